use std::collections::HashSet;

/// Duplicate detection for one import run.
///
/// `persisted` is the snapshot of stored emails taken when the run starts and
/// is never refreshed; `accepted` grows as rows are imported.
#[derive(Debug, Default)]
pub struct Deduplicator {
    persisted: HashSet<String>,
    accepted: HashSet<String>,
}

impl Deduplicator {
    pub fn new(persisted: HashSet<String>) -> Self {
        Self {
            persisted: persisted.into_iter().map(|email| normalize(&email)).collect(),
            accepted: HashSet::new(),
        }
    }

    pub fn is_duplicate(&self, email: &str) -> bool {
        let email = normalize(email);
        self.persisted.contains(&email) || self.accepted.contains(&email)
    }

    /// Remember an email imported earlier in this run.
    pub fn accept(&mut self, email: &str) {
        self.accepted.insert(normalize(email));
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_persisted_and_in_run_duplicates() {
        let mut dedup = Deduplicator::new(HashSet::from(["Old@X.com".to_string()]));

        assert!(dedup.is_duplicate("old@x.com"));
        assert!(!dedup.is_duplicate("new@x.com"));

        dedup.accept("new@x.com");
        assert!(dedup.is_duplicate(" NEW@x.com "));
    }
}
