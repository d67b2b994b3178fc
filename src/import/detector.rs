//! Delimiter detection and header resolution.
//!
//! The first line of the upload decides the delimiter (`;` wins when present,
//! `,` otherwise). Header cells are trimmed and lower-cased, then matched
//! against a fixed, ordered synonym list per canonical contact field. The
//! resolved [`ColumnMapping`] is computed once per run and reused for every row.

use crate::import::ImportError;
use csv::ByteRecord;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

/// Canonical contact fields populated by the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Email,
    Phone,
    Birthdate,
}

impl Field {
    /// Accepted header names, in priority order.
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Field::Name => &["name", "full_name", "fullname"],
            Field::Email => &["email", "email_address", "e-mail"],
            Field::Phone => &["phone", "telephone", "phone_number"],
            Field::Birthdate => &["birthdate", "birth_date", "dob", "date_of_birth"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::Birthdate => "birthdate",
        }
    }
}

/// Zero-based column positions for each canonical field.
///
/// `name` and `email` are mandatory, so a mapping only exists once both
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub name: usize,
    pub email: usize,
    pub phone: Option<usize>,
    pub birthdate: Option<usize>,
}

impl ColumnMapping {
    /// Resolve a normalized header row.
    ///
    /// Fails with [`ImportError::MissingRequiredColumns`] when either the name
    /// or the email column is absent.
    pub fn resolve(header: &[String]) -> Result<Self, ImportError> {
        let name = find_column(header, Field::Name);
        let email = find_column(header, Field::Email);

        match (name, email) {
            (Some(name), Some(email)) => Ok(Self {
                name,
                email,
                phone: find_column(header, Field::Phone),
                birthdate: find_column(header, Field::Birthdate),
            }),
            _ => Err(ImportError::MissingRequiredColumns),
        }
    }

    pub fn index_of(&self, field: Field) -> Option<usize> {
        match field {
            Field::Name => Some(self.name),
            Field::Email => Some(self.email),
            Field::Phone => self.phone,
            Field::Birthdate => self.birthdate,
        }
    }
}

/// First header position matching any synonym of `field`, honoring synonym order.
pub fn find_column(header: &[String], field: Field) -> Option<usize> {
    field
        .synonyms()
        .iter()
        .find_map(|synonym| header.iter().position(|column| column == synonym))
}

/// Inspect the first line and pick the field delimiter.
///
/// The source is rewound to its start afterwards so header parsing sees the
/// untouched stream.
pub fn detect_delimiter<R: Read + Seek>(source: &mut R) -> Result<u8, ImportError> {
    source.seek(SeekFrom::Start(0))?;

    let mut first_line = Vec::new();
    {
        let mut reader = BufReader::new(&mut *source);
        reader.read_until(b'\n', &mut first_line)?;
    }

    source.seek(SeekFrom::Start(0))?;

    Ok(if first_line.contains(&b';') { b';' } else { b',' })
}

/// Trim and lower-case every header cell, dropping a leading UTF-8 BOM.
pub fn normalize_header(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let text = String::from_utf8_lossy(cell);
            let text: &str = if idx == 0 {
                text.trim_start_matches('\u{feff}')
            } else {
                &text
            };
            text.trim().to_lowercase()
        })
        .collect()
}
