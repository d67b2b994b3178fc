use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use contacts_server::db::run_migrations;
use contacts_server::import::{
    ContactImporter, ContactStore, ImportSession, ImportStatistics, MemoryContactStore,
    PgContactStore,
};
use contacts_server::jobs::execute_attempt;
use contacts_server::progress::{DEFAULT_PROGRESS_TTL, MemoryProgressStore, ProgressHub, SessionChannels};

#[derive(Parser, Debug)]
#[command(
    name = "import_csv",
    about = "Import contacts from one or more CSV files without going through the HTTP API"
)]
struct Args {
    /// CSV or TXT files to import, processed in order.
    #[arg(long = "file", required = true)]
    files: Vec<PathBuf>,

    /// Validate and deduplicate without touching the database.
    #[arg(long)]
    dry_run: bool,

    /// Wall-clock limit per file, in seconds.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let contacts: Arc<dyn ContactStore> = if args.dry_run {
        log::info!("dry run: contacts are kept in memory");
        Arc::new(MemoryContactStore::new())
    } else {
        let database_url = std::env::var("DATABASE_URL")?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;
        run_migrations(&pool).await?;
        Arc::new(PgContactStore::new(pool))
    };

    let progress = ProgressHub::new(
        Arc::new(MemoryProgressStore::new()),
        Arc::new(SessionChannels::new()),
        DEFAULT_PROGRESS_TTL,
    );
    let importer = ContactImporter::new(contacts, progress);
    let timeout = Duration::from_secs(args.timeout_secs);

    let mut totals = ImportStatistics::default();
    let mut failed = false;

    for (idx, path) in args.files.iter().enumerate() {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let session = ImportSession::new(format!("cli_{}", idx + 1), file_name);

        match execute_attempt(&importer, path, &session, timeout).await {
            Ok(stats) => {
                println!("{}: {}", path.display(), serde_json::to_string(&stats)?);
                totals.merge(stats);
            }
            Err(e) => {
                eprintln!("error: {}: {}", path.display(), e);
                failed = true;
            }
        }
    }

    if args.files.len() > 1 {
        println!("total: {}", serde_json::to_string_pretty(&totals)?);
    }

    if failed {
        std::process::exit(1);
    }

    Ok(())
}
