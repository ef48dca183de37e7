use std::{fs, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use mdl_issuance::store::MemorySystemOfRecord;
use mdl_server::{
    server,
    settings::Settings,
    store::{database_url_for_path, DatabaseSystemOfRecord},
    testdata,
};

#[derive(Parser)]
#[command(about = "Reference issuing server for ISO 18013-5 mobile driving licences")]
struct Args {
    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Path of the SQLite catalog; omit to run on an in-memory catalog
    #[arg(long)]
    database: Option<PathBuf>,

    /// Drop the catalog file and re-seed it with the demo records
    #[arg(long)]
    reset_with_testdata: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = Settings::new()?;
    if let Some(port) = args.port {
        settings.port = port;
    }
    if args.database.is_some() {
        settings.database = args.database;
    }

    let builder = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    );
    if settings.structured_logging {
        builder.json().init();
    } else {
        builder.init()
    }

    match settings.database {
        Some(path) => {
            if args.reset_with_testdata && path.exists() {
                fs::remove_file(&path)?;
            }
            let seed = args.reset_with_testdata || !path.exists();

            let store = DatabaseSystemOfRecord::open(&database_url_for_path(&path)).await?;
            if seed {
                testdata::seed(&store).await?;
            }
            server::serve(settings.ip, settings.port, store).await
        }
        None => {
            let store = MemorySystemOfRecord::new();
            testdata::seed(&store).await?;
            server::serve(settings.ip, settings.port, store).await
        }
    }
}
