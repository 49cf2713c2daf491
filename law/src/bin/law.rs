use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;

use law::database::{DatabaseCollaborator, PgControlDataCollaborator, PgQueryCollaborator};
use law::{Cli, Command, Config, Operator};

fn main() {
    law::logging::init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("law: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run(cli)) {
        eprintln!("law: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::resolve(&cli)?;
    let storage = law_storage::from_ssn(&config.storage_url, config.aws.clone())?;
    let operator = Operator::new(storage);

    match cli.command {
        Command::WalPush { segment } => {
            operator.archive(&segment).await?;
        }
        Command::WalFetch {
            segment,
            destination,
        } => {
            operator.unarchive(&segment, &destination).await?;
        }
        Command::BackupPush {
            cluster,
            rate_limit,
        } => {
            let database = make_database_collaborator(&config, &cluster)?;
            operator.backup(&cluster, rate_limit, database.as_ref()).await?;
        }
        Command::BackupFetch { cluster, name } => {
            operator.restore(&cluster, &name).await?;
        }
    }

    Ok(())
}

/// Prefers talking to a live server over `DATABASE_URL`; falls back to
/// reading the (necessarily stopped) cluster's control file directly.
fn make_database_collaborator(
    config: &Config,
    cluster_dir: &Utf8PathBuf,
) -> anyhow::Result<Arc<dyn DatabaseCollaborator>> {
    if let Some(database_url) = &config.database_url {
        Ok(Arc::new(PgQueryCollaborator::new(database_url.clone())))
    } else {
        Ok(Arc::new(PgControlDataCollaborator::new(
            "pg_controldata".to_string(),
            cluster_dir.to_string(),
        )))
    }
}
