use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use storage::{prepare_database_url, KeyValueStore, PrefKind, PrefValue, Prefs, SqlitePrefsStore};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = storage::DEFAULT_PREFS_DATABASE_URL)]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List,
    Get {
        key: String,
    },
    Set {
        key: String,
        kind: String,
        value: String,
    },
    Remove {
        key: String,
    },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let database_url = prepare_database_url(&cli.database_url)?;
    let prefs = Prefs::new(Arc::new(SqlitePrefsStore::new(&database_url).await?));

    match cli.command {
        Command::List => {
            for (key, value) in prefs.entries().await? {
                println!("{key} ({}) = {value}", value.kind());
            }
        }
        Command::Get { key } => match prefs.store().read(&key).await? {
            Some(value) => println!("{key} ({}) = {value}", value.kind()),
            None => println!("{key} is not set"),
        },
        Command::Set { key, kind, value } => {
            let kind: PrefKind = kind.parse()?;
            let value = PrefValue::parse(kind, &value)
                .with_context(|| format!("invalid value for '{key}'"))?;
            if !prefs.set_value(&key, Some(value)).await {
                bail!("failed to write '{key}'");
            }
            println!("set {key}");
        }
        Command::Remove { key } => {
            if !prefs.set_value(&key, None).await {
                bail!("failed to remove '{key}'");
            }
            println!("removed {key}");
        }
        Command::Clear => {
            prefs.clear().await?;
            println!("cleared all preferences");
        }
    }

    Ok(())
}
