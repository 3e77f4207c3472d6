use anyhow::Result;
use clap::{Parser, Subcommand};
use wallet_watcher::config::Config;
use wallet_watcher::query::commands::{cmd_cursors, cmd_stats, cmd_wallets};
use wallet_watcher::query::formatters::OutputFormat;
use wallet_watcher::repository::{CursorRepository, Database, TrackingRepository};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Inspect tracked wallets and scan cursors", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Wallets {
        #[arg(long)]
        subscriber: Option<String>,
    },
    Cursors,
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let db = Database::new(&Config::database_url_from_env())?;
    let conn = db.conn();
    let tracking_repo = TrackingRepository::new(&conn);
    let cursor_repo = CursorRepository::new(&conn);

    match cli.command {
        Commands::Wallets { subscriber } => {
            cmd_wallets(&tracking_repo, subscriber.as_deref(), &format)?;
        }
        Commands::Cursors => {
            cmd_cursors(&cursor_repo, &format)?;
        }
        Commands::Stats => {
            cmd_stats(&tracking_repo, &format)?;
        }
    }

    Ok(())
}
