use anyhow::Result;
use wallet_watcher::config::Config;
use wallet_watcher::repository::Database;

fn main() -> Result<()> {
    wallet_watcher::init_tracing();

    let database_url = Config::database_url_from_env();

    println!("Running migrations on database: {database_url}");

    let _db = Database::new(&database_url)?;

    println!("Migrations completed successfully!");

    Ok(())
}
