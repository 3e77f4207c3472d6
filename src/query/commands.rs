use crate::query::formatters::{OutputFormat, format_cursors, format_stats, format_wallets};
use crate::repository::{CursorRepository, TrackingRepository};
use anyhow::Result;

pub fn cmd_wallets(
    tracking_repo: &TrackingRepository,
    subscriber_id: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let records = tracking_repo.list(subscriber_id)?;
    let output = format_wallets(&records, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_cursors(cursor_repo: &CursorRepository, format: &OutputFormat) -> Result<()> {
    let cursors = cursor_repo.list()?;
    let output = format_cursors(&cursors, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_stats(repo: &TrackingRepository, format: &OutputFormat) -> Result<()> {
    let stats = repo.get_statistics()?;
    let output = format_stats(&stats, format);
    println!("{output}");

    Ok(())
}
