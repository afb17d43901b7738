use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db;
use crate::output;
use crate::record::CharacterRecord;

/// A record needs a non-blank name and source URL to be stored.
fn is_loadable(record: &CharacterRecord) -> bool {
    record.name.as_deref().is_some_and(|n| !n.trim().is_empty())
        && !record.source_url.trim().is_empty()
}

/// Upsert every loadable record in a single transaction and return how many
/// were applied. Re-loading the same records leaves the table unchanged.
pub fn load(conn: &Connection, records: &[CharacterRecord]) -> Result<usize> {
    db::init_schema(conn)?;
    let (keep, skipped): (Vec<&CharacterRecord>, Vec<&CharacterRecord>) =
        records.iter().partition(|r| is_loadable(r));
    if !skipped.is_empty() {
        debug!("Skipping {} records without name or source_url", skipped.len());
    }
    let keep: Vec<CharacterRecord> = keep.into_iter().cloned().collect();
    db::upsert_characters(conn, &keep)
}

/// Load the intermediate file at `path`. A missing file loads nothing.
pub fn import_file(conn: &Connection, path: &Path) -> Result<usize> {
    let Some(records) = output::read_records(path)? else {
        return Ok(0);
    };
    let count = load(conn, &records)?;
    info!("Imported {} of {} characters from {:?}", count, records.len(), path);
    Ok(count)
}
