use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::record::CharacterRecord;

/// Open the SQLite sink named by a connection string. Accepts a bare path,
/// a `sqlite://` URL, or `:memory:`.
pub fn connect(database_url: &str) -> Result<Connection> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    let conn = if path == ":memory:" {
        Connection::open_in_memory()?
    } else {
        if let Some(dir) = std::path::Path::new(path)
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        Connection::open(path).with_context(|| format!("Failed to open {}", path))?
    };
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS characters (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            name              TEXT NOT NULL,
            source_collection TEXT,
            fandom            TEXT,
            source_url        TEXT UNIQUE NOT NULL,
            gender            TEXT,
            status            TEXT,
            image_url         TEXT,
            scraped_at        TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_characters_collection ON characters(source_collection);
        CREATE INDEX IF NOT EXISTS idx_characters_gender ON characters(gender);
        CREATE INDEX IF NOT EXISTS idx_characters_status ON characters(status);
        ",
    )?;
    Ok(())
}

// ── Upsert ──

/// Insert-or-overwrite by `source_url` inside one transaction. Every column
/// but `id` takes the incoming value. Any error rolls back the whole batch.
pub fn upsert_characters(conn: &Connection, records: &[CharacterRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO characters
             (name, source_collection, fandom, source_url, gender, status, image_url, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(source_url) DO UPDATE SET
                name              = excluded.name,
                source_collection = excluded.source_collection,
                fandom            = excluded.fandom,
                gender            = excluded.gender,
                status            = excluded.status,
                image_url         = excluded.image_url,
                scraped_at        = excluded.scraped_at",
        )?;
        for r in records {
            stmt.execute(rusqlite::params![
                r.name,
                r.source_collection,
                r.fandom,
                r.source_url,
                r.gender.as_str(),
                r.status.as_str(),
                r.image_url,
                r.scraped_at.map(|t| t.to_rfc3339()),
            ])
            .with_context(|| format!("Failed to upsert {}", r.source_url))?;
            count += 1;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Overview ──

/// Typed read-only projection of one table row.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterRow {
    pub name: String,
    pub source_collection: String,
    pub source_url: String,
    pub gender: String,
    pub status: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Default)]
pub struct OverviewFilter<'a> {
    pub collection: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub status: Option<&'a str>,
}

const ROW_COLUMNS: &str = "name, COALESCE(source_collection,''), source_url,
     COALESCE(gender,'Unknown'), COALESCE(status,'Unknown'), image_url";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CharacterRow> {
    Ok(CharacterRow {
        name: row.get(0)?,
        source_collection: row.get(1)?,
        source_url: row.get(2)?,
        gender: row.get(3)?,
        status: row.get(4)?,
        image_url: row.get(5)?,
    })
}

pub fn fetch_overview(
    conn: &Connection,
    filter: &OverviewFilter<'_>,
    limit: usize,
) -> Result<Vec<CharacterRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    for (column, value) in [
        ("source_collection", filter.collection),
        ("gender", filter.gender),
        ("status", filter.status),
    ] {
        if let Some(v) = value {
            conditions.push(format!("{} = ?{} COLLATE NOCASE", column, params.len() + 1));
            params.push(Box::new(v.to_string()));
        }
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM characters{} ORDER BY source_collection, name LIMIT {}",
        ROW_COLUMNS, where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Case-insensitive substring match on `name`. An empty query matches all.
pub fn search_by_name(conn: &Connection, query: &str, limit: usize) -> Result<Vec<CharacterRow>> {
    let pattern = format!(
        "%{}%",
        query.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
    );
    let sql = format!(
        "SELECT {} FROM characters WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT {}",
        ROW_COLUMNS, limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([pattern], map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub collections: usize,
    pub by_gender: Vec<(String, usize)>,
    pub by_status: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM characters", [], |r| r.get(0))?;
    let collections: usize = conn.query_row(
        "SELECT COUNT(DISTINCT source_collection) FROM characters",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        collections,
        by_gender: count_by(conn, "gender")?,
        by_status: count_by(conn, "status")?,
    })
}

fn count_by(conn: &Connection, column: &str) -> Result<Vec<(String, usize)>> {
    let sql = format!(
        "SELECT COALESCE({col},'Unknown'), COUNT(*) FROM characters
         GROUP BY 1 ORDER BY 2 DESC, 1",
        col = column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
