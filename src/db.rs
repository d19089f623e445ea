use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS locations (
            id         INTEGER PRIMARY KEY,
            country    TEXT NOT NULL,
            city       TEXT NOT NULL,
            UNIQUE(country, city)
        );

        CREATE TABLE IF NOT EXISTS categories (
            id         INTEGER PRIMARY KEY,
            name       TEXT UNIQUE NOT NULL
        );

        -- Rows as handed over by the table extractor, one table per location
        CREATE TABLE IF NOT EXISTS raw_rows (
            location_id INTEGER NOT NULL REFERENCES locations(id),
            position    INTEGER NOT NULL,
            type        TEXT NOT NULL,
            avg_price   TEXT NOT NULL,
            PRIMARY KEY (location_id, position)
        );
        ",
    )?;
    Ok(())
}

// ── Rows ──

/// One row of the scraped cost-of-living table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(rename = "Type")]
    pub row_type: String,
    #[serde(rename = "Avg_price")]
    pub avg_price: String,
}

impl RawRow {
    #[cfg(test)]
    pub fn new(row_type: &str, avg_price: &str) -> Self {
        Self {
            row_type: row_type.to_string(),
            avg_price: avg_price.to_string(),
        }
    }
}

/// The extracted table of one city page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    pub country: String,
    pub city: String,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRow {
    pub id: i64,
    pub country: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
}

// ── Reference tables ──

pub fn fetch_locations(conn: &Connection) -> Result<Vec<LocationRow>> {
    let mut stmt = conn.prepare("SELECT id, country, city FROM locations ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(LocationRow {
                id: row.get(0)?,
                country: row.get(1)?,
                city: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_categories(conn: &Connection) -> Result<Vec<CategoryRow>> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CategoryRow {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_location(conn: &Connection, country: &str, city: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO locations (country, city) VALUES (?1, ?2)",
        rusqlite::params![country, city],
    )?;
    let id = conn.query_row(
        "SELECT id FROM locations WHERE country = ?1 AND city = ?2",
        rusqlite::params![country, city],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn insert_category(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
        rusqlite::params![name],
    )?;
    let id = conn.query_row(
        "SELECT id FROM categories WHERE name = ?1",
        rusqlite::params![name],
        |row| row.get(0),
    )?;
    Ok(id)
}

// ── Raw tables ──

/// Replace the stored table of a location; row order is kept via `position`.
pub fn insert_raw_rows(conn: &Connection, location_id: i64, rows: &[RawRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM raw_rows WHERE location_id = ?1",
        rusqlite::params![location_id],
    )?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO raw_rows (location_id, position, type, avg_price) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (position, row) in rows.iter().enumerate() {
            count += stmt.execute(rusqlite::params![
                location_id,
                position as i64,
                row.row_type,
                row.avg_price
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Load extractor output (`[RawPage]` as JSON) into `raw_rows`.
pub fn import_pages_json(conn: &Connection, path: &Path) -> Result<usize> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let pages: Vec<RawPage> = serde_json::from_str(&json)
        .with_context(|| format!("Invalid page list in {}", path.display()))?;
    for page in &pages {
        let location_id = insert_location(conn, &page.country, &page.city)?;
        insert_raw_rows(conn, location_id, &page.rows)?;
    }
    Ok(pages.len())
}

fn fetch_rows(conn: &Connection, location_id: i64) -> Result<Vec<RawRow>> {
    let mut stmt = conn.prepare(
        "SELECT type, avg_price FROM raw_rows WHERE location_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map([location_id], |row| {
            Ok(RawRow {
                row_type: row.get(0)?,
                avg_price: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Tables of every location that has raw rows, ordered by location id.
pub fn fetch_pages(conn: &Connection, limit: Option<usize>) -> Result<Vec<RawPage>> {
    let sql = format!(
        "SELECT l.id, l.country, l.city
         FROM locations l
         WHERE EXISTS (SELECT 1 FROM raw_rows r WHERE r.location_id = l.id)
         ORDER BY l.id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let locations = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut pages = Vec::with_capacity(locations.len());
    for (id, country, city) in locations {
        pages.push(RawPage {
            rows: fetch_rows(conn, id)?,
            country,
            city,
        });
    }
    Ok(pages)
}

pub fn fetch_page(conn: &Connection, country: &str, city: &str) -> Result<Option<RawPage>> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM locations WHERE country = ?1 AND city = ?2",
            rusqlite::params![country, city],
            |row| row.get(0),
        )
        .optional()?;
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(Some(RawPage {
        country: country.to_string(),
        city: city.to_string(),
        rows: fetch_rows(conn, id)?,
    }))
}

// ── Stats ──

pub struct Stats {
    pub locations: usize,
    pub categories: usize,
    pub tables: usize,
    pub raw_rows: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    };
    Ok(Stats {
        locations: count("SELECT COUNT(*) FROM locations")?,
        categories: count("SELECT COUNT(*) FROM categories")?,
        tables: count("SELECT COUNT(DISTINCT location_id) FROM raw_rows")?,
        raw_rows: count("SELECT COUNT(*) FROM raw_rows")?,
    })
}

// ── Tests ──
