//! Generation bookkeeping.
//!
//! A generation is a named container of entries. Deleting one removes its
//! entries through the foreign key cascade.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_rusqlite::{params, rusqlite};

/// What a generation holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    /// App shell, icons, fonts, stylesheets and scripts.
    Static,
    /// Live API responses.
    Runtime,
}

impl GenerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationKind::Static => "static",
            GenerationKind::Runtime => "runtime",
        }
    }

    fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "static" => Ok(GenerationKind::Static),
            "runtime" => Ok(GenerationKind::Runtime),
            other => Err(Error::CorruptEntry(format!("unknown generation kind: {other}"))),
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation {
    pub name: String,
    pub kind: GenerationKind,
}

impl Generation {
    pub fn new(name: impl Into<String>, kind: GenerationKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// Listing row for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GenerationSummary {
    pub name: String,
    pub kind: GenerationKind,
    pub created_at: String,
    pub entries: u64,
}

pub(crate) fn ensure_generation(conn: &rusqlite::Connection, generation: &Generation) -> Result<bool, Error> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO generations (name, kind, created_at) VALUES (?1, ?2, ?3)",
        params![&generation.name, generation.kind.as_str(), chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(inserted == 1)
}

impl CacheDb {
    /// Create the generation if it does not exist yet.
    ///
    /// Returns true when a new generation was created.
    pub async fn open_generation(&self, generation: &Generation) -> Result<bool, Error> {
        let generation = generation.clone();
        self.conn
            .call(move |conn| ensure_generation(conn, &generation))
            .await
            .map_err(Error::from)
    }

    /// Whether a generation with this name exists.
    pub async fn has_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// All generation names in ascending tag order.
    pub async fn generation_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Every generation with its entry count.
    pub async fn generation_summaries(&self) -> Result<Vec<GenerationSummary>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<GenerationSummary>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT g.name, g.kind, g.created_at, COUNT(e.cache_key)
                     FROM generations g
                     LEFT JOIN entries e ON e.generation = g.name
                     GROUP BY g.name
                     ORDER BY g.name ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(name, kind, created_at, entries)| {
                        Ok(GenerationSummary { name, kind: GenerationKind::parse(&kind)?, created_at, entries: entries as u64 })
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and all of its entries.
    ///
    /// Returns false if no such generation existed.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation.
    ///
    /// Returns the number of generations removed.
    pub async fn delete_all_generations(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries", [])?;
                let deleted = tx.execute("DELETE FROM generations", [])?;
                tx.commit()?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
