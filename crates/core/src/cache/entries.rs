//! Stored request/response entries.
//!
//! Entries are keyed by `(generation, cache_key)`. Writing the same key again
//! overwrites the previous entry; there is no per-entry expiry here.

use super::connection::CacheDb;
use super::generations::{Generation, ensure_generation};
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

/// A response as persisted in a generation.
///
/// Headers keep their original order. `vary` holds the request header values
/// (lowercased names) that the response's `Vary` header named at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub cache_key: String,
    pub url: String,
    pub method: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub vary: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub opaque: bool,
    pub written_at: String,
}

impl StoredEntry {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the request headers agree with every varied header recorded
    /// for this entry. A header absent on both sides counts as equal.
    pub fn vary_matches(&self, request_headers: &[(String, String)]) -> bool {
        self.vary.iter().all(|(name, stored)| {
            let current = request_headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
                .unwrap_or("");
            current == stored
        })
    }
}

const SELECT_COLUMNS: &str = "cache_key, url, method, status_code, status_text, headers_json, vary_json, body, opaque, written_at";

fn insert_entry(conn: &rusqlite::Connection, generation: &str, entry: &StoredEntry) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO entries (
            generation, cache_key, url, method, status_code, status_text,
            headers_json, vary_json, body, opaque, written_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(generation, cache_key) DO UPDATE SET
            url = excluded.url,
            method = excluded.method,
            status_code = excluded.status_code,
            status_text = excluded.status_text,
            headers_json = excluded.headers_json,
            vary_json = excluded.vary_json,
            body = excluded.body,
            opaque = excluded.opaque,
            written_at = excluded.written_at",
        params![
            generation,
            &entry.cache_key,
            &entry.url,
            &entry.method,
            entry.status_code,
            &entry.status_text,
            serde_json::to_string(&entry.headers)?,
            serde_json::to_string(&entry.vary)?,
            &entry.body,
            entry.opaque as i32,
            &entry.written_at,
        ],
    )?;
    Ok(())
}

type EntryRow = (String, String, String, u16, String, String, String, Vec<u8>, i32, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn decode_row(row: EntryRow) -> Result<StoredEntry, Error> {
    let (cache_key, url, method, status_code, status_text, headers_json, vary_json, body, opaque, written_at) = row;
    Ok(StoredEntry {
        cache_key,
        url,
        method,
        status_code,
        status_text,
        headers: serde_json::from_str(&headers_json)?,
        vary: serde_json::from_str(&vary_json)?,
        body,
        opaque: opaque == 1,
        written_at,
    })
}

impl CacheDb {
    /// Insert or overwrite an entry.
    ///
    /// Recreates the generation row first if it was deleted, so writes after
    /// a purge land in a fresh generation of the same name.
    pub async fn put_entry(&self, generation: &Generation, entry: &StoredEntry) -> Result<(), Error> {
        let generation = generation.clone();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation)?;
                insert_entry(&tx, &generation.name, &entry)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Write a batch of entries in one transaction.
    ///
    /// Either every entry is stored or none is.
    pub async fn put_entries(&self, generation: &Generation, entries: Vec<StoredEntry>) -> Result<usize, Error> {
        let generation = generation.clone();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation)?;
                for entry in &entries {
                    insert_entry(&tx, &generation.name, entry)?;
                }
                tx.commit()?;
                Ok(entries.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up an entry by key in one generation, ignoring header variance.
    pub async fn get_entry(&self, generation: &str, cache_key: &str) -> Result<Option<StoredEntry>, Error> {
        let generation = generation.to_string();
        let cache_key = cache_key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM entries WHERE generation = ?1 AND cache_key = ?2"
                ))?;

                match stmt.query_row(params![generation, cache_key], read_row) {
                    Ok(row) => decode_row(row).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Find the first entry for `cache_key` across `generations`, in order,
    /// whose varied headers agree with `request_headers`.
    pub async fn match_entry(
        &self, generations: &[String], cache_key: &str, request_headers: &[(String, String)],
    ) -> Result<Option<StoredEntry>, Error> {
        let generations = generations.to_vec();
        let cache_key = cache_key.to_string();
        let request_headers = request_headers.to_vec();
        self.conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM entries WHERE generation = ?1 AND cache_key = ?2"
                ))?;

                for generation in &generations {
                    let row = match stmt.query_row(params![generation, cache_key], read_row) {
                        Ok(row) => row,
                        Err(rusqlite::Error::QueryReturnedNoRows) => continue,
                        Err(e) => return Err(e.into()),
                    };
                    let entry = decode_row(row)?;
                    if entry.vary_matches(&request_headers) {
                        return Ok(Some(entry));
                    }
                }

                Ok(None)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one entry. Returns false if it was not present.
    pub async fn delete_entry(&self, generation: &str, cache_key: &str) -> Result<bool, Error> {
        let generation = generation.to_string();
        let cache_key = cache_key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE generation = ?1 AND cache_key = ?2",
                    params![generation, cache_key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Total entries across all generations.
    pub async fn count_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
