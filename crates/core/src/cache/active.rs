//! Which worker version last finished activating.
//!
//! A single row, rewritten on every activation. It survives restarts so a
//! host can resume serving an installed version without the network.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite::OptionalExtension};

use super::connection::CacheDb;
use super::generations::Generation;
use crate::Error;

/// The generations owned by the last activated version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ActiveVersion {
    pub static_generation: String,
    pub runtime_generation: String,
    pub activated_at: String,
}

impl CacheDb {
    /// Record `static_generation` / `runtime_generation` as the active version.
    pub async fn record_active(&self, static_generation: &Generation, runtime_generation: &Generation) -> Result<(), Error> {
        let static_name = static_generation.name.clone();
        let runtime_name = runtime_generation.name.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO active_version (slot, static_generation, runtime_generation, activated_at)
                     VALUES (1, ?1, ?2, ?3)
                     ON CONFLICT(slot) DO UPDATE SET
                         static_generation = excluded.static_generation,
                         runtime_generation = excluded.runtime_generation,
                         activated_at = excluded.activated_at",
                    params![static_name, runtime_name, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// The last recorded active version, if any version ever activated.
    pub async fn active_version(&self) -> Result<Option<ActiveVersion>, Error> {
        self.conn
            .call(|conn| -> Result<Option<ActiveVersion>, Error> {
                let row = conn
                    .query_row(
                        "SELECT static_generation, runtime_generation, activated_at FROM active_version WHERE slot = 1",
                        [],
                        |row| {
                            Ok(ActiveVersion {
                                static_generation: row.get(0)?,
                                runtime_generation: row.get(1)?,
                                activated_at: row.get(2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)
    }
}
