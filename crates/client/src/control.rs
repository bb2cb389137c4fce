//! Out-of-band commands from pages and background-sync triggers.

use serde::{Deserialize, Serialize};

use crate::clients::Notification;
use crate::response::Response;
use crate::worker::Worker;
use fxcache_core::Error;

/// Control messages a page can post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Drop cached rates and fetch fresh ones.
    CacheUpdate,
    /// Drop every generation.
    ClearCache,
}

impl Command {
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "CACHE_UPDATE" => Some(Command::CacheUpdate),
            "CLEAR_CACHE" => Some(Command::ClearCache),
            _ => None,
        }
    }

    /// Parse a `{"type": ...}` message. Unknown types yield `Ok(None)`;
    /// malformed JSON or a missing `type` is an error.
    pub fn parse(raw: &str) -> Result<Option<Self>, Error> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| Error::InvalidInput(format!("control message: {e}")))?;
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| Error::InvalidInput("control message has no string `type`".into()))?;
        Ok(Self::from_type(kind))
    }
}

impl Worker {
    /// Run a control command and broadcast its notification.
    ///
    /// `CLEAR_CACHE` is unconditional; asking for confirmation is up to the
    /// caller.
    pub async fn on_message(&self, command: Command) -> Result<Notification, Error> {
        let cache = self.engine().cache();

        let notification = match command {
            Command::CacheUpdate => {
                let runtime = &self.engine().runtime_generation().name;
                cache.delete_generation(runtime).await?;
                self.refresh_rates().await;
                Notification::CacheUpdated
            }
            Command::ClearCache => {
                let deleted = cache.delete_all_generations().await?;
                tracing::info!(deleted, "cleared every generation");
                Notification::CacheCleared
            }
        };

        let delivered = self.clients().post_message(notification);
        tracing::debug!(?command, delivered, "control message handled");
        Ok(notification)
    }

    /// Raw JSON entry point for the control channel.
    pub async fn on_message_json(&self, raw: &str) -> Result<Option<Notification>, Error> {
        match Command::parse(raw)? {
            Some(command) => self.on_message(command).await.map(Some),
            None => {
                tracing::debug!(message = raw, "ignoring unknown control message");
                Ok(None)
            }
        }
    }

    /// Background-sync trigger. Refreshes rates for the configured tag and
    /// notifies nobody. Returns whether the tag was recognised.
    pub async fn on_sync(&self, tag: &str) -> Result<bool, Error> {
        if tag != self.sync_tag() {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return Ok(false);
        }
        self.refresh_rates().await;
        Ok(true)
    }

    /// One network-first pass over the default rates endpoint.
    pub async fn refresh_rates(&self) -> Response {
        let response = self.engine().network_first(self.rates_request()).await;
        if !response.is_ok() {
            tracing::warn!(url = %self.rates_request().url, "rates refresh did not reach the network");
        }
        response
    }
}
