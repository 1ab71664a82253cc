//! Small-state KV store on Redis.  Holds the JSON blobs that must survive a
//! restart (burst mode, intervals, boot markers) under `ain:state:*`.
//! Without a configured URL the store degrades to a no-op and the engine
//! falls back to its file defaults.

use std::time::Duration;

use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, warn};

const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct StateStore {
    manager: Option<ConnectionManager>,
    prefix: String,
}

impl StateStore {
    /// Connect if a URL is configured; otherwise return the degraded store.
    pub async fn open(url: Option<&str>, prefix: &str) -> Self {
        let Some(url) = url else {
            info!("no KV url configured; state store degraded to no-op");
            return Self::disabled(prefix);
        };

        let manager = match Self::connect(url).await {
            Ok(manager) => {
                info!("KV state store connected");
                Some(manager)
            }
            Err(err) => {
                warn!(%err, "KV connection failed; state store degraded to no-op");
                None
            }
        };

        Self {
            manager,
            prefix: prefix.to_string(),
        }
    }

    pub fn disabled(prefix: &str) -> Self {
        Self {
            manager: None,
            prefix: prefix.to_string(),
        }
    }

    async fn connect(url: &str) -> anyhow::Result<ConnectionManager> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(SOCKET_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| anyhow::anyhow!("KV connect timed out"))??;
        Ok(manager)
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_some()
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }

    /// Store a JSON-serialisable value.  Timeouts are retried once, per the
    /// store contract.
    pub async fn set_state<T: Serialize>(&self, name: &str, value: &T) -> bool {
        let Some(manager) = &self.manager else {
            return false;
        };
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, name, "KV value serialisation failed");
                return false;
            }
        };

        let key = self.key(name);
        for attempt in 0..2 {
            let mut conn = manager.clone();
            let outcome = tokio::time::timeout(
                SOCKET_TIMEOUT,
                redis::cmd("SET")
                    .arg(&key)
                    .arg(&serialized)
                    .query_async::<_, ()>(&mut conn),
            )
            .await;
            match outcome {
                Ok(Ok(())) => return true,
                Ok(Err(err)) => {
                    warn!(%err, key, "KV set failed");
                    return false;
                }
                Err(_) if attempt == 0 => continue,
                Err(_) => {
                    warn!(key, "KV set timed out twice");
                    return false;
                }
            }
        }
        false
    }

    /// Fetch and deserialise, or `None` on any failure.
    pub async fn get_state<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let manager = self.manager.as_ref()?;
        let key = self.key(name);

        for attempt in 0..2 {
            let mut conn = manager.clone();
            let outcome = tokio::time::timeout(
                SOCKET_TIMEOUT,
                redis::cmd("GET")
                    .arg(&key)
                    .query_async::<_, Option<String>>(&mut conn),
            )
            .await;
            match outcome {
                Ok(Ok(Some(raw))) => return serde_json::from_str(&raw).ok(),
                Ok(Ok(None)) => return None,
                Ok(Err(err)) => {
                    warn!(%err, key, "KV get failed");
                    return None;
                }
                Err(_) if attempt == 0 => continue,
                Err(_) => {
                    warn!(key, "KV get timed out twice");
                    return None;
                }
            }
        }
        None
    }

    // ── burst helpers ─────────────────────────────────────────────────────

    /// Persist active burst mode under `system_state`.
    pub async fn set_burst_mode(&self, end_time_iso: &str, interval: u64) -> bool {
        self.set_state(
            "system_state",
            &json!({
                "burst_mode": true,
                "burst_end_time": end_time_iso,
                "current_interval": interval,
            }),
        )
        .await
    }

    /// Clear burst mode, restoring the default interval.
    pub async fn clear_burst_mode(&self, default_interval: u64) -> bool {
        self.set_state(
            "system_state",
            &json!({
                "burst_mode": false,
                "burst_end_time": null,
                "current_interval": default_interval,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_store_is_inert() {
        let store = StateStore::disabled("ain:state");
        assert!(!store.is_connected());
        assert!(!store.set_state("k", &serde_json::json!({"a": 1})).await);
        assert!(store.get_state::<serde_json::Value>("k").await.is_none());
    }

    #[tokio::test]
    async fn missing_url_degrades() {
        let store = StateStore::open(None, "ain:state").await;
        assert!(!store.is_connected());
    }

    #[test]
    fn keys_carry_the_prefix() {
        let store = StateStore::disabled("ain:state");
        assert_eq!(store.key("system_state"), "ain:state:system_state");
    }
}
