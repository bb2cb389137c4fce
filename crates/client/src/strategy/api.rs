//! Network first with an expiring cache fallback, for exchange-rate calls.

use chrono::Utc;

use super::{StrategyEngine, request_key};
use crate::request::Request;
use crate::response::{BasicResponse, Response};

impl StrategyEngine {
    /// Prefer the live response; fall back to a cached copy younger than the
    /// expiry window; otherwise answer with the synthetic 503.
    ///
    /// The cached copy is read before the fetch starts. An expired copy is
    /// kept in the store but never served. Entries without a readable stale
    /// marker count as expired.
    pub async fn network_first(&self, request: &Request) -> Response {
        let key = request_key(request);
        let fallback = self.usable_fallback(&key).await;

        match self.fetch(request).await {
            Ok(Response::Basic(live)) if live.is_ok() => {
                self.store_rates(request, &key, &live).await;
                return Response::Basic(live);
            }
            Ok(Response::Basic(live)) => {
                tracing::debug!(url = %request.url, status = live.status.as_u16(), "rates upstream not OK");
            }
            Ok(Response::Opaque(_)) => {
                tracing::debug!(url = %request.url, "rates upstream returned an opaque response");
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(url = %request.url, error = %e, "rates fetch failed");
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "rates fetch failed unexpectedly");
            }
        }

        match fallback {
            Some(cached) => {
                tracing::info!(url = %request.url, "serving cached rates");
                cached
            }
            None => {
                tracing::warn!(url = %request.url, "no usable cached rates; answering offline");
                Response::offline_error()
            }
        }
    }

    async fn usable_fallback(&self, key: &str) -> Option<Response> {
        let generation = &self.runtime_generation().name;
        let entry = match self.cache().get_entry(generation, key).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(error = %e, "rates cache read failed");
                return None;
            }
        };

        let cached = match Response::from_entry(entry) {
            Ok(Response::Basic(basic)) => basic,
            Ok(Response::Opaque(_)) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable rates entry");
                return None;
            }
        };

        let Some(written) = cached.stale_marker() else {
            tracing::debug!(key, "rates entry has no stale marker; treating as expired");
            return None;
        };

        let age = Utc::now() - written;
        if age > self.expiry {
            tracing::debug!(key, age_hours = age.num_hours(), "rates entry expired");
            return None;
        }

        Some(Response::Basic(cached))
    }

    async fn store_rates(&self, request: &Request, key: &str, live: &BasicResponse) {
        let stamped = Response::Basic(live.stamped(Utc::now()));
        let entry = match stamped.to_entry(request, key.to_string()) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "rates response not storable");
                return;
            }
        };

        if let Err(e) = self.cache().put_entry(self.runtime_generation(), &entry).await {
            tracing::warn!(url = %request.url, error = %e, "failed to store rates");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, Duration as Age};
    use reqwest::StatusCode;

    use super::*;
    use crate::response::{OFFLINE_ERROR_BODY, STALE_MARKER_HEADER};
    use crate::strategy::tests::engine_with;
    use crate::testing::FakeNetwork;

    const USD: &str = "https://open.er-api.com/v6/latest/USD";

    async fn seed(engine: &StrategyEngine, body: &'static str, written: DateTime<Utc>) {
        let request = Request::get(USD).unwrap();
        let response = Response::Basic(BasicResponse::new(StatusCode::OK, body).stamped(written));
        let entry = response.to_entry(&request, request_key(&request)).unwrap();
        engine.cache().put_entry(engine.runtime_generation(), &entry).await.unwrap();
    }

    fn body_of(response: &Response) -> String {
        String::from_utf8_lossy(&response.as_basic().unwrap().body).into_owned()
    }

    #[tokio::test]
    async fn test_live_response_passes_through_then_serves_offline() {
        let network = Arc::new(FakeNetwork::new());
        network.respond(USD, 200, r#"{"rates":{"EUR":0.9}}"#);
        let engine = engine_with(network.clone()).await;
        let request = Request::get(USD).unwrap();

        let live = engine.handle(&request).await.unwrap();
        assert_eq!(body_of(&live), r#"{"rates":{"EUR":0.9}}"#);
        assert!(live.as_basic().unwrap().headers.get(STALE_MARKER_HEADER).is_none());

        network.set_offline(true);
        let offline = engine.handle(&request).await.unwrap();
        assert_eq!(body_of(&offline), r#"{"rates":{"EUR":0.9}}"#);
    }

    #[tokio::test]
    async fn test_stored_entry_is_stamped_now() {
        let network = Arc::new(FakeNetwork::new());
        network.respond(USD, 200, "{}");
        let engine = engine_with(network).await;
        let request = Request::get(USD).unwrap();

        engine.network_first(&request).await;

        let entry = engine
            .cache()
            .get_entry(&engine.runtime_generation().name, &request_key(&request))
            .await
            .unwrap()
            .unwrap();
        let stored = Response::from_entry(entry).unwrap().into_basic().unwrap();
        let age = Utc::now() - stored.stale_marker().unwrap();
        assert!(age.num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_served() {
        let network = Arc::new(FakeNetwork::new());
        network.set_offline(true);
        let engine = engine_with(network).await;
        seed(&engine, r#"{"rates":{"EUR":0.8}}"#, Utc::now() - Age::days(2)).await;

        let response = engine.handle(&Request::get(USD).unwrap()).await.unwrap();
        let basic = response.as_basic().unwrap();
        assert_eq!(basic.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_of(&response), OFFLINE_ERROR_BODY);
    }

    #[tokio::test]
    async fn test_expired_entry_is_kept_in_store() {
        let network = Arc::new(FakeNetwork::new());
        network.set_offline(true);
        let engine = engine_with(network).await;
        seed(&engine, "{}", Utc::now() - Age::days(2)).await;

        engine.network_first(&Request::get(USD).unwrap()).await;
        assert_eq!(engine.cache().count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fresh_entry_served_on_upstream_error_status() {
        let network = Arc::new(FakeNetwork::new());
        network.respond(USD, 500, "upstream broke");
        let engine = engine_with(network).await;
        seed(&engine, r#"{"rates":{"EUR":0.91}}"#, Utc::now() - Age::hours(6)).await;

        let response = engine.handle(&Request::get(USD).unwrap()).await.unwrap();
        assert_eq!(body_of(&response), r#"{"rates":{"EUR":0.91}}"#);
    }

    #[tokio::test]
    async fn test_error_status_without_cache_is_offline_error() {
        let network = Arc::new(FakeNetwork::new());
        network.respond(USD, 429, "slow down");
        let engine = engine_with(network).await;

        let response = engine.handle(&Request::get(USD).unwrap()).await.unwrap();
        assert_eq!(response.as_basic().unwrap().status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(engine.cache().count_entries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entry_without_marker_counts_as_expired() {
        let network = Arc::new(FakeNetwork::new());
        network.set_offline(true);
        let engine = engine_with(network).await;
        let request = Request::get(USD).unwrap();
        let unstamped = Response::Basic(BasicResponse::new(StatusCode::OK, "{}"));
        let entry = unstamped.to_entry(&request, request_key(&request)).unwrap();
        engine.cache().put_entry(engine.runtime_generation(), &entry).await.unwrap();

        let response = engine.handle(&request).await.unwrap();
        assert_eq!(response.as_basic().unwrap().status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_timeout_takes_failure_branch() {
        let network = Arc::new(FakeNetwork::new());
        network.respond_after(USD, Duration::from_secs(30), 200, "too late");
        let cache = fxcache_core::CacheDb::open_in_memory().await.unwrap();
        let config = fxcache_core::AppConfig { timeout_ms: 100, ..Default::default() };
        let engine = StrategyEngine::new(&config, cache, network).unwrap();
        seed(&engine, r#"{"rates":{"EUR":0.92}}"#, Utc::now()).await;

        let response = engine.handle(&Request::get(USD).unwrap()).await.unwrap();
        assert_eq!(body_of(&response), r#"{"rates":{"EUR":0.92}}"#);
    }

    #[tokio::test]
    async fn test_concurrent_writes_last_one_wins() {
        let network = Arc::new(FakeNetwork::new());
        network.queue(USD, Duration::from_millis(200), 200, r#"{"rates":{"EUR":0.1}}"#);
        network.queue(USD, Duration::ZERO, 200, r#"{"rates":{"EUR":0.2}}"#);
        let engine = engine_with(network).await;
        let request = Request::get(USD).unwrap();

        let (a, b) = tokio::join!(engine.network_first(&request), engine.network_first(&request));
        let mut bodies = vec![body_of(&a), body_of(&b)];
        bodies.sort();
        assert_eq!(bodies, vec![r#"{"rates":{"EUR":0.1}}"#, r#"{"rates":{"EUR":0.2}}"#]);

        // The delayed payload is written last.
        let entry = engine
            .cache()
            .get_entry(&engine.runtime_generation().name, &request_key(&request))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.body, br#"{"rates":{"EUR":0.1}}"#);
        assert_eq!(engine.cache().count_entries().await.unwrap(), 1);
    }
}
