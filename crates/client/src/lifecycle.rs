//! Install and activation.
//!
//! A worker moves `Installing -> Waiting -> Active -> Superseded`. A failed
//! install ends in `Discarded` and never activates. Transitions only move
//! forward.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::{join_all, try_join_all};
use serde::Serialize;
use tokio::sync::RwLock;
use url::Url;

use crate::fetch::{fetch_bounded, resolve, same_origin};
use crate::request::{Request, RequestMode};
use crate::strategy::request_key;
use crate::worker::Worker;
use fxcache_core::{AppConfig, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installing,
    Waiting,
    Active,
    Superseded,
    /// Install failed; this version never serves.
    Discarded,
}

impl LifecycleState {
    fn can_become(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Installing, Waiting)
                | (Installing, Discarded)
                | (Waiting, Active)
                | (Waiting, Discarded)
                | (Active, Superseded)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Active => "active",
            LifecycleState::Superseded => "superseded",
            LifecycleState::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

/// State cell for one worker version.
pub struct Lifecycle {
    state: RwLock<LifecycleState>,
    skip_waiting: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { state: RwLock::new(LifecycleState::Installing), skip_waiting: AtomicBool::new(false) }
    }
}

impl Lifecycle {
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Move to `next`, rejecting anything but a forward edge.
    pub async fn transition(&self, next: LifecycleState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        let current = *state;
        if !current.can_become(next) {
            return Err(Error::InvalidState(format!("cannot move from {current} to {next}")));
        }
        tracing::info!(from = %current, to = %next, "lifecycle transition");
        *state = next;
        Ok(())
    }

    /// Ask to activate as soon as install completes.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }
}

/// Resources seeded into the static generation at install time.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// All must be fetched and stored, or install fails.
    pub core: Vec<Url>,
    /// Stored individually when reachable.
    pub best_effort: Vec<Url>,
}

impl Manifest {
    pub fn from_config(config: &AppConfig, origin: &Url) -> Result<Self, Error> {
        let resolve_all = |paths: &[String]| {
            paths
                .iter()
                .map(|p| resolve(origin, p).map_err(|e| Error::InvalidUrl(format!("{p}: {e}"))))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self { core: resolve_all(&config.core_assets)?, best_effort: resolve_all(&config.optional_assets)? })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub core_stored: usize,
    pub best_effort_stored: usize,
    pub best_effort_failed: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    /// Set when old generations could not even be listed.
    pub cleanup_error: Option<String>,
    pub claimed: usize,
    /// True when an earlier activation of this version was resumed
    /// instead of installing again.
    pub restored: bool,
}

impl Worker {
    /// Seed the static generation and move to `Waiting` with skip-waiting
    /// requested.
    ///
    /// # Errors
    ///
    /// `Error::InstallFailed` if any core resource cannot be fetched with an
    /// OK status or the batch cannot be written; the worker is then
    /// `Discarded` and nothing from the core batch is stored.
    pub async fn on_install(&self) -> Result<InstallReport, Error> {
        if self.lifecycle().state().await != LifecycleState::Installing {
            return Err(Error::InvalidState(format!("{} is not installing", self.version())));
        }
        tracing::info!(version = self.version(), "installing");

        let core_stored = match self.seed_core().await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(version = self.version(), error = %e, "install failed");
                self.lifecycle().transition(LifecycleState::Discarded).await?;
                return Err(e);
            }
        };

        let mut report = self.seed_best_effort().await;
        report.core_stored = core_stored;

        self.lifecycle().transition(LifecycleState::Waiting).await?;
        self.lifecycle().skip_waiting();
        tracing::info!(
            version = self.version(),
            core = report.core_stored,
            best_effort = report.best_effort_stored,
            skipped = report.best_effort_failed.len(),
            "installed"
        );
        Ok(report)
    }

    async fn seed_core(&self) -> Result<usize, Error> {
        let engine = self.engine();
        let origin = engine.classifier().origin();
        let requests = self
            .manifest()
            .core
            .iter()
            .map(|url| manifest_request(origin, url, RequestMode::Cors))
            .collect::<Vec<_>>();

        let entries = try_join_all(requests.iter().map(|request| async move {
            let response = fetch_bounded(engine.network().as_ref(), request, engine.fetch_timeout())
                .await
                .map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;
            if !response.is_ok() {
                let status = response.as_basic().map(|b| b.status.as_u16()).unwrap_or(0);
                return Err(Error::InstallFailed(format!("{}: status {status}", request.url)));
            }
            response
                .to_entry(request, request_key(request))
                .map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))
        }))
        .await?;

        engine
            .cache()
            .put_entries(engine.static_generation(), entries)
            .await
            .map_err(|e| Error::InstallFailed(format!("storing core batch: {e}")))
    }

    async fn seed_best_effort(&self) -> InstallReport {
        let engine = self.engine();
        let origin = engine.classifier().origin();

        let outcomes = join_all(self.manifest().best_effort.iter().map(|url| async move {
            let request = manifest_request(origin, url, RequestMode::NoCors);
            let response = fetch_bounded(engine.network().as_ref(), &request, engine.fetch_timeout()).await?;
            if !response.is_storable() {
                return Err(Error::HttpError(format!("{url}: not storable")));
            }
            let entry = response.to_entry(&request, request_key(&request))?;
            engine.cache().put_entry(engine.static_generation(), &entry).await
        }))
        .await;

        let mut report = InstallReport::default();
        for (url, outcome) in self.manifest().best_effort.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.best_effort_stored += 1,
                Err(e) => {
                    tracing::warn!(%url, error = %e, "skipping optional asset");
                    report.best_effort_failed.push(url.to_string());
                }
            }
        }
        report
    }

    /// Delete every generation this version does not own, then claim all
    /// open clients. Deletion failures are logged and reported, never fatal.
    pub async fn on_activate(&self) -> Result<ActivationReport, Error> {
        if self.lifecycle().state().await != LifecycleState::Waiting {
            return Err(Error::InvalidState(format!("{} is not waiting", self.version())));
        }

        let cache = self.engine().cache();
        let keep = self.engine().current_generations();
        let mut report = ActivationReport::default();

        match cache.generation_names().await {
            Ok(names) => {
                for name in names.into_iter().filter(|n| !keep.contains(n)) {
                    match cache.delete_generation(&name).await {
                        Ok(_) => {
                            tracing::info!(generation = %name, "deleted old generation");
                            report.deleted.push(name);
                        }
                        Err(e) => {
                            tracing::warn!(generation = %name, error = %e, "failed to delete old generation");
                            report.failed.push(name);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not list generations; skipping cleanup");
                report.cleanup_error = Some(e.to_string());
            }
        }

        self.lifecycle().transition(LifecycleState::Active).await?;
        report.claimed = self.clients().claim(self.version());

        let engine = self.engine();
        if let Err(e) = cache.record_active(engine.static_generation(), engine.runtime_generation()).await {
            tracing::warn!(version = self.version(), error = %e, "failed to record active version");
        }
        tracing::info!(version = self.version(), claimed = report.claimed, "activated");
        Ok(report)
    }

    /// Resume this version without touching the network.
    ///
    /// Applies when the store records this version as the last one activated
    /// and every core resource is still in its static generation. Returns
    /// `None` when a normal install is needed.
    pub async fn restore(&self) -> Result<Option<ActivationReport>, Error> {
        if self.lifecycle().state().await != LifecycleState::Installing {
            return Err(Error::InvalidState(format!("{} is not installing", self.version())));
        }

        let engine = self.engine();
        let Some(active) = engine.cache().active_version().await? else {
            return Ok(None);
        };
        if active.static_generation != engine.static_generation().name
            || active.runtime_generation != engine.runtime_generation().name
        {
            tracing::debug!(recorded = %active.static_generation, version = self.version(), "recorded version differs");
            return Ok(None);
        }
        if !self.core_seeded().await? {
            tracing::info!(version = self.version(), "core resources missing; reinstalling");
            return Ok(None);
        }

        self.lifecycle().transition(LifecycleState::Waiting).await?;
        self.lifecycle().skip_waiting();
        self.lifecycle().transition(LifecycleState::Active).await?;

        let claimed = self.clients().claim(self.version());
        tracing::info!(version = self.version(), activated_at = %active.activated_at, claimed, "restored");
        Ok(Some(ActivationReport { claimed, restored: true, ..Default::default() }))
    }

    async fn core_seeded(&self) -> Result<bool, Error> {
        let engine = self.engine();
        let origin = engine.classifier().origin();
        for url in &self.manifest().core {
            let request = manifest_request(origin, url, RequestMode::Cors);
            let entry = engine
                .cache()
                .get_entry(&engine.static_generation().name, &request_key(&request))
                .await?;
            if entry.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn manifest_request(origin: &Url, url: &Url, cross_origin_mode: RequestMode) -> Request {
    let mode = if same_origin(origin, url) { RequestMode::SameOrigin } else { cross_origin_mode };
    Request {
        method: reqwest::Method::GET,
        url: url.clone(),
        headers: Default::default(),
        mode,
        destination: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clients::Clients;
    use crate::testing::FakeNetwork;
    use fxcache_core::{CacheDb, Generation, GenerationKind};

    fn small_config() -> AppConfig {
        AppConfig {
            core_assets: vec!["/index.html".into(), "/app.js".into()],
            optional_assets: vec!["/icons/icon-192.png".into(), "https://fonts.gstatic.com/s/inter.woff2".into()],
            ..Default::default()
        }
    }

    fn shell_network() -> Arc<FakeNetwork> {
        let network = Arc::new(FakeNetwork::new());
        network.respond("http://localhost:8080/index.html", 200, "<html>");
        network.respond("http://localhost:8080/app.js", 200, "js");
        network.respond("http://localhost:8080/icons/icon-192.png", 200, "png");
        network.respond_opaque("https://fonts.gstatic.com/s/inter.woff2", "font");
        network
    }

    async fn worker(config: &AppConfig, cache: CacheDb, network: Arc<FakeNetwork>) -> Worker {
        Worker::new(config, cache, network, Arc::new(Clients::new(4))).unwrap()
    }

    #[tokio::test]
    async fn test_transition_table() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state().await, LifecycleState::Installing);
        assert!(lifecycle.transition(LifecycleState::Active).await.is_err());
        lifecycle.transition(LifecycleState::Waiting).await.unwrap();
        lifecycle.transition(LifecycleState::Active).await.unwrap();
        assert!(lifecycle.transition(LifecycleState::Waiting).await.is_err());
        lifecycle.transition(LifecycleState::Superseded).await.unwrap();
    }

    #[test]
    fn test_manifest_resolves_against_origin() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let manifest = Manifest::from_config(&small_config(), &origin).unwrap();
        assert_eq!(manifest.core[0].as_str(), "http://localhost:8080/index.html");
        assert_eq!(manifest.best_effort[1].as_str(), "https://fonts.gstatic.com/s/inter.woff2");
    }

    #[tokio::test]
    async fn test_install_seeds_core_and_best_effort() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let worker = worker(&small_config(), cache.clone(), shell_network()).await;

        let report = worker.on_install().await.unwrap();
        assert_eq!(report.core_stored, 2);
        assert_eq!(report.best_effort_stored, 2);
        assert!(report.best_effort_failed.is_empty());
        assert_eq!(cache.count_entries().await.unwrap(), 4);
        assert_eq!(worker.lifecycle().state().await, LifecycleState::Waiting);
        assert!(worker.lifecycle().skips_waiting());
    }

    #[tokio::test]
    async fn test_unreachable_core_asset_fails_install() {
        let network = shell_network();
        network.fail("http://localhost:8080/app.js");
        let cache = CacheDb::open_in_memory().await.unwrap();
        let worker = worker(&small_config(), cache.clone(), network).await;

        let result = worker.on_install().await;
        assert!(matches!(result, Err(Error::InstallFailed(_))));
        assert_eq!(worker.lifecycle().state().await, LifecycleState::Discarded);
        assert_eq!(cache.count_entries().await.unwrap(), 0);
        assert!(worker.on_activate().await.is_err());
    }

    #[tokio::test]
    async fn test_core_error_status_fails_install() {
        let network = shell_network();
        network.respond("http://localhost:8080/index.html", 404, "gone");
        let cache = CacheDb::open_in_memory().await.unwrap();
        let worker = worker(&small_config(), cache, network).await;

        assert!(matches!(worker.on_install().await, Err(Error::InstallFailed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_best_effort_asset_is_skipped() {
        let network = shell_network();
        network.fail("http://localhost:8080/icons/icon-192.png");
        let cache = CacheDb::open_in_memory().await.unwrap();
        let worker = worker(&small_config(), cache, network).await;

        let report = worker.on_install().await.unwrap();
        assert_eq!(report.best_effort_stored, 1);
        assert_eq!(report.best_effort_failed, vec!["http://localhost:8080/icons/icon-192.png"]);
        assert_eq!(worker.lifecycle().state().await, LifecycleState::Waiting);
    }

    #[tokio::test]
    async fn test_activate_deletes_foreign_generations_and_claims() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        cache
            .open_generation(&Generation::new("currency-converter-static-v2", GenerationKind::Static))
            .await
            .unwrap();
        cache
            .open_generation(&Generation::new("currency-converter-runtime-v2", GenerationKind::Runtime))
            .await
            .unwrap();
        let config = small_config();
        let clients = Arc::new(Clients::new(4));
        let page = clients.connect();
        let worker = Worker::new(&config, cache.clone(), shell_network(), clients.clone()).unwrap();

        worker.on_install().await.unwrap();
        let report = worker.on_activate().await.unwrap();

        assert_eq!(report.deleted, vec!["currency-converter-runtime-v2", "currency-converter-static-v2"]);
        assert!(report.failed.is_empty());
        assert_eq!(report.claimed, 1);
        assert_eq!(clients.controller(page.id).as_deref(), Some(config.static_generation.as_str()));
        assert_eq!(cache.generation_names().await.unwrap(), vec![config.static_generation.clone()]);
        assert_eq!(worker.lifecycle().state().await, LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_activation_survives_store_failure() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = small_config();
        let clients = Arc::new(Clients::new(4));
        let page = clients.connect();
        let worker = Worker::new(&config, cache.clone(), shell_network(), clients.clone()).unwrap();
        worker.on_install().await.unwrap();

        cache.close().await.unwrap();
        let report = worker.on_activate().await.unwrap();

        assert!(report.cleanup_error.is_some());
        assert!(report.deleted.is_empty());
        assert_eq!(report.claimed, 1);
        assert_eq!(worker.lifecycle().state().await, LifecycleState::Active);
        assert_eq!(clients.controller(page.id).as_deref(), Some(config.static_generation.as_str()));
    }

    #[tokio::test]
    async fn test_activation_records_version() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = small_config();
        let worker = worker(&config, cache.clone(), shell_network()).await;
        worker.on_install().await.unwrap();
        worker.on_activate().await.unwrap();

        let active = cache.active_version().await.unwrap().unwrap();
        assert_eq!(active.static_generation, config.static_generation);
        assert_eq!(active.runtime_generation, config.runtime_generation);
    }

    #[tokio::test]
    async fn test_restore_resumes_recorded_version_offline() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = small_config();
        let first = worker(&config, cache.clone(), shell_network()).await;
        first.on_install().await.unwrap();
        first.on_activate().await.unwrap();

        let offline = Arc::new(FakeNetwork::new());
        offline.set_offline(true);
        let restarted = worker(&config, cache, offline.clone()).await;

        let report = restarted.restore().await.unwrap().unwrap();
        assert!(report.restored);
        assert_eq!(restarted.lifecycle().state().await, LifecycleState::Active);
        assert_eq!(offline.calls("http://localhost:8080/index.html"), 0);
    }

    #[tokio::test]
    async fn test_restore_needs_core_resources() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = small_config();
        let first = worker(&config, cache.clone(), shell_network()).await;
        first.on_install().await.unwrap();
        first.on_activate().await.unwrap();
        cache.delete_all_generations().await.unwrap();

        let restarted = worker(&config, cache, shell_network()).await;
        assert!(restarted.restore().await.unwrap().is_none());
        assert_eq!(restarted.lifecycle().state().await, LifecycleState::Installing);
    }

    #[tokio::test]
    async fn test_restore_ignores_other_versions() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let first = worker(&small_config(), cache.clone(), shell_network()).await;
        first.on_install().await.unwrap();
        first.on_activate().await.unwrap();

        let next = AppConfig { static_generation: "currency-converter-static-v4".into(), ..small_config() };
        let upgraded = worker(&next, cache, shell_network()).await;
        assert!(upgraded.restore().await.unwrap().is_none());
    }
}
