//! The worker facade and version cutover.
//!
//! A [`Worker`] is one version of the cache layer: its generation names,
//! manifest and strategies. The host drives it through `on_install`,
//! `on_activate`, `intercept`, `on_message` and `on_sync`. A
//! [`Registration`] keeps track of which version currently serves.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::clients::Clients;
use crate::fetch::Network;
use crate::lifecycle::{ActivationReport, Lifecycle, LifecycleState, Manifest};
use crate::request::Request;
use crate::response::Response;
use crate::strategy::StrategyEngine;
use fxcache_core::{AppConfig, CacheDb, Error};

/// Outcome of offering a request to the worker.
#[derive(Debug)]
pub enum Intercept {
    Respond(Response),
    /// Not handled; the host fetches it as if no worker existed.
    Bypass,
}

/// One version of the offline cache layer.
pub struct Worker {
    config: AppConfig,
    engine: StrategyEngine,
    lifecycle: Lifecycle,
    manifest: Manifest,
    clients: Arc<Clients>,
    rates_request: Request,
    sync_tag: String,
}

impl Worker {
    pub fn new(
        config: &AppConfig, cache: CacheDb, network: Arc<dyn Network>, clients: Arc<Clients>,
    ) -> Result<Self, Error> {
        let engine = StrategyEngine::new(config, cache, network)?;
        let manifest = Manifest::from_config(config, engine.classifier().origin())?;
        let rates_request = Request::get(&config.rates_url)?;

        Ok(Self {
            config: config.clone(),
            engine,
            lifecycle: Lifecycle::default(),
            manifest,
            clients,
            rates_request,
            sync_tag: config.sync_tag.clone(),
        })
    }

    /// Version tag: the static generation name.
    pub fn version(&self) -> &str {
        &self.engine.static_generation().name
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn clients(&self) -> &Arc<Clients> {
        &self.clients
    }

    pub(crate) fn rates_request(&self) -> &Request {
        &self.rates_request
    }

    pub(crate) fn sync_tag(&self) -> &str {
        &self.sync_tag
    }

    /// Handle a request if this version is active and the method is GET.
    pub async fn intercept(&self, request: &Request) -> Result<Intercept, Error> {
        if !request.is_get() {
            return Ok(Intercept::Bypass);
        }
        if self.lifecycle.state().await != LifecycleState::Active {
            tracing::debug!(version = self.version(), url = %request.url, "not active; bypassing");
            return Ok(Intercept::Bypass);
        }
        self.engine.handle(request).await.map(Intercept::Respond)
    }
}

/// Tracks the serving worker and performs version cutover.
pub struct Registration {
    active: RwLock<Option<Arc<Worker>>>,
    network: Arc<dyn Network>,
}

impl Registration {
    /// `network` answers requests when no worker handles them.
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self { active: RwLock::new(None), network }
    }

    pub async fn active(&self) -> Option<Arc<Worker>> {
        self.active.read().await.clone()
    }

    /// Bring `worker` into service.
    ///
    /// A version the store already activated in an earlier run is resumed
    /// without the network. Anything else is installed and, once installed,
    /// activated immediately. On success the previous worker becomes
    /// `Superseded`.
    ///
    /// If install fails the current worker keeps serving and the error is
    /// returned. With no current worker, the version the store last
    /// activated is resumed if its core resources are still stored.
    pub async fn update(&self, worker: Arc<Worker>) -> Result<ActivationReport, Error> {
        let report = match worker.restore().await? {
            Some(report) => report,
            None => match Self::install(&worker).await {
                Ok(report) => report,
                Err(e) => {
                    if self.active().await.is_none() {
                        self.resume_recorded(&worker).await;
                    }
                    return Err(e);
                }
            },
        };

        self.promote(worker).await;
        Ok(report)
    }

    async fn install(worker: &Worker) -> Result<ActivationReport, Error> {
        worker.on_install().await?;

        if !worker.lifecycle().skips_waiting() {
            return Err(Error::InvalidState(format!("{} is waiting without skip-waiting", worker.version())));
        }

        worker.on_activate().await
    }

    async fn promote(&self, worker: Arc<Worker>) {
        let previous = self.active.write().await.replace(worker);

        if let Some(previous) = previous
            && let Err(e) = previous.lifecycle().transition(LifecycleState::Superseded).await
        {
            tracing::warn!(version = previous.version(), error = %e, "previous worker was not active");
        }
    }

    async fn resume_recorded(&self, failed: &Worker) {
        let cache = failed.engine().cache();
        let recorded = match cache.active_version().await {
            Ok(Some(recorded)) if recorded.static_generation != failed.version() => recorded,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(error = %e, "could not read the recorded version");
                return;
            }
        };

        let config = AppConfig {
            static_generation: recorded.static_generation,
            runtime_generation: recorded.runtime_generation,
            ..failed.config().clone()
        };
        let previous = match Worker::new(
            &config,
            cache.clone(),
            Arc::clone(failed.engine().network()),
            Arc::clone(failed.clients()),
        ) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(error = %e, "could not rebuild the recorded version");
                return;
            }
        };

        match previous.restore().await {
            Ok(Some(_)) => {
                tracing::warn!(
                    failed = failed.version(),
                    serving = previous.version(),
                    "install failed; serving the recorded version"
                );
                self.promote(Arc::new(previous)).await;
            }
            Ok(None) => tracing::info!(version = previous.version(), "recorded version is incomplete"),
            Err(e) => tracing::warn!(version = previous.version(), error = %e, "could not resume recorded version"),
        }
    }

    /// Route a request through the active worker, or straight to the network.
    /// Also returns the version that answered, if a worker did.
    pub async fn dispatch(&self, request: &Request) -> Result<(Response, Option<String>), Error> {
        if let Some(worker) = self.active().await
            && let Intercept::Respond(response) = worker.intercept(request).await?
        {
            return Ok((response, Some(worker.version().to_string())));
        }
        self.network.fetch(request).await.map(|response| (response, None))
    }

    pub async fn intercept(&self, request: &Request) -> Result<Response, Error> {
        self.dispatch(request).await.map(|(response, _)| response)
    }
}
