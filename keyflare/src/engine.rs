// Copyright 2025 KeyFlare (https://github.com/keyflare)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Engine facade and process-wide lifecycle.
//!
//! One engine instance exists per process, held in a cell behind a
//! reader-writer lock. [`init`] creates it, [`start`]/[`stop`] toggle the
//! background work (collection ticker and metrics server, running on a
//! small tokio runtime the engine owns), [`shutdown`] stops and clears the
//! cell, and [`instance`] hands out shared handles to wrappers while the
//! engine is initialized and running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use prometheus::Registry;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use keyflare_core::{Detector, KeyflareError, PolicyManager, Result, SnapshotHistory};
use keyflare_metrics::{
    parse_listen_addr, router, serve, AppState, Collector, NoopCollector, PrometheusCollector,
};

use crate::options::Options;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

static GLOBAL: RwLock<Option<Arc<Engine>>> = RwLock::new(None);

struct Worker {
    runtime: Runtime,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// The assembled engine: detector, policy manager, snapshot history, and
/// metrics collector, plus the background worker driving collection.
pub struct Engine {
    options: Options,
    detector: Arc<Detector>,
    policy: Arc<PolicyManager>,
    history: Arc<SnapshotHistory>,
    collector: Arc<dyn Collector>,
    registry: Option<Registry>,
    running: AtomicBool,
    worker: Mutex<Option<Worker>>,
}

impl Engine {
    fn build(options: Options) -> Result<Self> {
        let options = options.normalized();

        let detector = Arc::new(Detector::new(options.detector.clone()));
        let policy = Arc::new(PolicyManager::new(options.policy.clone())?);
        let history = Arc::new(SnapshotHistory::new(options.metrics.hot_key_history_size));

        let (collector, registry): (Arc<dyn Collector>, Option<Registry>) =
            if options.enable_metrics {
                let collector = PrometheusCollector::new(
                    &options.metrics.namespace,
                    options.metrics.hot_key_metric_limit,
                );
                let registry = collector.registry().clone();
                (Arc::new(collector), Some(registry))
            } else {
                (Arc::new(NoopCollector), None)
            };

        Ok(Self {
            options,
            detector,
            policy,
            history,
            collector,
            registry,
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        })
    }

    /// The hot key detector.
    pub fn detector(&self) -> Arc<Detector> {
        Arc::clone(&self.detector)
    }

    /// The admission-gated policy manager.
    pub fn policy_manager(&self) -> Arc<PolicyManager> {
        Arc::clone(&self.policy)
    }

    /// The snapshot history backing the trends API.
    pub fn history(&self) -> Arc<SnapshotHistory> {
        Arc::clone(&self.history)
    }

    /// The metrics sink (a no-op when metrics are disabled).
    pub fn collector(&self) -> Arc<dyn Collector> {
        Arc::clone(&self.collector)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn start(&self) -> Result<()> {
        let mut worker_slot = self.worker.lock();
        if worker_slot.is_some() {
            return Err(KeyflareError::AlreadyRunning);
        }

        // Resolve the bind address before spawning anything so a bad
        // configuration fails the call instead of a background task.
        let server_addr = match &self.registry {
            Some(_) => Some(parse_listen_addr(&self.options.metrics.server_address)?),
            None => None,
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("keyflare")
            .enable_all()
            .build()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(2);

        let detector = Arc::clone(&self.detector);
        let history = Arc::clone(&self.history);
        let collector = Arc::clone(&self.collector);
        let interval = self.options.metrics.collection_interval;
        let mut collect_shutdown = shutdown_rx.clone();
        handles.push(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The interval fires immediately; swallow that tick so the
            // first collection happens one full interval after start.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let top = detector.top_k();
                        tracing::debug!(keys = top.len(), "collected top-k snapshot");
                        history.add(&top);
                        collector.update_hot_keys(&top);
                    }
                    _ = collect_shutdown.changed() => break,
                }
            }
        }));

        if let (Some(registry), Some(addr)) = (&self.registry, server_addr) {
            let state = AppState::new(registry.clone(), Arc::clone(&self.history));
            let app = router(state, self.options.metrics.enable_api);
            let server_shutdown = shutdown_rx.clone();
            handles.push(runtime.spawn(async move {
                if let Err(err) = serve(addr, app, server_shutdown).await {
                    tracing::error!("metrics server error: {err}");
                }
            }));
        }

        *worker_slot = Some(Worker {
            runtime,
            shutdown_tx,
            handles,
        });
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("keyflare started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut worker_slot = self.worker.lock();
        let worker = worker_slot.take().ok_or(KeyflareError::NotRunning)?;
        self.running.store(false, Ordering::SeqCst);

        let _ = worker.shutdown_tx.send(true);
        let Worker {
            runtime, handles, ..
        } = worker;

        runtime.block_on(async move {
            let drain = async move {
                for handle in handles {
                    let _ = handle.await;
                }
            };
            if tokio::time::timeout(SHUTDOWN_DEADLINE, drain).await.is_err() {
                tracing::warn!("shutdown deadline exceeded, abandoning in-flight work");
            }
        });
        runtime.shutdown_timeout(Duration::from_secs(1));

        tracing::info!("keyflare stopped");
        Ok(())
    }
}

/// Initializes the process-wide engine. Fails with `AlreadyInitialized` if
/// an instance already exists.
pub fn init(options: Options) -> Result<()> {
    let mut guard = GLOBAL.write();
    if guard.is_some() {
        return Err(KeyflareError::AlreadyInitialized);
    }
    *guard = Some(Arc::new(Engine::build(options)?));
    Ok(())
}

/// Starts the background worker (collection ticker, metrics server).
pub fn start() -> Result<()> {
    let guard = GLOBAL.read();
    guard
        .as_ref()
        .ok_or(KeyflareError::NotInitialized)?
        .start()
}

/// Stops the background worker. The instance survives and can be started
/// again.
pub fn stop() -> Result<()> {
    let guard = GLOBAL.read();
    guard.as_ref().ok_or(KeyflareError::NotInitialized)?.stop()
}

/// Stops the engine if running and clears the process-wide instance.
pub fn shutdown() -> Result<()> {
    let mut guard = GLOBAL.write();
    let engine = guard.take().ok_or(KeyflareError::NotInitialized)?;
    if engine.is_running() {
        engine.stop()?;
    }
    Ok(())
}

/// Returns a shared handle to the engine. Available only while the engine
/// is initialized and running.
pub fn instance() -> Result<Arc<Engine>> {
    let guard = GLOBAL.read();
    let engine = guard.as_ref().ok_or(KeyflareError::NotInitialized)?;
    if !engine.is_running() {
        return Err(KeyflareError::NotRunning);
    }
    Ok(Arc::clone(engine))
}
