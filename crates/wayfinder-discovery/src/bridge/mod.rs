//! Discovery bridges
//!
//! A bridge keeps the registry's imported subset in line with an external
//! catalog by polling it on a fixed cadence:
//!
//! 1. fetch the full external snapshot (bounded by the fetch timeout)
//! 2. key and translate every entry
//! 3. diff against the entries imported so far
//! 4. publish arrivals, update changed entries, unpublish departures
//!
//! A failed or timed out fetch changes nothing, so an unreachable source
//! never produces departures. Only what reached the registry is remembered,
//! which makes a failed apply retry on the next cycle.

pub mod diff;
pub mod runner;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use wayfinder_common::{DiscoveryError, Result};

use crate::model::{Record, Status};
use crate::options::BridgeOptions;
use crate::registry::Registry;

pub use diff::{DiffPlan, Imported, diff};
pub use runner::BridgeRunner;

/// Adapter over one external discovery system
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync + 'static {
    type Entry: Send + Sync;

    fn name(&self) -> &str;

    /// Validate configuration and connect; an error here is fatal for the bridge
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Current full content of the external catalog
    async fn fetch_all(&self) -> Result<Vec<Self::Entry>>;

    /// Stable identifier of an entry across fetches
    fn external_key_of(&self, entry: &Self::Entry) -> String;

    /// Translate an entry into an unpublished record
    fn to_record(&self, entry: &Self::Entry) -> Record;

    /// Best-effort cleanup
    async fn stop(&self) {}
}

/// Bridge lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl BridgeState {
    /// States in which scan results may be applied
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "STOPPED"),
            Self::Starting => write!(f, "STARTING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopping => write!(f, "STOPPING"),
        }
    }
}

/// Outcome of one scan
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub arrivals: usize,
    pub updates: usize,
    pub departures: usize,
    pub unchanged: usize,
    /// Registry calls that failed and will be retried next cycle
    pub failures: usize,
    /// The bridge left the active states before the results were applied
    pub discarded: bool,
}

impl ScanReport {
    fn discarded() -> Self {
        Self {
            discarded: true,
            ..Default::default()
        }
    }

    pub fn changes(&self) -> usize {
        self.arrivals + self.updates + self.departures
    }
}

/// Object-safe view of a bridge, used by the runner
#[async_trait::async_trait]
pub trait ManagedBridge: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> BridgeState;
    async fn start(&self) -> Result<()>;
    async fn stop(&self);
    async fn scan_now(&self) -> Result<ScanReport>;
    /// External key -> registration id of every imported entry
    async fn imported(&self) -> HashMap<String, String>;
}

struct BridgeInner<S: SourceAdapter> {
    name: String,
    source: S,
    registry: Registry,
    options: BridgeOptions,
    state: Mutex<BridgeState>,
    /// Held for the whole scan, so scans of one bridge never interleave
    known: tokio::sync::Mutex<HashMap<String, Imported>>,
    shutdown: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// A bridge between one source adapter and the registry
pub struct Bridge<S: SourceAdapter> {
    inner: Arc<BridgeInner<S>>,
}

impl<S: SourceAdapter> Clone for Bridge<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: SourceAdapter> fmt::Debug for Bridge<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl<S: SourceAdapter> Bridge<S> {
    pub fn new(source: S, registry: Registry, options: BridgeOptions) -> Self {
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| source.name().to_string());
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(BridgeInner {
                name,
                source,
                registry,
                options,
                state: Mutex::new(BridgeState::Stopped),
                known: tokio::sync::Mutex::new(HashMap::new()),
                shutdown,
                ticker: Mutex::new(None),
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }
}

impl<S: SourceAdapter> BridgeInner<S> {
    fn state(&self) -> BridgeState {
        *self.state.lock()
    }

    fn set_state(&self, state: BridgeState) {
        let mut current = self.state.lock();
        let from = *current;
        debug!(bridge = %self.name, from = %from, to = %state, "Bridge state change");
        *current = state;
    }

    async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != BridgeState::Stopped {
                return Err(DiscoveryError::Configuration(format!(
                    "bridge '{}' is {}, cannot start",
                    self.name, *state
                )));
            }
            *state = BridgeState::Starting;
        }

        if let Err(e) = self.options.validate() {
            error!(bridge = %self.name, "Invalid bridge options: {}", e);
            self.set_state(BridgeState::Stopped);
            return Err(e);
        }
        self.shutdown.send_replace(false);

        if let Err(e) = self.source.start().await {
            error!(bridge = %self.name, "Bridge source failed to start: {}", e);
            self.set_state(BridgeState::Stopped);
            return Err(e);
        }

        match self.scan().await {
            Ok(report) => info!(
                bridge = %self.name,
                arrivals = report.arrivals,
                failures = report.failures,
                "Initial scan complete"
            ),
            Err(e) => warn!(bridge = %self.name, "Initial scan failed, retrying on next tick: {}", e),
        }

        {
            let mut state = self.state.lock();
            if *state != BridgeState::Starting {
                return Err(DiscoveryError::Configuration(format!(
                    "bridge '{}' was stopped while starting",
                    self.name
                )));
            }
            *state = BridgeState::Running;
        }

        let handle = tokio::spawn(Self::tick_loop(self.clone()));
        *self.ticker.lock() = Some(handle);

        info!(
            bridge = %self.name,
            poll_interval_ms = self.options.poll_interval_ms,
            "Bridge running"
        );
        Ok(())
    }

    async fn tick_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.options.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; the initial scan already ran
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
            if self.state() != BridgeState::Running {
                break;
            }
            if let Err(e) = self.scan().await {
                warn!(bridge = %self.name, "Scan failed, keeping last known view: {}", e);
            }
        }
        debug!(bridge = %self.name, "Bridge ticker exited");
    }

    async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if !state.is_active() {
                return;
            }
            *state = BridgeState::Stopping;
        }
        self.shutdown.send_replace(true);

        let handle = self.ticker.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(bridge = %self.name, "Bridge ticker ended abnormally: {}", e);
        }

        self.source.stop().await;

        if self.options.retract_on_stop {
            let mut known = self.known.lock().await;
            for (key, imported) in known.drain() {
                match self.registry.unpublish(&imported.registration).await {
                    Ok(_) | Err(DiscoveryError::NotFound(_)) => {}
                    Err(e) => warn!(bridge = %self.name, key = %key, "Failed to retract record: {}", e),
                }
            }
        }

        self.set_state(BridgeState::Stopped);
        info!(bridge = %self.name, "Bridge stopped");
    }

    /// Fetch, racing the shutdown signal and the fetch timeout
    async fn fetch(&self) -> Option<Result<Vec<S::Entry>>> {
        let mut shutdown = self.shutdown.subscribe();
        let timeout = self.options.fetch_timeout();

        tokio::select! {
            fetched = tokio::time::timeout(timeout, self.source.fetch_all()) => Some(match fetched {
                Ok(result) => result,
                Err(_) => Err(DiscoveryError::Timeout(self.options.fetch_timeout_ms)),
            }),
            _ = shutdown.wait_for(|stop| *stop) => None,
        }
    }

    async fn scan(&self) -> Result<ScanReport> {
        let mut known = self.known.lock().await;
        if !self.state().is_active() {
            return Ok(ScanReport::discarded());
        }

        let entries = match self.fetch().await {
            Some(result) => result?,
            None => {
                debug!(bridge = %self.name, "Scan cancelled by stop");
                return Ok(ScanReport::discarded());
            }
        };

        let mut current = BTreeMap::new();
        for entry in &entries {
            let key = self.source.external_key_of(entry);
            let record = self.source.to_record(entry);
            if current.insert(key.clone(), record).is_some() {
                warn!(bridge = %self.name, key = %key, "Duplicate external key, keeping last entry");
            }
        }

        if !self.state().is_active() {
            return Ok(ScanReport::discarded());
        }

        let plan = diff(&known, &current);
        let mut report = ScanReport {
            unchanged: plan.unchanged,
            ..Default::default()
        };
        if plan.is_empty() {
            return Ok(report);
        }

        self.apply(&mut known, plan, &mut report).await;
        debug!(
            bridge = %self.name,
            arrivals = report.arrivals,
            updates = report.updates,
            departures = report.departures,
            failures = report.failures,
            "Scan applied"
        );
        Ok(report)
    }

    async fn apply(
        &self,
        known: &mut HashMap<String, Imported>,
        plan: DiffPlan,
        report: &mut ScanReport,
    ) {
        for (key, record) in plan.arrivals {
            if !self.state().is_active() {
                report.discarded = true;
                return;
            }
            self.import(known, key, record, report).await;
        }

        for (key, registration, record) in plan.updates {
            if !self.state().is_active() {
                report.discarded = true;
                return;
            }
            let mut stored = record.clone();
            stored.registration = Some(registration.clone());
            if stored.status == Status::Unknown {
                stored.status = Status::Up;
            }
            match self.registry.update(&stored).await {
                Ok(()) => {
                    known.insert(
                        key,
                        Imported {
                            registration,
                            record,
                        },
                    );
                    report.updates += 1;
                }
                Err(DiscoveryError::NotFound(_)) => {
                    // Removed behind the bridge's back: import it again
                    known.remove(&key);
                    self.import(known, key, record, report).await;
                }
                Err(e) => {
                    warn!(bridge = %self.name, key = %key, "Failed to update record: {}", e);
                    report.failures += 1;
                }
            }
        }

        for (key, registration) in plan.departures {
            if !self.state().is_active() {
                report.discarded = true;
                return;
            }
            match self.registry.unpublish(&registration).await {
                Ok(_) | Err(DiscoveryError::NotFound(_)) => {
                    known.remove(&key);
                    report.departures += 1;
                }
                Err(e) => {
                    warn!(bridge = %self.name, key = %key, "Failed to withdraw record: {}", e);
                    report.failures += 1;
                }
            }
        }
    }

    async fn import(
        &self,
        known: &mut HashMap<String, Imported>,
        key: String,
        record: Record,
        report: &mut ScanReport,
    ) {
        let mut candidate = record.clone();
        candidate.registration = None;
        match self.registry.publish(candidate).await {
            Ok(published) => {
                if let Some(registration) = published.registration {
                    known.insert(
                        key,
                        Imported {
                            registration,
                            record,
                        },
                    );
                    report.arrivals += 1;
                }
            }
            Err(e) => {
                warn!(bridge = %self.name, key = %key, "Failed to import record: {}", e);
                report.failures += 1;
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: SourceAdapter> ManagedBridge for Bridge<S> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn state(&self) -> BridgeState {
        self.inner.state()
    }

    /// `Stopped -> Starting -> Running`, after the initial scan
    async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    /// `Running -> Stopping -> Stopped`; safe during an in-flight scan
    async fn stop(&self) {
        self.inner.stop().await
    }

    async fn scan_now(&self) -> Result<ScanReport> {
        self.inner.scan().await
    }

    async fn imported(&self) -> HashMap<String, String> {
        self.inner
            .known
            .lock()
            .await
            .iter()
            .map(|(key, imported)| (key.clone(), imported.registration.clone()))
            .collect()
    }
}
