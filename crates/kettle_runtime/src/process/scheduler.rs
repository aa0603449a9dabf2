//! Process Scheduler
//!
//! Loads processes (dependencies first), runs each `setup` once, then steps
//! every steady process on a fixed interval, sequentially, in registration
//! order. Bus traffic is drained before every tick and on a finer interval
//! in between.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time::MissedTickBehavior;

use super::{Process, ProcessCatalog, ProcessContext, ProcessResult, ProcessState, normalize_path};
use crate::error::ProcessError;
use crate::runtime::Runtime;
use crate::settings::SettingsBackend;

/// Timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period between process steps
    pub tick_interval: Duration,

    /// Period between bus drains
    pub drain_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            drain_interval: Duration::from_millis(50),
        }
    }
}

impl SchedulerConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// A steady process and its context
struct Slot {
    process: Box<dyn Process>,
    ctx: ProcessContext,
}

/// Drives every loaded process
pub struct Scheduler {
    runtime: Runtime,
    catalog: ProcessCatalog,
    settings: Arc<dyn SettingsBackend>,
    config: SchedulerConfig,

    /// Steady processes in registration order
    slots: Vec<Slot>,

    states: HashMap<String, ProcessState>,
}

impl Scheduler {
    pub fn new(
        runtime: Runtime,
        catalog: ProcessCatalog,
        settings: Arc<dyn SettingsBackend>,
    ) -> Self {
        Self {
            runtime,
            catalog,
            settings,
            config: SchedulerConfig::default(),
            slots: Vec::new(),
            states: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Lifecycle state of a process, by load path
    pub fn state(&self, path: &str) -> Option<ProcessState> {
        self.states.get(&normalize_path(path)).copied()
    }

    /// Steady process ids in step order
    pub fn process_ids(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.ctx.process_id.clone()).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────

    /// Load every path, logging failures. Returns how many are steady.
    pub async fn load_all<S: AsRef<str>>(&mut self, paths: &[S]) -> usize {
        for path in paths {
            if let Err(e) = self.load(path.as_ref()).await {
                tracing::error!(process = %path.as_ref(), error = %e, "Failed to load process");
            }
        }
        self.slots.len()
    }

    /// Load a process and its dependencies, run its setup, then load any
    /// sub-processes it requested. Idempotent by normalized id.
    pub fn load<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, ProcessResult<String>> {
        async move {
            let id = normalize_path(path);

            match self.states.get(&id) {
                Some(ProcessState::Steady) => return Ok(id),
                Some(ProcessState::Loading) => {
                    self.states.insert(id.clone(), ProcessState::Failed);
                    return Err(ProcessError::Cycle(id));
                }
                Some(ProcessState::Failed) => return Err(ProcessError::Failed(id)),
                None => {}
            }

            let Some(mut process) = self.catalog.create(&id) else {
                self.states.insert(id.clone(), ProcessState::Failed);
                return Err(ProcessError::Unknown(id));
            };
            self.states.insert(id.clone(), ProcessState::Loading);
            tracing::debug!(process_id = %id, "Loading process");

            for dependency in process.requires() {
                if let Err(e) = self.load(&dependency).await {
                    tracing::error!(process_id = %id, dependency = %dependency, error = %e, "Dependency failed");
                    self.states.insert(id.clone(), ProcessState::Failed);
                    return Err(ProcessError::Dependency {
                        process: id,
                        dependency,
                    });
                }
            }

            let settings = match self.settings.open(&id) {
                Ok(s) => s,
                Err(e) => {
                    self.states.insert(id.clone(), ProcessState::Failed);
                    return Err(e.into());
                }
            };

            let spec = process.spec();
            let mut ctx = ProcessContext::new(id.clone(), spec.name, self.runtime.clone(), settings);

            let outcome = AssertUnwindSafe(process.setup(&mut ctx)).catch_unwind().await;
            let result = match outcome {
                Ok(result) => result,
                Err(panic) => Err(ProcessError::Panicked(panic_message(panic.as_ref()))),
            };
            if let Err(e) = result {
                tracing::error!(process_id = %id, error = %e, "Process setup failed");
                ctx.log().error(format!("Setup failed: {}", e));
                self.states.insert(id.clone(), ProcessState::Failed);
                return Err(e);
            }

            let requested = ctx.take_load_requests();
            self.states.insert(id.clone(), ProcessState::Steady);
            self.slots.push(Slot { process, ctx });
            tracing::info!(process_id = %id, "Process ready");

            for sub in requested {
                if let Err(e) = self.load(&sub).await {
                    tracing::warn!(process_id = %id, sub_process = %sub, error = %e, "Sub-process failed to load");
                }
            }

            Ok(id)
        }
        .boxed()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Running
    // ─────────────────────────────────────────────────────────────────────

    /// Drain the bus, then step every steady process once
    pub async fn tick(&mut self) {
        self.runtime.drain();

        let mut requested = Vec::new();
        for slot in &mut self.slots {
            slot.ctx.poll_bundle();

            let outcome = AssertUnwindSafe(slot.process.step(&mut slot.ctx))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(process_id = %slot.ctx.process_id, error = %e, "Error during step");
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(process_id = %slot.ctx.process_id, panic = %message, "Process panicked during step");
                    slot.ctx.log().error(format!("Step panicked: {}", message));
                }
            }

            requested.extend(slot.ctx.take_load_requests());
        }

        for path in requested {
            if let Err(e) = self.load(&path).await {
                tracing::warn!(process = %path, error = %e, "Requested process failed to load");
            }
        }
    }

    /// Tick forever until `shutdown` resolves, then flush settings
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        let mut ticks = tokio::time::interval(self.config.tick_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut drains = tokio::time::interval(self.config.drain_interval);
        drains.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        tracing::info!(
            processes = self.slots.len(),
            tick_ms = self.config.tick_interval.as_millis() as u64,
            "Scheduler running"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = ticks.tick() => self.tick().await,
                _ = drains.tick() => {
                    self.runtime.drain();
                }
            }
        }

        for slot in &self.slots {
            if let Err(e) = slot.ctx.settings().save() {
                tracing::warn!(process_id = %slot.ctx.process_id, error = %e, "Failed to save settings");
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
