//! # Launcher: the control surface.
//!
//! Owns the event bus, the subscriber fan-out, the shared exit-event bus and
//! the timer pool, and turns a validated [`JobConfig`] into a running
//! [`ScheduledJob`]. Built through [`LauncherBuilder`]; everything is
//! injected, nothing is global.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::JobConfig;
use crate::error::ActivateError;
use crate::events::{Bus, Event};
use crate::job::{JobOutcome, JobState, ScheduledJob};
use crate::memory::MemoryWatch;
use crate::observer::ExitEventBus;
use crate::schedule::TimeFieldPolicy;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::timer::TimerPool;

const DEFAULT_BUS_CAPACITY: usize = 256;

/// Builder for [`Launcher`].
pub struct LauncherBuilder {
    subscribers: Vec<Arc<dyn Subscribe>>,
    exit_bus: Option<Arc<ExitEventBus>>,
    bus_capacity: usize,
    time_policy: TimeFieldPolicy,
}

impl Default for LauncherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LauncherBuilder {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            exit_bus: None,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            time_policy: TimeFieldPolicy::default(),
        }
    }

    /// Adds an event subscriber.
    pub fn with_subscriber(mut self, sub: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(sub);
        self
    }

    /// Adds several event subscribers.
    pub fn with_subscribers(mut self, subs: impl IntoIterator<Item = Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subs);
        self
    }

    /// Uses the given exit-event bus instead of opening the kernel proc
    /// connector. Lets several launchers share one channel, and lets tests
    /// inject synthetic exit records.
    pub fn with_exit_bus(mut self, bus: Arc<ExitEventBus>) -> Self {
        self.exit_bus = Some(bus);
        self
    }

    /// Capacity of the broadcast event bus.
    pub fn bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Policy for malformed time fields in the configuration.
    pub fn time_policy(mut self, policy: TimeFieldPolicy) -> Self {
        self.time_policy = policy;
        self
    }

    /// Builds the launcher and starts the subscriber fan-out worker.
    ///
    /// Must run inside a tokio runtime.
    pub fn build(self) -> Launcher {
        let bus = Bus::new(self.bus_capacity);
        let memory = MemoryWatch::new();

        let mut subs = self.subscribers;
        subs.push(Arc::clone(&memory) as Arc<dyn Subscribe>);
        let set = SubscriberSet::new(subs);

        // Bridge: broadcast bus -> per-subscriber bounded queues.
        let stop = CancellationToken::new();
        let mut rx = bus.subscribe();
        let token = stop.clone();
        let fanout = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    recv = rx.recv() => match recv {
                        Ok(ev) => set.emit(&ev),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber fan-out lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            set.shutdown().await;
        });

        Launcher {
            bus,
            exit_bus: self.exit_bus.unwrap_or_else(ExitEventBus::proc_connector),
            timers: TimerPool::new(),
            memory,
            time_policy: self.time_policy,
            job: Mutex::new(None),
            fanout_stop: stop,
            fanout,
        }
    }
}

/// Process launch scheduler with kernel-level exit supervision.
pub struct Launcher {
    bus: Bus,
    exit_bus: Arc<ExitEventBus>,
    timers: TimerPool,
    memory: Arc<MemoryWatch>,
    time_policy: TimeFieldPolicy,
    job: Mutex<Option<ScheduledJob>>,
    fanout_stop: CancellationToken,
    fanout: tokio::task::JoinHandle<()>,
}

impl Launcher {
    pub fn builder() -> LauncherBuilder {
        LauncherBuilder::new()
    }

    /// Validates `config` and activates its job.
    ///
    /// A previously activated job is shut down first.
    pub async fn activate(&self, config: &JobConfig) -> Result<(), ActivateError> {
        let (descriptor, plan) = config.validate(self.time_policy)?;
        let name = job_name(&config.command);

        let mut slot = self.job.lock().await;
        if let Some(previous) = slot.take() {
            previous.shutdown().await;
        }

        let job = ScheduledJob::new(
            name,
            descriptor,
            plan,
            self.bus.clone(),
            Arc::clone(&self.exit_bus),
            self.timers.clone(),
        );
        job.activate().map_err(ActivateError::from)?;
        *slot = Some(job);
        Ok(())
    }

    /// Shuts down the active job, if any. The launcher stays usable.
    pub async fn deactivate(&self) {
        let job = self.job.lock().await.take();
        if let Some(job) = job {
            job.shutdown().await;
        }
    }

    /// Current state of the active job; [`JobState::Idle`] when none.
    pub async fn state(&self) -> JobState {
        match self.job.lock().await.as_ref() {
            Some(job) => job.state(),
            None => JobState::Idle,
        }
    }

    /// Watch resolving once the active job settles; `None` when no job is
    /// active.
    pub async fn outcome(&self) -> Option<watch::Receiver<Option<JobOutcome>>> {
        self.job.lock().await.as_ref().map(ScheduledJob::outcome)
    }

    /// Subscribes to the runtime event stream.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Memory accounting for the supervised process.
    pub fn memory(&self) -> &Arc<MemoryWatch> {
        &self.memory
    }

    /// Full teardown: deactivates the job and drains the subscriber workers.
    pub async fn shutdown(self) {
        self.deactivate().await;
        self.fanout_stop.cancel();
        if self.fanout.await.is_err() {
            tracing::warn!("subscriber fan-out worker panicked");
        }
    }
}

/// Last path component of the command, used as the job name in events.
fn job_name(command: &str) -> Arc<str> {
    let name = command.rsplit('/').next().unwrap_or(command);
    Arc::from(if name.is_empty() { command } else { name })
}
