//! # ScheduledJob: the job lifecycle orchestrator.
//!
//! Ties together the schedule planner, the timer pool, the process
//! supervisor and the exit-event bus for one configured job. Three actors
//! drive it:
//!
//! - the control surface (`activate` / `shutdown`),
//! - timer dispatch (launch at trigger instants, queue the next one),
//! - kernel exit events (classify the exit, settle or re-arm).
//!
//! The kernel reader thread only filters and hands off ([`ExitListener`]
//! impl); all state transitions run on the tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::SuperviseError;
use crate::events::{Bus, Event, EventKind};
use crate::observer::{ExitEventBus, ExitListener, ExitRecord};
use crate::schedule::{next_in_lattice, SchedulePlan, Trigger};
use crate::timer::{TimerHandle, TimerPool};

use super::descriptor::JobDescriptor;
use super::process::ProcessSupervisor;
use super::state::JobState;

/// How a job settled. Published on the outcome watch once the job reaches a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Clean exit with no further trigger.
    Completed,
    /// Non-zero exit status (raw kernel encoding) or failed launch.
    Failed { exit_code: Option<u32> },
}

/// Mutable control state, guarded by one std mutex.
///
/// Held only for short non-blocking sections; the kernel reader thread takes
/// it in [`ExitListener::update`], so nothing async may run under it.
struct Ctl {
    state: JobState,
    /// Pid of the currently supervised process, 0 when none.
    pid: u32,
    shutdown: bool,
    pending: Option<TimerHandle>,
    /// Lattice anchor: the instant of the most recently armed trigger.
    last_trigger: Option<NaiveDateTime>,
}

struct Inner {
    name: Arc<str>,
    descriptor: JobDescriptor,
    plan: SchedulePlan,
    bus: Bus,
    exit_bus: Arc<ExitEventBus>,
    timers: TimerPool,
    ctl: Mutex<Ctl>,
    supervisor: tokio::sync::Mutex<ProcessSupervisor>,
    exit_tx: mpsc::UnboundedSender<ExitRecord>,
    exit_rx: Mutex<Option<mpsc::UnboundedReceiver<ExitRecord>>>,
    outcome_tx: watch::Sender<Option<JobOutcome>>,
    pump: CancellationToken,
}

/// One activated job.
pub struct ScheduledJob {
    inner: Arc<Inner>,
}

impl ScheduledJob {
    pub fn new(
        name: impl Into<Arc<str>>,
        descriptor: JobDescriptor,
        plan: SchedulePlan,
        bus: Bus,
        exit_bus: Arc<ExitEventBus>,
        timers: TimerPool,
    ) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let (outcome_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                descriptor,
                plan,
                bus,
                exit_bus,
                timers,
                ctl: Mutex::new(Ctl {
                    state: JobState::Idle,
                    pid: 0,
                    shutdown: false,
                    pending: None,
                    last_trigger: None,
                }),
                supervisor: tokio::sync::Mutex::new(ProcessSupervisor::new()),
                exit_tx,
                exit_rx: Mutex::new(Some(exit_rx)),
                outcome_tx,
                pump: CancellationToken::new(),
            }),
        }
    }

    /// Registers for exit events, starts the exit pump, and arms the first
    /// trigger.
    pub fn activate(&self) -> Result<(), SuperviseError> {
        let inner = &self.inner;
        let listener: Arc<dyn ExitListener> = Arc::clone(inner) as Arc<dyn ExitListener>;
        inner.exit_bus.register(listener)?;

        // Exit pump: moves decoded records from the reader thread onto the
        // runtime, where transitions may take the async supervisor lock.
        let rx = inner
            .exit_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(mut rx) = rx {
            let pump = Arc::clone(inner);
            let token = inner.pump.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        record = rx.recv() => match record {
                            Some(record) => pump.handle_exit(record).await,
                            None => break,
                        },
                    }
                }
            });
        }

        let now = Local::now().naive_local();
        let (trigger, delay) = match inner.plan.first_trigger(now) {
            Trigger::Immediate => (now, Duration::ZERO),
            Trigger::At(at) => (at, (at - now).to_std().unwrap_or(Duration::ZERO)),
        };

        {
            let mut ctl = inner.lock_ctl();
            ctl.state = JobState::Scheduled;
            ctl.last_trigger = Some(trigger);
            ctl.pending = Some(inner.timers.schedule(delay, inner.dispatch_future()));
        }

        inner.publish(
            Event::now(EventKind::JobScheduled)
                .with_job(Arc::clone(&inner.name))
                .with_delay(delay),
        );
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.inner.lock_ctl().state
    }

    /// Watch that resolves once the job reaches a terminal outcome.
    pub fn outcome(&self) -> watch::Receiver<Option<JobOutcome>> {
        self.inner.outcome_tx.subscribe()
    }

    /// Suppresses further launches, revokes the pending trigger, and drives
    /// the graceful-then-forceful termination of any live process.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        {
            let mut ctl = inner.lock_ctl();
            if ctl.shutdown {
                return;
            }
            ctl.shutdown = true;
            ctl.state = JobState::ShuttingDown;
            if let Some(pending) = ctl.pending.take() {
                pending.revoke();
            }
        }
        inner.publish(Event::now(EventKind::ShutdownRequested).with_job(Arc::clone(&inner.name)));

        let listener: Arc<dyn ExitListener> = Arc::clone(inner) as Arc<dyn ExitListener>;
        if let Err(e) = inner.exit_bus.unregister(&listener) {
            tracing::debug!(job = %inner.name, error = %e, "exit bus unregister");
        }

        let pid = inner.lock_ctl().pid;
        let escalated = {
            let mut sup = inner.supervisor.lock().await;
            sup.terminate(inner.descriptor.close_timeout()).await.escalated
        };
        if escalated {
            let mut event = Event::now(EventKind::TerminationEscalated)
                .with_job(Arc::clone(&inner.name))
                .with_delay(inner.descriptor.close_timeout());
            if pid != 0 {
                event = event.with_pid(pid);
            }
            inner.publish(event);
        }

        inner.pump.cancel();
        let mut ctl = inner.lock_ctl();
        ctl.pid = 0;
        ctl.state = JobState::Idle;
    }

    #[cfg(test)]
    pub(crate) fn inject_exit(&self, record: ExitRecord) {
        self.inner.update(&record);
    }

    #[cfg(test)]
    pub(crate) async fn dispatch_now(&self) {
        self.inner.dispatch().await;
    }
}

impl Inner {
    fn lock_ctl(&self) -> MutexGuard<'_, Ctl> {
        self.ctl
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn publish(&self, event: Event) {
        self.bus.publish(event);
    }

    fn dispatch_future(self: &Arc<Self>) -> BoxFuture<'static, ()> {
        let inner = Arc::clone(self);
        Box::pin(async move { inner.dispatch().await })
    }

    /// Trigger fired: launch unless suppressed, then queue the next trigger.
    ///
    /// A still-active process skips only the launch; the reschedule still
    /// happens, keeping the lattice phase stable.
    async fn dispatch(self: &Arc<Self>) {
        if self.lock_ctl().shutdown {
            self.publish(
                Event::now(EventKind::DispatchSkipped)
                    .with_job(Arc::clone(&self.name))
                    .with_reason("shutdown in progress"),
            );
            return;
        }
        self.lock_ctl().pending = None;

        let mut sup = self.supervisor.lock().await;
        // Shutdown may have completed while this dispatch waited for the
        // supervisor; launching now would leave an unobserved child.
        if self.lock_ctl().shutdown {
            self.publish(
                Event::now(EventKind::DispatchSkipped)
                    .with_job(Arc::clone(&self.name))
                    .with_reason("shutdown in progress"),
            );
            return;
        }
        if sup.is_active() {
            self.publish(
                Event::now(EventKind::DispatchSkipped)
                    .with_job(Arc::clone(&self.name))
                    .with_reason("previous run still active"),
            );
        } else {
            match sup.launch(&self.descriptor) {
                Ok(pid) => {
                    let mut ctl = self.lock_ctl();
                    ctl.pid = pid;
                    ctl.state = JobState::Running;
                    drop(ctl);
                    self.publish(
                        Event::now(EventKind::ProcessLaunched)
                            .with_job(Arc::clone(&self.name))
                            .with_pid(pid),
                    );
                }
                Err(e) => {
                    tracing::warn!(job = %self.name, error = %e, "launch failed");
                    self.publish(
                        Event::now(EventKind::JobFailed)
                            .with_job(Arc::clone(&self.name))
                            .with_reason(e.to_string()),
                    );
                    if !self.plan.is_repeating() {
                        self.settle(JobState::Failed, JobOutcome::Failed { exit_code: None });
                        return;
                    }
                    // Repeating jobs keep their lattice and retry at the
                    // next slot.
                }
            }
        }
        drop(sup);

        self.queue_reschedule();
    }

    /// Arms the next trigger on the fixed lattice anchored at the previous
    /// trigger instant. No-op for run-once plans or during shutdown.
    fn queue_reschedule(self: &Arc<Self>) {
        let Some(step) = self.plan.step() else { return };

        let now = Local::now().naive_local();
        let mut ctl = self.lock_ctl();
        if ctl.shutdown {
            return;
        }
        let anchor = ctl.last_trigger.unwrap_or(now);
        let next = next_in_lattice(anchor, step, now);
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
        ctl.last_trigger = Some(next);

        let inner = Arc::clone(self);
        ctl.pending = Some(
            self.timers
                .schedule(delay, Box::pin(async move { inner.dispatch().await })),
        );
        drop(ctl);

        self.publish(
            Event::now(EventKind::RescheduleQueued)
                .with_job(Arc::clone(&self.name))
                .with_delay(delay),
        );
    }

    /// Classifies an observed exit of our process and settles or re-arms.
    async fn handle_exit(self: &Arc<Self>, record: ExitRecord) {
        {
            // The pid filter ran on the reader thread, but the pid may have
            // moved on since; discard stale records.
            let ctl = self.lock_ctl();
            if ctl.pid == 0 || record.pid != ctl.pid {
                return;
            }
        }

        // Reap the child handle; exit classification uses the kernel record.
        {
            let mut sup = self.supervisor.lock().await;
            sup.wait_completed(Duration::from_secs(1)).await;
        }

        self.publish(
            Event::now(EventKind::ProcessExited)
                .with_job(Arc::clone(&self.name))
                .with_pid(record.pid)
                .with_exit_code(record.exit_code),
        );

        // Low 16 bits carry the wait status; anything non-zero (bad exit
        // code or a signal) is a failure.
        if record.exit_code & 0xFFFF != 0 {
            let revoked = {
                let mut ctl = self.lock_ctl();
                ctl.pid = 0;
                ctl.pending.take()
            };
            if let Some(pending) = revoked {
                pending.revoke();
            }
            self.publish(
                Event::now(EventKind::JobFailed)
                    .with_job(Arc::clone(&self.name))
                    .with_exit_code(record.exit_code),
            );
            self.settle(
                JobState::Failed,
                JobOutcome::Failed {
                    exit_code: Some(record.exit_code),
                },
            );
            return;
        }

        let mut ctl = self.lock_ctl();
        ctl.pid = 0;
        if ctl.shutdown {
            return;
        }
        if self.plan.is_repeating() {
            ctl.state = JobState::Scheduled;
        } else {
            drop(ctl);
            self.settle(JobState::Completed, JobOutcome::Completed);
            self.publish(Event::now(EventKind::JobCompleted).with_job(Arc::clone(&self.name)));
        }
    }

    fn settle(&self, state: JobState, outcome: JobOutcome) {
        self.lock_ctl().state = state;
        let _ = self.outcome_tx.send(Some(outcome));
    }
}

impl ExitListener for Inner {
    /// Runs on the kernel reader thread: pid filter and hand-off only.
    fn update(&self, record: &ExitRecord) {
        let pid = self.lock_ctl().pid;
        if pid != 0 && record.is_exit_of(pid) {
            let _ = self.exit_tx.send(*record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::channel::EventChannel;
    use crate::observer::ExitEventKind;
    use crate::schedule::{ScheduleMode, TimeSpec};
    use std::io;

    struct IdleChannel;

    impl EventChannel for IdleChannel {
        fn open(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn control(&mut self, _listen: bool) -> io::Result<()> {
            Ok(())
        }
        fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
            std::thread::sleep(Duration::from_millis(20));
            Ok(None)
        }
        fn close(&mut self) {}
    }

    fn quiet_bus() -> Arc<ExitEventBus> {
        ExitEventBus::with_factory(Box::new(|| Box::new(IdleChannel)))
    }

    fn exit_record(pid: u32, exit_code: u32) -> ExitRecord {
        ExitRecord {
            kind: ExitEventKind::Exit,
            pid,
            tgid: pid,
            exit_code,
        }
    }

    async fn await_kind(
        rx: &mut tokio::sync::broadcast::Receiver<Event>,
        kind: EventKind,
    ) -> Event {
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event wait timed out")
                .expect("event bus closed");
            if ev.kind == kind {
                return ev;
            }
        }
    }

    fn true_job(bus: &Bus, exit_bus: &Arc<ExitEventBus>, plan: SchedulePlan) -> ScheduledJob {
        ScheduledJob::new(
            "probe",
            JobDescriptor::new("/bin/true"),
            plan,
            bus.clone(),
            Arc::clone(exit_bus),
            TimerPool::new(),
        )
    }

    #[tokio::test]
    async fn test_run_once_completes_on_clean_exit() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let exit_bus = quiet_bus();
        let job = true_job(&bus, &exit_bus, SchedulePlan::run_once());
        let mut outcome = job.outcome();

        job.activate().unwrap();
        let launched = await_kind(&mut rx, EventKind::ProcessLaunched).await;
        let pid = launched.pid.unwrap();

        // /bin/true exits on its own; synthesize the kernel record for it.
        tokio::time::sleep(Duration::from_millis(200)).await;
        job.inject_exit(exit_record(pid, 0));

        await_kind(&mut rx, EventKind::JobCompleted).await;
        outcome.changed().await.unwrap();
        assert_eq!(*outcome.borrow(), Some(JobOutcome::Completed));
        assert_eq!(job.state(), JobState::Completed);

        job.shutdown().await;
        assert!(exit_bus.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_and_revokes_recurrence() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let exit_bus = quiet_bus();
        let plan = SchedulePlan {
            mode: None,
            time: TimeSpec::UNSET,
            interval: TimeSpec::new(Some(1), Some(0), Some(0)), // repeats hourly
        };
        let job = ScheduledJob::new(
            "flaky",
            JobDescriptor::new("/bin/false"),
            plan,
            bus.clone(),
            Arc::clone(&exit_bus),
            TimerPool::new(),
        );
        let mut outcome = job.outcome();

        job.activate().unwrap();
        let launched = await_kind(&mut rx, EventKind::ProcessLaunched).await;
        let pid = launched.pid.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        // Exit status 1 in kernel wait encoding.
        job.inject_exit(exit_record(pid, 1 << 8));

        await_kind(&mut rx, EventKind::JobFailed).await;
        outcome.changed().await.unwrap();
        assert_eq!(
            *outcome.borrow(),
            Some(JobOutcome::Failed {
                exit_code: Some(1 << 8)
            })
        );
        assert_eq!(job.state(), JobState::Failed);

        job.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_suppresses_dispatch() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let exit_bus = quiet_bus();
        // Armed far in the future so the timer never fires during the test.
        let plan = SchedulePlan {
            mode: Some(ScheduleMode::Relative),
            time: TimeSpec::new(Some(10), Some(0), Some(0)),
            interval: TimeSpec::UNSET,
        };
        let job = true_job(&bus, &exit_bus, plan);

        job.activate().unwrap();
        await_kind(&mut rx, EventKind::JobScheduled).await;
        job.shutdown().await;
        await_kind(&mut rx, EventKind::ShutdownRequested).await;

        job.dispatch_now().await;
        let skipped = await_kind(&mut rx, EventKind::DispatchSkipped).await;
        assert_eq!(skipped.reason.as_deref(), Some("shutdown in progress"));
        assert_eq!(job.state(), JobState::Idle);
        assert!(exit_bus.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_skips_launch_while_process_active() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let exit_bus = quiet_bus();
        let plan = SchedulePlan {
            mode: None,
            time: TimeSpec::UNSET,
            interval: TimeSpec::new(Some(0), Some(30), Some(0)),
        };
        let job = ScheduledJob::new(
            "long",
            JobDescriptor::new("/bin/sh").with_parameter("-c", Some("sleep 30".into())),
            plan,
            bus.clone(),
            Arc::clone(&exit_bus),
            TimerPool::new(),
        );

        job.activate().unwrap();
        await_kind(&mut rx, EventKind::ProcessLaunched).await;

        job.dispatch_now().await;
        await_kind(&mut rx, EventKind::DispatchSkipped).await;
        // The skipped dispatch still queues the next slot.
        await_kind(&mut rx, EventKind::RescheduleQueued).await;

        job.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_rechecks_shutdown_after_supervisor_wait() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let exit_bus = quiet_bus();
        let job = true_job(&bus, &exit_bus, SchedulePlan::run_once());

        // Park a dispatch on the supervisor lock past its entry check, then
        // finish a shutdown before releasing it.
        let guard = job.inner.supervisor.lock().await;
        let dispatcher = Arc::clone(&job.inner);
        let parked = tokio::spawn(async move { dispatcher.dispatch().await });
        tokio::task::yield_now().await;

        job.inner.lock_ctl().shutdown = true;
        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), parked)
            .await
            .expect("dispatch did not finish")
            .unwrap();

        let skipped = await_kind(&mut rx, EventKind::DispatchSkipped).await;
        assert_eq!(skipped.reason.as_deref(), Some("shutdown in progress"));
        // No launch happened: the supervisor never saw a child.
        assert!(!job.inner.supervisor.lock().await.is_active());
        while let Ok(ev) = rx.try_recv() {
            assert_ne!(ev.kind, EventKind::ProcessLaunched);
        }
    }

    #[tokio::test]
    async fn test_shutdown_suppresses_inflight_reschedule() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let exit_bus = quiet_bus();
        let plan = SchedulePlan {
            mode: None,
            time: TimeSpec::UNSET,
            interval: TimeSpec::new(Some(0), Some(30), Some(0)),
        };
        let job = true_job(&bus, &exit_bus, plan);

        // Shutdown lands between the launch and the reschedule step.
        job.inner.lock_ctl().shutdown = true;
        job.inner.queue_reschedule();

        assert!(job.inner.lock_ctl().pending.is_none());
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_escalated_termination_event_carries_pid_and_timeout() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let exit_bus = quiet_bus();
        let job = ScheduledJob::new(
            "stubborn",
            JobDescriptor::new("/bin/sh")
                .with_parameter("-c", Some("trap '' TERM; sleep 30".into()))
                .with_close_timeout(Duration::from_millis(300)),
            SchedulePlan::run_once(),
            bus.clone(),
            Arc::clone(&exit_bus),
            TimerPool::new(),
        );

        job.activate().unwrap();
        let launched = await_kind(&mut rx, EventKind::ProcessLaunched).await;
        let pid = launched.pid.unwrap();
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        job.shutdown().await;
        let escalated = await_kind(&mut rx, EventKind::TerminationEscalated).await;
        assert_eq!(escalated.pid, Some(pid));
        assert_eq!(escalated.delay_ms, Some(300));
        assert_eq!(job.state(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_stale_pid_record_is_discarded() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let exit_bus = quiet_bus();
        let job = true_job(&bus, &exit_bus, SchedulePlan::run_once());

        job.activate().unwrap();
        let launched = await_kind(&mut rx, EventKind::ProcessLaunched).await;
        let pid = launched.pid.unwrap();

        // A different pid must not settle the job.
        job.inject_exit(exit_record(pid.wrapping_add(1), 1 << 8));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(job.state(), JobState::Running);

        job.shutdown().await;
    }
}
