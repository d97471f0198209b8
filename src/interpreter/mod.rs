//! The interpreter: a live machine processing events.
//!
//! The interpreter is the imperative shell around the pure resolver. It owns
//! the committed configuration, context, and history, two event queues
//! (raised events outrank external sends), the running invoked services, and
//! the subscriber list. Any thread may send events; a compare-and-swap flag
//! elects one thread at a time to drain the queues, and everyone else just
//! enqueues.
//!
//! Commits are all-or-nothing: a step either fully applies or the machine
//! stays exactly where it was. Effects and service work always run after the
//! commit, against committed state.

pub mod invoke;

mod error;
mod snapshot;

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::core::{resolver, Configuration, Context, Event, HistoryStore, InvokeOp, Machine, Step};

pub use error::InterpreterError;
pub use invoke::{CallbackService, SendBack, Service};
pub use snapshot::Snapshot;

use invoke::InvokeHost;

/// Lifecycle of an interpreter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Created but not yet started; no state is active.
    NotStarted,
    /// Processing events.
    Running,
    /// Stopped; events are rejected and all services are torn down.
    Stopped,
}

/// One entry of the interpreter's step log.
#[derive(Clone, Debug)]
pub struct StepRecord {
    /// Type of the processed event.
    pub event_type: String,
    /// When the event was processed.
    pub timestamp: DateTime<Utc>,
    /// Whether the event changed anything.
    pub changed: bool,
}

/// Handle for removing a subscriber.
///
/// Dropping the handle does not unsubscribe; call
/// [`unsubscribe`](Subscription::unsubscribe).
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
}

impl Subscription {
    /// Remove the subscriber this handle was returned for.
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}

struct Subscriber {
    id: u64,
    callback: Arc<dyn Fn(&Snapshot) + Send + Sync>,
}

#[derive(Default)]
struct Queues {
    internal: VecDeque<Event>,
    external: VecDeque<Event>,
}

impl Queues {
    fn pop(&mut self) -> Option<Event> {
        self.internal
            .pop_front()
            .or_else(|| self.external.pop_front())
    }

    fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty()
    }

    fn clear(&mut self) {
        self.internal.clear();
        self.external.clear();
    }
}

/// Upper bound on retained [`StepRecord`]s; the oldest entries are evicted
/// first once a long-running interpreter reaches it.
pub const MAX_LOG_RECORDS: usize = 1024;

struct CoreState {
    configuration: Configuration,
    context: Context,
    history: HistoryStore,
    snapshot: Arc<Snapshot>,
    log: VecDeque<StepRecord>,
}

impl CoreState {
    fn pristine(machine: &Arc<Machine>) -> Self {
        Self {
            configuration: Configuration::empty(),
            context: machine.initial_context().clone(),
            history: HistoryStore::new(),
            snapshot: Arc::new(Snapshot::new(
                Arc::clone(machine),
                Configuration::empty(),
                machine.initial_context().clone(),
                HistoryStore::new(),
                Event::init(),
                false,
            )),
            log: VecDeque::new(),
        }
    }

    fn record(&mut self, event: &Event, changed: bool) {
        if self.log.len() == MAX_LOG_RECORDS {
            self.log.pop_front();
        }
        self.log.push_back(StepRecord {
            event_type: event.event_type().to_string(),
            timestamp: Utc::now(),
            changed,
        });
    }
}

pub(crate) struct Shared {
    pub(crate) machine: Arc<Machine>,
    state: Mutex<CoreState>,
    host: Mutex<InvokeHost>,
    queues: Mutex<Queues>,
    status: Mutex<Status>,
    live_sessions: Mutex<HashSet<Uuid>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
    processing: AtomicBool,
    processor: Mutex<Option<ThreadId>>,
}

/// A running machine.
///
/// Cheap to clone; clones share the same live machine and may be moved to
/// other threads.
///
/// # Example
///
/// ```rust
/// use statecraft::{Event, MachineBuilder, StateBuilder, TransitionBuilder};
///
/// let machine = MachineBuilder::new("toggle")
///     .state(StateBuilder::atomic("off")
///         .on("FLIP", TransitionBuilder::new().target("on")))
///     .state(StateBuilder::atomic("on")
///         .on("FLIP", TransitionBuilder::new().target("off")))
///     .build()
///     .unwrap();
///
/// let interpreter = machine.interpret();
/// interpreter.start().unwrap();
/// let snapshot = interpreter.send(Event::new("FLIP")).unwrap();
/// assert!(snapshot.matches("on"));
/// interpreter.stop();
/// ```
#[derive(Clone)]
pub struct Interpreter {
    shared: Arc<Shared>,
}

impl Interpreter {
    pub(crate) fn new(machine: Arc<Machine>) -> Self {
        let shared = Shared {
            state: Mutex::new(CoreState::pristine(&machine)),
            machine,
            host: Mutex::new(InvokeHost::new()),
            queues: Mutex::new(Queues::default()),
            status: Mutex::new(Status::NotStarted),
            live_sessions: Mutex::new(HashSet::new()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
            processing: AtomicBool::new(false),
            processor: Mutex::new(None),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// The machine definition this interpreter runs.
    pub fn machine(&self) -> &Arc<Machine> {
        &self.shared.machine
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        *self.shared.status.lock()
    }

    /// Enter the machine's initial configuration, run entry work, and settle.
    ///
    /// Existing subscribers are notified with the initial snapshot. Fails
    /// with [`InterpreterError::AlreadyStarted`] on any second call, and with
    /// a step error if initialization itself livelocks or a behavior fails,
    /// in which case nothing remains committed and `start` may be retried.
    pub fn start(&self) -> Result<Arc<Snapshot>, InterpreterError> {
        {
            let mut status = self.shared.status.lock();
            if *status != Status::NotStarted {
                return Err(InterpreterError::AlreadyStarted);
            }
            *status = Status::Running;
        }
        debug!(machine = %self.shared.machine.id(), "starting interpreter");

        let result = self.shared.run_as_processor(|shared| {
            let step = resolver::initial_step(&shared.machine)?;
            shared.commit(step, &Event::init())?;
            shared.drain_loop(true)
        });
        match result.and_then(|()| self.shared.drain()) {
            Ok(()) => Ok(self.snapshot()),
            Err(error) => {
                self.shared.reset_after_failed_start();
                Err(error)
            }
        }
    }

    /// Deliver an event and process it to quiescence.
    ///
    /// Returns the snapshot current when the call returns. Ignored events
    /// return the previous snapshot unchanged (pointer-equal). A send from
    /// within a callback running on the processing thread (an effect, a
    /// subscriber, a service started synchronously) is queued ahead of
    /// external events and drained before the outer call returns.
    pub fn send(&self, event: Event) -> Result<Arc<Snapshot>, InterpreterError> {
        match *self.shared.status.lock() {
            Status::NotStarted => return Err(InterpreterError::NotStarted),
            Status::Stopped => return Err(InterpreterError::Stopped),
            Status::Running => {}
        }
        let nested = *self.shared.processor.lock() == Some(thread::current().id());
        if nested {
            trace!(event = event.event_type(), "queueing nested send");
            self.shared.queues.lock().internal.push_back(event);
            return Ok(self.snapshot());
        }
        self.shared.queues.lock().external.push_back(event);
        self.shared.drain()?;
        Ok(self.snapshot())
    }

    /// The latest committed snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.state.lock().snapshot.clone()
    }

    /// Register a callback invoked once per settled event, changed or not;
    /// for an ignored event the delivered snapshot reference is unchanged.
    /// While running, the callback is also invoked immediately with the
    /// current snapshot; a subscriber added before `start` first fires with
    /// the initial snapshot.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let callback: Arc<dyn Fn(&Snapshot) + Send + Sync> = Arc::new(callback);
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers.lock().push(Subscriber {
            id,
            callback: Arc::clone(&callback),
        });
        if *self.shared.status.lock() == Status::Running {
            let snapshot = self.shared.state.lock().snapshot.clone();
            callback(&snapshot);
        }
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Stop the machine: tear down every invoked service, drop queued
    /// events, and reject all further sends. Idempotent; subscribers are not
    /// notified.
    pub fn stop(&self) {
        let was_running = {
            let mut status = self.shared.status.lock();
            if *status == Status::Stopped {
                return;
            }
            let was_running = *status == Status::Running;
            *status = Status::Stopped;
            was_running
        };
        debug!(machine = %self.shared.machine.id(), "stopping interpreter");
        if was_running {
            self.shared.host.lock().stop_all(&self.shared.live_sessions);
        }
        self.shared.queues.lock().clear();
    }

    /// The ordered record of processed events, including ignored ones,
    /// bounded to the most recent [`MAX_LOG_RECORDS`].
    pub fn log(&self) -> Vec<StepRecord> {
        self.shared.state.lock().log.iter().cloned().collect()
    }
}

impl Shared {
    /// Claim the processing flag, run `work`, release. Spins briefly if a
    /// racing drain holds the flag.
    fn run_as_processor<F>(self: &Arc<Self>, work: F) -> Result<(), InterpreterError>
    where
        F: FnOnce(&Arc<Self>) -> Result<(), InterpreterError>,
    {
        while self
            .processing
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            thread::yield_now();
        }
        *self.processor.lock() = Some(thread::current().id());
        let result = work(self);
        *self.processor.lock() = None;
        self.processing.store(false, Ordering::Release);
        result
    }

    /// Process queued events if no other thread is already doing so.
    fn drain(self: &Arc<Self>) -> Result<(), InterpreterError> {
        loop {
            if self
                .processing
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                // Whoever holds the flag will see our queued events.
                return Ok(());
            }
            *self.processor.lock() = Some(thread::current().id());
            let result = self.drain_loop(false);
            *self.processor.lock() = None;
            self.processing.store(false, Ordering::Release);
            result?;
            if self.queues.lock().is_empty() {
                return Ok(());
            }
            // An event arrived while the flag was being released; claim again.
        }
    }

    /// Pop and process events until the queues are empty. Subscribers are
    /// notified once per settled event, after its raised descendants drain,
    /// whether or not anything changed.
    fn drain_loop(self: &Arc<Self>, mut pending: bool) -> Result<(), InterpreterError> {
        loop {
            if *self.status.lock() != Status::Running {
                self.queues.lock().clear();
                return Ok(());
            }
            let Some(event) = self.queues.lock().pop() else {
                if pending {
                    self.notify();
                }
                return Ok(());
            };
            if let Err(error) = self.process_event(&event) {
                // Raised descendants of the failed event are meaningless.
                self.queues.lock().internal.clear();
                return Err(error);
            }
            pending = true;
            if self.queues.lock().internal.is_empty() {
                self.notify();
                pending = false;
            }
        }
    }

    /// Resolve one event and commit its step; an ignored event only gets a
    /// log record.
    fn process_event(self: &Arc<Self>, event: &Event) -> Result<(), InterpreterError> {
        trace!(machine = %self.machine.id(), event = event.event_type(), "processing event");
        let step = {
            let state = self.state.lock();
            resolver::resolve(
                &self.machine,
                &state.configuration,
                &state.context,
                &state.history,
                event,
            )?
        };
        if !step.changed {
            trace!(event = event.event_type(), "event ignored");
            self.state.lock().record(event, false);
            return Ok(());
        }
        self.commit(step, event)
    }

    /// Apply a resolved step: state first, then queued raises; service
    /// lifecycle work and deferred effects run afterwards, with the state
    /// lock released so they may read snapshots and the log freely.
    fn commit(self: &Arc<Self>, step: Step, event: &Event) -> Result<(), InterpreterError> {
        let Step {
            configuration,
            context,
            history,
            effects,
            raised,
            invoke_ops,
            ..
        } = step;

        let committed = {
            let mut state = self.state.lock();
            state.configuration = configuration;
            state.context = context;
            state.history = history;
            state.snapshot = Arc::new(Snapshot::new(
                Arc::clone(&self.machine),
                state.configuration.clone(),
                state.context.clone(),
                state.history.clone(),
                event.clone(),
                true,
            ));
            state.record(event, true);
            debug!(
                machine = %self.machine.id(),
                event = event.event_type(),
                "committed step"
            );
            state.context.clone()
        };

        if !raised.is_empty() {
            self.queues.lock().internal.extend(raised);
        }

        if !invoke_ops.is_empty() {
            let mut host = self.host.lock();
            for op in invoke_ops {
                match op {
                    InvokeOp::Start(id) => {
                        if let Some(def) = self.machine.node(&id).and_then(|n| n.invoke.as_ref()) {
                            host.start(self, def, &committed, event, &self.live_sessions);
                        }
                    }
                    InvokeOp::Stop(id) => {
                        if let Some(def) = self.machine.node(&id).and_then(|n| n.invoke.as_ref()) {
                            host.stop(&def.id, &self.live_sessions);
                        }
                    }
                    InvokeOp::Route { service, event } => host.route(&service, event),
                }
            }
        }

        for call in effects {
            let Some(effect) = self.machine.registry().get_effect(&call.name) else {
                warn!(effect = %call.name, "deferred effect is not registered");
                continue;
            };
            effect(&committed, &call.event).map_err(|source| InterpreterError::Effect {
                name: call.name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Accept an event from an invoked service, dropping it when the session
    /// has ended or the interpreter is not running.
    pub(crate) fn deliver_from_service(self: &Arc<Self>, token: Uuid, event: Event) -> bool {
        if *self.status.lock() != Status::Running {
            return false;
        }
        if !self.live_sessions.lock().contains(&token) {
            trace!(event = event.event_type(), "dropped event from ended session");
            return false;
        }
        self.queues.lock().external.push_back(event);
        if *self.processor.lock() == Some(thread::current().id()) {
            // Delivered synchronously from within processing; the active
            // drain picks it up.
            return true;
        }
        if let Err(error) = self.drain() {
            warn!(%error, "step failed while processing a service event");
        }
        true
    }

    fn notify(&self) {
        let snapshot = self.state.lock().snapshot.clone();
        let callbacks: Vec<Arc<dyn Fn(&Snapshot) + Send + Sync>> = self
            .subscribers
            .lock()
            .iter()
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    /// Return to the pre-start state after a failed initialization.
    fn reset_after_failed_start(&self) {
        self.host.lock().stop_all(&self.live_sessions);
        {
            let mut state = self.state.lock();
            let log = std::mem::take(&mut state.log);
            *state = CoreState::pristine(&self.machine);
            state.log = log;
        }
        self.queues.lock().clear();
        *self.status.lock() = Status::NotStarted;
    }
}
