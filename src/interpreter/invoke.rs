//! Invoked child processes.
//!
//! A state that declares an invocation gets a running service for exactly as
//! long as it is active: the host starts the service when the state is
//! entered and stops it when the state is exited. Each run is identified by a
//! fresh session token; events a service delivers after its session ended are
//! dropped, so a slow task resolving after its state was left cannot corrupt
//! the machine.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::core::node::InvokeDef;
use crate::core::{Context, Event};
use crate::registry::BehaviorError;

use super::Shared;

/// A long-lived service driven by the machine.
///
/// Implementations receive a [`SendBack`] for delivering events to the
/// machine and a channel of events the machine routes to them. [`run`] is
/// called once on the interpreter's processing thread and must not block;
/// spawn a thread for ongoing work and keep the channel ends there.
///
/// [`run`]: CallbackService::run
pub trait CallbackService: Send {
    /// Start the service.
    fn run(&mut self, send_back: SendBack, events: Receiver<Event>);

    /// Tear the service down. Called when the owning state is exited; the
    /// event channel is closed right after, so a worker thread blocked on it
    /// unblocks on its own.
    fn stop(&mut self) {}
}

type TaskFn = Box<dyn FnOnce() -> Result<Value, BehaviorError> + Send>;

/// What a service factory produces for one invocation.
pub enum Service {
    /// A bidirectional service: receives routed events, sends events back.
    Callback(Box<dyn CallbackService>),
    /// A one-shot unit of work run on its own thread. Resolving delivers
    /// `done.invoke.{id}` with the value in the `data` field; failing
    /// delivers `error.invoke.{id}`.
    Task(TaskFn),
}

impl Service {
    /// Wrap a callback service.
    pub fn callback(service: impl CallbackService + 'static) -> Self {
        Self::Callback(Box::new(service))
    }

    /// Wrap a one-shot task.
    pub fn task(task: impl FnOnce() -> Result<Value, BehaviorError> + Send + 'static) -> Self {
        Self::Task(Box::new(task))
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Service::Callback(..)"),
            Self::Task(_) => f.write_str("Service::Task(..)"),
        }
    }
}

/// A service's handle for delivering events to the machine.
///
/// Tied to one session: once the owning state is exited (or the interpreter
/// stops), delivery becomes a no-op and `send` returns `false`.
#[derive(Clone)]
pub struct SendBack {
    shared: Weak<Shared>,
    token: Uuid,
}

impl SendBack {
    pub(crate) fn new(shared: &Arc<Shared>, token: Uuid) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            token,
        }
    }

    /// Deliver an event to the machine's external queue. Returns whether the
    /// event was accepted.
    pub fn send(&self, event: Event) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.deliver_from_service(self.token, event),
            None => false,
        }
    }
}

impl fmt::Debug for SendBack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendBack").field("token", &self.token).finish()
    }
}

enum SessionHandle {
    Callback {
        service: Box<dyn CallbackService>,
        sender: Sender<Event>,
    },
    Task,
}

struct Session {
    token: Uuid,
    handle: SessionHandle,
}

/// Running invocations, keyed by invocation id.
pub(crate) struct InvokeHost {
    sessions: HashMap<String, Session>,
}

impl InvokeHost {
    pub(crate) fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Start a fresh session for an invocation whose state was just entered.
    pub(crate) fn start(
        &mut self,
        shared: &Arc<Shared>,
        def: &InvokeDef,
        context: &Context,
        event: &Event,
        live: &Mutex<HashSet<Uuid>>,
    ) {
        // Re-entry within one step: the old session is gone first.
        self.stop(&def.id, live);

        let Some(factory) = shared.machine.registry().get_service(&def.src) else {
            warn!(service = %def.src, "invoked service is not registered");
            return;
        };
        let token = Uuid::new_v4();
        live.lock().insert(token);
        let send_back = SendBack::new(shared, token);
        trace!(id = %def.id, %token, "starting invoked service");

        match factory(context, event) {
            Service::Task(task) => {
                let id = def.id.clone();
                thread::spawn(move || {
                    let completion = match task() {
                        Ok(value) => Event::done_invoke(&id, value),
                        Err(error) => Event::error_invoke(&id, json!(error.message())),
                    };
                    send_back.send(completion);
                });
                self.sessions.insert(
                    def.id.clone(),
                    Session {
                        token,
                        handle: SessionHandle::Task,
                    },
                );
            }
            Service::Callback(mut service) => {
                let (sender, receiver) = unbounded();
                service.run(send_back, receiver);
                self.sessions.insert(
                    def.id.clone(),
                    Session {
                        token,
                        handle: SessionHandle::Callback { service, sender },
                    },
                );
            }
        }
    }

    /// End a session: invalidate its token, close its channel, and let a
    /// callback service tear itself down. Stopping an unknown id is a no-op.
    pub(crate) fn stop(&mut self, id: &str, live: &Mutex<HashSet<Uuid>>) {
        let Some(session) = self.sessions.remove(id) else {
            return;
        };
        live.lock().remove(&session.token);
        trace!(%id, token = %session.token, "stopping invoked service");
        if let SessionHandle::Callback { mut service, sender } = session.handle {
            drop(sender);
            service.stop();
        }
    }

    /// Tear down every session, in no particular order.
    pub(crate) fn stop_all(&mut self, live: &Mutex<HashSet<Uuid>>) {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            self.stop(&id, live);
        }
    }

    /// Deliver an event to a running callback service. Events routed to a
    /// stopped or unknown id, or to a task, are dropped silently.
    pub(crate) fn route(&self, id: &str, event: Event) {
        match self.sessions.get(id) {
            Some(Session {
                handle: SessionHandle::Callback { sender, .. },
                ..
            }) => {
                let _ = sender.send(event);
            }
            _ => trace!(%id, event = event.event_type(), "dropped event for inactive service"),
        }
    }
}
