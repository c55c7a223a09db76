/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;
use tracing::error;

use crate::ConnectorState;
use crate::Element;
use crate::ErrorCondition;
use crate::Jid;
use crate::Scope;
use crate::SessionState;

/// Subscribing with this event type delivers every event.
pub const ALL_EVENTS: &str = "*";

/// Notifications fired by the client engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ElementReceived(Element),
    ElementSent(Element),
    /// A received element was consumed as the answer of a pending request.
    ResponseReceived(Element),
    StreamStarted(Vec<(String, String)>),
    StreamClosed,
    ParseError(String),
    ConnectorStateChanged {
        old: ConnectorState,
        new: ConnectorState,
    },
    SessionStateChanged {
        old: SessionState,
        new: SessionState,
    },
    StreamManagementEnabled {
        id: Option<String>,
        resume: bool,
        max: Option<u64>,
    },
    StreamManagementFailed(ErrorCondition),
    StreamResumed {
        h: u64,
        previd: String,
    },
    /// Scoped data holders reset themselves on this.
    Cleared(Vec<Scope>),
    Tick(Instant),
    StreamFeaturesReceived(Element),
    /// Asks the authentication module to start SASL.
    AuthRequested,
    AuthSuccess,
    AuthFailure(String),
    /// Asks the binding module to bind a resource.
    BindRequested,
    Bound(Jid),
    /// Asks stream management to resume the previous session.
    ResumeRequested,
    StreamError(String),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ElementReceived(_) => "element-received",
            Event::ElementSent(_) => "element-sent",
            Event::ResponseReceived(_) => "response-received",
            Event::StreamStarted(_) => "stream-started",
            Event::StreamClosed => "stream-closed",
            Event::ParseError(_) => "parse-error",
            Event::ConnectorStateChanged { .. } => "connector-state-changed",
            Event::SessionStateChanged { .. } => "session-state-changed",
            Event::StreamManagementEnabled { .. } => "stream-management-enabled",
            Event::StreamManagementFailed(_) => "stream-management-failed",
            Event::StreamResumed { .. } => "stream-resumed",
            Event::Cleared(_) => "cleared",
            Event::Tick(_) => "tick",
            Event::StreamFeaturesReceived(_) => "stream-features-received",
            Event::AuthRequested => "auth-requested",
            Event::AuthSuccess => "auth-success",
            Event::AuthFailure(_) => "auth-failure",
            Event::BindRequested => "bind-requested",
            Event::Bound(_) => "bound",
            Event::ResumeRequested => "resume-requested",
            Event::StreamError(_) => "stream-error",
        }
    }

    /// True if a cleared event covers the given scope.
    pub fn clears(&self, scope: Scope) -> bool {
        match self {
            Event::Cleared(scopes) => scopes.contains(&scope),
            _ => false,
        }
    }
}

/// How `EventBus::fire` runs the subscribed handlers.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum DispatchPolicy {
    /// Handlers run on the calling thread, in registration order.
    #[default]
    Synchronous,
    /// One new thread runs all handlers of an event.
    ThreadPerEvent,
    /// Every handler gets its own thread.
    ThreadPerHandler,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: HandlerId,
    event_type: String,
    handler: Handler,
}

/// Publish/subscribe registry keyed by event type.
pub struct EventBus {
    policy: DispatchPolicy,
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

fn call_handler(handler: &Handler, event: &Event) {
    if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
        error!(event = event.event_type(), "event handler panicked");
    }
}

impl EventBus {
    pub fn new(policy: DispatchPolicy) -> Self {
        EventBus {
            policy,
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Subscribes a handler to one event type, or to `ALL_EVENTS`.
    pub fn register<F>(&self, event_type: &str, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().push(Subscription {
            id,
            event_type: event_type.to_string(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Returns false if the handler was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn fire(&self, event: Event) {
        let event_type = event.event_type();
        let handlers: Vec<Handler> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.event_type == event_type || s.event_type == ALL_EVENTS)
            .map(|s| Arc::clone(&s.handler))
            .collect();
        if handlers.is_empty() {
            return;
        }
        debug!(event = event_type, handlers = handlers.len(), "firing event");
        match self.policy {
            DispatchPolicy::Synchronous => {
                for handler in &handlers {
                    call_handler(handler, &event);
                }
            }
            DispatchPolicy::ThreadPerEvent => {
                thread::spawn(move || {
                    for handler in &handlers {
                        call_handler(handler, &event);
                    }
                });
            }
            DispatchPolicy::ThreadPerHandler => {
                for handler in handlers {
                    let event = event.clone();
                    thread::spawn(move || call_handler(&handler, &event));
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DispatchPolicy::default())
    }
}
