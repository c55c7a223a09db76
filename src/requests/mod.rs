/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::debug;
use tracing::warn;

pub use error::RequestError;

use crate::Element;
use crate::ErrorCondition;
use crate::IqType;
use crate::Jid;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestResult {
    Success(Element),
    Error {
        condition: ErrorCondition,
        text: Option<String>,
        element: Element,
    },
    Timeout,
}

impl RequestResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestResult::Success(_))
    }

    /// Resolves a response stanza, `None` unless its type is result or error.
    pub fn from_response(response: &Element) -> Option<RequestResult> {
        match response.attribute("type") {
            Some("result") => Some(RequestResult::Success(response.clone())),
            Some("error") => {
                let (condition, text) = ErrorCondition::from_stanza(response)
                    .unwrap_or((ErrorCondition::UndefinedCondition, None));
                Some(RequestResult::Error {
                    condition,
                    text,
                    element: response.clone(),
                })
            }
            _ => None,
        }
    }
}

type Callback = Box<dyn FnOnce(&RequestResult) + Send>;

#[derive(Default)]
struct Slot {
    result: Option<RequestResult>,
    callback: Option<Callback>,
    handled: bool,
    delivery_confirmed: bool,
}

struct Inner {
    id: String,
    jid: Option<Jid>,
    stanza: Element,
    created: Instant,
    timeout: Duration,
    slot: Mutex<Slot>,
    resolved: Condvar,
}

/// An outstanding stanza waiting for its response.
///
/// Clones share the same state. The result is delivered to the callback
/// exactly once, whether the callback is attached before or after the
/// response arrives.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

impl Request {
    pub fn new(stanza: Element, timeout: Duration, created: Instant) -> Result<Self, RequestError> {
        let id = match stanza.attribute("id") {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(RequestError::MissingId),
        };
        let jid = stanza.attribute("to").and_then(|to| Jid::new(to).ok());
        Ok(Request {
            inner: Arc::new(Inner {
                id,
                jid,
                stanza,
                created,
                timeout,
                slot: Mutex::new(Slot::default()),
                resolved: Condvar::new(),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Addressee, `None` for stanzas to the server itself.
    pub fn jid(&self) -> Option<&Jid> {
        self.inner.jid.as_ref()
    }

    pub fn stanza(&self) -> &Element {
        &self.inner.stanza
    }

    pub fn created(&self) -> Instant {
        self.inner.created
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn is_outdated(&self, now: Instant) -> bool {
        self.inner.created + self.inner.timeout <= now
    }

    /// True for iq get and set, the stanzas which time out.
    pub fn expects_response(&self) -> bool {
        let stanza = &self.inner.stanza;
        stanza.name() == "iq"
            && stanza
                .attribute("type")
                .and_then(|t| t.parse::<IqType>().ok())
                .is_some_and(|t| t.is_request())
    }

    /// Attaches the result callback.
    ///
    /// Runs it right away if the request is already resolved. Once a result
    /// has been handed out, further callbacks are ignored.
    pub fn response<F>(&self, callback: F)
    where
        F: FnOnce(&RequestResult) + Send + 'static,
    {
        let mut slot = self.inner.slot.lock();
        if slot.handled {
            warn!(id = %self.inner.id, "request result was already delivered");
            return;
        }
        match slot.result.clone() {
            Some(result) => {
                slot.handled = true;
                drop(slot);
                callback(&result);
            }
            None => {
                if slot.callback.replace(Box::new(callback)).is_some() {
                    debug!(id = %self.inner.id, "request callback replaced");
                }
            }
        }
    }

    /// Stores the result, returns false if the request was resolved before.
    pub(crate) fn resolve(&self, result: RequestResult) -> bool {
        let mut slot = self.inner.slot.lock();
        if slot.result.is_some() {
            return false;
        }
        slot.result = Some(result.clone());
        let callback = slot.callback.take();
        if callback.is_some() {
            slot.handled = true;
        }
        drop(slot);
        self.inner.resolved.notify_all();
        if let Some(callback) = callback {
            callback(&result);
        }
        true
    }

    pub fn result(&self) -> Option<RequestResult> {
        self.inner.slot.lock().result.clone()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.slot.lock().result.is_some()
    }

    /// Blocks until the request is resolved or the duration passes.
    ///
    /// Must not be called on the thread which reads the transport.
    pub fn wait_timeout(&self, duration: Duration) -> Option<RequestResult> {
        let deadline = Instant::now() + duration;
        let mut slot = self.inner.slot.lock();
        while slot.result.is_none() {
            if self.inner.resolved.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.result.clone()
    }

    /// True once stream management confirmed that the peer received it.
    pub fn is_delivery_confirmed(&self) -> bool {
        self.inner.slot.lock().delivery_confirmed
    }

    pub(crate) fn confirm_delivery(&self) {
        self.inner.slot.lock().delivery_confirmed = true;
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("jid", &self.inner.jid)
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Pending requests keyed by stanza id, with their creation sequence.
#[derive(Debug, Default)]
pub struct RequestsManager {
    requests: HashMap<String, (u64, Request)>,
    sequence: u64,
}

impl RequestsManager {
    pub fn new() -> Self {
        RequestsManager {
            requests: HashMap::new(),
            sequence: 0,
        }
    }

    /// Starts tracking a stanza. The stanza must have an id.
    pub fn create(
        &mut self,
        stanza: Element,
        timeout: Duration,
        now: Instant,
    ) -> Result<Request, RequestError> {
        let request = Request::new(stanza, timeout, now)?;
        if self.requests.contains_key(request.id()) {
            return Err(RequestError::DuplicateId(request.id().to_string()));
        }
        self.sequence += 1;
        self.requests
            .insert(request.id().to_string(), (self.sequence, request.clone()));
        Ok(request)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.requests.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Request> {
        self.requests.get(id).map(|(_, request)| request)
    }

    fn verify(request: &Request, response: &Element) -> bool {
        let from = response.attribute("from").and_then(|from| Jid::new(from).ok());
        match (request.jid(), from) {
            (None, None) => true,
            (Some(jid), Some(from)) => jid.bare_eq(&from),
            _ => false,
        }
    }

    /// Removes and returns the request answered by the element.
    ///
    /// Only result and error stanzas whose sender matches the addressee of
    /// the request count as answers.
    pub fn get_request(&mut self, response: &Element) -> Option<Request> {
        if !matches!(response.attribute("type"), Some("result" | "error")) {
            return None;
        }
        let id = response.attribute("id")?;
        let request = self.get(id)?;
        if !Self::verify(request, response) {
            warn!(
                id,
                from = response.attribute("from").unwrap_or_default(),
                "response sender does not match the request"
            );
            return None;
        }
        self.requests.remove(id).map(|(_, request)| request)
    }

    /// Resolves the request answered by the element, if any.
    pub fn find_and_execute(&mut self, response: &Element) -> bool {
        let Some(request) = self.get_request(response) else {
            return false;
        };
        if let Some(result) = RequestResult::from_response(response) {
            request.resolve(result);
        }
        true
    }

    /// Drops the overdue requests, timing out those which expect a response.
    ///
    /// Requests are handled in the order they were created.
    pub fn find_outdated(&mut self, now: Instant) -> Vec<Request> {
        let mut outdated: Vec<(u64, String)> = self
            .requests
            .values()
            .filter(|(_, request)| request.is_outdated(now))
            .map(|(sequence, request)| (*sequence, request.id().to_string()))
            .collect();
        outdated.sort_unstable();
        let mut removed = Vec::with_capacity(outdated.len());
        for (_, id) in outdated {
            if let Some((_, request)) = self.requests.remove(&id) {
                if request.expects_response() {
                    debug!(id = %id, "request timed out");
                    request.resolve(RequestResult::Timeout);
                }
                removed.push(request);
            }
        }
        removed
    }

    /// Times out every pending request.
    pub fn timeout_all(&mut self) {
        let mut pending: Vec<(u64, Request)> =
            self.requests.drain().map(|(_, entry)| entry).collect();
        pending.sort_unstable_by_key(|(sequence, _)| *sequence);
        for (_, request) in pending {
            if request.expects_response() {
                request.resolve(RequestResult::Timeout);
            }
        }
    }
}
