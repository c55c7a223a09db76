/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::VecDeque;
use std::time::Instant;

use tracing::debug;

use crate::Element;
use crate::Event;
use crate::IdGenerator;
use crate::Jid;
use crate::Request;
use crate::RequestError;
use crate::RequestsManager;
use crate::Scope;
use crate::SessionState;

use super::Config;

/// Work queued by modules, carried out by the client in order.
#[derive(Debug)]
pub(crate) enum Action {
    Send(Element),
    /// Resend after resumption, already counted and queued.
    Replay(Element),
    Fire(Event),
    Clear(Vec<Scope>),
    StartTls,
    RestartStream,
    SetSessionState(SessionState),
    Disconnect,
}

/// What modules see of the client.
///
/// Writes, events and state changes are queued here and carried out by the
/// client once the current step finishes, so they keep their order.
pub struct Context {
    config: Config,
    ids: IdGenerator,
    requests: RequestsManager,
    actions: VecDeque<Action>,
    session_state: SessionState,
    secure: bool,
    // stream scope
    features: Option<Element>,
    // connection scope
    authenticated: bool,
    // session scope
    bound_jid: Option<Jid>,
    resumption_id: Option<String>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Context {
            config,
            ids: IdGenerator::new(),
            requests: RequestsManager::new(),
            actions: VecDeque::new(),
            session_state: SessionState::Stopped,
            secure: false,
            features: None,
            authenticated: false,
            bound_jid: None,
            resumption_id: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn next_id(&mut self) -> String {
        self.ids.next_id()
    }

    pub fn requests(&self) -> &RequestsManager {
        &self.requests
    }

    pub fn requests_mut(&mut self) -> &mut RequestsManager {
        &mut self.requests
    }

    /// Queues a stanza and starts tracking its response.
    ///
    /// An id is generated if the stanza has none.
    pub fn write(&mut self, mut element: Element) -> Result<Request, RequestError> {
        if element.attribute("id").is_none_or(str::is_empty) {
            element.set_attribute("id", self.ids.next_id());
        }
        let timeout = self.config.request_timeout();
        let request = self.requests.create(element.clone(), timeout, Instant::now())?;
        self.actions.push_back(Action::Send(element));
        Ok(request)
    }

    /// Queues an element without tracking a response.
    pub fn write_directly(&mut self, element: Element) {
        self.actions.push_back(Action::Send(element));
    }

    /// Writes an element again without the usual send side effects.
    pub(crate) fn replay(&mut self, element: Element) {
        self.actions.push_back(Action::Replay(element));
    }

    pub fn fire(&mut self, event: Event) {
        self.actions.push_back(Action::Fire(event));
    }

    /// Asks every scoped state holder to forget the given scopes.
    pub fn clear(&mut self, scopes: &[Scope]) {
        self.actions.push_back(Action::Clear(scopes.to_vec()));
    }

    pub fn start_tls(&mut self) {
        self.actions.push_back(Action::StartTls);
    }

    /// Opens a new stream on the current connection.
    pub fn restart_stream(&mut self) {
        self.actions.push_back(Action::RestartStream);
    }

    pub fn disconnect(&mut self) {
        self.actions.push_back(Action::Disconnect);
    }

    pub fn set_session_state(&mut self, state: SessionState) {
        self.actions.push_back(Action::SetSessionState(state));
    }

    pub(crate) fn next_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub fn session_state(&self) -> SessionState {
        self.session_state
    }

    pub(crate) fn update_session_state(&mut self, state: SessionState) -> SessionState {
        std::mem::replace(&mut self.session_state, state)
    }

    /// True once the transport runs over TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub(crate) fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    /// Last stream features of the current stream.
    pub fn stream_features(&self) -> Option<&Element> {
        self.features.as_ref()
    }

    pub fn set_stream_features(&mut self, features: Element) {
        self.features = Some(features);
    }

    /// True if the current features advertise the given child.
    pub fn has_feature(&self, name: &str, xmlns: &str) -> bool {
        self.features
            .as_ref()
            .is_some_and(|features| features.child_ns(name, xmlns).is_some())
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    pub fn bound_jid(&self) -> Option<&Jid> {
        self.bound_jid.as_ref()
    }

    pub fn set_bound_jid(&mut self, jid: Jid) {
        self.bound_jid = Some(jid);
    }

    /// Id of a resumable stream management session.
    pub fn resumption_id(&self) -> Option<&str> {
        self.resumption_id.as_deref()
    }

    pub fn set_resumption_id(&mut self, id: Option<String>) {
        self.resumption_id = id;
    }

    /// Forgets the data of the cleared scopes.
    pub(crate) fn on_event(&mut self, event: &Event) {
        if event.clears(Scope::Stream) {
            self.features = None;
        }
        if event.clears(Scope::Connection) {
            self.authenticated = false;
            self.secure = false;
        }
        if event.clears(Scope::Session) {
            debug!(pending = self.requests.len(), "clearing session");
            self.bound_jid = None;
            self.resumption_id = None;
            self.requests.timeout_all();
        }
    }
}
