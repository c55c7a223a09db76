/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod config;
mod context;
mod error;
mod state;
mod transport;

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

pub use config::Config;
pub use config::ConfigBuilder;
pub(crate) use context::Action;
pub use context::Context;
pub use error::ClientError;
pub use error::ConfigError;
pub use error::TransportError;
pub use state::ConnectorState;
pub use state::Scope;
pub use state::SessionState;
pub use transport::MemoryTransport;
pub use transport::TcpTransport;
pub use transport::Transport;

use crate::DispatchPolicy;
use crate::Dispatched;
use crate::Element;
use crate::ErrorCondition;
use crate::Event;
use crate::EventBus;
use crate::Jid;
use crate::ModuleProvider;
use crate::ModulesManager;
use crate::Request;
use crate::STREAM_MANAGEMENT;
use crate::StreamElement;
use crate::StreamParser;
use crate::XmppError;
use crate::XmppModule;
use crate::is_stanza;
use crate::modules::BIND;
use crate::modules::PING;
use crate::modules::PingModule;
use crate::modules::SASL;
use crate::modules::SESSION_CONTROLLER;
use crate::modules::STREAM_ERROR;
use crate::modules::STREAM_FEATURES;
use crate::xmpp::constants::CLIENT_NS;
use crate::xmpp::constants::STREAM_NS;
use crate::xmpp::constants::STREAMS_NS;

const READ_BUFFER_SIZE: usize = 4096;

const STREAM_END: &str = "</stream:stream>";

/// Opening of the client stream.
pub fn stream_header(config: &Config) -> String {
    format!(
        "<?xml version='1.0'?><stream:stream xmlns='{CLIENT_NS}' xmlns:stream='{STREAM_NS}' \
         version='1.0' xml:lang='en' from='{}' to='{}'>",
        config.jid.bare(),
        config.jid.domainpart(),
    )
}

fn stream_error(condition: &str) -> Element {
    Element::builder("stream:error")
        .child(condition)
        .xmlns(STREAMS_NS)
        .build()
}

/// Providers installed by `ClientBuilder` unless asked otherwise.
pub fn default_providers() -> Vec<&'static ModuleProvider> {
    vec![
        &SESSION_CONTROLLER,
        &STREAM_FEATURES,
        &SASL,
        &BIND,
        &STREAM_MANAGEMENT,
        &PING,
        &STREAM_ERROR,
    ]
}

pub struct ClientBuilder<T: Transport> {
    config: Config,
    transport: T,
    providers: Vec<&'static ModuleProvider>,
    modules: Vec<Box<dyn XmppModule>>,
    policy: DispatchPolicy,
}

impl<T: Transport> ClientBuilder<T> {
    pub fn new(config: Config, transport: T) -> Self {
        ClientBuilder {
            config,
            transport,
            providers: default_providers(),
            modules: Vec::new(),
            policy: DispatchPolicy::default(),
        }
    }

    /// Adds a provider, its requirements are installed before it.
    pub fn provider(mut self, provider: &'static ModuleProvider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Adds an already constructed module after the providers.
    pub fn module(mut self, module: Box<dyn XmppModule>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn without_default_modules(mut self) -> Self {
        self.providers.clear();
        self
    }

    pub fn build(self) -> Result<Client<T>, ClientError> {
        let mut ctx = Context::new(self.config);
        let mut modules = ModulesManager::new();
        modules.register_providers(&self.providers)?;
        for module in self.modules {
            modules.register(module)?;
        }
        modules.init_modules(&mut ctx)?;
        debug!(
            modules = ?modules.module_types().collect::<Vec<_>>(),
            "client modules ready"
        );
        Ok(Client {
            transport: self.transport,
            parser: StreamParser::new(),
            modules,
            ctx,
            events: Arc::new(EventBus::new(self.policy)),
            connector_state: ConnectorState::Disconnected,
            last_tick: Instant::now(),
            stream_generation: 0,
        })
    }
}

/// XMPP client engine.
///
/// The client is driven by its owner: `poll` reads from the transport and
/// dispatches whatever arrived, `tick` runs timers. Modules talk back through
/// the `Context` and the client carries out their actions in order.
pub struct Client<T: Transport> {
    transport: T,
    parser: StreamParser,
    modules: ModulesManager,
    ctx: Context,
    events: Arc<EventBus>,
    connector_state: ConnectorState,
    last_tick: Instant,
    // bumped on every stream restart
    stream_generation: u64,
}

impl<T: Transport> Client<T> {
    pub fn builder(config: Config, transport: T) -> ClientBuilder<T> {
        ClientBuilder::new(config, transport)
    }

    /// Bus receiving every engine event, for application handlers.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn config(&self) -> &Config {
        self.ctx.config()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn module<M: XmppModule + 'static>(&self) -> Option<&M> {
        self.modules.get::<M>()
    }

    pub fn module_mut<M: XmppModule + 'static>(&mut self) -> Option<&mut M> {
        self.modules.get_mut::<M>()
    }

    pub fn connector_state(&self) -> ConnectorState {
        self.connector_state
    }

    pub fn session_state(&self) -> SessionState {
        self.ctx.session_state()
    }

    pub fn is_connected(&self) -> bool {
        self.connector_state == ConnectorState::Connected
    }

    /// Opens the transport and starts the stream.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        if self.connector_state != ConnectorState::Disconnected {
            warn!(state = %self.connector_state, "connect called while not disconnected");
            return Ok(());
        }
        info!(host = self.ctx.config().host(), "connecting");
        self.set_connector_state(ConnectorState::Connecting);
        if let Err(err) = self.transport.connect(self.ctx.config()) {
            error!(error = %err, "connection failed");
            self.set_connector_state(ConnectorState::Disconnected);
            self.run_actions()?;
            return Err(err.into());
        }
        self.parser.reset();
        self.last_tick = Instant::now();
        self.set_connector_state(ConnectorState::Connected);
        self.send_header()?;
        self.run_actions()
    }

    /// Closes the stream and ends the session.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        info!("disconnecting");
        self.close_connection();
        self.ctx.clear(Scope::STOP);
        self.run_actions()
    }

    /// Sends a stanza and tracks its response.
    pub fn write(&mut self, element: Element) -> Result<Request, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let request = self.ctx.write(element)?;
        self.run_actions()?;
        Ok(request)
    }

    /// Sends an element without response tracking.
    pub fn write_directly(&mut self, element: Element) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.ctx.write_directly(element);
        self.run_actions()
    }

    /// Pings an entity, or the server without one.
    pub fn ping(&mut self, to: Option<&Jid>) -> Result<Request, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let request = PingModule::ping(&mut self.ctx, to)?;
        self.run_actions()?;
        Ok(request)
    }

    /// Reads once from the transport and handles the data, ticking when the
    /// tick interval elapsed. Returns false once the connection is gone.
    pub fn poll(&mut self) -> Result<bool, ClientError> {
        if !self.is_connected() {
            return Ok(false);
        }
        let mut buffer = [0; READ_BUFFER_SIZE];
        match self.transport.receive(&mut buffer) {
            Ok(None) => {
                info!("connection closed by the server");
                self.connection_lost();
                self.run_actions()?;
                return Ok(false);
            }
            Ok(Some(0)) => (),
            Ok(Some(count)) => self.receive_bytes(&buffer[..count])?,
            Err(err) => {
                error!(error = %err, "receive failed");
                self.connection_lost();
                self.run_actions()?;
                return Err(err.into());
            }
        }
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= self.ctx.config().tick_interval() {
            self.tick(now)?;
        }
        Ok(self.is_connected())
    }

    /// Polls until the connection is closed.
    pub fn run(&mut self) -> Result<(), ClientError> {
        while self.poll()? {}
        Ok(())
    }

    /// Times out overdue requests and lets modules run periodic work.
    pub fn tick(&mut self, now: Instant) -> Result<(), ClientError> {
        self.last_tick = now;
        for request in self.ctx.requests_mut().find_outdated(now) {
            debug!(id = request.id(), "request timed out");
        }
        self.dispatch_event(Event::Tick(now));
        self.run_actions()
    }

    /// Feeds raw stream data, as read from the transport.
    pub fn receive_bytes(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        trace!(bytes = %String::from_utf8_lossy(bytes), "Received bytes");
        let mut items: Vec<StreamElement> = Vec::new();
        let parsed = self.parser.parse_bytes(&mut items, bytes);
        let generation = self.stream_generation;
        for item in items {
            if self.stream_generation != generation {
                warn!("discarding data read before the stream restart");
                return Ok(());
            }
            self.handle_stream_element(item);
            self.run_actions()?;
        }
        if self.stream_generation != generation {
            return Ok(());
        }
        if let Err(err) = parsed {
            error!(error = %err, "stream parse error");
            self.dispatch_event(Event::ParseError(err.to_string()));
            if self.is_connected() {
                self.ctx.write_directly(stream_error("bad-format"));
                self.ctx.disconnect();
            }
            self.run_actions()?;
            return Err(err.into());
        }
        Ok(())
    }

    fn handle_stream_element(&mut self, item: StreamElement) {
        match item {
            StreamElement::Start(attributes) => {
                debug!(?attributes, "stream started");
                self.dispatch_event(Event::StreamStarted(attributes));
            }
            StreamElement::Element(element) => self.handle_element(element),
            StreamElement::End => {
                info!("server closed the stream");
                self.dispatch_event(Event::StreamClosed);
                self.ctx.disconnect();
            }
        }
    }

    fn handle_element(&mut self, element: Element) {
        self.dispatch_event(Event::ElementReceived(element.clone()));
        let Some(element) = self.modules.after_receive(&mut self.ctx, element) else {
            return;
        };
        if self.ctx.requests_mut().find_and_execute(&element) {
            self.dispatch_event(Event::ResponseReceived(element));
            return;
        }
        match self.modules.process(&mut self.ctx, &element) {
            Dispatched::Handled => (),
            Dispatched::Failed(err) => {
                if is_stanza(&element) && element.attribute("type") != Some("error") {
                    self.ctx.write_directly(err.to_reply(&element));
                }
            }
            Dispatched::Unhandled => self.unsupported(&element),
        }
    }

    fn unsupported(&mut self, element: &Element) {
        if !is_stanza(element) {
            warn!(
                element = element.name(),
                xmlns = element.xmlns().unwrap_or_default(),
                "unsupported stream element"
            );
            self.ctx.write_directly(stream_error("unsupported-stanza-type"));
            self.ctx.disconnect();
            return;
        }
        let kind = element.attribute("type");
        let answerable = match element.name() {
            "iq" => matches!(kind, Some("get") | Some("set")),
            _ => kind != Some("error"),
        };
        if answerable {
            debug!(element = element.name(), id = element.attribute("id"), "unsupported stanza");
            let err = XmppError::new(ErrorCondition::FeatureNotImplemented);
            self.ctx.write_directly(err.to_reply(element));
        } else {
            debug!(element = element.name(), id = element.attribute("id"), "ignoring stanza");
        }
    }

    fn dispatch_event(&mut self, event: Event) {
        self.ctx.on_event(&event);
        self.modules.on_event(&mut self.ctx, &event);
        self.events.fire(event);
    }

    fn set_connector_state(&mut self, new: ConnectorState) {
        let old = std::mem::replace(&mut self.connector_state, new);
        if old != new {
            debug!(%old, %new, "connector state changed");
            self.dispatch_event(Event::ConnectorStateChanged { old, new });
        }
    }

    fn run_actions(&mut self) -> Result<(), ClientError> {
        let mut result = Ok(());
        while let Some(action) = self.ctx.next_action() {
            if let Err(err) = self.run_action(action) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    fn run_action(&mut self, action: Action) -> Result<(), ClientError> {
        match action {
            Action::Send(element) => self.send_element(element)?,
            Action::Replay(element) => self.replay_element(element)?,
            Action::Fire(event) => self.dispatch_event(event),
            Action::Clear(scopes) => {
                debug!(?scopes, "clearing");
                self.dispatch_event(Event::Cleared(scopes));
            }
            Action::StartTls => self.start_tls()?,
            Action::RestartStream => self.restart_stream()?,
            Action::SetSessionState(new) => {
                let old = self.ctx.update_session_state(new);
                if old != new {
                    info!(%old, %new, "session state changed");
                    self.dispatch_event(Event::SessionStateChanged { old, new });
                }
            }
            Action::Disconnect => {
                if self.close_connection() {
                    self.ctx.clear(Scope::DISCONNECT);
                }
            }
        }
        Ok(())
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        trace!(bytes = %String::from_utf8_lossy(bytes), "Sending bytes");
        if let Err(err) = self.transport.send(bytes) {
            error!(error = %err, "send failed");
            self.connection_lost();
            return Err(err.into());
        }
        Ok(())
    }

    fn send_element(&mut self, element: Element) -> Result<(), ClientError> {
        if !self.is_connected() {
            warn!(element = element.name(), "not connected, dropping element");
            return Ok(());
        }
        let element = self.modules.before_send(&mut self.ctx, element);
        self.send_bytes(element.to_string().as_bytes())?;
        self.dispatch_event(Event::ElementSent(element));
        Ok(())
    }

    /// Interceptors and `ElementSent` already ran for the first send.
    fn replay_element(&mut self, element: Element) -> Result<(), ClientError> {
        if !self.is_connected() {
            warn!(element = element.name(), "not connected, dropping replay");
            return Ok(());
        }
        trace!(element = element.name(), id = element.attribute("id"), "replaying");
        self.send_bytes(element.to_string().as_bytes())
    }

    fn send_header(&mut self) -> Result<(), ClientError> {
        let header = stream_header(self.ctx.config());
        self.send_bytes(header.as_bytes())
    }

    fn restart_stream(&mut self) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Ok(());
        }
        debug!("restarting the stream");
        self.stream_generation += 1;
        self.dispatch_event(Event::Cleared(Scope::NEW_STREAM.to_vec()));
        self.parser.reset();
        self.send_header()
    }

    fn start_tls(&mut self) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Ok(());
        }
        let domain = self.ctx.config().jid.domainpart().to_string();
        debug!(domain = %domain, "starting TLS");
        if let Err(err) = self.transport.start_tls(&domain) {
            error!(error = %err, "TLS negotiation failed");
            self.ctx.set_session_state(SessionState::Failed);
            self.connection_lost();
            return Err(err.into());
        }
        self.ctx.set_secure(self.transport.is_secure());
        self.restart_stream()
    }

    /// Closes the stream and the transport, false if already closed.
    fn close_connection(&mut self) -> bool {
        if self.connector_state != ConnectorState::Connected {
            return false;
        }
        self.set_connector_state(ConnectorState::Disconnecting);
        trace!(bytes = STREAM_END, "Sending bytes");
        if let Err(err) = self.transport.send(STREAM_END.as_bytes()) {
            debug!(error = %err, "cannot close the stream");
        }
        self.transport.close();
        self.set_connector_state(ConnectorState::Disconnected);
        true
    }

    /// The transport went away without a stream close.
    fn connection_lost(&mut self) {
        if self.connector_state == ConnectorState::Disconnected {
            return;
        }
        warn!("connection lost");
        self.transport.close();
        self.set_connector_state(ConnectorState::Disconnected);
        self.ctx.clear(Scope::DISCONNECT);
    }
}

#[cfg(test)]
mod tests;
