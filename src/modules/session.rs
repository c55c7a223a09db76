/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use tracing::debug;
use tracing::error;
use tracing::info;

use crate::ConnectorState;
use crate::Context;
use crate::Criteria;
use crate::Element;
use crate::Event;
use crate::ModuleError;
use crate::ModuleLookup;
use crate::Scope;
use crate::SessionState;
use crate::XmppError;
use crate::XmppModule;
use crate::xmpp::constants::BIND_NS;
use crate::xmpp::constants::SASL_NS;
use crate::xmpp::constants::SM_NS;
use crate::xmpp::constants::TLS_NS;

use super::BIND;
use super::ModuleProvider;
use super::SASL;
use super::STREAM_FEATURES;

pub static SESSION_CONTROLLER: ModuleProvider = ModuleProvider {
    module_type: SessionController::TYPE,
    requires: &[&STREAM_FEATURES, &SASL, &BIND],
    create: || Box::new(SessionController::new()),
};

/// Drives stream negotiation: STARTTLS, authentication, binding or
/// resumption, in the order the server offers them.
#[derive(Debug, Default)]
pub struct SessionController {
    resuming: bool,
}

impl SessionController {
    pub const TYPE: &'static str = "session-controller";

    pub fn new() -> Self {
        SessionController { resuming: false }
    }

    fn fail(ctx: &mut Context, reason: &str) {
        error!(reason, "session negotiation failed");
        ctx.set_session_state(SessionState::Failed);
        ctx.disconnect();
    }

    fn on_features(&mut self, ctx: &mut Context) {
        let use_tls = ctx.config().use_tls;
        let resumption = ctx.config().resumption;
        if !ctx.is_secure() && use_tls && ctx.has_feature("starttls", TLS_NS) {
            debug!("requesting STARTTLS");
            ctx.write_directly(Element::builder("starttls").xmlns(TLS_NS).build());
        } else if !ctx.is_authenticated() && ctx.has_feature("mechanisms", SASL_NS) {
            ctx.fire(Event::AuthRequested);
        } else if resumption
            && ctx.resumption_id().is_some()
            && ctx.has_feature("sm", SM_NS)
        {
            debug!("resuming the previous session");
            self.resuming = true;
            ctx.fire(Event::ResumeRequested);
        } else if ctx.has_feature("bind", BIND_NS) {
            ctx.fire(Event::BindRequested);
        } else if !ctx.is_authenticated() {
            Self::fail(ctx, "server offers no authentication");
        }
    }
}

impl XmppModule for SessionController {
    fn module_type(&self) -> &'static str {
        Self::TYPE
    }

    fn criteria(&self) -> Option<Criteria> {
        Some(Criteria::xmlns(TLS_NS))
    }

    fn initialize(
        &mut self,
        _ctx: &mut Context,
        modules: &ModuleLookup<'_>,
    ) -> Result<(), ModuleError> {
        for provider in SESSION_CONTROLLER.requires {
            modules.require(provider.module_type)?;
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut Context, element: &Element) -> Result<(), XmppError> {
        match element.name() {
            "proceed" => ctx.start_tls(),
            "failure" => Self::fail(ctx, "STARTTLS refused"),
            other => debug!(element = other, "ignoring TLS element"),
        }
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context, event: &Event) {
        match event {
            Event::ConnectorStateChanged {
                new: ConnectorState::Connected,
                ..
            } => ctx.set_session_state(SessionState::Negotiating),
            Event::StreamFeaturesReceived(_) => self.on_features(ctx),
            Event::AuthSuccess => ctx.restart_stream(),
            Event::AuthFailure(condition) => Self::fail(ctx, condition),
            Event::Bound(_) | Event::StreamResumed { .. } => {
                self.resuming = false;
                info!("session established");
                ctx.set_session_state(SessionState::Established);
            }
            Event::StreamManagementFailed(_) if self.resuming => {
                debug!("resumption failed, binding a new session");
                self.resuming = false;
                ctx.fire(Event::BindRequested);
            }
            Event::Cleared(_) if event.clears(Scope::Session) => {
                self.resuming = false;
                ctx.set_session_state(SessionState::Stopped);
            }
            Event::Cleared(_) if event.clears(Scope::Connection) => {
                self.resuming = false;
                if ctx.session_state() == SessionState::Established {
                    ctx.set_session_state(SessionState::Interrupted);
                }
            }
            _ => {}
        }
    }
}
