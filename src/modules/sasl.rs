/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Context;
use crate::Criteria;
use crate::Element;
use crate::Event;
use crate::Scope;
use crate::XmppError;
use crate::XmppModule;
use crate::xmpp::constants::SASL_NS;

use super::ModuleProvider;

pub static SASL: ModuleProvider = ModuleProvider {
    module_type: SaslModule::TYPE,
    requires: &[],
    create: || Box::new(SaslModule::new()),
};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Mechanism {
    Plain,
    Anonymous,
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::Plain => "PLAIN",
            Mechanism::Anonymous => "ANONYMOUS",
        }
    }
}

/// Mechanisms offered in the current stream features.
pub fn offered_mechanisms(features: &Element) -> Vec<&str> {
    features
        .child_ns("mechanisms", SASL_NS)
        .map(|mechanisms| {
            mechanisms
                .children_named("mechanism")
                .filter_map(Element::value)
                .collect()
        })
        .unwrap_or_default()
}

/// `authzid NUL authcid NUL password`, with an empty authzid.
fn plain_message(username: &str, password: &str) -> String {
    let mut message = Vec::with_capacity(username.len() + password.len() + 2);
    message.push(0);
    message.extend_from_slice(username.as_bytes());
    message.push(0);
    message.extend_from_slice(password.as_bytes());
    STANDARD.encode(message)
}

/// SASL authentication with PLAIN or ANONYMOUS.
#[derive(Debug, Default)]
pub struct SaslModule {
    mechanism: Option<Mechanism>,
}

impl SaslModule {
    pub const TYPE: &'static str = "sasl";

    pub fn new() -> Self {
        SaslModule { mechanism: None }
    }

    /// Mechanism of the running or finished authentication.
    pub fn mechanism(&self) -> Option<Mechanism> {
        self.mechanism
    }

    fn select(ctx: &Context) -> Option<Mechanism> {
        let offered = offered_mechanisms(ctx.stream_features()?);
        let wanted = match ctx.config().password {
            Some(_) => Mechanism::Plain,
            None => Mechanism::Anonymous,
        };
        offered
            .contains(&wanted.name())
            .then_some(wanted)
    }

    /// Sends the `<auth/>` for the best offered mechanism.
    pub fn start_auth(&mut self, ctx: &mut Context) {
        let Some(mechanism) = Self::select(ctx) else {
            warn!("no usable SASL mechanism offered");
            ctx.fire(Event::AuthFailure("invalid-mechanism".into()));
            return;
        };
        if mechanism == Mechanism::Plain && !ctx.is_secure() {
            warn!("sending the password over an unencrypted connection");
        }
        let config = ctx.config();
        let payload = match mechanism {
            Mechanism::Plain => plain_message(
                config.jid.localpart().unwrap_or_default(),
                config.password.as_deref().unwrap_or_default(),
            ),
            Mechanism::Anonymous => "=".to_string(),
        };
        let auth = Element::builder("auth")
            .xmlns(SASL_NS)
            .attr("mechanism", mechanism.name())
            .value(payload)
            .build();
        debug!(mechanism = mechanism.name(), "authenticating");
        self.mechanism = Some(mechanism);
        ctx.write_directly(auth);
    }
}

impl XmppModule for SaslModule {
    fn module_type(&self) -> &'static str {
        Self::TYPE
    }

    fn criteria(&self) -> Option<Criteria> {
        Some(Criteria::xmlns(SASL_NS))
    }

    fn process(&mut self, ctx: &mut Context, element: &Element) -> Result<(), XmppError> {
        match element.name() {
            "success" => {
                info!(jid = %ctx.config().jid, "authenticated");
                ctx.set_authenticated(true);
                ctx.fire(Event::AuthSuccess);
            }
            "failure" => {
                let condition = element
                    .children()
                    .iter()
                    .find(|child| child.name() != "text")
                    .map_or("not-authorized", Element::name);
                warn!(condition, "authentication failed");
                ctx.fire(Event::AuthFailure(condition.to_string()));
            }
            "challenge" => {
                // neither mechanism expects a challenge
                ctx.write_directly(Element::builder("abort").xmlns(SASL_NS).build());
            }
            other => debug!(element = other, "ignoring SASL element"),
        }
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context, event: &Event) {
        match event {
            Event::AuthRequested => self.start_auth(ctx),
            Event::Cleared(_) if event.clears(Scope::Connection) => self.mechanism = None,
            _ => {}
        }
    }
}
