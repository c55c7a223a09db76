/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use tracing::error;
use tracing::info;

use crate::Context;
use crate::Element;
use crate::Event;
use crate::Jid;
use crate::Request;
use crate::RequestResult;
use crate::Scope;
use crate::SessionState;
use crate::XmppModule;
use crate::xmpp::constants::BIND_NS;

use super::ModuleProvider;

pub static BIND: ModuleProvider = ModuleProvider {
    module_type: BindModule::TYPE,
    requires: &[],
    create: || Box::new(BindModule::new()),
};

/// Resource binding of RFC 6120 section 7.
#[derive(Debug, Default)]
pub struct BindModule {
    pending: Option<Request>,
    jid: Option<Jid>,
}

impl BindModule {
    pub const TYPE: &'static str = "bind";

    pub fn new() -> Self {
        BindModule {
            pending: None,
            jid: None,
        }
    }

    /// Full JID assigned by the server.
    pub fn bound_jid(&self) -> Option<&Jid> {
        self.jid.as_ref()
    }

    pub fn bind(&mut self, ctx: &mut Context) {
        let mut bind = Element::builder("iq")
            .attr("type", "set")
            .child("bind")
            .xmlns(BIND_NS);
        if let Some(resource) = &ctx.config().resource {
            bind = bind.child("resource").value(resource.as_str()).up();
        }
        match ctx.write(bind.build()) {
            Ok(request) => self.pending = Some(request),
            Err(err) => error!(error = %err, "cannot send bind request"),
        }
    }

    fn check_pending(&mut self, ctx: &mut Context) {
        let Some(result) = self.pending.as_ref().and_then(Request::result) else {
            return;
        };
        self.pending = None;
        let jid = match &result {
            RequestResult::Success(response) => response
                .find_child(&["iq", "bind", "jid"])
                .and_then(Element::value)
                .and_then(|jid| Jid::new(jid).ok()),
            _ => None,
        };
        match jid {
            Some(jid) => {
                info!(jid = %jid, "resource bound");
                self.jid = Some(jid.clone());
                ctx.set_bound_jid(jid.clone());
                ctx.fire(Event::Bound(jid));
            }
            None => {
                error!(result = ?result, "resource binding failed");
                ctx.set_session_state(SessionState::Failed);
                ctx.disconnect();
            }
        }
    }
}

impl XmppModule for BindModule {
    fn module_type(&self) -> &'static str {
        Self::TYPE
    }

    fn features(&self) -> &'static [&'static str] {
        &[BIND_NS]
    }

    fn on_event(&mut self, ctx: &mut Context, event: &Event) {
        match event {
            Event::BindRequested => self.bind(ctx),
            Event::ResponseReceived(_) | Event::Tick(_) => self.check_pending(ctx),
            Event::Cleared(_) if event.clears(Scope::Session) => {
                self.pending = None;
                self.jid = None;
            }
            _ => {}
        }
    }
}
