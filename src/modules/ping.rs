/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::Context;
use crate::Criteria;
use crate::Element;
use crate::ErrorCondition;
use crate::Jid;
use crate::Request;
use crate::RequestError;
use crate::XmppError;
use crate::XmppModule;
use crate::xmpp::constants::PING_NS;

use super::ModuleProvider;

pub static PING: ModuleProvider = ModuleProvider {
    module_type: PingModule::TYPE,
    requires: &[],
    create: || Box::new(PingModule),
};

/// XMPP Ping (XEP-0199).
#[derive(Debug, Default)]
pub struct PingModule;

impl PingModule {
    pub const TYPE: &'static str = PING_NS;

    /// A ping for the given entity, or for the server without one.
    pub fn stanza(to: Option<&Jid>) -> Element {
        Element::builder("iq")
            .attr("type", "get")
            .attr_opt("to", to.map(Jid::full))
            .child("ping")
            .xmlns(PING_NS)
            .build()
    }

    pub fn ping(ctx: &mut Context, to: Option<&Jid>) -> Result<Request, RequestError> {
        ctx.write(Self::stanza(to))
    }
}

impl XmppModule for PingModule {
    fn module_type(&self) -> &'static str {
        Self::TYPE
    }

    fn criteria(&self) -> Option<Criteria> {
        Some(Criteria::chain([
            Criteria::name("iq"),
            Criteria::name_and_xmlns("ping", PING_NS),
        ]))
    }

    fn features(&self) -> &'static [&'static str] {
        &[PING_NS]
    }

    fn process(&mut self, ctx: &mut Context, element: &Element) -> Result<(), XmppError> {
        match element.attribute("type") {
            Some("get") => {
                let pong = Element::builder("iq")
                    .attr("type", "result")
                    .attr_opt("id", element.attribute("id"))
                    .attr_opt("to", element.attribute("from"))
                    .build();
                ctx.write_directly(pong);
                Ok(())
            }
            Some("set") => Err(XmppError::new(ErrorCondition::BadRequest)),
            _ => Ok(()),
        }
    }
}
