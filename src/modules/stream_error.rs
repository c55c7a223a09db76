/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use tracing::warn;

use crate::Context;
use crate::Criteria;
use crate::Element;
use crate::Event;
use crate::XmppError;
use crate::XmppModule;
use crate::xmpp::constants::STREAM_NS;
use crate::xmpp::constants::STREAMS_NS;

use super::ModuleProvider;

pub static STREAM_ERROR: ModuleProvider = ModuleProvider {
    module_type: StreamErrorModule::TYPE,
    requires: &[],
    create: || Box::new(StreamErrorModule),
};

/// Reports `<stream:error/>` and closes the connection.
#[derive(Debug, Default)]
pub struct StreamErrorModule;

impl StreamErrorModule {
    pub const TYPE: &'static str = "stream-error";

    /// Name of the defined condition, `undefined-condition` if missing.
    pub fn condition(error: &Element) -> &str {
        error
            .children()
            .iter()
            .find(|child| child.xmlns() == Some(STREAMS_NS) && child.name() != "text")
            .map_or("undefined-condition", Element::name)
    }
}

impl XmppModule for StreamErrorModule {
    fn module_type(&self) -> &'static str {
        Self::TYPE
    }

    fn criteria(&self) -> Option<Criteria> {
        Some(Criteria::name_and_xmlns("error", STREAM_NS))
    }

    fn process(&mut self, ctx: &mut Context, element: &Element) -> Result<(), XmppError> {
        let condition = Self::condition(element);
        let text = element
            .child_ns("text", STREAMS_NS)
            .and_then(Element::value)
            .unwrap_or_default();
        warn!(condition, text, "stream error");
        ctx.fire(Event::StreamError(condition.to_string()));
        ctx.disconnect();
        Ok(())
    }
}
