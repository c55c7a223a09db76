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

use crate::Context;
use crate::Criteria;
use crate::Element;
use crate::Event;
use crate::XmppError;
use crate::XmppModule;
use crate::xmpp::constants::STREAM_NS;

use super::ModuleProvider;

pub static STREAM_FEATURES: ModuleProvider = ModuleProvider {
    module_type: StreamFeaturesModule::TYPE,
    requires: &[],
    create: || Box::new(StreamFeaturesModule),
};

/// Keeps the features announced on the current stream.
#[derive(Debug, Default)]
pub struct StreamFeaturesModule;

impl StreamFeaturesModule {
    pub const TYPE: &'static str = "stream-features";
}

impl XmppModule for StreamFeaturesModule {
    fn module_type(&self) -> &'static str {
        Self::TYPE
    }

    fn criteria(&self) -> Option<Criteria> {
        Some(Criteria::name_and_xmlns("features", STREAM_NS))
    }

    fn process(&mut self, ctx: &mut Context, element: &Element) -> Result<(), XmppError> {
        debug!(
            features = ?element.children().iter().map(Element::name).collect::<Vec<_>>(),
            "stream features"
        );
        ctx.set_stream_features(element.clone());
        ctx.fire(Event::StreamFeaturesReceived(element.clone()));
        Ok(())
    }
}
