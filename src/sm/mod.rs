/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Stream management (XEP-0198): acknowledgements and session resumption.

use std::collections::VecDeque;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Context;
use crate::Criteria;
use crate::Element;
use crate::ErrorCondition;
use crate::Event;
use crate::ModuleError;
use crate::ModuleLookup;
use crate::ModuleProvider;
use crate::Request;
use crate::Scope;
use crate::XmppError;
use crate::XmppModule;
use crate::modules::STREAM_FEATURES;
use crate::xmpp::constants::SASL_NS;
use crate::xmpp::constants::SM_NS;
use crate::xmpp::constants::STANZAS_NS;
use crate::xmpp::constants::STREAM_NS;
use crate::xmpp::constants::TLS_NS;

pub static STREAM_MANAGEMENT: ModuleProvider = ModuleProvider {
    module_type: StreamManagementModule::TYPE,
    requires: &[&STREAM_FEATURES],
    create: || Box::new(StreamManagementModule::new()),
};

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum SmState {
    /// Acknowledgements are not negotiated.
    #[default]
    Inactive,
    /// `<enable/>` is sent, waiting for `<enabled/>`.
    Negotiating,
    Active,
    /// The transport dropped, `<resume/>` is pending or about to be sent.
    AwaitingResume,
}

/// True if the element is counted by the acknowledgement counters.
///
/// Stream management elements and stream negotiation (features, errors,
/// STARTTLS, SASL) are not counted. Outbound stream elements keep their
/// `stream:` prefix instead of a namespace.
pub fn is_countable(element: &Element) -> bool {
    if element.name().starts_with("stream:") {
        return false;
    }
    !matches!(
        element.xmlns(),
        Some(SM_NS) | Some(STREAM_NS) | Some(TLS_NS) | Some(SASL_NS)
    )
}

fn parse_counter(element: &Element) -> Option<u64> {
    element.attribute("h").and_then(|h| h.parse().ok())
}

fn is_true(value: Option<&str>) -> bool {
    matches!(value, Some("true") | Some("1"))
}

pub struct StreamManagementModule {
    state: SmState,
    outgoing: u64,
    incoming: u64,
    acknowledged: u64,
    ack_requested: bool,
    queue: VecDeque<(Element, Option<Request>)>,
    resumption_id: Option<String>,
    max: Option<u64>,
}

impl StreamManagementModule {
    pub const TYPE: &'static str = "urn:xmpp:sm:3";

    pub fn new() -> Self {
        StreamManagementModule {
            state: SmState::Inactive,
            outgoing: 0,
            incoming: 0,
            acknowledged: 0,
            ack_requested: false,
            queue: VecDeque::new(),
            resumption_id: None,
            max: None,
        }
    }

    pub fn state(&self) -> SmState {
        self.state
    }

    pub fn outgoing_count(&self) -> u64 {
        self.outgoing
    }

    pub fn incoming_count(&self) -> u64 {
        self.incoming
    }

    /// Outgoing count last confirmed by the server.
    pub fn acknowledged_count(&self) -> u64 {
        self.acknowledged
    }

    /// Elements sent but not acknowledged yet, oldest first.
    pub fn unacknowledged(&self) -> impl Iterator<Item = &Element> {
        self.queue.iter().map(|(element, _)| element)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn resumption_id(&self) -> Option<&str> {
        self.resumption_id.as_deref()
    }

    /// Maximum resumption time the server offered, in seconds.
    pub fn max_resumption_time(&self) -> Option<u64> {
        self.max
    }

    fn reset(&mut self, ctx: &mut Context) {
        self.state = SmState::Inactive;
        self.outgoing = 0;
        self.incoming = 0;
        self.acknowledged = 0;
        self.ack_requested = false;
        self.queue.clear();
        self.resumption_id = None;
        self.max = None;
        ctx.set_resumption_id(None);
    }

    /// Sends `<enable/>`, counting starts from zero.
    pub fn enable(&mut self, ctx: &mut Context) {
        self.reset(ctx);
        let mut enable = Element::builder("enable").xmlns(SM_NS);
        if ctx.config().resumption {
            enable = enable.attr("resume", "true");
        }
        ctx.write_directly(enable.build());
        self.state = SmState::Negotiating;
        debug!("stream management requested");
    }

    /// Sends `<resume/>` for the interrupted session, if there is one.
    pub fn resume(&mut self, ctx: &mut Context) -> bool {
        let Some(previd) = self.resumption_id.clone() else {
            return false;
        };
        ctx.write_directly(
            Element::builder("resume")
                .xmlns(SM_NS)
                .attr("h", self.incoming.to_string())
                .attr("previd", previd)
                .build(),
        );
        self.state = SmState::AwaitingResume;
        debug!(h = self.incoming, "stream resumption requested");
        true
    }

    /// Sends `<r/>` if acknowledgements are active.
    pub fn request_ack(&mut self, ctx: &mut Context) {
        if self.state == SmState::Active {
            ctx.write_directly(Element::builder("r").xmlns(SM_NS).build());
            self.ack_requested = true;
        }
    }

    fn on_sent(&mut self, ctx: &Context, element: &Element) {
        if !matches!(self.state, SmState::Negotiating | SmState::Active) || !is_countable(element)
        {
            return;
        }
        self.outgoing += 1;
        let request = element
            .attribute("id")
            .and_then(|id| ctx.requests().get(id))
            .cloned();
        self.queue.push_back((element.clone(), request));
    }

    fn on_received(&mut self, element: &Element) {
        if self.state == SmState::Active && is_countable(element) {
            self.incoming += 1;
        }
    }

    /// Drops the elements covered by the peer's count.
    fn acknowledge(&mut self, h: u64) -> bool {
        if h > self.outgoing {
            warn!(
                h,
                sent = self.outgoing,
                "acknowledged more stanzas than sent, ignoring"
            );
            return false;
        }
        if h < self.acknowledged {
            debug!(h, acknowledged = self.acknowledged, "stale acknowledgement");
            return false;
        }
        let remaining = (self.outgoing - h) as usize;
        while self.queue.len() > remaining {
            if let Some((_, Some(request))) = self.queue.pop_front() {
                request.confirm_delivery();
            }
        }
        self.acknowledged = h;
        true
    }

    fn on_enabled(&mut self, ctx: &mut Context, enabled: &Element) {
        let resume = is_true(enabled.attribute("resume"));
        let id = enabled.attribute("id").map(str::to_string);
        self.state = SmState::Active;
        self.max = enabled.attribute("max").and_then(|max| max.parse().ok());
        self.resumption_id = if resume { id.clone() } else { None };
        ctx.set_resumption_id(self.resumption_id.clone());
        info!(resume, "stream management enabled");
        ctx.fire(Event::StreamManagementEnabled {
            id,
            resume,
            max: self.max,
        });
    }

    fn on_resumed(&mut self, ctx: &mut Context, resumed: &Element) {
        let h = parse_counter(resumed).unwrap_or(self.acknowledged);
        let h = if h > self.outgoing {
            warn!(h, sent = self.outgoing, "resumed with a count above the sent stanzas");
            self.outgoing
        } else {
            h
        };
        self.acknowledge(h);
        let pending = std::mem::take(&mut self.queue);
        self.outgoing = h;
        self.acknowledged = h;
        self.ack_requested = false;
        self.state = SmState::Active;
        info!(h, replayed = pending.len(), "stream resumed");
        for (element, request) in pending {
            self.outgoing += 1;
            ctx.replay(element.clone());
            self.queue.push_back((element, request));
        }
        ctx.fire(Event::StreamResumed {
            h,
            previd: resumed
                .attribute("previd")
                .map(str::to_string)
                .unwrap_or_default(),
        });
    }

    fn on_failed(&mut self, ctx: &mut Context, failed: &Element) {
        let condition = failed
            .children()
            .iter()
            .find(|child| child.xmlns() == Some(STANZAS_NS))
            .map_or(ErrorCondition::UndefinedCondition, |child| {
                ErrorCondition::from_element_name(child.name())
            });
        warn!(%condition, state = ?self.state, "stream management failed");
        self.reset(ctx);
        ctx.fire(Event::StreamManagementFailed(condition));
    }
}

impl Default for StreamManagementModule {
    fn default() -> Self {
        Self::new()
    }
}

impl XmppModule for StreamManagementModule {
    fn module_type(&self) -> &'static str {
        Self::TYPE
    }

    fn criteria(&self) -> Option<Criteria> {
        Some(Criteria::xmlns(SM_NS))
    }

    fn features(&self) -> &'static [&'static str] {
        &[SM_NS]
    }

    fn initialize(
        &mut self,
        _ctx: &mut Context,
        modules: &ModuleLookup<'_>,
    ) -> Result<(), ModuleError> {
        modules.require(STREAM_FEATURES.module_type)
    }

    fn process(&mut self, ctx: &mut Context, element: &Element) -> Result<(), XmppError> {
        match element.name() {
            "enabled" => self.on_enabled(ctx, element),
            "a" => {
                let Some(h) = parse_counter(element) else {
                    warn!("acknowledgement without a count");
                    return Ok(());
                };
                self.ack_requested = false;
                self.acknowledge(h);
            }
            "r" => ctx.write_directly(
                Element::builder("a")
                    .xmlns(SM_NS)
                    .attr("h", self.incoming.to_string())
                    .build(),
            ),
            "resumed" => self.on_resumed(ctx, element),
            "failed" => self.on_failed(ctx, element),
            other => debug!(element = other, "ignoring stream management element"),
        }
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context, event: &Event) {
        match event {
            Event::ElementSent(element) => self.on_sent(ctx, element),
            Event::ElementReceived(element) => self.on_received(element),
            Event::Bound(_) => {
                if ctx.config().stream_management && ctx.has_feature("sm", SM_NS) {
                    self.enable(ctx);
                }
            }
            Event::ResumeRequested => {
                if !self.resume(ctx) {
                    ctx.fire(Event::StreamManagementFailed(ErrorCondition::ItemNotFound));
                }
            }
            Event::Tick(_) => {
                if !self.ack_requested && self.outgoing > self.acknowledged {
                    self.request_ack(ctx);
                }
            }
            Event::Cleared(_) if event.clears(Scope::Session) => self.reset(ctx),
            Event::Cleared(_) if event.clears(Scope::Connection) => {
                if self.state == SmState::Active && self.resumption_id.is_some() {
                    self.state = SmState::AwaitingResume;
                    self.ack_requested = false;
                    debug!(unacknowledged = self.queue.len(), "waiting to resume");
                } else if self.state != SmState::AwaitingResume {
                    self.reset(ctx);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests;
