/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;

use thiserror::Error;

use crate::Element;

use super::constants::STANZAS_NS;

/// Stanza error conditions of RFC 6120 section 8.3.3.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorCondition {
    BadRequest,
    Conflict,
    FeatureNotImplemented,
    Forbidden,
    Gone,
    InternalServerError,
    ItemNotFound,
    JidMalformed,
    NotAcceptable,
    NotAllowed,
    NotAuthorized,
    PaymentRequired,
    PolicyViolation,
    RecipientUnavailable,
    Redirect,
    RegistrationRequired,
    RemoteServerNotFound,
    RemoteServerTimeout,
    ResourceConstraint,
    ServiceUnavailable,
    SubscriptionRequired,
    UndefinedCondition,
    UnexpectedRequest,
    /// Anything this library does not know about.
    Unknown,
}

use ErrorCondition::*;

const ALL: [ErrorCondition; 23] = [
    BadRequest,
    Conflict,
    FeatureNotImplemented,
    Forbidden,
    Gone,
    InternalServerError,
    ItemNotFound,
    JidMalformed,
    NotAcceptable,
    NotAllowed,
    NotAuthorized,
    PaymentRequired,
    PolicyViolation,
    RecipientUnavailable,
    Redirect,
    RegistrationRequired,
    RemoteServerNotFound,
    RemoteServerTimeout,
    ResourceConstraint,
    ServiceUnavailable,
    SubscriptionRequired,
    UndefinedCondition,
    UnexpectedRequest,
];

impl ErrorCondition {
    pub fn element_name(&self) -> &'static str {
        match self {
            BadRequest => "bad-request",
            Conflict => "conflict",
            FeatureNotImplemented => "feature-not-implemented",
            Forbidden => "forbidden",
            Gone => "gone",
            InternalServerError => "internal-server-error",
            ItemNotFound => "item-not-found",
            JidMalformed => "jid-malformed",
            NotAcceptable => "not-acceptable",
            NotAllowed => "not-allowed",
            NotAuthorized => "not-authorized",
            PaymentRequired => "payment-required",
            PolicyViolation => "policy-violation",
            RecipientUnavailable => "recipient-unavailable",
            Redirect => "redirect",
            RegistrationRequired => "registration-required",
            RemoteServerNotFound => "remote-server-not-found",
            RemoteServerTimeout => "remote-server-timeout",
            ResourceConstraint => "resource-constraint",
            ServiceUnavailable => "service-unavailable",
            SubscriptionRequired => "subscription-required",
            UndefinedCondition => "undefined-condition",
            UnexpectedRequest => "unexpected-request",
            Unknown => "unknown",
        }
    }

    /// The error type which should accompany the condition.
    pub fn error_type(&self) -> Option<&'static str> {
        match self {
            BadRequest | Gone | JidMalformed | NotAcceptable | Redirect => Some("modify"),
            Conflict | FeatureNotImplemented | ItemNotFound | NotAllowed | PolicyViolation
            | RemoteServerNotFound | ServiceUnavailable => Some("cancel"),
            Forbidden | NotAuthorized | PaymentRequired | RegistrationRequired
            | SubscriptionRequired => Some("auth"),
            InternalServerError | RecipientUnavailable | RemoteServerTimeout
            | ResourceConstraint | UnexpectedRequest => Some("wait"),
            UndefinedCondition | Unknown => None,
        }
    }

    /// Legacy numeric code from the pre-RFC Jabber protocol.
    pub fn code(&self) -> Option<u16> {
        match self {
            BadRequest | JidMalformed | UnexpectedRequest => Some(400),
            Conflict => Some(409),
            FeatureNotImplemented => Some(501),
            Forbidden => Some(403),
            Gone | Redirect => Some(302),
            InternalServerError | ResourceConstraint | UndefinedCondition => Some(500),
            ItemNotFound | RecipientUnavailable | RemoteServerNotFound => Some(404),
            NotAcceptable => Some(406),
            NotAllowed => Some(405),
            NotAuthorized => Some(401),
            PaymentRequired => Some(402),
            RegistrationRequired | SubscriptionRequired => Some(407),
            RemoteServerTimeout => Some(504),
            ServiceUnavailable => Some(503),
            PolicyViolation | Unknown => None,
        }
    }

    /// Maps an element name back to a condition, unknown names give [Unknown](ErrorCondition::Unknown).
    pub fn from_element_name(name: &str) -> ErrorCondition {
        ALL.into_iter()
            .find(|condition| condition.element_name() == name)
            .unwrap_or(Unknown)
    }

    /// Finds the condition inside an error stanza.
    ///
    /// Looks at the first `error` child, then for its first child in the
    /// stanza errors namespace. The optional human readable `text` is
    /// returned too.
    pub fn from_stanza(stanza: &Element) -> Option<(ErrorCondition, Option<String>)> {
        let error = stanza.first_child_named("error")?;
        let condition = error
            .children()
            .iter()
            .find(|child| child.xmlns() == Some(STANZAS_NS) && child.name() != "text")
            .map_or(UndefinedCondition, |child| {
                ErrorCondition::from_element_name(child.name())
            });
        let text = error
            .child_ns("text", STANZAS_NS)
            .and_then(Element::value)
            .map(str::to_string);
        Some((condition, text))
    }
}

impl Display for ErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.element_name())
    }
}

fn text_suffix(text: &Option<String>) -> String {
    match text {
        Some(text) => format!(": {text}"),
        None => String::new(),
    }
}

/// A protocol level failure which goes back to the peer as an error stanza.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("{}{}", .condition, text_suffix(.text))]
pub struct XmppError {
    pub condition: ErrorCondition,
    pub text: Option<String>,
}

impl XmppError {
    pub fn new(condition: ErrorCondition) -> Self {
        XmppError {
            condition,
            text: None,
        }
    }

    pub fn with_text(condition: ErrorCondition, text: impl Into<String>) -> Self {
        XmppError {
            condition,
            text: Some(text.into()),
        }
    }

    /// Builds the error reply for a received stanza.
    ///
    /// The reply has the same name and id, `type='error'`, and is addressed
    /// to the original sender.
    pub fn to_reply(&self, stanza: &Element) -> Element {
        let mut error = Element::builder("error")
            .attr_opt("type", self.condition.error_type())
            .attr_opt("code", self.condition.code().map(|c| c.to_string()))
            .child(self.condition.element_name())
            .xmlns(STANZAS_NS)
            .up();
        if let Some(text) = &self.text {
            error = error.child("text").xmlns(STANZAS_NS).value(text.as_str()).up();
        }
        Element::builder(stanza.name())
            .attr("type", "error")
            .attr_opt("id", stanza.attribute("id"))
            .attr_opt("to", stanza.attribute("from"))
            .attr_opt("xmlns", stanza.xmlns())
            .append(error.build())
            .build()
    }
}

impl From<ErrorCondition> for XmppError {
    fn from(condition: ErrorCondition) -> Self {
        XmppError::new(condition)
    }
}
