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
use std::str::FromStr;

use thiserror::Error;

use crate::Element;

use super::jid::Jid;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum StanzaError {
    #[error("expected a <{expected}/> stanza, found <{found}/>")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("unknown stanza type '{0}'")]
    UnknownType(String),
}

macro_rules! stanza_type {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = StanzaError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(StanzaError::UnknownType(s.to_string())),
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

stanza_type!(
    /// Values of the `type` attribute of `<iq/>`.
    IqType {
        Get => "get",
        Set => "set",
        Result => "result",
        Error => "error",
    }
);

stanza_type!(
    /// Values of the `type` attribute of `<message/>`.
    MessageType {
        Chat => "chat",
        Error => "error",
        Groupchat => "groupchat",
        Headline => "headline",
        Normal => "normal",
    }
);

stanza_type!(
    /// Values of the `type` attribute of `<presence/>`.
    PresenceType {
        Error => "error",
        Probe => "probe",
        Subscribe => "subscribe",
        Subscribed => "subscribed",
        Unavailable => "unavailable",
        Unsubscribe => "unsubscribe",
        Unsubscribed => "unsubscribed",
    }
);

impl IqType {
    /// Requests expect a response, and time out without one.
    pub fn is_request(&self) -> bool {
        matches!(self, IqType::Get | IqType::Set)
    }
}

macro_rules! stanza_view {
    ($(#[$meta:meta])* $name:ident, $tag:literal, $kind:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Eq, PartialEq)]
        pub struct $name(Element);

        impl $name {
            pub const NAME: &'static str = $tag;

            pub fn new() -> Self {
                $name(Element::new($tag))
            }

            pub fn id(&self) -> Option<&str> {
                self.0.attribute("id")
            }

            pub fn set_id(&mut self, id: impl Into<String>) {
                self.0.set_attribute("id", id);
            }

            /// The sender, `None` if missing or not a valid JID.
            pub fn from(&self) -> Option<Jid> {
                self.0.attribute("from").and_then(|from| Jid::new(from).ok())
            }

            pub fn set_from(&mut self, jid: &Jid) {
                self.0.set_attribute("from", jid.full());
            }

            /// The recipient, `None` if missing or not a valid JID.
            pub fn to(&self) -> Option<Jid> {
                self.0.attribute("to").and_then(|to| Jid::new(to).ok())
            }

            pub fn set_to(&mut self, jid: &Jid) {
                self.0.set_attribute("to", jid.full());
            }

            /// Parsed `type` attribute, unknown values give `None`.
            pub fn stanza_type(&self) -> Option<$kind> {
                self.0.attribute("type").and_then(|t| t.parse().ok())
            }

            pub fn set_type(&mut self, kind: $kind) {
                self.0.set_attribute("type", kind.as_str());
            }

            pub fn element(&self) -> &Element {
                &self.0
            }

            pub fn element_mut(&mut self) -> &mut Element {
                &mut self.0
            }

            pub fn into_element(self) -> Element {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl TryFrom<Element> for $name {
            type Error = StanzaError;

            fn try_from(element: Element) -> Result<Self, Self::Error> {
                if element.name() != $tag {
                    return Err(StanzaError::TypeMismatch {
                        expected: $tag,
                        found: element.name().to_string(),
                    });
                }
                Ok($name(element))
            }
        }

        impl From<$name> for Element {
            fn from(stanza: $name) -> Element {
                stanza.0
            }
        }
    };
}

stanza_view!(
    /// Info/query stanza.
    Iq,
    "iq",
    IqType
);

stanza_view!(Message, "message", MessageType);

stanza_view!(Presence, "presence", PresenceType);

/// True for the three top level stanza kinds.
pub fn is_stanza(element: &Element) -> bool {
    matches!(element.name(), "iq" | "message" | "presence")
}
