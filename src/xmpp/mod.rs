/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub mod constants;
mod error_condition;
mod ids;
mod jid;
mod stanza;

pub use error_condition::ErrorCondition;
pub use error_condition::XmppError;
pub use ids::IdGenerator;
pub use jid::BadJid;
pub use jid::Jid;
pub use stanza::Iq;
pub use stanza::IqType;
pub use stanza::Message;
pub use stanza::MessageType;
pub use stanza::Presence;
pub use stanza::PresenceType;
pub use stanza::StanzaError;
pub use stanza::is_stanza;
