/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub const CLIENT_PORT: u16 = 5222;

pub const STREAM_TAG: &str = "stream:stream";

pub const STREAM_NS: &str = "http://etherx.jabber.org/streams";

pub const CLIENT_NS: &str = "jabber:client";

pub const TLS_NS: &str = "urn:ietf:params:xml:ns:xmpp-tls";

pub const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

pub const BIND_NS: &str = "urn:ietf:params:xml:ns:xmpp-bind";

pub const STANZAS_NS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

pub const STREAMS_NS: &str = "urn:ietf:params:xml:ns:xmpp-streams";

pub const SM_NS: &str = "urn:xmpp:sm:3";

pub const PING_NS: &str = "urn:xmpp:ping";
