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

/// Lifecycle of the transport.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum ConnectorState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectorState::Disconnected => "disconnected",
            ConnectorState::Connecting => "connecting",
            ConnectorState::Connected => "connected",
            ConnectorState::Disconnecting => "disconnecting",
        })
    }
}

/// Progress of the XMPP session on top of the transport.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum SessionState {
    #[default]
    Stopped,
    /// Stream negotiation (TLS, authentication, binding) is running.
    Negotiating,
    Established,
    /// The transport dropped, the session may still be resumed.
    Interrupted,
    Failed,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SessionState::Stopped => "stopped",
            SessionState::Negotiating => "negotiating",
            SessionState::Established => "established",
            SessionState::Interrupted => "interrupted",
            SessionState::Failed => "failed",
        })
    }
}

/// Lifetime of a piece of engine state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Scope {
    /// Cleared on every stream (re)start.
    Stream,
    /// Cleared when the transport disconnects.
    Connection,
    /// Cleared when the user stops the client.
    Session,
    /// Never cleared automatically.
    User,
}

impl Scope {
    /// Scopes cleared when a new stream starts on the same connection.
    pub const NEW_STREAM: &'static [Scope] = &[Scope::Stream];

    /// Scopes cleared when the transport goes away.
    pub const DISCONNECT: &'static [Scope] = &[Scope::Stream, Scope::Connection];

    /// Scopes cleared when the user stops the client.
    pub const STOP: &'static [Scope] = &[Scope::Stream, Scope::Connection, Scope::Session];
}
