/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! An XMPP client engine built on a streaming XML parser.
//!
//! Incoming bytes are parsed into [`Element`] trees, dispatched to the
//! registered [`XmppModule`]s, and the results flow back out through a
//! [`Transport`]. Applications observe the session on the [`EventBus`].

pub mod client;
mod element;
mod entities;
mod events;
pub mod modules;
mod parser;
mod requests;
mod sm;
mod stream;
pub mod xmpp;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use parser::Location;
pub use parser::SaxElement;
pub use parser::SaxError;
pub use parser::SaxHandler;
pub use parser::SaxParser;

pub use element::Attributes;
pub use element::Cursor;
pub use element::Element;
pub use element::ElementBuilder;
pub use element::ElementError;

pub use stream::StreamElement;
pub use stream::StreamError;
pub use stream::StreamHandler;
pub use stream::StreamParser;

pub use xmpp::BadJid;
pub use xmpp::ErrorCondition;
pub use xmpp::IdGenerator;
pub use xmpp::Iq;
pub use xmpp::IqType;
pub use xmpp::Jid;
pub use xmpp::Message;
pub use xmpp::MessageType;
pub use xmpp::Presence;
pub use xmpp::PresenceType;
pub use xmpp::StanzaError;
pub use xmpp::XmppError;
pub use xmpp::is_stanza;

pub use events::ALL_EVENTS;
pub use events::DispatchPolicy;
pub use events::Event;
pub use events::EventBus;
pub use events::HandlerId;

pub use modules::Criteria;
pub use modules::Dispatched;
pub use modules::ModuleError;
pub use modules::ModuleLookup;
pub use modules::ModuleProvider;
pub use modules::ModulesManager;
pub use modules::StanzaInterceptor;
pub use modules::XmppModule;

pub use requests::DEFAULT_TIMEOUT;
pub use requests::Request;
pub use requests::RequestError;
pub use requests::RequestResult;
pub use requests::RequestsManager;

pub use sm::STREAM_MANAGEMENT;
pub use sm::SmState;
pub use sm::StreamManagementModule;

pub use client::Client;
pub use client::ClientBuilder;
pub use client::ClientError;
pub use client::Config;
pub use client::ConfigBuilder;
pub use client::ConfigError;
pub use client::ConnectorState;
pub use client::Context;
pub use client::MemoryTransport;
pub use client::Scope;
pub use client::SessionState;
pub use client::TcpTransport;
pub use client::Transport;
pub use client::TransportError;
pub use client::stream_header;
