/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::Jid;
use crate::xmpp::constants::CLIENT_PORT;

use super::ConfigError;

fn default_port() -> u16 {
    CLIENT_PORT
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_tick_interval() -> u64 {
    2_000
}

fn enabled() -> bool {
    true
}

/// Client settings.
///
/// ```
/// use iks_client::Config;
///
/// let config = Config::from_toml_str("jid = 'juliet@capulet.lit'\nport = 5223").unwrap();
/// assert_eq!(config.host(), "capulet.lit");
/// assert_eq!(config.port, 5223);
/// assert!(config.stream_management);
/// ```
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub jid: Jid,
    /// Missing password means anonymous login.
    #[serde(default)]
    pub password: Option<String>,
    /// Host to connect instead of the JID's domain.
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "enabled")]
    pub use_tls: bool,
    #[serde(default = "enabled")]
    pub stream_management: bool,
    #[serde(default = "enabled")]
    pub resumption: bool,
}

impl Config {
    pub fn new(jid: Jid) -> Self {
        Config {
            jid,
            password: None,
            server: None,
            port: CLIENT_PORT,
            resource: None,
            connection_timeout_secs: default_connection_timeout(),
            request_timeout_ms: default_request_timeout(),
            tick_interval_ms: default_tick_interval(),
            use_tls: true,
            stream_management: true,
            resumption: true,
        }
    }

    pub fn builder(jid: Jid) -> ConfigBuilder {
        ConfigBuilder {
            config: Config::new(jid),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Host name the transport connects to.
    pub fn host(&self) -> &str {
        match &self.server {
            Some(server) => server,
            None => self.jid.domainpart(),
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("jid", &self.jid.full())
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("server", &self.server)
            .field("port", &self.port)
            .field("resource", &self.resource)
            .field("use_tls", &self.use_tls)
            .field("stream_management", &self.stream_management)
            .field("resumption", &self.resumption)
            .finish_non_exhaustive()
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn server(mut self, server: Option<String>) -> Self {
        self.config.server = server;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.config.resource = Some(resource.into());
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout_secs = timeout.as_secs();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.config.use_tls = use_tls;
        self
    }

    pub fn stream_management(mut self, enable: bool) -> Self {
        self.config.stream_management = enable;
        self
    }

    pub fn resumption(mut self, enable: bool) -> Self {
        self.config.resumption = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
