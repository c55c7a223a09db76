/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;

pub use error::BadJid;
use error::description;

const MAX_PART: usize = 1023;

fn check_resource(resource: &str) -> Result<(), BadJid> {
    if resource.is_empty() {
        return Err(BadJid(description::RESOURCE_EMPTY));
    }
    if resource.len() > MAX_PART {
        return Err(BadJid(description::RESOURCE_TOO_LONG));
    }
    Ok(())
}

/// The address of an entity in the XMPP protocol.
///
/// Each JID has three parts:
/// - Local part: Optionally identifies a local entity on the domain.
/// - Domain part: Identifies an XMPP server.
/// - Resource part: Optionally identifies a service or an object.
///
/// The domain part is stored in lowercase, since it is compared without
/// regard to case. More details can be found in
/// [RFC7622](https://datatracker.ietf.org/doc/rfc7622/)
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct Jid {
    full: String,
    at_pos: Option<usize>,
    slash_pos: Option<usize>,
}

impl Jid {
    /// Create a JID from a string.
    pub fn new(jid: &str) -> Result<Self, BadJid> {
        // The resource may contain '@' and '/', so it is split off first.
        let (bare, resource) = match jid.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (jid, None),
        };
        let (local, mut domain) = match bare.split_once('@') {
            Some((local, domain)) => (Some(local), domain),
            None => (None, bare),
        };
        if let Some(stripped) = domain.strip_suffix('.') {
            // Remove final dot as per RFC 7622 section 3.2
            domain = stripped;
        }
        if domain.is_empty() {
            return Err(BadJid(description::DOMAIN_EMPTY));
        }
        if domain.len() > MAX_PART {
            return Err(BadJid(description::DOMAIN_TOO_LONG));
        }
        if let Some(local) = local {
            if local.is_empty() {
                return Err(BadJid(description::LOCAL_EMPTY));
            }
            if local.len() > MAX_PART {
                return Err(BadJid(description::LOCAL_TOO_LONG));
            }
            if local.contains(['"', '&', '\'', ':', '<', '>', '@']) {
                return Err(BadJid(description::LOCAL_FORBIDDEN_CHAR));
            }
        }
        if let Some(resource) = resource {
            check_resource(resource)?;
        }

        let mut full = String::with_capacity(jid.len());
        let mut at_pos = None;
        let mut slash_pos = None;
        if let Some(local) = local {
            full.push_str(local);
            at_pos = Some(full.len());
            full.push('@');
        }
        full.push_str(&domain.to_lowercase());
        if let Some(resource) = resource {
            slash_pos = Some(full.len());
            full.push('/');
            full.push_str(resource);
        }
        Ok(Jid {
            full,
            at_pos,
            slash_pos,
        })
    }

    /// Full form of the JID with all the components.
    pub fn full(&self) -> &str {
        &self.full
    }

    /// Bare form of the JID without the resource part.
    pub fn bare(&self) -> &str {
        match self.slash_pos {
            Some(pos) => &self.full[..pos],
            None => &self.full,
        }
    }

    pub fn localpart(&self) -> Option<&str> {
        self.at_pos.map(|pos| &self.full[..pos])
    }

    pub fn domainpart(&self) -> &str {
        let start = self.at_pos.map_or(0, |pos| pos + 1);
        &self.bare()[start..]
    }

    pub fn resourcepart(&self) -> Option<&str> {
        self.slash_pos.map(|pos| &self.full[pos + 1..])
    }

    /// True if the JID does not contain a resource part.
    pub fn is_bare(&self) -> bool {
        self.slash_pos.is_none()
    }

    pub fn to_bare(&self) -> Jid {
        Jid {
            full: self.bare().to_string(),
            at_pos: self.at_pos,
            slash_pos: None,
        }
    }

    /// True if both JIDs address the same account or server.
    pub fn bare_eq(&self, other: &Jid) -> bool {
        self.bare() == other.bare()
    }

    /// Creates another JID by overriding the resource part.
    pub fn with_resource(&self, resource: &str) -> Result<Jid, BadJid> {
        check_resource(resource)?;
        let bare = self.bare();
        let mut full = String::with_capacity(bare.len() + 1 + resource.len());
        full.push_str(bare);
        full.push('/');
        full.push_str(resource);
        Ok(Jid {
            full,
            at_pos: self.at_pos,
            slash_pos: Some(bare.len()),
        })
    }
}

impl FromStr for Jid {
    type Err = BadJid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Jid::new(s)
    }
}

impl TryFrom<&str> for Jid {
    type Error = BadJid;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Jid::new(value)
    }
}

impl TryFrom<String> for Jid {
    type Error = BadJid;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Jid::new(&value)
    }
}

impl Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

#[cfg(test)]
mod tests;
