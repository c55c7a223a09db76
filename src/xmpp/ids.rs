/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Source of stanza ids.
///
/// Ids are a per instance prefix followed by a counter, so they never repeat
/// during the lifetime of the generator.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
    counter: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
            .unwrap_or_default();
        let seed = nanos ^ ((std::process::id() as u64) << 20);
        Self::with_prefix(format!("iks{:x}", seed & 0xff_ffff))
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        IdGenerator {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    pub fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("{}-{}", self.prefix, self.counter)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
