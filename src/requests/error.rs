/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum RequestError {
    #[error("request stanza has no id")]
    MissingId,

    #[error("a request with id '{0}' is already pending")]
    DuplicateId(String),
}
