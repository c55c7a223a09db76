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
pub enum ModuleError {
    #[error("module '{0}' is already registered")]
    Duplicate(String),

    #[error("module '{0}' is not registered")]
    NotRegistered(String),

    #[error("module '{0}' depends on itself")]
    DependencyCycle(&'static str),
}
