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

use crate::ElementError;
use crate::SaxError;

#[derive(Debug, Error, Eq, PartialEq, Copy, Clone)]
pub enum StreamError {
    #[error("not enough memory")]
    NoMemory,

    #[error("invalid XML syntax: {0}")]
    BadXml(&'static str),

    #[error("invalid stream protocol: {0}")]
    BadStream(&'static str),
}

impl From<SaxError> for StreamError {
    fn from(err: SaxError) -> Self {
        match err {
            SaxError::NoMemory => StreamError::NoMemory,
            SaxError::BadXml(msg) => StreamError::BadXml(msg),
            SaxError::HandlerAbort => StreamError::BadStream(description::HANDLER_ABORT),
        }
    }
}

impl From<ElementError> for StreamError {
    fn from(err: ElementError) -> Self {
        match err {
            ElementError::NoMemory => StreamError::NoMemory,
            ElementError::BadXml(msg) => StreamError::BadXml(msg),
        }
    }
}

pub(crate) mod description {
    pub(super) const HANDLER_ABORT: &str = "stream handler aborted the parsing";
    pub(crate) const NOT_A_STREAM: &str = "root element is not a stream tag";
    pub(crate) const ROOT_MISMATCH: &str = "stream is closed with a different tag";
}
