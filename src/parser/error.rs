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

/// Type of the error which happened during the XML SAX parsing.
///
/// These categories are designed to be as few as possible and correspond to the distinct
/// actions the caller might take based on the problem. The location of the error is
/// available via [location()](super::SaxParser::location).
#[derive(Debug, Error, Eq, PartialEq, Copy, Clone)]
pub enum SaxError {
    /// Parser could not allocate the memory needed for parsing buffers.
    #[error("not enough memory")]
    NoMemory,

    /// A syntax error is encountered in the XML input.
    ///
    /// The argument describes the actual syntax issue. A stream which produced this error
    /// cannot be continued, the connection should be torn down.
    #[error("invalid xml syntax: {0}")]
    BadXml(&'static str),

    /// Element handler function returned this error.
    ///
    /// This is intended for caller's handler to be able to abort the processing while
    /// signalling to the caller that the interruption is not caused by the parser itself.
    #[error("error from sax handler")]
    HandlerAbort,
}

pub(crate) mod description {
    pub(crate) const PARSER_REUSE_WITHOUT_RESET: &str =
        "cannot continue after an error without a reset";
    pub(crate) const UTF8_INVALID_CONT_BYTE: &str = "Invalid UTF8 continuation byte";
    pub(crate) const UTF8_OVERLONG_SEQUENCE: &str = "Overlong UTF8 sequence";
    pub(crate) const UTF8_INVALID_PREFIX_BYTE: &str = "Invalid UTF8 prefix byte";
    pub(crate) const CHAR_INVALID: &str = "Invalid XML character";
    pub(crate) const DOC_NO_CONTENT: &str = "Document has no root tag";
    pub(crate) const DOC_OPEN_TAGS: &str = "Document has unclosed tags";
    pub(crate) const DOC_OPEN_MARKUP: &str = "Document epilog has unclosed PI or comment tag";
    pub(crate) const DOC_CDATA_WITHOUT_PARENT: &str =
        "Character data not allowed outside of the root tag";
    pub(crate) const TAG_CLOSE_WITHOUT_OPEN: &str = "Close tag without open";
    pub(crate) const TAG_WHITESPACE_START: &str = "Tag cannot start with whitespace";
    pub(crate) const TAG_OUTSIDE_ROOT: &str = "Tags cannot be outside of the root tag";
    pub(crate) const TAG_EMPTY_NAME: &str = "Tag has no name";
    pub(crate) const TAG_INVALID_NAME: &str = "Tag name has an invalid character";
    pub(crate) const TAG_DOUBLE_END: &str = "End tag has standalone ending too";
    pub(crate) const TAG_END_TAG_ATTRIBUTES: &str = "End tag cannot have attributes";
    pub(crate) const TAG_EMPTY_TAG_MISSING_END: &str = "Empty element tags must end after the '/'";
    pub(crate) const TAG_ATTRIBUTE_WITHOUT_EQUAL: &str =
        "Tag attributes must have '=' before the value";
    pub(crate) const TAG_ATTRIBUTE_WITHOUT_QUOTE: &str =
        "Tag attribute value must be double or single quotes";
    pub(crate) const TAG_ATTRIBUTE_BAD_NAME: &str =
        "Tag attribute names must be made of name characters";
    pub(crate) const TAG_ATTRIBUTE_BAD_VALUE: &str =
        "Tag value cannot have '<' character without a reference";
    pub(crate) const REFERENCE_INVALID_START: &str =
        "Reference must start with a name character or '#'";
    pub(crate) const REFERENCE_INVALID_DECIMAL: &str = "Non digit in decimal character refence";
    pub(crate) const REFERENCE_INVALID_HEX: &str = "Non hex digit in hexadecimal character refence";
    pub(crate) const REFERENCE_EMPTY: &str = "Character reference has no digits";
    pub(crate) const REFERENCE_MISSING_SEMICOLON: &str = "Reference is not terminated with ';'";
    pub(crate) const REFERENCE_TOO_LONG: &str = "Entity reference name is too long";
    pub(crate) const COMMENT_MISSING_DASH: &str = "Comment tag should start with double dash";
    pub(crate) const COMMENT_MISSING_END: &str = "Comment tag should end after double dash";
    pub(crate) const MARKUP_CDATA_SECTION_BAD_START: &str =
        "Character data sections must start with '[CDATA['";
    pub(crate) const MARKUP_DOCTYPE_BAD_START: &str = "Doctype must start with 'DOCTYPE '";
    pub(crate) const MARKUP_CDATA_SECTION_OUTSIDE_ROOT: &str =
        "Character data sections cannot be outside of the root tag";
    pub(crate) const MARKUP_UNRECOGNIZED: &str =
        "Markup is not a comment, character data section, or document type declaration";
    pub(crate) const PI_MISSING_END: &str =
        "Processing instruction must end after closing the '?'";
    pub(crate) const BUFFER_LIMIT: &str = "Token is larger than the configured buffer limit";
}
