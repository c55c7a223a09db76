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
mod location;

pub(crate) use error::description;
pub use error::SaxError;
pub use location::Location;

/// An XML element returned from the parser.
#[derive(Debug, Eq, PartialEq)]
pub enum SaxElement<'a> {
    /// A start tag or empty element tag.
    ///
    /// The argument is the full name of the tag including any namespace prefix. This
    /// element is sent to the handler as soon as the name is parsed.
    StartTag(&'a str),

    /// A tag attribute for the last StartTag.
    ///
    /// First argument is the attribute name and the second argument is the attribute value.
    /// All references in the attribute value are replaced with the actual characters.
    Attribute(&'a str, &'a str),

    /// The last StartTag is complete and has content, the '>' is seen.
    StartTagContent,

    /// The last StartTag was an empty element tag and will have no content.
    StartTagEmpty,

    /// An end tag element.
    ///
    /// The argument is the full name of the end tag.
    EndTag(&'a str),

    /// A character data element.
    ///
    /// The argument is the decoded text between two tags. Comments, processing
    /// instructions, and CDATA section boundaries do not split the text, so every
    /// continuous run of text arrives as one element even when the input is fed in
    /// arbitrarily small blocks.
    CData(&'a str),
}

pub trait SaxHandler {
    fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError>;
}

/// SAX (Simple API for XML) based XML parser.
///
/// This struct implements an incremental parser which processes the incoming
/// bytes and invokes a handler function for each encountered XML element.
/// Input can be split at any byte, including the middle of a tag name, an
/// entity reference, or a multi-byte UTF-8 sequence.
///
/// # Examples
///
/// ```
/// use iks_client::{SaxElement, SaxError, SaxHandler, SaxParser};
///
/// struct Counter { tags: usize }
/// impl SaxHandler for Counter {
///     fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
///         if let SaxElement::StartTag(_) = element {
///             self.tags += 1;
///         }
///         Ok(())
///     }
/// }
///
/// let mut handler = Counter { tags: 0 };
/// let mut parser = SaxParser::new();
/// parser.parse_bytes(&mut handler, b"<doc><it").unwrap();
/// parser.parse_bytes(&mut handler, b"em/></doc>").unwrap();
/// parser.parse_finish().unwrap();
/// assert_eq!(handler.tags, 2);
/// ```
pub struct SaxParser {
    state: State,
    uni_len: u32,
    uni_left: u32,
    uni_char: u32,
    depth: usize,
    is_end_tag: bool,
    is_apos_value: bool,
    seen_content: bool,
    value_pos: usize,
    buffer: Vec<u8>,
    text: Vec<u8>,
    ref_buffer: Vec<u8>,
    char_ref_value: u32,
    char_ref_digits: usize,
    is_value_ref: bool,
    buffer_limit: usize,
    failed: bool,
    location: Location,
}

#[derive(Debug, Eq, PartialEq)]
enum State {
    Prolog,
    TagStart,
    PI,
    PIEnd,
    Markup,
    CDataSectionC,
    CDataSectionCD,
    CDataSectionCDA,
    CDataSectionCDAT,
    CDataSectionCDATA,
    CDataSectionCDATAb,
    CDataSectionBody,
    CDataSectionMaybeEnd,
    CDataSectionMaybeEnd2,
    CommentStart,
    CommentBody,
    CommentMaybeEnd,
    CommentEnd,
    DoctypeDO,
    DoctypeDOC,
    DoctypeDOCT,
    DoctypeDOCTY,
    DoctypeDOCTYP,
    DoctypeDOCTYPE,
    DoctypeWhitespace,
    DoctypeSkip,
    DoctypeMarkupDecl,
    TagName,
    EndTagWhitespace,
    EmptyTagEnd,
    AttributeWhitespace,
    AttributeName,
    AttributeValueStart,
    AttributeValue,
    AttributeEq,
    CData,
    Reference,
    CharReference,
    CharReferenceBody,
    HexCharReference,
    Entity,
    Epilog,
}

const INITIAL_BUFFER_CAPACITY: usize = 128;

const REF_BUFFER_SIZE: usize = 32;

/// Default upper bound for a single token (tag name, attribute, or text run).
pub const DEFAULT_BUFFER_LIMIT: usize = 4 * 1024 * 1024;

macro_rules! whitespace {
    () => {
        b' ' | b'\t' | b'\r' | b'\n'
    };
}

fn is_valid_xml_char(c: u32) -> bool {
    matches!(
        c,
        0x09 | 0x0a | 0x0d | 0x20..=0xd7ff | 0xe000..=0xfffd | 0x10000..=0x10ffff
    )
}

fn is_name_start(c: u8) -> bool {
    matches!(c, b'a'..=b'z' | b'A'..=b'Z' | b'_' | b':' | 0x80..)
}

fn is_name_char(c: u8) -> bool {
    matches!(c, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b':' | b'-' | b'.' | 0x80..)
}

macro_rules! xml_error {
    ($a:ident) => {
        return Err(SaxError::BadXml(description::$a))
    };
}

fn reserve(buf: &mut Vec<u8>, need: usize, limit: usize) -> Result<(), SaxError> {
    if buf.len() + need > limit {
        xml_error!(BUFFER_LIMIT);
    }
    if buf.len() + need > buf.capacity() {
        let diff = std::cmp::max(need, buf.capacity());
        buf.try_reserve_exact(diff)
            .map_err(|_| SaxError::NoMemory)?;
    }
    Ok(())
}

// Bytes reaching here already passed the UTF-8 checks of the state machine.
fn as_str(bytes: &[u8]) -> Result<&str, SaxError> {
    std::str::from_utf8(bytes).map_err(|_| SaxError::BadXml(description::CHAR_INVALID))
}

impl SaxParser {
    /// Creates a new SAX parser instance.
    ///
    /// The instance can be reused for multiple documents with the [reset()](SaxParser::reset) method.
    pub fn new() -> SaxParser {
        SaxParser {
            state: State::Prolog,
            uni_len: 0,
            uni_left: 0,
            uni_char: 0,
            depth: 0,
            is_end_tag: false,
            is_apos_value: false,
            seen_content: false,
            value_pos: 0,
            buffer: Vec::<u8>::with_capacity(INITIAL_BUFFER_CAPACITY),
            text: Vec::<u8>::with_capacity(INITIAL_BUFFER_CAPACITY),
            ref_buffer: Vec::<u8>::with_capacity(REF_BUFFER_SIZE),
            char_ref_value: 0,
            char_ref_digits: 0,
            is_value_ref: false,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            failed: false,
            location: Location::new(),
        }
    }

    /// Limits the size of a single token the parser is willing to buffer.
    ///
    /// A peer sending a longer tag name, attribute, or text run triggers a
    /// [SaxError::BadXml] instead of growing the memory use without bounds.
    pub fn set_buffer_limit(&mut self, limit: usize) {
        self.buffer_limit = limit;
    }

    /// Resets the parser into a clean state.
    pub fn reset(&mut self) {
        self.state = State::Prolog;
        self.uni_len = 0;
        self.uni_left = 0;
        self.uni_char = 0;
        self.depth = 0;
        self.is_end_tag = false;
        self.is_apos_value = false;
        self.seen_content = false;
        self.value_pos = 0;
        self.buffer.clear();
        self.text.clear();
        self.ref_buffer.clear();
        self.char_ref_value = 0;
        self.char_ref_digits = 0;
        self.is_value_ref = false;
        self.failed = false;
        self.location = Location::new();
    }

    /// Nesting depth of the currently open tags.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// Checks if the document is complete.
    ///
    /// A completed document should have a root tag and should not have any
    /// unfinished XML constructs, such as open comments and markup.
    pub fn parse_finish(&mut self) -> Result<(), SaxError> {
        if self.failed {
            xml_error!(PARSER_REUSE_WITHOUT_RESET);
        }
        if !self.seen_content {
            xml_error!(DOC_NO_CONTENT);
        }
        if self.depth > 0 {
            xml_error!(DOC_OPEN_TAGS);
        }
        if self.state != State::Epilog {
            xml_error!(DOC_OPEN_MARKUP);
        }
        Ok(())
    }

    /// Parses given XML bytes and checks if the document is complete.
    ///
    /// This is a convenience function which calls [parse_bytes()](SaxParser::parse_bytes)
    /// and [parse_finish()](SaxParser::parse_finish) methods for you.
    pub fn parse_bytes_finish(
        &mut self,
        handler: &mut impl SaxHandler,
        bytes: &[u8],
    ) -> Result<(), SaxError> {
        self.parse_bytes(handler, bytes)?;
        self.parse_finish()
    }

    /// Parses given XML bytes.
    ///
    /// After an error the parser refuses any further input until it is [reset](SaxParser::reset).
    pub fn parse_bytes(
        &mut self,
        handler: &mut impl SaxHandler,
        bytes: &[u8],
    ) -> Result<(), SaxError> {
        if self.failed {
            xml_error!(PARSER_REUSE_WITHOUT_RESET);
        }
        let result = self.parse_block(handler, bytes);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn check_char(&mut self, c: u8) -> Result<(), SaxError> {
        if self.uni_left > 0 {
            if c & 0xc0 != 0x80 {
                xml_error!(UTF8_INVALID_CONT_BYTE);
            }
            self.uni_char <<= 6;
            self.uni_char += c as u32 & 0x3f;
            self.uni_left -= 1;
            if self.uni_left == 0 {
                // Sequences longer than the actual character codepoint
                // size are security hazards.
                if (self.uni_len == 2 && self.uni_char <= 0x7f)
                    || (self.uni_len == 3 && self.uni_char <= 0x7ff)
                    || (self.uni_len == 4 && self.uni_char <= 0xffff)
                {
                    xml_error!(UTF8_OVERLONG_SEQUENCE);
                }
                if !is_valid_xml_char(self.uni_char) {
                    xml_error!(CHAR_INVALID);
                }
            }
        } else if c & 0x80 == 0x80 {
            if c & 0x60 == 0x40 {
                self.uni_len = 2;
                self.uni_left = 1;
                self.uni_char = c as u32 & 0x1f;
            } else if c & 0x70 == 0x60 {
                self.uni_len = 3;
                self.uni_left = 2;
                self.uni_char = c as u32 & 0x0f;
            } else if c & 0x78 == 0x70 {
                self.uni_len = 4;
                self.uni_left = 3;
                self.uni_char = c as u32 & 0x07;
            } else {
                xml_error!(UTF8_INVALID_PREFIX_BYTE);
            }
        } else if c < 0x20 && (c != 0x09 && c != 0x0a && c != 0x0d) {
            xml_error!(CHAR_INVALID);
        }
        Ok(())
    }

    fn flush_text(&mut self, handler: &mut impl SaxHandler) -> Result<(), SaxError> {
        if !self.text.is_empty() {
            let s = as_str(&self.text)?;
            handler.handle_element(&SaxElement::CData(s))?;
            self.text.clear();
        }
        Ok(())
    }

    fn push_ref_bytes(&mut self, bytes: &[u8]) -> Result<(), SaxError> {
        let target = if self.is_value_ref {
            &mut self.buffer
        } else {
            &mut self.text
        };
        reserve(target, bytes.len(), self.buffer_limit)?;
        target.extend_from_slice(bytes);
        Ok(())
    }

    fn push_char_ref(&mut self) -> Result<(), SaxError> {
        let c = match char::from_u32(self.char_ref_value) {
            Some(c) if is_valid_xml_char(self.char_ref_value) => c,
            _ => xml_error!(CHAR_INVALID),
        };
        let mut buf = [0u8; 4];
        let encoded = c.encode_utf8(&mut buf);
        self.push_ref_bytes(encoded.as_bytes())
    }

    fn push_entity(&mut self) -> Result<(), SaxError> {
        let decoded: &[u8] = match self.ref_buffer.as_slice() {
            b"amp" => b"&",
            b"lt" => b"<",
            b"gt" => b">",
            b"quot" => b"\"",
            b"apos" => b"'",
            _ => {
                // Entities declared in a DTD are not supported, the
                // reference is kept as literal text.
                let mut literal = Vec::with_capacity(self.ref_buffer.len() + 2);
                literal.push(b'&');
                literal.extend_from_slice(&self.ref_buffer);
                literal.push(b';');
                return self.push_ref_bytes(&literal);
            }
        };
        self.push_ref_bytes(decoded)
    }

    fn reference_done(&mut self) -> State {
        if self.is_value_ref {
            State::AttributeValue
        } else {
            State::CData
        }
    }

    fn add_char_ref_digit(&mut self, base: u32, digit: u32) -> Result<(), SaxError> {
        self.char_ref_value = self.char_ref_value * base + digit;
        self.char_ref_digits += 1;
        if self.char_ref_value > 0x10ffff {
            xml_error!(CHAR_INVALID);
        }
        Ok(())
    }

    fn close_tag(&mut self, pos: usize, back: &mut usize) -> Result<(), SaxError> {
        if self.depth == 0 {
            xml_error!(TAG_CLOSE_WITHOUT_OPEN);
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.state = State::Epilog;
        } else {
            *back = pos + 1;
            self.state = State::CData;
        }
        Ok(())
    }

    fn parse_block(
        &mut self,
        handler: &mut impl SaxHandler,
        bytes: &[u8],
    ) -> Result<(), SaxError> {
        let mut pos: usize = 0;
        let mut back: usize = 0;
        let mut redo: bool = false;

        while pos < bytes.len() {
            let c = bytes[pos];

            if !redo {
                self.check_char(c)?;
            }
            redo = false;

            match self.state {
                State::Prolog => match c {
                    b'<' => self.state = State::TagStart,
                    whitespace!() => (),
                    _ => xml_error!(DOC_CDATA_WITHOUT_PARENT),
                },

                State::TagStart => match c {
                    b'!' => self.state = State::Markup,
                    b'?' => self.state = State::PI,
                    b'/' => {
                        if self.depth == 0 {
                            xml_error!(TAG_CLOSE_WITHOUT_OPEN);
                        }
                        self.flush_text(handler)?;
                        back = pos + 1;
                        self.is_end_tag = true;
                        self.state = State::TagName;
                    }
                    whitespace!() => xml_error!(TAG_WHITESPACE_START),
                    b'>' => xml_error!(TAG_EMPTY_NAME),
                    _ if !is_name_start(c) => xml_error!(TAG_INVALID_NAME),
                    _ => {
                        if self.depth == 0 && self.seen_content {
                            xml_error!(TAG_OUTSIDE_ROOT);
                        }
                        self.flush_text(handler)?;
                        self.depth += 1;
                        back = pos;
                        self.is_end_tag = false;
                        self.seen_content = true;
                        self.state = State::TagName;
                    }
                },

                State::Markup => match c {
                    b'-' => self.state = State::CommentStart,
                    b'[' => {
                        if self.depth == 0 {
                            xml_error!(MARKUP_CDATA_SECTION_OUTSIDE_ROOT);
                        }
                        self.state = State::CDataSectionC;
                    }
                    b'D' => self.state = State::DoctypeDO,
                    _ => xml_error!(MARKUP_UNRECOGNIZED),
                },

                State::DoctypeDO => match c {
                    b'O' => self.state = State::DoctypeDOC,
                    _ => xml_error!(MARKUP_DOCTYPE_BAD_START),
                },

                State::DoctypeDOC => match c {
                    b'C' => self.state = State::DoctypeDOCT,
                    _ => xml_error!(MARKUP_DOCTYPE_BAD_START),
                },

                State::DoctypeDOCT => match c {
                    b'T' => self.state = State::DoctypeDOCTY,
                    _ => xml_error!(MARKUP_DOCTYPE_BAD_START),
                },

                State::DoctypeDOCTY => match c {
                    b'Y' => self.state = State::DoctypeDOCTYP,
                    _ => xml_error!(MARKUP_DOCTYPE_BAD_START),
                },

                State::DoctypeDOCTYP => match c {
                    b'P' => self.state = State::DoctypeDOCTYPE,
                    _ => xml_error!(MARKUP_DOCTYPE_BAD_START),
                },

                State::DoctypeDOCTYPE => match c {
                    b'E' => self.state = State::DoctypeWhitespace,
                    _ => xml_error!(MARKUP_DOCTYPE_BAD_START),
                },

                State::DoctypeWhitespace => match c {
                    whitespace!() => self.state = State::DoctypeSkip,
                    _ => xml_error!(MARKUP_DOCTYPE_BAD_START),
                },

                State::DoctypeSkip => match c {
                    b'<' => self.state = State::DoctypeMarkupDecl,
                    b'>' => self.state = State::Prolog,
                    _ => (),
                },

                State::DoctypeMarkupDecl => {
                    if c == b'>' {
                        self.state = State::DoctypeSkip;
                    }
                }

                State::CDataSectionC => {
                    if c != b'C' {
                        xml_error!(MARKUP_CDATA_SECTION_BAD_START);
                    }
                    self.state = State::CDataSectionCD;
                }

                State::CDataSectionCD => {
                    if c != b'D' {
                        xml_error!(MARKUP_CDATA_SECTION_BAD_START);
                    }
                    self.state = State::CDataSectionCDA;
                }

                State::CDataSectionCDA => {
                    if c != b'A' {
                        xml_error!(MARKUP_CDATA_SECTION_BAD_START);
                    }
                    self.state = State::CDataSectionCDAT;
                }

                State::CDataSectionCDAT => {
                    if c != b'T' {
                        xml_error!(MARKUP_CDATA_SECTION_BAD_START);
                    }
                    self.state = State::CDataSectionCDATA;
                }

                State::CDataSectionCDATA => {
                    if c != b'A' {
                        xml_error!(MARKUP_CDATA_SECTION_BAD_START);
                    }
                    self.state = State::CDataSectionCDATAb;
                }

                State::CDataSectionCDATAb => {
                    if c != b'[' {
                        xml_error!(MARKUP_CDATA_SECTION_BAD_START);
                    }
                    back = pos + 1;
                    self.state = State::CDataSectionBody;
                }

                State::CDataSectionBody => {
                    if c == b']' {
                        if back < pos {
                            reserve(&mut self.text, pos - back, self.buffer_limit)?;
                            self.text.extend_from_slice(&bytes[back..pos]);
                        }
                        self.state = State::CDataSectionMaybeEnd;
                    }
                }

                State::CDataSectionMaybeEnd => match c {
                    b']' => self.state = State::CDataSectionMaybeEnd2,
                    _ => {
                        reserve(&mut self.text, 1, self.buffer_limit)?;
                        self.text.push(b']');
                        back = pos;
                        self.state = State::CDataSectionBody;
                    }
                },

                State::CDataSectionMaybeEnd2 => match c {
                    b'>' => {
                        back = pos + 1;
                        self.state = State::CData;
                    }
                    b']' => {
                        reserve(&mut self.text, 1, self.buffer_limit)?;
                        self.text.push(b']');
                    }
                    _ => {
                        reserve(&mut self.text, 2, self.buffer_limit)?;
                        self.text.extend_from_slice(b"]]");
                        back = pos;
                        self.state = State::CDataSectionBody;
                    }
                },

                State::CommentStart => {
                    if c != b'-' {
                        xml_error!(COMMENT_MISSING_DASH);
                    }
                    self.state = State::CommentBody;
                }

                State::CommentBody => {
                    if c == b'-' {
                        self.state = State::CommentMaybeEnd;
                    }
                }

                State::CommentMaybeEnd => match c {
                    b'-' => self.state = State::CommentEnd,
                    _ => self.state = State::CommentBody,
                },

                State::CommentEnd => {
                    if c != b'>' {
                        xml_error!(COMMENT_MISSING_END);
                    }
                    if self.depth > 0 {
                        back = pos + 1;
                        self.state = State::CData;
                    } else if self.seen_content {
                        self.state = State::Epilog;
                    } else {
                        self.state = State::Prolog;
                    }
                }

                State::PI => {
                    if c == b'?' {
                        self.state = State::PIEnd;
                    }
                }

                State::PIEnd => match c {
                    b'>' => {
                        if self.seen_content {
                            if self.depth > 0 {
                                back = pos + 1;
                                self.state = State::CData;
                            } else {
                                self.state = State::Epilog;
                            }
                        } else {
                            self.state = State::Prolog;
                        }
                    }
                    _ => xml_error!(PI_MISSING_END),
                },

                State::TagName => match c {
                    b'/' | b'>' | whitespace!() => {
                        if back < pos {
                            reserve(&mut self.buffer, pos - back, self.buffer_limit)?;
                            self.buffer.extend_from_slice(&bytes[back..pos]);
                        }
                        if self.buffer.is_empty() {
                            xml_error!(TAG_EMPTY_NAME);
                        }
                        {
                            let s = as_str(&self.buffer)?;
                            if self.is_end_tag {
                                if c == b'/' {
                                    xml_error!(TAG_DOUBLE_END);
                                }
                                handler.handle_element(&SaxElement::EndTag(s))?;
                            } else {
                                handler.handle_element(&SaxElement::StartTag(s))?;
                            }
                        }
                        self.buffer.clear();
                        match c {
                            b'/' => self.state = State::EmptyTagEnd,
                            b'>' => {
                                if self.is_end_tag {
                                    self.close_tag(pos, &mut back)?;
                                } else {
                                    handler.handle_element(&SaxElement::StartTagContent)?;
                                    back = pos + 1;
                                    self.state = State::CData;
                                }
                            }
                            _ => {
                                if self.is_end_tag {
                                    self.state = State::EndTagWhitespace;
                                } else {
                                    self.state = State::AttributeWhitespace;
                                }
                            }
                        }
                    }
                    _ if is_name_char(c) => (),
                    _ => xml_error!(TAG_INVALID_NAME),
                },

                State::EmptyTagEnd => match c {
                    b'>' => {
                        handler.handle_element(&SaxElement::StartTagEmpty)?;
                        self.close_tag(pos, &mut back)?;
                    }
                    _ => xml_error!(TAG_EMPTY_TAG_MISSING_END),
                },

                State::EndTagWhitespace => match c {
                    b'>' => self.close_tag(pos, &mut back)?,
                    whitespace!() => (),
                    _ => xml_error!(TAG_END_TAG_ATTRIBUTES),
                },

                State::AttributeWhitespace => match c {
                    whitespace!() => (),
                    b'/' => self.state = State::EmptyTagEnd,
                    b'>' => {
                        handler.handle_element(&SaxElement::StartTagContent)?;
                        back = pos + 1;
                        self.state = State::CData;
                    }
                    _ if is_name_start(c) => {
                        back = pos;
                        self.state = State::AttributeName;
                        redo = true;
                    }
                    _ => xml_error!(TAG_ATTRIBUTE_BAD_NAME),
                },

                State::AttributeName => match c {
                    b'=' | whitespace!() => {
                        if back < pos {
                            reserve(&mut self.buffer, pos - back, self.buffer_limit)?;
                            self.buffer.extend_from_slice(&bytes[back..pos]);
                        }
                        if self.buffer.is_empty() {
                            xml_error!(TAG_ATTRIBUTE_BAD_NAME);
                        }
                        if c == b'=' {
                            self.state = State::AttributeValueStart;
                        } else {
                            self.state = State::AttributeEq;
                        }
                    }
                    _ if is_name_char(c) => (),
                    _ => xml_error!(TAG_ATTRIBUTE_BAD_NAME),
                },

                State::AttributeEq => match c {
                    b'=' => self.state = State::AttributeValueStart,
                    whitespace!() => (),
                    _ => xml_error!(TAG_ATTRIBUTE_WITHOUT_EQUAL),
                },

                State::AttributeValueStart => match c {
                    b'"' | b'\'' => {
                        self.is_apos_value = c == b'\'';
                        self.value_pos = self.buffer.len();
                        back = pos + 1;
                        self.state = State::AttributeValue;
                    }
                    whitespace!() => (),
                    _ => xml_error!(TAG_ATTRIBUTE_WITHOUT_QUOTE),
                },

                State::AttributeValue => {
                    if (self.is_apos_value && c == b'\'') || (!self.is_apos_value && c == b'"') {
                        if back < pos {
                            reserve(&mut self.buffer, pos - back, self.buffer_limit)?;
                            self.buffer.extend_from_slice(&bytes[back..pos]);
                        }
                        {
                            let attr = as_str(&self.buffer[0..self.value_pos])?;
                            let value = as_str(&self.buffer[self.value_pos..])?;
                            handler.handle_element(&SaxElement::Attribute(attr, value))?;
                        }
                        self.buffer.clear();
                        self.state = State::AttributeWhitespace;
                    } else if c == b'&' {
                        if back < pos {
                            reserve(&mut self.buffer, pos - back, self.buffer_limit)?;
                            self.buffer.extend_from_slice(&bytes[back..pos]);
                        }
                        self.ref_buffer.clear();
                        self.is_value_ref = true;
                        self.state = State::Reference;
                    } else if c == b'<' {
                        xml_error!(TAG_ATTRIBUTE_BAD_VALUE);
                    }
                }

                State::CData => match c {
                    b'<' | b'&' => {
                        if back < pos {
                            reserve(&mut self.text, pos - back, self.buffer_limit)?;
                            self.text.extend_from_slice(&bytes[back..pos]);
                        }
                        if c == b'<' {
                            self.state = State::TagStart;
                        } else {
                            self.ref_buffer.clear();
                            self.is_value_ref = false;
                            self.state = State::Reference;
                        }
                    }
                    _ => (),
                },

                State::Reference => match c {
                    b'#' => {
                        self.char_ref_value = 0;
                        self.char_ref_digits = 0;
                        self.state = State::CharReference;
                    }
                    b'a'..=b'z' | b'A'..=b'Z' | b'_' | b':' | 0x80.. => {
                        self.ref_buffer.push(c);
                        self.state = State::Entity;
                    }
                    _ => xml_error!(REFERENCE_INVALID_START),
                },

                State::Entity => match c {
                    b';' => {
                        self.push_entity()?;
                        back = pos + 1;
                        self.state = self.reference_done();
                    }
                    _ if is_name_char(c) => {
                        if self.ref_buffer.len() >= REF_BUFFER_SIZE {
                            xml_error!(REFERENCE_TOO_LONG);
                        }
                        self.ref_buffer.push(c);
                    }
                    _ => xml_error!(REFERENCE_MISSING_SEMICOLON),
                },

                State::CharReference => match c {
                    b'x' => self.state = State::HexCharReference,
                    b'0'..=b'9' => {
                        self.add_char_ref_digit(10, (c - b'0').into())?;
                        self.state = State::CharReferenceBody;
                    }
                    _ => xml_error!(REFERENCE_INVALID_DECIMAL),
                },

                State::CharReferenceBody => match c {
                    b';' => {
                        self.push_char_ref()?;
                        back = pos + 1;
                        self.state = self.reference_done();
                    }
                    b'0'..=b'9' => self.add_char_ref_digit(10, (c - b'0').into())?,
                    whitespace!() | b'<' | b'&' => xml_error!(REFERENCE_MISSING_SEMICOLON),
                    _ => xml_error!(REFERENCE_INVALID_DECIMAL),
                },

                State::HexCharReference => match c {
                    b';' => {
                        if self.char_ref_digits == 0 {
                            xml_error!(REFERENCE_EMPTY);
                        }
                        self.push_char_ref()?;
                        back = pos + 1;
                        self.state = self.reference_done();
                    }
                    b'0'..=b'9' => self.add_char_ref_digit(16, (c - b'0').into())?,
                    b'a'..=b'f' => self.add_char_ref_digit(16, (c - b'a' + 10).into())?,
                    b'A'..=b'F' => self.add_char_ref_digit(16, (c - b'A' + 10).into())?,
                    whitespace!() | b'<' | b'&' => xml_error!(REFERENCE_MISSING_SEMICOLON),
                    _ => xml_error!(REFERENCE_INVALID_HEX),
                },

                State::Epilog => match c {
                    b'<' => self.state = State::TagStart,
                    whitespace!() => (),
                    _ => xml_error!(DOC_CDATA_WITHOUT_PARENT),
                },
            }

            if !redo {
                pos += 1;
                self.location.advance(c);
            }
        }

        if back < pos {
            match self.state {
                State::TagName | State::AttributeName | State::AttributeValue => {
                    reserve(&mut self.buffer, pos - back, self.buffer_limit)?;
                    self.buffer.extend_from_slice(&bytes[back..pos]);
                }
                State::CData | State::CDataSectionBody => {
                    reserve(&mut self.text, pos - back, self.buffer_limit)?;
                    self.text.extend_from_slice(&bytes[back..pos]);
                }
                _ => (),
            }
        }

        Ok(())
    }
}

impl Default for SaxParser {
    fn default() -> Self {
        Self::new()
    }
}
