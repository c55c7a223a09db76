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

pub(crate) use error::description;
pub use error::StreamError;

use tracing::trace;

use crate::Element;
use crate::Location;
use crate::SaxElement;
use crate::SaxError;
use crate::SaxHandler;
use crate::SaxParser;
use crate::element::TreeBuilder;

/// Things an XMPP stream is made of.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StreamElement {
    /// The stream root tag is opened, with its attributes in document order.
    Start(Vec<(String, String)>),

    /// A complete direct child of the stream root.
    Element(Element),

    /// The stream root tag is closed.
    End,
}

pub trait StreamHandler {
    fn handle_stream_start(&mut self, attributes: Vec<(String, String)>);
    fn handle_stream_element(&mut self, element: Element);
    fn handle_stream_end(&mut self);
}

/// Collects the stream into a list, handy for processing it afterwards.
impl StreamHandler for Vec<StreamElement> {
    fn handle_stream_start(&mut self, attributes: Vec<(String, String)>) {
        self.push(StreamElement::Start(attributes));
    }

    fn handle_stream_element(&mut self, element: Element) {
        self.push(StreamElement::Element(element));
    }

    fn handle_stream_end(&mut self) {
        self.push(StreamElement::End);
    }
}

#[derive(Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    RootAttributes,
    Open,
    Closed,
}

struct RootState {
    phase: Phase,
    name: String,
    attributes: Vec<(String, String)>,
    error: Option<StreamError>,
}

fn is_stream_tag(name: &str) -> bool {
    match name.split_once(':') {
        Some((_, local)) => local == "stream",
        None => name == "stream",
    }
}

struct StreamBuilder<'a, H: StreamHandler> {
    root: &'a mut RootState,
    tree: &'a mut TreeBuilder,
    handler: &'a mut H,
}

impl<H: StreamHandler> StreamBuilder<'_, H> {
    fn fail(&mut self, err: StreamError) -> Result<(), SaxError> {
        self.root.error = Some(err);
        Err(SaxError::HandlerAbort)
    }
}

impl<H: StreamHandler> SaxHandler for StreamBuilder<'_, H> {
    fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
        match self.root.phase {
            Phase::Idle => {
                if let SaxElement::StartTag(name) = element {
                    if !is_stream_tag(name) {
                        return self.fail(StreamError::BadStream(description::NOT_A_STREAM));
                    }
                    self.root.name = name.to_string();
                    self.root.phase = Phase::RootAttributes;
                }
            }
            Phase::RootAttributes => match element {
                SaxElement::Attribute(name, value) => {
                    if let Some(prefix) = name.strip_prefix("xmlns:") {
                        self.tree.declare(prefix, value);
                    }
                    self.root
                        .attributes
                        .push((name.to_string(), value.to_string()));
                }
                SaxElement::StartTagContent => {
                    self.root.phase = Phase::Open;
                    let attributes = std::mem::take(&mut self.root.attributes);
                    self.handler.handle_stream_start(attributes);
                }
                SaxElement::StartTagEmpty => {
                    self.root.phase = Phase::Closed;
                    let attributes = std::mem::take(&mut self.root.attributes);
                    self.handler.handle_stream_start(attributes);
                    self.handler.handle_stream_end();
                }
                _ => (),
            },
            Phase::Open => {
                if self.tree.depth() == 0 {
                    match element {
                        // whitespace keepalives between stanzas
                        SaxElement::CData(_) => return Ok(()),
                        SaxElement::EndTag(name) => {
                            if *name != self.root.name {
                                return self
                                    .fail(StreamError::BadXml(description::ROOT_MISMATCH));
                            }
                            self.root.phase = Phase::Closed;
                            self.handler.handle_stream_end();
                            return Ok(());
                        }
                        _ => (),
                    }
                }
                match self.tree.append_element(element) {
                    Ok(Some(done)) => self.handler.handle_stream_element(done),
                    Ok(None) => (),
                    Err(err) => return self.fail(err.into()),
                }
            }
            Phase::Closed => (),
        }
        Ok(())
    }
}

/// Incremental parser for XMPP streams.
///
/// Bytes can be fed in arbitrary pieces, the handler gets the stream start,
/// every complete top level stanza, and the stream end as they become
/// available. Any error is fatal for the stream, a new stream needs a
/// [reset()](StreamParser::reset).
pub struct StreamParser {
    parser: SaxParser,
    tree: TreeBuilder,
    root: RootState,
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            parser: SaxParser::new(),
            tree: TreeBuilder::new(),
            root: RootState {
                phase: Phase::Idle,
                name: String::new(),
                attributes: Vec::new(),
                error: None,
            },
        }
    }

    pub fn reset(&mut self) {
        self.parser.reset();
        self.tree.reset();
        self.root.phase = Phase::Idle;
        self.root.name.clear();
        self.root.attributes.clear();
        self.root.error = None;
    }

    pub fn set_buffer_limit(&mut self, limit: usize) {
        self.parser.set_buffer_limit(limit);
    }

    pub fn location(&self) -> Location {
        self.parser.location()
    }

    /// True between the stream start and the stream end.
    pub fn is_open(&self) -> bool {
        self.root.phase == Phase::Open
    }

    pub fn parse_bytes(
        &mut self,
        handler: &mut impl StreamHandler,
        bytes: &[u8],
    ) -> Result<(), StreamError> {
        let mut builder = StreamBuilder {
            root: &mut self.root,
            tree: &mut self.tree,
            handler,
        };
        match self.parser.parse_bytes(&mut builder, bytes) {
            Ok(()) => Ok(()),
            Err(SaxError::HandlerAbort) => {
                let err = self
                    .root
                    .error
                    .take()
                    .unwrap_or(StreamError::BadStream(description::NOT_A_STREAM));
                trace!(location = %self.parser.location(), "stream rejected: {err}");
                Err(err)
            }
            Err(err) => {
                trace!(location = %self.parser.location(), "stream parse error: {err}");
                Err(err.into())
            }
        }
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}
