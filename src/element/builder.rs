/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::SaxElement;

use super::Element;
use super::ElementError;
use super::error::description;

/// Fluent construction of element trees.
///
/// The builder keeps a current position: [child()](ElementBuilder::child)
/// moves into a new child, [up()](ElementBuilder::up) moves back to the
/// parent, attribute and value calls apply to the current element.
pub struct ElementBuilder {
    stack: Vec<Element>,
}

impl ElementBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ElementBuilder {
            stack: vec![Element::new(name)],
        }
    }

    fn current(&mut self) -> &mut Element {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.current().set_attribute(name, value);
        self
    }

    /// Sets an attribute only when there is a value for it.
    pub fn attr_opt(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.attr(name, value),
            None => self,
        }
    }

    pub fn xmlns(self, xmlns: impl Into<String>) -> Self {
        self.attr("xmlns", xmlns)
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.current().set_value(Some(value.into()));
        self
    }

    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.stack.push(Element::new(name));
        self
    }

    /// Appends an already built element to the current one.
    pub fn append(mut self, element: Element) -> Self {
        self.current().add_child(element);
        self
    }

    pub fn up(mut self) -> Self {
        if self.stack.len() > 1 {
            if let Some(done) = self.stack.pop() {
                self.current().add_child(done);
            }
        }
        self
    }

    pub fn build(mut self) -> Element {
        while self.stack.len() > 1 {
            self = self.up();
        }
        self.stack.pop().unwrap_or_default()
    }
}

/// Assembles elements from the SAX events of the parser.
///
/// Namespace prefixes declared with `xmlns:p` attributes are resolved with
/// the element scoping rules: a prefixed element `p:name` becomes `name`
/// with an `xmlns` attribute, and the declaration is dropped from it.
pub(crate) struct TreeBuilder {
    stack: Vec<Element>,
    tags: Vec<String>,
    texts: Vec<String>,
    scopes: Vec<Vec<(String, String)>>,
    base_scope: Vec<(String, String)>,
}

impl TreeBuilder {
    pub(crate) fn new() -> Self {
        TreeBuilder {
            stack: Vec::new(),
            tags: Vec::new(),
            texts: Vec::new(),
            scopes: Vec::new(),
            base_scope: Vec::new(),
        }
    }

    /// Declares a prefix visible to every element built afterwards.
    pub(crate) fn declare(&mut self, prefix: &str, uri: &str) {
        self.base_scope.retain(|(p, _)| p != prefix);
        self.base_scope.push((prefix.to_string(), uri.to_string()));
    }

    pub(crate) fn reset(&mut self) {
        self.stack.clear();
        self.tags.clear();
        self.texts.clear();
        self.scopes.clear();
        self.base_scope.clear();
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .chain(std::iter::once(&self.base_scope))
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn resolve_top(&mut self) {
        let Some(element) = self.stack.last() else {
            return;
        };
        let Some((prefix, local)) = element.name().split_once(':') else {
            return;
        };
        let Some(uri) = self.lookup(prefix) else {
            return;
        };
        let uri = uri.to_string();
        let prefix = prefix.to_string();
        let local = local.to_string();
        if let Some(element) = self.stack.last_mut() {
            element.set_name(local);
            element.remove_attribute(&format!("xmlns:{prefix}"));
            element.set_xmlns(uri);
        }
    }

    fn close_top(&mut self) -> Option<Element> {
        let mut element = self.stack.pop()?;
        self.tags.pop();
        self.scopes.pop();
        let text = self.texts.pop().unwrap_or_default();
        let whitespace_only = text.chars().all(|c| c.is_ascii_whitespace());
        if !text.is_empty() && !(whitespace_only && !element.children().is_empty()) {
            element.set_value(Some(text));
        }
        match self.stack.last_mut() {
            Some(parent) => {
                parent.add_child(element);
                None
            }
            None => Some(element),
        }
    }

    /// Feeds one SAX event, returns an element when its outermost tag closes.
    pub(crate) fn append_element(
        &mut self,
        element: &SaxElement,
    ) -> Result<Option<Element>, ElementError> {
        match element {
            SaxElement::StartTag(name) => {
                self.stack.push(Element::new(*name));
                self.tags.push(name.to_string());
                self.texts.push(String::new());
                self.scopes.push(Vec::new());
            }
            SaxElement::Attribute(name, value) => {
                let Some(top) = self.stack.last_mut() else {
                    return Err(ElementError::BadXml(description::NO_ELEMENT));
                };
                if top.attribute(name).is_some() {
                    return Err(ElementError::BadXml(description::DUPLICATE_ATTRIBUTE));
                }
                top.set_attribute(name, *value);
                if let Some(prefix) = name.strip_prefix("xmlns:") {
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.push((prefix.to_string(), value.to_string()));
                    }
                }
            }
            SaxElement::StartTagContent => self.resolve_top(),
            SaxElement::StartTagEmpty => {
                self.resolve_top();
                return Ok(self.close_top());
            }
            SaxElement::CData(text) => {
                if let Some(buf) = self.texts.last_mut() {
                    buf.push_str(text);
                }
            }
            SaxElement::EndTag(name) => {
                if self.tags.last().map(String::as_str) != Some(*name) {
                    return Err(ElementError::BadXml(description::TAG_MISMATCH));
                }
                return Ok(self.close_top());
            }
        }
        Ok(None)
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
