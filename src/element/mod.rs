/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod builder;
mod cursor;
mod error;

use std::str::FromStr;

pub use builder::ElementBuilder;
pub(crate) use builder::TreeBuilder;
pub use cursor::Cursor;
pub(crate) use error::description;
pub use error::ElementError;

use crate::SaxElement;
use crate::SaxError;
use crate::SaxHandler;
use crate::SaxParser;
use crate::entities::escape;
use crate::entities::escape_fmt;
use crate::entities::escaped_size;

/// An XML element with its attributes, children and text.
///
/// Elements own their children. There is no stored parent link, navigation
/// towards the ancestors is done with a [Cursor] which remembers the path it
/// walked from the root.
///
/// The namespace of an element is its `xmlns` attribute. An element without
/// one inherits the namespace of the nearest ancestor which has it, see
/// [Cursor::xmlns()].
///
/// ```
/// use iks_client::Element;
///
/// let iq = Element::builder("iq")
///     .attr("type", "get")
///     .attr("id", "p1")
///     .child("ping")
///     .xmlns("urn:xmpp:ping")
///     .build();
/// assert_eq!(iq.to_string(), r#"<iq type="get" id="p1"><ping xmlns="urn:xmpp:ping"/></iq>"#);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    value: Option<String>,
}

pub struct Attributes<'a> {
    inner: std::slice::Iter<'a, (String, String)>,
}

impl<'a> Iterator for Attributes<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Element {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            value: None,
        }
    }

    pub fn builder(name: impl Into<String>) -> ElementBuilder {
        ElementBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute value, returns the old value if there was one.
    ///
    /// A new attribute is added after the existing ones, replacing a value
    /// keeps the attribute at its original position.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self.attributes.iter_mut().find(|(attr, _)| attr == name) {
            Some((_, old)) => Some(std::mem::replace(old, value)),
            None => {
                self.attributes.push((name.to_string(), value));
                None
            }
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(attr, _)| attr == name)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn attributes(&self) -> Attributes<'_> {
        Attributes {
            inner: self.attributes.iter(),
        }
    }

    /// The namespace declared on this element itself.
    pub fn xmlns(&self) -> Option<&str> {
        self.attribute("xmlns")
    }

    pub fn set_xmlns(&mut self, xmlns: impl Into<String>) {
        self.set_attribute("xmlns", xmlns);
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn set_value(&mut self, value: Option<String>) {
        self.value = value;
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Element> {
        &mut self.children
    }

    /// Appends a child and returns a reference to it for further editing.
    pub fn add_child(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn remove_child(&mut self, index: usize) -> Option<Element> {
        if index < self.children.len() {
            Some(self.children.remove(index))
        } else {
            None
        }
    }

    pub fn first_child(&self) -> Option<&Element> {
        self.children.first()
    }

    pub fn first_child_named(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn first_child_named_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Children whose namespace is `xmlns`, either declared or inherited from this element.
    pub fn children_ns<'a>(&'a self, xmlns: &'a str) -> impl Iterator<Item = &'a Element> {
        let own = self.xmlns();
        self.children
            .iter()
            .filter(move |child| child.xmlns().or(own) == Some(xmlns))
    }

    pub fn child_ns(&self, name: &str, xmlns: &str) -> Option<&Element> {
        let own = self.xmlns();
        self.children
            .iter()
            .find(|child| child.name == name && child.xmlns().or(own) == Some(xmlns))
    }

    /// Walks down a path of element names starting with this element.
    ///
    /// The first name must be the name of this element, each following name
    /// selects the first child with that name.
    pub fn find_child(&self, path: &[&str]) -> Option<&Element> {
        let (first, rest) = path.split_first()?;
        if *first != self.name {
            return None;
        }
        let mut current = self;
        for name in rest {
            current = current.first_child_named(name)?;
        }
        Some(current)
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }

    /// Size of the serialized form in bytes.
    pub fn str_size(&self) -> usize {
        self.str_size_in(None)
    }

    fn has_content(&self) -> bool {
        !self.children.is_empty() || self.value.is_some()
    }

    fn visible_attributes<'a>(
        &'a self,
        parent_xmlns: Option<&'a str>,
    ) -> impl Iterator<Item = &'a (String, String)> {
        self.attributes
            .iter()
            .filter(move |(name, value)| name != "xmlns" || Some(value.as_str()) != parent_xmlns)
    }

    fn str_size_in(&self, parent_xmlns: Option<&str>) -> usize {
        let mut size = 1 + self.name.len();
        for (name, value) in self.visible_attributes(parent_xmlns) {
            // space, equal sign and two quotes
            size += 4 + name.len() + escaped_size(value);
        }
        if !self.has_content() {
            return size + 2;
        }
        size += 1;
        let xmlns = self.xmlns().or(parent_xmlns);
        for child in &self.children {
            size += child.str_size_in(xmlns);
        }
        if let Some(value) = &self.value {
            size += escaped_size(value);
        }
        size + 3 + self.name.len()
    }

    fn write_into(&self, buf: &mut String, parent_xmlns: Option<&str>) {
        buf.push('<');
        buf.push_str(&self.name);
        for (name, value) in self.visible_attributes(parent_xmlns) {
            buf.push(' ');
            buf.push_str(name);
            buf.push_str("=\"");
            escape(value, buf);
            buf.push('"');
        }
        if !self.has_content() {
            buf.push_str("/>");
            return;
        }
        buf.push('>');
        let xmlns = self.xmlns().or(parent_xmlns);
        for child in &self.children {
            child.write_into(buf, xmlns);
        }
        if let Some(value) = &self.value {
            escape(value, buf);
        }
        buf.push_str("</");
        buf.push_str(&self.name);
        buf.push('>');
    }

    fn fmt_in(&self, f: &mut std::fmt::Formatter<'_>, parent_xmlns: Option<&str>) -> std::fmt::Result {
        f.write_str("<")?;
        f.write_str(&self.name)?;
        for (name, value) in self.visible_attributes(parent_xmlns) {
            f.write_str(" ")?;
            f.write_str(name)?;
            f.write_str("=\"")?;
            escape_fmt(value, f)?;
            f.write_str("\"")?;
        }
        if !self.has_content() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        let xmlns = self.xmlns().or(parent_xmlns);
        for child in &self.children {
            child.fmt_in(f, xmlns)?;
        }
        if let Some(value) = &self.value {
            escape_fmt(value, f)?;
        }
        f.write_str("</")?;
        f.write_str(&self.name)?;
        f.write_str(">")
    }

    /// Serializes the element into a string allocated with the exact size.
    #[allow(clippy::inherent_to_string_shadow_display)]
    pub fn to_string(&self) -> String {
        let mut buf = String::with_capacity(self.str_size());
        self.write_into(&mut buf, None);
        buf
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_in(f, None)
    }
}

struct ElementCollector {
    builder: TreeBuilder,
    element: Option<Element>,
}

impl SaxHandler for ElementCollector {
    fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
        if let Some(done) = self.builder.append_element(element)? {
            self.element = Some(done);
        }
        Ok(())
    }
}

impl FromStr for Element {
    type Err = ElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut collector = ElementCollector {
            builder: TreeBuilder::new(),
            element: None,
        };
        let mut parser = SaxParser::new();
        parser.parse_bytes_finish(&mut collector, s.as_bytes())?;
        collector
            .element
            .ok_or(ElementError::BadXml(description::NO_ELEMENT))
    }
}

#[cfg(test)]
mod tests;
