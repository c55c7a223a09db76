/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::Element;

/// Read-only position inside an element tree.
///
/// A cursor remembers the ancestors it passed through, so it can move to the
/// parent and to the siblings of the current element, and it can compute the
/// namespace an element inherits.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    node: &'a Element,
    // ancestors from the root with the child index taken at each step
    path: Vec<(&'a Element, usize)>,
}

impl<'a> Cursor<'a> {
    pub fn new(root: &'a Element) -> Self {
        Cursor {
            node: root,
            path: Vec::new(),
        }
    }

    pub fn element(&self) -> &'a Element {
        self.node
    }

    /// Number of ancestors between this position and the cursor's root.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn parent(&self) -> Option<Cursor<'a>> {
        let mut path = self.path.clone();
        let (parent, _) = path.pop()?;
        Some(Cursor { node: parent, path })
    }

    pub fn child(&self, index: usize) -> Option<Cursor<'a>> {
        let node = self.node.children().get(index)?;
        let mut path = self.path.clone();
        path.push((self.node, index));
        Some(Cursor { node, path })
    }

    pub fn first_child(&self) -> Option<Cursor<'a>> {
        self.child(0)
    }

    /// Moves to the first child that satisfies the predicate.
    pub fn find_child(&self, mut pred: impl FnMut(&Cursor<'a>) -> bool) -> Option<Cursor<'a>> {
        (0..self.node.children().len())
            .filter_map(|index| self.child(index))
            .find(|child| pred(child))
    }

    fn sibling(&self, forward: bool) -> Option<Cursor<'a>> {
        let (parent, index) = *self.path.last()?;
        let index = if forward {
            index + 1
        } else {
            index.checked_sub(1)?
        };
        let node = parent.children().get(index)?;
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            last.1 = index;
        }
        Some(Cursor { node, path })
    }

    pub fn next_sibling(&self) -> Option<Cursor<'a>> {
        self.sibling(true)
    }

    pub fn previous_sibling(&self) -> Option<Cursor<'a>> {
        self.sibling(false)
    }

    /// Effective namespace of the current element.
    ///
    /// This is the element's own `xmlns` attribute, or the nearest one found
    /// on the ancestors.
    pub fn xmlns(&self) -> Option<&'a str> {
        let node = self.node;
        node.xmlns().or_else(|| {
            self.path
                .iter()
                .rev()
                .find_map(|&(ancestor, _)| ancestor.xmlns())
        })
    }
}
