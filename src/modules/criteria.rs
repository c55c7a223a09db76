/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Debug;
use std::ops::Not;
use std::sync::Arc;

use crate::Cursor;
use crate::Element;

type Predicate = Arc<dyn Fn(&Cursor<'_>) -> bool + Send + Sync>;

/// Composable predicate deciding which elements a module processes.
///
/// ```
/// use iks_client::{Criteria, Element};
///
/// let ping = Criteria::chain([Criteria::name("iq"), Criteria::xmlns("urn:xmpp:ping")]);
/// let iq: Element = "<iq type='get'><ping xmlns='urn:xmpp:ping'/></iq>".parse().unwrap();
/// assert!(ping.matches(&iq));
/// ```
#[derive(Clone)]
pub enum Criteria {
    Name(String),
    /// Effective namespace, inherited from the ancestors when not set.
    Xmlns(String),
    NameAndXmlns(String, String),
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    Not(Box<Criteria>),
    /// First step matches the element, each next step one of the direct
    /// children of the previous match.
    Chain(Vec<Criteria>),
    Custom(Predicate),
}

impl Criteria {
    pub fn name(name: impl Into<String>) -> Criteria {
        Criteria::Name(name.into())
    }

    pub fn xmlns(xmlns: impl Into<String>) -> Criteria {
        Criteria::Xmlns(xmlns.into())
    }

    pub fn name_and_xmlns(name: impl Into<String>, xmlns: impl Into<String>) -> Criteria {
        Criteria::NameAndXmlns(name.into(), xmlns.into())
    }

    pub fn chain(steps: impl IntoIterator<Item = Criteria>) -> Criteria {
        Criteria::Chain(steps.into_iter().collect())
    }

    pub fn custom<F>(predicate: F) -> Criteria
    where
        F: Fn(&Cursor<'_>) -> bool + Send + Sync + 'static,
    {
        Criteria::Custom(Arc::new(predicate))
    }

    pub fn and(self, other: Criteria) -> Criteria {
        match self {
            Criteria::And(mut all) => {
                all.push(other);
                Criteria::And(all)
            }
            first => Criteria::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Criteria) -> Criteria {
        match self {
            Criteria::Or(mut any) => {
                any.push(other);
                Criteria::Or(any)
            }
            first => Criteria::Or(vec![first, other]),
        }
    }

    pub fn matches(&self, element: &Element) -> bool {
        self.matches_at(&element.cursor())
    }

    pub fn matches_at(&self, cursor: &Cursor<'_>) -> bool {
        match self {
            Criteria::Name(name) => cursor.element().name() == name,
            Criteria::Xmlns(xmlns) => cursor.xmlns() == Some(xmlns.as_str()),
            Criteria::NameAndXmlns(name, xmlns) => {
                cursor.element().name() == name && cursor.xmlns() == Some(xmlns.as_str())
            }
            Criteria::And(all) => all.iter().all(|c| c.matches_at(cursor)),
            Criteria::Or(any) => any.iter().any(|c| c.matches_at(cursor)),
            Criteria::Not(inner) => !inner.matches_at(cursor),
            Criteria::Chain(steps) => {
                let Some((first, rest)) = steps.split_first() else {
                    return false;
                };
                if !first.matches_at(cursor) {
                    return false;
                }
                let mut current = cursor.clone();
                for step in rest {
                    match current.find_child(|child| step.matches_at(child)) {
                        Some(child) => current = child,
                        None => return false,
                    }
                }
                true
            }
            Criteria::Custom(predicate) => predicate(cursor),
        }
    }
}

impl Not for Criteria {
    type Output = Criteria;

    fn not(self) -> Criteria {
        Criteria::Not(Box::new(self))
    }
}

impl Debug for Criteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Criteria::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Criteria::Xmlns(xmlns) => f.debug_tuple("Xmlns").field(xmlns).finish(),
            Criteria::NameAndXmlns(name, xmlns) => f
                .debug_tuple("NameAndXmlns")
                .field(name)
                .field(xmlns)
                .finish(),
            Criteria::And(all) => f.debug_tuple("And").field(all).finish(),
            Criteria::Or(any) => f.debug_tuple("Or").field(any).finish(),
            Criteria::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Criteria::Chain(steps) => f.debug_tuple("Chain").field(steps).finish(),
            Criteria::Custom(_) => f.write_str("Custom"),
        }
    }
}
