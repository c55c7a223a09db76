/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use proptest::prelude::*;

use super::error::description::*;
use super::*;

fn check_xml(element: &Element, expected: &str) {
    let xml = element.to_string();
    assert_eq!(xml, expected);
    // Verify that the capacity is measured correctly
    assert_eq!(xml.len(), xml.capacity());
    // Verify that the Display and to_string are same
    let xml2 = format!("{}", element);
    assert_eq!(xml2, expected);
}

#[test]
fn builder() {
    let iq = Element::builder("iq")
        .attr("type", "get")
        .attr("id", "123")
        .attr("to", "a@b.c")
        .child("ping")
        .xmlns("urn:xmpp:ping")
        .build();
    check_xml(
        &iq,
        "<iq type=\"get\" id=\"123\" to=\"a@b.c\"><ping xmlns=\"urn:xmpp:ping\"/></iq>",
    );

    let msg = Element::builder("message")
        .xmlns("jabber:client")
        .child("body")
        .value("Tom & Jerry <3")
        .up()
        .child("thread")
        .value("t1")
        .build();
    check_xml(
        &msg,
        "<message xmlns=\"jabber:client\"><body>Tom &amp; Jerry &lt;3</body><thread>t1</thread></message>",
    );

    let appended = Element::builder("a")
        .append(Element::new("b"))
        .attr_opt("c", Some("d"))
        .attr_opt("e", None::<String>)
        .build();
    check_xml(&appended, "<a c=\"d\"><b/></a>");
}

#[test]
fn redundant_xmlns_is_omitted() {
    let element = Element::builder("iq")
        .xmlns("jabber:client")
        .child("query")
        .xmlns("jabber:client")
        .child("item")
        .xmlns("jabber:iq:roster")
        .build();
    check_xml(
        &element,
        "<iq xmlns=\"jabber:client\"><query><item xmlns=\"jabber:iq:roster\"/></query></iq>",
    );
}

#[test]
fn empty_value_is_not_self_closing() {
    let mut element = Element::new("a");
    check_xml(&element, "<a/>");
    element.set_value(Some(String::new()));
    check_xml(&element, "<a></a>");
}

#[test]
fn attributes() {
    let mut element = Element::new("x");
    assert_eq!(element.set_attribute("a", "1"), None);
    assert_eq!(element.set_attribute("b", "2"), None);
    assert_eq!(element.set_attribute("a", "3"), Some("1".to_string()));
    assert_eq!(element.attribute("a"), Some("3"));
    assert_eq!(
        element.attributes().collect::<Vec<_>>(),
        vec![("a", "3"), ("b", "2")]
    );
    assert_eq!(element.remove_attribute("a"), Some("3".to_string()));
    assert_eq!(element.remove_attribute("a"), None);
    check_xml(&element, "<x b=\"2\"/>");

    element.set_attribute("q", "'\"<&>");
    check_xml(&element, "<x b=\"2\" q=\"&apos;&quot;&lt;&amp;&gt;\"/>");
}

#[test]
fn parsing() {
    let element: Element = "<a/>".parse().unwrap();
    assert_eq!(element.name(), "a");
    assert_eq!(element.value(), None);
    assert!(element.children().is_empty());

    let element: Element = "<a>  </a>".parse().unwrap();
    assert_eq!(element.value(), Some("  "));

    let element: Element = "<a> <b/> </a>".parse().unwrap();
    assert_eq!(element.value(), None);
    assert_eq!(element.children().len(), 1);

    let element: Element = "<a>x<b/>y</a>".parse().unwrap();
    assert_eq!(element.value(), Some("xy"));

    let element: Element = "<?xml version='1.0'?><a><!-- c --><![CDATA[<raw>]]></a>"
        .parse()
        .unwrap();
    assert_eq!(element.value(), Some("<raw>"));
}

#[test]
fn entity_handling() {
    let element: Element = "<x>&#169;</x>".parse().unwrap();
    assert_eq!(element.value(), Some("\u{a9}"));

    let element: Element = "<x id='&a123;'/>".parse().unwrap();
    assert_eq!(element.attribute("id"), Some("&a123;"));

    assert!(matches!(
        "<x>&123;</x>".parse::<Element>(),
        Err(ElementError::BadXml(_))
    ));
}

#[test]
fn bad_documents() {
    assert_eq!(
        "<a><b></a></b>".parse::<Element>(),
        Err(ElementError::BadXml(TAG_MISMATCH))
    );
    assert_eq!(
        "<a x='1' x='2'/>".parse::<Element>(),
        Err(ElementError::BadXml(DUPLICATE_ATTRIBUTE))
    );
    assert!(matches!(
        "<x>a <<b/></x>".parse::<Element>(),
        Err(ElementError::BadXml(_))
    ));
    assert!("".parse::<Element>().is_err());
    assert!("<a>".parse::<Element>().is_err());
}

#[test]
fn prefixes() {
    let element: Element = "<s:a xmlns:s='urn:s' k='v'><s:b/><c/><t:d xmlns:t='urn:t'/></s:a>"
        .parse()
        .unwrap();
    assert_eq!(element.name(), "a");
    assert_eq!(element.xmlns(), Some("urn:s"));
    assert_eq!(element.attribute("xmlns:s"), None);
    assert_eq!(element.attribute("k"), Some("v"));
    assert_eq!(element.children()[0].name(), "b");
    assert_eq!(element.children()[0].xmlns(), Some("urn:s"));
    assert_eq!(element.children()[1].xmlns(), None);
    assert_eq!(element.children()[2].name(), "d");
    assert_eq!(element.children()[2].xmlns(), Some("urn:t"));
    check_xml(
        &element,
        "<a k=\"v\" xmlns=\"urn:s\"><b/><c/><d xmlns=\"urn:t\"/></a>",
    );

    // unbound prefixes are kept as they are
    let element: Element = "<p:x/>".parse().unwrap();
    assert_eq!(element.name(), "p:x");
}

#[test]
fn lookups() {
    let element: Element = "<iq type='result'><query xmlns='jabber:iq:roster'><item jid='a@b'/><item jid='c@d'/></query><other xmlns='urn:x'/></iq>"
        .parse()
        .unwrap();

    let item = element.find_child(&["iq", "query", "item"]).unwrap();
    assert_eq!(item.attribute("jid"), Some("a@b"));
    assert!(element.find_child(&["message", "query"]).is_none());
    assert!(element.find_child(&["iq", "nothing"]).is_none());
    assert!(element.find_child(&[]).is_none());
    assert_eq!(element.find_child(&["iq"]), Some(&element));

    let query = element.first_child_named("query").unwrap();
    assert_eq!(query.children_named("item").count(), 2);
    assert_eq!(query.children_ns("jabber:iq:roster").count(), 2);
    assert_eq!(element.children_ns("urn:x").count(), 1);
    assert!(element.child_ns("query", "jabber:iq:roster").is_some());
    assert!(element.child_ns("query", "urn:x").is_none());
}

#[test]
fn child_ns_outlives_its_arguments() {
    let element: Element = "<features><sm xmlns='urn:xmpp:sm:3'/></features>"
        .parse()
        .unwrap();
    let found = {
        let name = String::from("sm");
        let xmlns = format!("urn:xmpp:sm:{}", 3);
        element.child_ns(&name, &xmlns)
    };
    assert_eq!(found.map(Element::name), Some("sm"));
}

#[test]
fn editing() {
    let mut element = Element::new("a");
    element.add_child(Element::new("b")).set_attribute("n", "1");
    element.add_child(Element::new("c"));
    assert_eq!(element.first_child().map(Element::name), Some("b"));
    let removed = element.remove_child(0).unwrap();
    assert_eq!(removed.attribute("n"), Some("1"));
    assert!(element.remove_child(5).is_none());
    element.first_child_named_mut("c").unwrap().set_name("d");
    check_xml(&element, "<a><d/></a>");
}

#[test]
fn cursor_navigation() {
    let element: Element = "<r xmlns='urn:r'><a/><b xmlns='urn:b'><c/></b><d/></r>"
        .parse()
        .unwrap();
    let root = element.cursor();
    assert!(root.parent().is_none());
    assert!(root.next_sibling().is_none());
    assert_eq!(root.xmlns(), Some("urn:r"));

    let a = root.first_child().unwrap();
    assert_eq!(a.element().name(), "a");
    assert_eq!(a.xmlns(), Some("urn:r"));
    assert!(a.previous_sibling().is_none());

    let b = a.next_sibling().unwrap();
    assert_eq!(b.element().name(), "b");
    let c = b.first_child().unwrap();
    assert_eq!(c.depth(), 2);
    assert_eq!(c.xmlns(), Some("urn:b"));
    assert_eq!(c.parent().unwrap().element().name(), "b");
    assert_eq!(c.parent().unwrap().parent().unwrap().element().name(), "r");

    let d = b.next_sibling().unwrap();
    assert_eq!(d.element().name(), "d");
    assert!(d.next_sibling().is_none());
    assert_eq!(d.previous_sibling().unwrap().element().name(), "b");

    let found = root.find_child(|child| child.xmlns() == Some("urn:b")).unwrap();
    assert_eq!(found.element().name(), "b");
}

fn arb_attributes() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map("[a-f]{1,4}", "[a-zA-Z0-9 &<>'\"]{0,10}", 0..4)
        .prop_map(|map| map.into_iter().collect())
}

fn arb_value() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-zA-Z0-9&<>'\"]{1,10}")
}

fn make(name: String, attributes: Vec<(String, String)>, value: Option<String>) -> Element {
    let mut element = Element::new(name);
    for (name, value) in attributes {
        element.set_attribute(&name, value);
    }
    element.set_value(value);
    element
}

fn arb_element() -> impl Strategy<Value = Element> {
    let leaf = ("[a-z][a-z0-9]{0,6}", arb_attributes(), arb_value())
        .prop_map(|(name, attributes, value)| make(name, attributes, value));
    leaf.prop_recursive(3, 24, 4, |inner| {
        (
            "[a-z][a-z0-9]{0,6}",
            arb_attributes(),
            arb_value(),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(name, attributes, value, children)| {
                let mut element = make(name, attributes, value);
                for child in children {
                    element.add_child(child);
                }
                element
            })
    })
}

proptest! {
    #[test]
    fn serialize_then_parse(element in arb_element()) {
        let xml = element.to_string();
        prop_assert_eq!(xml.len(), element.str_size());
        let parsed: Element = xml.parse().unwrap();
        prop_assert_eq!(parsed, element);
    }
}
