/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::*;
use crate::Config;
use crate::Jid;
use crate::client::Action;

fn parse(text: &str) -> Element {
    text.parse().unwrap()
}

fn context() -> Context {
    Context::new(Config::new(Jid::new("juliet@capulet.lit").unwrap()))
}

fn drain(ctx: &mut Context) -> Vec<Action> {
    std::iter::from_fn(|| ctx.next_action()).collect()
}

fn sent_elements(ctx: &mut Context) -> Vec<String> {
    drain(ctx)
        .into_iter()
        .filter_map(|action| match action {
            Action::Send(element) => Some(element.to_string()),
            _ => None,
        })
        .collect()
}

/// Enables acknowledgements as if the server agreed.
fn active(ctx: &mut Context) -> StreamManagementModule {
    let mut sm = StreamManagementModule::new();
    sm.enable(ctx);
    assert_eq!(
        sent_elements(ctx),
        vec![r#"<enable xmlns="urn:xmpp:sm:3" resume="true"/>"#]
    );
    assert_eq!(sm.state(), SmState::Negotiating);
    sm.process(
        ctx,
        &parse("<enabled xmlns='urn:xmpp:sm:3' id='some-long-sm-id' resume='true' max='600'/>"),
    )
    .unwrap();
    assert_eq!(sm.state(), SmState::Active);
    sm
}

fn send(sm: &mut StreamManagementModule, ctx: &mut Context, text: &str) {
    sm.on_event(ctx, &Event::ElementSent(parse(text)));
}

fn receive(sm: &mut StreamManagementModule, ctx: &mut Context, text: &str) {
    let element = parse(text);
    sm.on_event(ctx, &Event::ElementReceived(element.clone()));
    if sm.criteria().is_some_and(|c| c.matches(&element)) {
        sm.process(ctx, &element).unwrap();
    }
}

#[test]
fn countable_elements() {
    assert!(is_countable(&parse("<iq type='get'/>")));
    assert!(is_countable(&parse("<message xmlns='jabber:client'/>")));
    assert!(!is_countable(&parse("<a xmlns='urn:xmpp:sm:3' h='1'/>")));
    assert!(!is_countable(&parse("<r xmlns='urn:xmpp:sm:3'/>")));
    assert!(!is_countable(&parse(
        "<features xmlns='http://etherx.jabber.org/streams'/>"
    )));
    assert!(!is_countable(&parse("<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>")));
    assert!(!is_countable(&parse(
        "<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='PLAIN'/>"
    )));
    assert!(!is_countable(&parse("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")));

    // built for sending: prefixed name, namespace only on the child
    let error = Element::builder("stream:error")
        .child("bad-format")
        .xmlns("urn:ietf:params:xml:ns:xmpp-streams")
        .build();
    assert_eq!(error.xmlns(), None);
    assert!(!is_countable(&error));
    assert!(!is_countable(&Element::new("stream:features")));
}

#[test]
fn stream_errors_are_not_queued() {
    let mut ctx = context();
    let mut sm = active(&mut ctx);
    send(&mut sm, &mut ctx, "<presence/>");
    let error = Element::builder("stream:error")
        .child("unsupported-stanza-type")
        .xmlns("urn:ietf:params:xml:ns:xmpp-streams")
        .build();
    sm.on_event(&mut ctx, &Event::ElementSent(error));
    assert_eq!(sm.outgoing_count(), 1);
    assert_eq!(sm.queue_len(), 1);
}

#[test]
fn enabled_event() {
    let mut ctx = context();
    let sm = active(&mut ctx);
    assert_eq!(sm.resumption_id(), Some("some-long-sm-id"));
    assert_eq!(ctx.resumption_id(), Some("some-long-sm-id"));
    assert_eq!(sm.max_resumption_time(), Some(600));
    let events: Vec<Event> = drain(&mut ctx)
        .into_iter()
        .filter_map(|action| match action {
            Action::Fire(event) => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(
        events,
        vec![Event::StreamManagementEnabled {
            id: Some("some-long-sm-id".into()),
            resume: true,
            max: Some(600),
        }]
    );
}

#[test]
fn counting() {
    let mut ctx = context();
    let mut sm = active(&mut ctx);

    send(&mut sm, &mut ctx, "<iq type='get' id='1'/>");
    send(&mut sm, &mut ctx, "<presence/>");
    send(&mut sm, &mut ctx, "<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>");
    assert_eq!(sm.outgoing_count(), 2);
    assert_eq!(sm.queue_len(), 2);

    receive(&mut sm, &mut ctx, "<message><body>hi</body></message>");
    receive(&mut sm, &mut ctx, "<a xmlns='urn:xmpp:sm:3' h='0'/>");
    assert_eq!(sm.incoming_count(), 1);
}

#[test]
fn nothing_is_counted_before_enable() {
    let mut ctx = context();
    let mut sm = StreamManagementModule::new();
    send(&mut sm, &mut ctx, "<presence/>");
    receive(&mut sm, &mut ctx, "<presence/>");
    assert_eq!(sm.outgoing_count(), 0);
    assert_eq!(sm.incoming_count(), 0);
    assert_eq!(sm.queue_len(), 0);
}

#[test]
fn answers_ack_requests() {
    let mut ctx = context();
    let mut sm = active(&mut ctx);
    drain(&mut ctx);
    receive(&mut sm, &mut ctx, "<presence/>");
    receive(&mut sm, &mut ctx, "<message/>");
    receive(&mut sm, &mut ctx, "<r xmlns='urn:xmpp:sm:3'/>");
    assert_eq!(
        sent_elements(&mut ctx),
        vec![r#"<a xmlns="urn:xmpp:sm:3" h="2"/>"#]
    );
    assert_eq!(sm.incoming_count(), 2);
}

#[test]
fn acknowledgements() {
    let mut ctx = context();
    let mut sm = active(&mut ctx);
    let request = ctx
        .write(parse("<iq type='get' id='q1' to='capulet.lit'/>"))
        .unwrap();
    drain(&mut ctx);

    send(&mut sm, &mut ctx, "<iq type='get' id='q1' to='capulet.lit'/>");
    send(&mut sm, &mut ctx, "<message id='m1'/>");
    send(&mut sm, &mut ctx, "<message id='m2'/>");
    assert_eq!(sm.queue_len(), 3);

    receive(&mut sm, &mut ctx, "<a xmlns='urn:xmpp:sm:3' h='1'/>");
    assert_eq!(sm.queue_len(), 2);
    assert_eq!(sm.acknowledged_count(), 1);
    assert!(request.is_delivery_confirmed());
    assert!(!request.is_completed());

    // more than sent is ignored
    receive(&mut sm, &mut ctx, "<a xmlns='urn:xmpp:sm:3' h='7'/>");
    assert_eq!(sm.queue_len(), 2);
    assert_eq!(sm.acknowledged_count(), 1);

    // stale counts too
    receive(&mut sm, &mut ctx, "<a xmlns='urn:xmpp:sm:3' h='0'/>");
    assert_eq!(sm.queue_len(), 2);

    receive(&mut sm, &mut ctx, "<a xmlns='urn:xmpp:sm:3' h='3'/>");
    assert_eq!(sm.queue_len(), 0);
}

#[test]
fn tick_requests_acknowledgement() {
    let mut ctx = context();
    let mut sm = active(&mut ctx);
    drain(&mut ctx);
    let now = std::time::Instant::now();

    sm.on_event(&mut ctx, &Event::Tick(now));
    assert!(sent_elements(&mut ctx).is_empty());

    send(&mut sm, &mut ctx, "<presence/>");
    sm.on_event(&mut ctx, &Event::Tick(now));
    sm.on_event(&mut ctx, &Event::Tick(now));
    assert_eq!(sent_elements(&mut ctx), vec![r#"<r xmlns="urn:xmpp:sm:3"/>"#]);

    receive(&mut sm, &mut ctx, "<a xmlns='urn:xmpp:sm:3' h='1'/>");
    sm.on_event(&mut ctx, &Event::Tick(now));
    assert!(sent_elements(&mut ctx).is_empty());
}

#[test]
fn resumption_replays_unacknowledged() {
    let mut ctx = context();
    let mut sm = active(&mut ctx);
    drain(&mut ctx);
    for n in 1..=5 {
        send(&mut sm, &mut ctx, &format!("<message id='m{n}'/>"));
    }
    receive(&mut sm, &mut ctx, "<presence/>");

    sm.on_event(&mut ctx, &Event::Cleared(Scope::DISCONNECT.to_vec()));
    assert_eq!(sm.state(), SmState::AwaitingResume);
    assert_eq!(sm.queue_len(), 5);

    sm.on_event(&mut ctx, &Event::ResumeRequested);
    assert_eq!(
        sent_elements(&mut ctx),
        vec![r#"<resume xmlns="urn:xmpp:sm:3" h="1" previd="some-long-sm-id"/>"#]
    );

    receive(
        &mut sm,
        &mut ctx,
        "<resumed xmlns='urn:xmpp:sm:3' h='3' previd='some-long-sm-id'/>",
    );
    assert_eq!(sm.state(), SmState::Active);
    assert_eq!(sm.outgoing_count(), 5);
    assert_eq!(sm.queue_len(), 2);
    let actions = drain(&mut ctx);
    let replayed: Vec<String> = actions
        .iter()
        .filter_map(|action| match action {
            Action::Replay(element) => Some(element.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(replayed, vec![r#"<message id="m4"/>"#, r#"<message id="m5"/>"#]);
    assert!(!actions.iter().any(|action| matches!(action, Action::Send(_))));
    assert!(actions.iter().any(|action| matches!(
        action,
        Action::Fire(Event::StreamResumed { h: 3, previd }) if previd == "some-long-sm-id"
    )));

    receive(&mut sm, &mut ctx, "<a xmlns='urn:xmpp:sm:3' h='5'/>");
    assert_eq!(sm.queue_len(), 0);
    assert_eq!(sm.acknowledged_count(), 5);
}

#[test]
fn failed_resumption_resets() {
    let mut ctx = context();
    let mut sm = active(&mut ctx);
    send(&mut sm, &mut ctx, "<presence/>");
    sm.on_event(&mut ctx, &Event::Cleared(Scope::DISCONNECT.to_vec()));
    sm.on_event(&mut ctx, &Event::ResumeRequested);
    drain(&mut ctx);

    receive(
        &mut sm,
        &mut ctx,
        "<failed xmlns='urn:xmpp:sm:3'>\
         <item-not-found xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/>\
         </failed>",
    );
    assert_eq!(sm.state(), SmState::Inactive);
    assert_eq!(sm.queue_len(), 0);
    assert_eq!(sm.outgoing_count(), 0);
    assert_eq!(sm.resumption_id(), None);
    assert_eq!(ctx.resumption_id(), None);
    assert!(drain(&mut ctx).iter().any(|action| matches!(
        action,
        Action::Fire(Event::StreamManagementFailed(ErrorCondition::ItemNotFound))
    )));
}

#[test]
fn session_clear_resets() {
    let mut ctx = context();
    let mut sm = active(&mut ctx);
    send(&mut sm, &mut ctx, "<presence/>");
    sm.on_event(&mut ctx, &Event::Cleared(Scope::STOP.to_vec()));
    assert_eq!(sm.state(), SmState::Inactive);
    assert_eq!(sm.queue_len(), 0);
    assert!(!sm.resume(&mut ctx));
}

#[test]
fn enable_after_binding() {
    let mut ctx = context();
    let mut sm = StreamManagementModule::new();
    let jid = Jid::new("juliet@capulet.lit/balcony").unwrap();

    sm.on_event(&mut ctx, &Event::Bound(jid.clone()));
    assert_eq!(sm.state(), SmState::Inactive);

    ctx.set_stream_features(parse(
        "<features xmlns='http://etherx.jabber.org/streams'><sm xmlns='urn:xmpp:sm:3'/></features>",
    ));
    sm.on_event(&mut ctx, &Event::Bound(jid));
    assert_eq!(sm.state(), SmState::Negotiating);
    assert_eq!(
        sent_elements(&mut ctx),
        vec![r#"<enable xmlns="urn:xmpp:sm:3" resume="true"/>"#]
    );
}
