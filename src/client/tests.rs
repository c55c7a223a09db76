/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::time::Duration;

use parking_lot::Mutex;

use super::*;
use crate::Criteria;
use crate::RequestResult;
use crate::SmState;
use crate::StreamManagementModule;

const SERVER_STREAM: &str = "<stream:stream xmlns='jabber:client' \
    xmlns:stream='http://etherx.jabber.org/streams' id='c2s-1' from='capulet.lit' version='1.0'>";

const PING: &str = "<iq type='get' id='123' to='a@b.c'><ping xmlns='urn:xmpp:ping'/></iq>";

fn parse(text: &str) -> Element {
    text.parse().unwrap()
}

fn config() -> ConfigBuilder {
    Config::builder(Jid::new("juliet@capulet.lit").unwrap())
        .password("r0m30")
        .resource("balcony")
        .tick_interval(Duration::from_secs(3600))
}

fn features(content: &str) -> String {
    format!("<stream:features>{content}</stream:features>")
}

fn record(client: &Client<MemoryTransport>, event_type: &str) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    client
        .events()
        .register(event_type, move |event| sink.lock().push(event.clone()));
    events
}

struct Server {
    pipe: MemoryTransport,
}

impl Server {
    fn feed(&self, client: &mut Client<MemoryTransport>, text: &str) {
        self.pipe.push_inbound(text);
        client.poll().unwrap();
    }

    fn sent(&self) -> String {
        self.pipe.take_sent()
    }
}

fn start(config: Config) -> (Client<MemoryTransport>, Server) {
    let pipe = MemoryTransport::new();
    let client = Client::builder(config, pipe.clone()).build().unwrap();
    (client, Server { pipe })
}

const MECHANISMS: &str = "<mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
    <mechanism>PLAIN</mechanism></mechanisms>";

const BIND_AND_SM: &str =
    "<bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/><sm xmlns='urn:xmpp:sm:3'/>";

/// Authenticates on a plain connection, up to the new stream after SASL.
fn authenticate(client: &mut Client<MemoryTransport>, server: &Server) {
    client.connect().unwrap();
    assert_eq!(server.sent(), stream_header(client.config()));
    server.feed(client, &format!("{SERVER_STREAM}{}", features(MECHANISMS)));
    assert_eq!(
        server.sent(),
        r#"<auth xmlns="urn:ietf:params:xml:ns:xmpp-sasl" mechanism="PLAIN">AGp1bGlldAByMG0zMA==</auth>"#
    );
    server.feed(client, "<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>");
    assert_eq!(server.sent(), stream_header(client.config()));
}

fn bind(client: &mut Client<MemoryTransport>, server: &Server) {
    let request = parse(&server.sent());
    assert_eq!(
        request.find_child(&["iq", "bind", "resource"]).and_then(Element::value),
        Some("balcony")
    );
    let id = request.attribute("id").unwrap();
    server.feed(
        client,
        &format!(
            "<iq type='result' id='{id}'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
             <jid>juliet@capulet.lit/balcony</jid></bind></iq>"
        ),
    );
}

fn established() -> (Client<MemoryTransport>, Server) {
    let (mut client, server) = start(config().use_tls(false).build());
    authenticate(&mut client, &server);
    server.feed(&mut client, &format!("{SERVER_STREAM}{}", features(BIND_AND_SM)));
    bind(&mut client, &server);
    assert_eq!(server.sent(), r#"<enable xmlns="urn:xmpp:sm:3" resume="true"/>"#);
    server.feed(
        &mut client,
        "<enabled xmlns='urn:xmpp:sm:3' id='sm-1' resume='true' max='300'/>",
    );
    assert_eq!(client.session_state(), SessionState::Established);
    (client, server)
}

fn sm(client: &Client<MemoryTransport>) -> &StreamManagementModule {
    client.module::<StreamManagementModule>().unwrap()
}

#[test]
fn full_negotiation() {
    let (mut client, server) = start(config().build());
    let states = record(&client, "session-state-changed");
    let connector = record(&client, "connector-state-changed");

    client.connect().unwrap();
    assert_eq!(server.sent(), stream_header(client.config()));
    assert_eq!(client.connector_state(), ConnectorState::Connected);
    assert_eq!(client.session_state(), SessionState::Negotiating);

    server.feed(
        &mut client,
        &format!(
            "{SERVER_STREAM}{}",
            features(&format!(
                "<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>{MECHANISMS}"
            ))
        ),
    );
    assert_eq!(server.sent(), r#"<starttls xmlns="urn:ietf:params:xml:ns:xmpp-tls"/>"#);

    server.feed(&mut client, "<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>");
    assert!(client.context().is_secure());
    assert_eq!(server.sent(), stream_header(client.config()));

    server.feed(&mut client, &format!("{SERVER_STREAM}{}", features(MECHANISMS)));
    assert_eq!(
        server.sent(),
        r#"<auth xmlns="urn:ietf:params:xml:ns:xmpp-sasl" mechanism="PLAIN">AGp1bGlldAByMG0zMA==</auth>"#
    );

    server.feed(&mut client, "<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>");
    assert!(client.context().is_authenticated());
    assert_eq!(server.sent(), stream_header(client.config()));

    server.feed(&mut client, &format!("{SERVER_STREAM}{}", features(BIND_AND_SM)));
    bind(&mut client, &server);
    let jid = Jid::new("juliet@capulet.lit/balcony").unwrap();
    assert_eq!(client.context().bound_jid(), Some(&jid));
    assert_eq!(server.sent(), r#"<enable xmlns="urn:xmpp:sm:3" resume="true"/>"#);

    server.feed(
        &mut client,
        "<enabled xmlns='urn:xmpp:sm:3' id='sm-1' resume='true' max='300'/>",
    );
    assert_eq!(sm(&client).state(), SmState::Active);
    assert_eq!(client.context().resumption_id(), Some("sm-1"));

    assert_eq!(
        *states.lock(),
        vec![
            Event::SessionStateChanged {
                old: SessionState::Stopped,
                new: SessionState::Negotiating,
            },
            Event::SessionStateChanged {
                old: SessionState::Negotiating,
                new: SessionState::Established,
            },
        ]
    );
    assert_eq!(
        *connector.lock(),
        vec![
            Event::ConnectorStateChanged {
                old: ConnectorState::Disconnected,
                new: ConnectorState::Connecting,
            },
            Event::ConnectorStateChanged {
                old: ConnectorState::Connecting,
                new: ConnectorState::Connected,
            },
        ]
    );
}

#[test]
fn authentication_failure() {
    let (mut client, server) = start(config().use_tls(false).build());
    client.connect().unwrap();
    server.sent();
    server.feed(&mut client, &format!("{SERVER_STREAM}{}", features(MECHANISMS)));
    server.sent();
    server.feed(
        &mut client,
        "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>",
    );
    assert_eq!(server.sent(), STREAM_END);
    assert_eq!(client.session_state(), SessionState::Failed);
    assert_eq!(client.connector_state(), ConnectorState::Disconnected);
}

#[test]
fn ping_round_trip() {
    let (mut client, server) = established();
    let responses = record(&client, "response-received");

    let request = client.write(parse(PING)).unwrap();
    assert_eq!(
        server.sent(),
        r#"<iq type="get" id="123" to="a@b.c"><ping xmlns="urn:xmpp:ping"/></iq>"#
    );
    assert_eq!(sm(&client).outgoing_count(), 1);
    assert!(!request.is_completed());

    server.feed(&mut client, "<iq type='result' id='123' from='a@b.c'/>");
    assert!(request.result().is_some_and(|result| result.is_success()));
    assert_eq!(responses.lock().len(), 1);
    assert_eq!(sm(&client).incoming_count(), 1);
    // a response needs no answer
    assert_eq!(server.sent(), "");
}

#[test]
fn ping_error() {
    let (mut client, server) = established();
    let request = client.write(parse(PING)).unwrap();
    server.sent();
    server.feed(
        &mut client,
        "<iq type='error' id='123' from='a@b.c'><error type='cancel'>\
         <not-allowed xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></iq>",
    );
    assert!(matches!(
        request.result(),
        Some(RequestResult::Error {
            condition: ErrorCondition::NotAllowed,
            ..
        })
    ));
}

#[test]
fn response_from_the_wrong_sender() {
    let (mut client, server) = established();
    let request = client.write(parse(PING)).unwrap();
    server.sent();
    server.feed(&mut client, "<iq type='result' id='123' from='mallory@b.c'/>");
    assert!(!request.is_completed());
    assert_eq!(server.sent(), "");
    server.feed(&mut client, "<iq type='result' id='123' from='a@b.c/res'/>");
    assert!(request.is_completed());
}

#[test]
fn answers_pings() {
    let (mut client, server) = established();
    server.feed(
        &mut client,
        "<iq type='get' id='s2c1' from='capulet.lit'><ping xmlns='urn:xmpp:ping'/></iq>",
    );
    assert_eq!(server.sent(), r#"<iq type="result" id="s2c1" to="capulet.lit"/>"#);
    assert_eq!(client.ping(None).unwrap().stanza().attribute("to"), None);
}

#[test]
fn unsupported_iq_gets_an_error() {
    let (mut client, server) = established();
    server.feed(
        &mut client,
        "<iq type='get' id='v1' from='romeo@montague.lit/orchard'>\
         <query xmlns='jabber:iq:version'/></iq>",
    );
    let reply = parse(&server.sent());
    assert_eq!(reply.attribute("type"), Some("error"));
    assert_eq!(reply.attribute("id"), Some("v1"));
    assert_eq!(reply.attribute("to"), Some("romeo@montague.lit/orchard"));
    assert_eq!(
        ErrorCondition::from_stanza(&reply),
        Some((ErrorCondition::FeatureNotImplemented, None))
    );

    // errors are never answered
    server.feed(
        &mut client,
        "<message type='error' from='romeo@montague.lit'><error type='cancel'>\
         <gone xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></message>",
    );
    assert_eq!(server.sent(), "");
    assert!(client.is_connected());
}

#[test]
fn unknown_element_ends_the_stream() {
    let (mut client, server) = established();
    server.feed(&mut client, "<foo xmlns='urn:example:foo'/>");
    assert_eq!(
        server.sent(),
        "<stream:error><unsupported-stanza-type xmlns=\"urn:ietf:params:xml:ns:xmpp-streams\"/>\
         </stream:error></stream:stream>"
    );
    assert_eq!(client.connector_state(), ConnectorState::Disconnected);
    assert_eq!(client.session_state(), SessionState::Interrupted);
    assert_eq!(sm(&client).outgoing_count(), 0);
    assert_eq!(sm(&client).queue_len(), 0);
}

#[test]
fn stream_error_from_the_server() {
    let (mut client, server) = established();
    let errors = record(&client, "stream-error");
    server.feed(
        &mut client,
        "<stream:error><conflict xmlns='urn:ietf:params:xml:ns:xmpp-streams'/></stream:error>",
    );
    assert_eq!(*errors.lock(), vec![Event::StreamError("conflict".into())]);
    assert_eq!(server.sent(), STREAM_END);
    assert_eq!(client.connector_state(), ConnectorState::Disconnected);
}

#[test]
fn parse_error_is_fatal() {
    let (mut client, server) = established();
    let errors = record(&client, "parse-error");
    server.pipe.push_inbound("<message><body>hi</message>");
    assert!(matches!(client.poll(), Err(ClientError::Stream(_))));
    assert_eq!(errors.lock().len(), 1);
    assert!(server.sent().starts_with("<stream:error><bad-format"));
    assert_eq!(client.connector_state(), ConnectorState::Disconnected);
}

#[test]
fn stream_errors_are_not_replayed() {
    let (mut client, server) = established();
    client
        .write_directly(parse("<presence><show>away</show></presence>"))
        .unwrap();
    server.sent();
    server.pipe.push_inbound("<message><body>hi</message>");
    assert!(client.poll().is_err());
    assert!(server.sent().starts_with("<stream:error><bad-format"));
    assert_eq!(sm(&client).outgoing_count(), 1);
    assert_eq!(sm(&client).queue_len(), 1);

    authenticate(&mut client, &server);
    server.feed(&mut client, &format!("{SERVER_STREAM}{}", features(BIND_AND_SM)));
    assert_eq!(
        server.sent(),
        r#"<resume xmlns="urn:xmpp:sm:3" h="0" previd="sm-1"/>"#
    );
    server.feed(
        &mut client,
        "<resumed xmlns='urn:xmpp:sm:3' h='0' previd='sm-1'/>",
    );
    assert_eq!(server.sent(), "<presence><show>away</show></presence>");
    assert!(client.is_connected());
    assert_eq!(client.session_state(), SessionState::Established);
}

#[test]
fn data_before_a_stream_restart_is_discarded() {
    let (mut client, server) = start(config().build());
    client.connect().unwrap();
    server.sent();
    server.feed(
        &mut client,
        &format!(
            "{SERVER_STREAM}{}",
            features("<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>")
        ),
    );
    assert_eq!(server.sent(), r#"<starttls xmlns="urn:ietf:params:xml:ns:xmpp-tls"/>"#);

    let received = record(&client, "element-received");
    server.feed(
        &mut client,
        "<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>         <message from='mallory@evil.lit'><body>injected</body></message>",
    );
    assert!(client.context().is_secure());
    assert_eq!(server.sent(), stream_header(client.config()));
    assert_eq!(
        *received.lock(),
        vec![Event::ElementReceived(parse(
            "<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>"
        ))]
    );

    server.feed(&mut client, &format!("{SERVER_STREAM}{}", features(MECHANISMS)));
    assert!(server.sent().starts_with("<auth"));
    assert_eq!(received.lock().len(), 2);
}

#[test]
fn server_closing_the_stream() {
    let (mut client, server) = established();
    server.feed(&mut client, "</stream:stream>");
    assert_eq!(server.sent(), STREAM_END);
    assert!(!client.is_connected());
    assert!(!client.poll().unwrap());
}

#[test]
fn resumption_after_a_drop() {
    let (mut client, server) = established();
    client
        .write_directly(parse("<message id='m1'><body>one</body></message>"))
        .unwrap();
    client
        .write_directly(parse("<message id='m2'><body>two</body></message>"))
        .unwrap();
    server.sent();
    server.feed(&mut client, "<a xmlns='urn:xmpp:sm:3' h='1'/>");
    assert_eq!(sm(&client).queue_len(), 1);

    server.pipe.close_by_peer();
    assert!(!client.poll().unwrap());
    assert_eq!(client.connector_state(), ConnectorState::Disconnected);
    assert_eq!(client.session_state(), SessionState::Interrupted);
    assert_eq!(sm(&client).state(), SmState::AwaitingResume);
    assert!(matches!(client.write(parse(PING)), Err(ClientError::NotConnected)));

    authenticate(&mut client, &server);
    server.feed(&mut client, &format!("{SERVER_STREAM}{}", features(BIND_AND_SM)));
    assert_eq!(
        server.sent(),
        r#"<resume xmlns="urn:xmpp:sm:3" h="0" previd="sm-1"/>"#
    );

    let sent = record(&client, "element-sent");
    server.feed(
        &mut client,
        "<resumed xmlns='urn:xmpp:sm:3' h='1' previd='sm-1'/>",
    );
    assert_eq!(server.sent(), r#"<message id="m2"><body>two</body></message>"#);
    assert!(sent.lock().is_empty());
    assert_eq!(client.session_state(), SessionState::Established);
    assert_eq!(sm(&client).state(), SmState::Active);
    assert_eq!(sm(&client).outgoing_count(), 2);
    assert_eq!(sm(&client).queue_len(), 1);
}

#[test]
fn failed_resumption_binds_a_new_session() {
    let (mut client, server) = established();
    server.pipe.close_by_peer();
    assert!(!client.poll().unwrap());

    authenticate(&mut client, &server);
    server.feed(&mut client, &format!("{SERVER_STREAM}{}", features(BIND_AND_SM)));
    assert!(server.sent().starts_with("<resume"));

    server.feed(
        &mut client,
        "<failed xmlns='urn:xmpp:sm:3'>\
         <item-not-found xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></failed>",
    );
    assert_eq!(sm(&client).state(), SmState::Inactive);
    bind(&mut client, &server);
    assert_eq!(server.sent(), r#"<enable xmlns="urn:xmpp:sm:3" resume="true"/>"#);
    assert_eq!(client.session_state(), SessionState::Established);
}

#[test]
fn user_disconnect_ends_the_session() {
    let (mut client, server) = established();
    let request = client.write(parse(PING)).unwrap();
    server.sent();

    client.disconnect().unwrap();
    assert_eq!(server.sent(), STREAM_END);
    assert_eq!(client.connector_state(), ConnectorState::Disconnected);
    assert_eq!(client.session_state(), SessionState::Stopped);
    assert_eq!(request.result(), Some(RequestResult::Timeout));
    assert_eq!(client.context().resumption_id(), None);
    assert_eq!(sm(&client).state(), SmState::Inactive);
}

#[test]
fn requests_time_out_on_tick() {
    let (mut client, server) = established();
    let request = client.write(parse(PING)).unwrap();
    server.sent();

    client.tick(Instant::now()).unwrap();
    assert!(!request.is_completed());
    // the tick also asks for an acknowledgement of the ping
    assert_eq!(server.sent(), r#"<r xmlns="urn:xmpp:sm:3"/>"#);

    client.tick(Instant::now() + Duration::from_secs(31)).unwrap();
    assert_eq!(request.result(), Some(RequestResult::Timeout));
}

#[test]
fn write_needs_a_connection() {
    let (mut client, _server) = start(config().build());
    assert!(matches!(client.write(parse(PING)), Err(ClientError::NotConnected)));
    assert!(matches!(
        client.write_directly(parse("<presence/>")),
        Err(ClientError::NotConnected)
    ));
}

/// Answers every chat message with its own body.
struct Echo;

impl XmppModule for Echo {
    fn module_type(&self) -> &'static str {
        "echo"
    }

    fn criteria(&self) -> Option<Criteria> {
        Some(Criteria::name("message").and(!Criteria::custom(|cursor| {
            cursor.element().attribute("type") == Some("error")
        })))
    }

    fn process(&mut self, ctx: &mut Context, element: &Element) -> Result<(), XmppError> {
        let body = element
            .first_child_named("body")
            .and_then(Element::value)
            .ok_or_else(|| XmppError::new(ErrorCondition::BadRequest))?;
        ctx.write_directly(
            Element::builder("message")
                .attr_opt("to", element.attribute("from"))
                .child("body")
                .value(body)
                .build(),
        );
        Ok(())
    }
}

#[test]
fn custom_modules() {
    let pipe = MemoryTransport::new();
    let mut client = Client::builder(config().use_tls(false).build(), pipe.clone())
        .module(Box::new(Echo))
        .build()
        .unwrap();
    let server = Server { pipe };
    authenticate(&mut client, &server);
    server.feed(&mut client, &format!("{SERVER_STREAM}<stream:features/>"));
    assert_eq!(server.sent(), "");

    server.feed(
        &mut client,
        "<message from='romeo@montague.lit/orchard'><body>hello</body></message>",
    );
    assert_eq!(
        server.sent(),
        r#"<message to="romeo@montague.lit/orchard"><body>hello</body></message>"#
    );

    server.feed(&mut client, "<message id='x1' from='romeo@montague.lit/orchard'/>");
    let reply = parse(&server.sent());
    assert_eq!(
        ErrorCondition::from_stanza(&reply),
        Some((ErrorCondition::BadRequest, None))
    );
}

#[test]
fn builder_rejects_duplicates() {
    let result = Client::builder(config().build(), MemoryTransport::new())
        .module(Box::new(PingModule))
        .build();
    assert!(matches!(
        result,
        Err(ClientError::Module(crate::ModuleError::Duplicate(_)))
    ));
}

#[test]
fn toml_configuration() {
    let config = Config::from_toml_str(
        r#"
        jid = "juliet@capulet.lit"
        password = "r0m30"
        server = "localhost:5223"
        stream_management = false
        "#,
    )
    .unwrap();
    assert_eq!(config.host(), "localhost:5223");
    assert!(!config.stream_management);
    assert!(config.use_tls);
    assert!(matches!(
        Config::from_toml_str("jid = \"@capulet.lit\""),
        Err(ConfigError::BadJid(_)) | Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        Config::from_toml_str("jid = \"a@b\"\nunknown = 1"),
        Err(ConfigError::Parse(_))
    ));
}
