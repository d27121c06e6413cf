//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "tests"
//! fb_type: "source"
//! fb_scope: "test"
//! fb_description: "End-to-end session behaviour over the in-memory broker."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use fogbridge_cloud::codec;
use fogbridge_cloud::{
    binding_key, AddressingMode, CloudSession, ConfigEntry, EventFlags, EventPolicy,
    InMemoryBroker, MessageBody, MessageKind, ProtocolMessage, SensorSchema, TypedValue,
    ValueType,
};
use serde_json::json;

type Inbox = Vec<ProtocolMessage>;

fn session_for(device_id: &str) -> (CloudSession<InMemoryBroker, Inbox>, InMemoryBroker) {
    let broker = InMemoryBroker::new();
    let mut session = CloudSession::new(broker.clone()).with_user_token("user-secret");
    session
        .start_reading(
            device_id,
            |message, inbox: &mut Inbox| {
                inbox.push(message.clone());
                true
            },
            Vec::new(),
        )
        .expect("start reading");
    (session, broker)
}

#[test]
fn list_reply_preserves_device_order() {
    let (mut session, broker) = session_for("fog1");
    session.list_devices().expect("list devices");

    let request = broker.take_published().remove(0);
    assert_eq!(request.mode, AddressingMode::DirectRpc);
    assert_eq!(request.body, "{}");
    let reply_to = request.reply_to.expect("reply key");

    let reply = json!({
        "devices": [
            {"id": "b2", "name": "second", "config": []},
            {"id": "a1", "name": "first", "config": [{
                "sensorId": 1,
                "schema": {"typeId": 65296, "unit": 0, "valueType": 3, "name": "Lamp"},
                "event": {"change": true}
            }]}
        ]
    });
    broker
        .inject("device", &reply_to, &reply.to_string())
        .expect("reply routed");
    assert_eq!(session.poll(), 1);

    let inbox = session.context().expect("reading");
    let MessageBody::ListDevices(devices) = &inbox[0].body else {
        panic!("expected list reply, got {:?}", inbox[0].body);
    };
    let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["b2", "a1"]);
    assert_eq!(devices[1].config[0].event.flags, EventFlags::CHANGE);
    assert_eq!(inbox[0].device_id, None);
}

#[test]
fn unknown_routing_key_is_acked_without_handler() {
    let (mut session, broker) = session_for("fog1");
    broker
        .inject_unrouted("device", "device.fog2.data.update", "{}")
        .expect("queued");
    assert_eq!(session.poll(), 1);

    assert!(session.context().expect("reading").is_empty());
    let acks = broker.acknowledgements();
    assert_eq!(acks.len(), 1);
    assert!(acks[0].consumed);
    assert_eq!(session.metrics().unknown, 1);
}

#[test]
fn error_reply_skips_payload_validation() {
    let (mut session, broker) = session_for("fog1");
    let key = binding_key(MessageKind::Register, "fog1").expect("key");
    broker
        .inject("device", &key, r#"{"id":"fog1","error":"bad token"}"#)
        .expect("routed");
    session.poll();

    let inbox = session.context().expect("reading");
    assert_eq!(inbox[0].error.as_deref(), Some("bad token"));
    assert_eq!(inbox[0].body, MessageBody::Register { token: None });
}

#[test]
fn malformed_error_field_is_consumed_and_dropped() {
    let (mut session, broker) = session_for("fog1");
    let key = binding_key(MessageKind::Auth, "fog1").expect("key");
    broker
        .inject("device", &key, r#"{"id":"fog1","error":42}"#)
        .expect("routed");
    session.poll();

    assert!(session.context().expect("reading").is_empty());
    assert!(broker.acknowledgements()[0].consumed);
    assert_eq!(session.metrics().decode_failures, 1);
}

#[test]
fn handler_can_reject_a_delivery() {
    let broker = InMemoryBroker::new();
    let mut session: CloudSession<_, ()> = CloudSession::new(broker.clone());
    session
        .start_reading("fog1", |_, _| false, ())
        .expect("start reading");
    broker
        .inject(
            "device",
            "device.fog1.data.request",
            r#"{"id":"fog1","sensorIds":[1,2]}"#,
        )
        .expect("routed");
    session.poll();
    assert!(!broker.acknowledgements()[0].consumed);
}

#[test]
fn published_data_decodes_as_update() {
    let (mut session, broker) = session_for("fog1");
    let values = [
        (ValueType::Int, TypedValue::Int(-40)),
        (ValueType::Uint64, TypedValue::Uint64(u64::MAX)),
        (ValueType::Float, TypedValue::Float(21.5)),
        (ValueType::Bool, TypedValue::Bool(true)),
    ];
    for (sensor_id, (value_type, value)) in values.iter().enumerate() {
        session
            .publish_data("fog1", sensor_id as u8, *value_type, value, 0)
            .expect("publish");
    }

    for message in broker.take_published() {
        assert_eq!(message.exchange, "data.sent");
        broker
            .inject("device", "device.fog1.data.update", &message.body)
            .expect("routed");
    }
    assert_eq!(session.poll(), values.len());

    let inbox = session.context().expect("reading");
    let decoded: Vec<_> = inbox
        .iter()
        .map(|message| match &message.body {
            MessageBody::Update(data) => data[0].clone(),
            other => panic!("unexpected body {:?}", other),
        })
        .collect();
    assert_eq!(decoded[0].value, TypedValue::Int(-40));
    assert_eq!(decoded[1].value, TypedValue::Uint64(u64::MAX));
    assert_eq!(decoded[2].value, TypedValue::Float(21.5));
    assert_eq!(decoded[3].value, TypedValue::Bool(true));
    assert_eq!(decoded[3].sensor_id, 3);
}

#[test]
fn config_update_roundtrips_through_list_decoder() {
    let (session, broker) = session_for("fog1");
    let config = vec![ConfigEntry {
        sensor_id: 4,
        schema: SensorSchema {
            value_type: ValueType::Int,
            unit: 1,
            type_id: 9,
            name: "Temp".into(),
        },
        event: EventPolicy {
            flags: EventFlags::CHANGE | EventFlags::TIME | EventFlags::UPPER_THRESHOLD,
            time_sec: 30,
            lower_threshold: None,
            upper_threshold: Some(TypedValue::Int(80)),
        },
    }];
    session.update_config("fog1", &config).expect("update config");

    let published = broker.take_published().remove(0);
    assert_eq!(published.routing_key.as_deref(), Some("device.schema.sent"));
    let body: serde_json::Value = serde_json::from_str(&published.body).expect("json");
    let decoded =
        codec::decode_config_list(&body["config"].to_string()).expect("decode config list");
    assert_eq!(decoded, config);
}

#[test]
fn stop_then_restart_ignores_stale_keys() {
    let (mut session, broker) = session_for("fog1");
    broker
        .inject("device", "device.fog1.data.update", "{}")
        .expect("routed");
    session.stop_reading();
    assert_eq!(broker.pending(), 0);

    session
        .start_reading("fog2", |_, _: &mut Inbox| true, Vec::new())
        .expect("restart");
    assert!(broker
        .inject("device", "device.fog1.data.update", "{}")
        .is_none());
    assert_eq!(session.poll(), 0);
}
