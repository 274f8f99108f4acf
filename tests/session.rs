//! End-to-end session tests: raw packet bytes in, typed events out, and
//! the outbound frames a session queues in response.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use std::sync::Arc;

use bytes::{Buf, Bytes};
use tokio::sync::mpsc;

use remote_tools_protocol::core::{NetObject, ObjectStream, SchemaRegistry, Value};
use remote_tools_protocol::protocol::messages::{
    request, DebugValue, ScriptDebugAck, ScriptDebugAckBreakpoint, ScriptDebugCallStackResult,
    ScriptDebugEnumLocalsResult, ScriptDebugGetValueResult, ScriptDebugRequest, BREAKPOINT_HIT,
    ACK_CODE, SENDER_NAME,
};
use remote_tools_protocol::protocol::packet::{packet_type, Packet, RemoteToolsConnect};
use remote_tools_protocol::protocol::session::{Session, SessionCommand, SessionEvent};
use remote_tools_protocol::utils::name_hash;

struct Harness {
    session: Session,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
    registry: Arc<SchemaRegistry>,
}

fn harness() -> Harness {
    let registry = Arc::new(common::test_registry());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    Harness {
        session: Session::new(registry.clone(), events_tx, outbound_tx),
        events: events_rx,
        outbound: outbound_rx,
        registry,
    }
}

impl Harness {
    /// Encode a result object and feed it to the session as the engine
    /// would send it (fragmented inbound wire form).
    fn feed_object(&mut self, object: &NetObject, max_fragment: usize) {
        let bytes = ObjectStream::new(&self.registry).encode(object).unwrap();
        for frame in common::inbound_message_frames(&bytes, 0xBEEF, max_fragment) {
            self.session.handle_bytes(&frame).unwrap();
        }
    }

    fn next_event(&mut self) -> SessionEvent {
        self.events.try_recv().expect("an event was emitted")
    }

    /// Decode one queued outbound frame back into the object it carries.
    fn next_outbound_object(&mut self) -> NetObject {
        let frame = self.outbound.try_recv().expect("an outbound frame");
        // 5-byte packet header, then the outbound fragment layout:
        // u32 fragment size, fragment bytes, u32 total, u32 sender id.
        assert_eq!(u16::from_be_bytes([frame[1], frame[2]]), 8);
        let mut payload = &frame[5..];
        let frag_size = payload.get_u32() as usize;
        let fragment = &payload[..frag_size];
        let object = ObjectStream::new(&self.registry)
            .read_from(fragment)
            .expect("outbound object decodes");
        let mut trailer = &payload[frag_size..];
        assert_eq!(trailer.get_u32() as usize, frag_size, "single fragment");
        assert_eq!(trailer.get_u32(), name_hash(SENDER_NAME));
        object
    }
}

fn connect_frame() -> Bytes {
    let connect = RemoteToolsConnect {
        capabilities: 1,
        persistent_id: 0x0102_0304,
        display_name: "Engine Editor".into(),
    };
    connect.to_packet().unwrap().to_frame()
}

#[test]
fn connect_emits_event_and_auto_attaches() {
    let mut h = harness();
    h.session.handle_bytes(&connect_frame()).unwrap();

    assert_eq!(
        h.next_event(),
        SessionEvent::Connected {
            capabilities: 1,
            persistent_id: 0x0102_0304,
            display_name: "Engine Editor".into(),
        }
    );

    // The session attaches to the agent without being asked.
    let attach = h.next_outbound_object();
    assert_eq!(attach.class_uuid, ScriptDebugRequest::UUID);
    assert_eq!(
        attach.values[1],
        Value::from(name_hash(request::ATTACH_DEBUGGER))
    );
    assert_eq!(attach.values[2], Value::from("Default"));
}

#[test]
fn attach_ack_becomes_attached_event() {
    let mut h = harness();
    let ack = NetObject::new(
        ScriptDebugAck::UUID,
        vec![
            Value::UInt(0),
            Value::from(name_hash(request::ATTACH_DEBUGGER)),
            Value::from(name_hash(ACK_CODE)),
        ],
    );
    h.feed_object(&ack, 4096);
    assert_eq!(h.next_event(), SessionEvent::Attached);
}

#[test]
fn non_attach_ack_is_surfaced_generically() {
    let mut h = harness();
    let ack = NetObject::new(
        ScriptDebugAck::UUID,
        vec![
            Value::UInt(0),
            Value::from(name_hash(request::CONTINUE)),
            Value::from(name_hash(ACK_CODE)),
        ],
    );
    h.feed_object(&ack, 4096);
    assert_eq!(
        h.next_event(),
        SessionEvent::Ack {
            request: name_hash(request::CONTINUE),
            ack_code: name_hash(ACK_CODE),
        }
    );
}

#[test]
fn breakpoint_hit_is_routed_by_operation_id() {
    let mut h = harness();
    let ack = NetObject::new(
        ScriptDebugAckBreakpoint::UUID,
        vec![
            Value::UInt(0),
            Value::from(name_hash(BREAKPOINT_HIT)),
            Value::from("scripts/turret.lua"),
            Value::from(128u32),
        ],
    );
    h.feed_object(&ack, 4096);
    assert_eq!(
        h.next_event(),
        SessionEvent::BreakpointHit {
            module_name: "scripts/turret.lua".into(),
            line: 128,
        }
    );
}

#[test]
fn fragmented_callstack_dispatches_once() {
    let mut h = harness();
    let callstack = "frame\n".repeat(60);
    let result = NetObject::new(
        ScriptDebugCallStackResult::UUID,
        vec![Value::UInt(0), Value::from(callstack.as_str())],
    );
    // Tiny fragment ceiling: the encoded object crosses many packets.
    h.feed_object(&result, 48);

    assert_eq!(h.next_event(), SessionEvent::CallStack(callstack));
    assert!(h.events.try_recv().is_err(), "exactly one event");
}

#[test]
fn chunk_boundaries_do_not_matter() {
    // Same bytes as the fragmented callstack test, but delivered one byte
    // at a time to exercise the resumable read path end to end.
    let mut h = harness();
    let result = NetObject::new(
        ScriptDebugCallStackResult::UUID,
        vec![Value::UInt(0), Value::from("a\nb\nc")],
    );
    let bytes = ObjectStream::new(&h.registry).encode(&result).unwrap();
    let frames = common::inbound_message_frames(&bytes, 0xBEEF, 16);

    for frame in frames {
        for byte in frame.iter() {
            h.session.handle_bytes(&[*byte]).unwrap();
        }
    }
    assert_eq!(h.next_event(), SessionEvent::CallStack("a\nb\nc".into()));
}

#[test]
fn enum_locals_event_carries_names() {
    let mut h = harness();
    let result = NetObject::new(
        ScriptDebugEnumLocalsResult::UUID,
        vec![
            Value::UInt(0),
            Value::Seq(vec![
                Value::from("self"),
                Value::from("dt"),
                Value::from("target"),
            ]),
        ],
    );
    h.feed_object(&result, 4096);
    assert_eq!(
        h.next_event(),
        SessionEvent::EnumLocals(vec!["self".into(), "dt".into(), "target".into()])
    );
}

#[test]
fn get_value_event_carries_the_value_tree() {
    let mut h = harness();
    let value = DebugValue {
        name: "hp".into(),
        value: "100".into(),
        value_type: 2,
        flags: 0,
        elements: Vec::new(),
    };
    let result = NetObject::new(
        ScriptDebugGetValueResult::UUID,
        vec![Value::UInt(0), Value::Fields(value.to_values())],
    );
    h.feed_object(&result, 4096);
    assert_eq!(h.next_event(), SessionEvent::GetValue(value));
}

#[test]
fn commands_produce_outbound_requests() {
    let mut h = harness();
    h.session
        .apply_command(SessionCommand::AddBreakpoint {
            context: "scripts/ai.lua".into(),
            line: 77,
        })
        .unwrap();

    let object = h.next_outbound_object();
    let decoded_line = object.values[3].as_u64().unwrap();
    assert_eq!(decoded_line, 77);
    assert_eq!(
        object.values[1],
        Value::from(name_hash(request::ADD_BREAKPOINT))
    );
    assert_eq!(object.values[2], Value::from("scripts/ai.lua"));
}

#[test]
fn set_value_command_encodes_the_value_tree() {
    let mut h = harness();
    let value = DebugValue {
        name: "speed".into(),
        value: "7.5".into(),
        value_type: 2,
        flags: 0,
        elements: Vec::new(),
    };
    h.session
        .apply_command(SessionCommand::SetValue(value.clone()))
        .unwrap();

    let object = h.next_outbound_object();
    let fields = object.values[1].as_fields().expect("nested value tree");
    assert_eq!(DebugValue::from_values(fields).unwrap(), value);
}

#[test]
fn custom_sender_name_changes_the_persistent_id() {
    let registry = Arc::new(common::test_registry());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(registry, events_tx, outbound_tx).with_sender_name("QaHarness");

    session.send_attach_request().unwrap();

    // The outbound fragment trailer carries the configured sender id.
    let frame = outbound_rx.try_recv().expect("an outbound frame");
    let mut payload = &frame[5..];
    let frag_size = payload.get_u32() as usize;
    let mut trailer = &payload[frag_size..];
    assert_eq!(trailer.get_u32() as usize, frag_size);
    assert_eq!(trailer.get_u32(), name_hash("QaHarness"));
}

#[test]
fn unknown_packet_types_are_ignored() {
    let mut h = harness();
    let packet = Packet::new(99, Bytes::from_static(b"whatever")).unwrap();
    h.session.handle_bytes(&packet.to_frame()).unwrap();
    assert!(h.events.try_recv().is_err());

    // An initiate-connection packet is likewise quiet.
    let packet = Packet::new(packet_type::INITIATE_CONNECTION, Bytes::from_static(&[0; 4]))
        .unwrap();
    h.session.handle_bytes(&packet.to_frame()).unwrap();
    assert!(h.events.try_recv().is_err());
}

#[test]
fn unknown_object_uuid_in_stream_is_fatal_for_the_decode() {
    // A message whose root class the registry does not know must error;
    // the caller owns the drop-or-resync decision.
    let mut h = harness();
    let foreign = {
        // Encode with a registry that knows an extra class.
        let mut json: serde_json::Value = serde_json::from_str(common::SCHEMA_JSON).unwrap();
        json["classes"].as_array_mut().unwrap().push(serde_json::json!({
            "name": "Mystery",
            "uuid": "{99999999-9999-9999-9999-999999999999}",
            "version": 0,
            "containerTypes": [],
            "typeSize": 16,
            "elements": [
                { "name": "id", "isBaseClass": false,
                  "uuid": "{10000000-0000-0000-0000-000000000002}",
                  "cppOffset": 0, "cppSize": 4, "elementIndex": 0 }
            ]
        }));
        let writer = SchemaRegistry::from_json(&json.to_string()).unwrap();
        let object = NetObject::new(
            uuid::Uuid::parse_str("99999999-9999-9999-9999-999999999999").unwrap(),
            vec![Value::UInt(5)],
        );
        ObjectStream::new(&writer).encode(&object).unwrap()
    };

    let frames = common::inbound_message_frames(&foreign, 1, 4096);
    let err = h.session.handle_bytes(&frames[0]).unwrap_err();
    assert!(matches!(
        err,
        remote_tools_protocol::error::ProtocolError::UnknownTypeUuid(_)
    ));
}
