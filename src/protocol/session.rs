//! # Debug Session
//!
//! One active connection to the engine. The session owns everything that
//! is per-connection: the resumable packet read buffer, the fragment
//! reassembler, and the reusable scratch buffer outbound objects are
//! encoded into. Inbound bytes are pushed in as they arrive; decoded
//! objects are routed by class uuid to typed [`SessionEvent`]s on an
//! event channel, and outbound sends queue ready-to-write frames on an
//! outbound channel. Nothing here blocks.
//!
//! Correlation is by message type only (plus the embedded operation-id
//! hash for breakpoint acks); there is no per-request sequence number, so
//! callers should keep at most one request of a given kind in flight.

use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use std::sync::Arc;

use crate::core::object_stream::ObjectStream;
use crate::core::schema::SchemaRegistry;
use crate::core::value::NetObject;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::fragment::{split_message, Reassembler, RemoteToolsMessage};
use crate::protocol::messages::{
    request, BreakpointAckKind, DebugValue, ScriptDebugAck,
    ScriptDebugAckBreakpoint, ScriptDebugAckExecute, ScriptDebugBreakpointRequest,
    ScriptDebugCallStackResult, ScriptDebugEnumContextsResult, ScriptDebugEnumLocalsResult,
    ScriptDebugGetValueResult, ScriptDebugRegisteredEBusesResult,
    ScriptDebugRegisteredGlobalsResult, ScriptDebugRequest, ScriptDebugSetValue,
    ScriptDebugSetValueResult, ScriptUserEBusInfo, ScriptUserMethodInfo, ScriptUserPropertyInfo,
    ACK_CODE, AGENT_NAME, DEFAULT_CONTEXT, SENDER_NAME,
};
use crate::protocol::packet::{packet_type, Packet, PacketCodec, RemoteToolsConnect};
use crate::utils::name_hash;

/// Everything the session reports back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The transport is listening and no engine is connected yet.
    WaitingForConnection,
    /// The engine introduced itself.
    Connected {
        capabilities: u32,
        persistent_id: u32,
        display_name: String,
    },
    /// The script debug agent accepted our attach request.
    Attached,
    /// An acknowledgement that is not the attach handshake.
    Ack { request: u32, ack_code: u32 },
    /// A breakpoint operation was acknowledged.
    BreakpointAck {
        kind: BreakpointAckKind,
        module_name: String,
        line: u32,
    },
    /// Execution stopped on a breakpoint.
    BreakpointHit { module_name: String, line: u32 },
    CallStack(String),
    EnumLocals(Vec<String>),
    EnumContexts(Vec<String>),
    GetValue(DebugValue),
    SetValueResult { name: String, success: bool },
    ExecuteAck { module_name: String, success: bool },
    RegisteredGlobals {
        methods: Vec<ScriptUserMethodInfo>,
        properties: Vec<ScriptUserPropertyInfo>,
    },
    RegisteredEbuses(Vec<ScriptUserEBusInfo>),
    /// The connection ended (peer close or error).
    Disconnected,
}

/// Operations callers can hand to a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Attach,
    /// A plain agent request: verb plus context.
    Request { request: String, context: String },
    AddBreakpoint { context: String, line: u32 },
    RemoveBreakpoint { context: String, line: u32 },
    SetValue(DebugValue),
}

/// State for one engine connection.
pub struct Session {
    registry: Arc<SchemaRegistry>,
    dispatcher: Dispatcher,
    events: mpsc::UnboundedSender<SessionEvent>,
    outbound: mpsc::UnboundedSender<bytes::Bytes>,
    codec: PacketCodec,
    recv_buf: BytesMut,
    reassembler: Reassembler,
    /// Reused across every outbound encode.
    send_scratch: Vec<u8>,
    persistent_id: u32,
}

impl Session {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        events: mpsc::UnboundedSender<SessionEvent>,
        outbound: mpsc::UnboundedSender<bytes::Bytes>,
    ) -> Self {
        Self {
            registry,
            dispatcher: default_dispatcher(),
            events,
            outbound,
            codec: PacketCodec,
            recv_buf: BytesMut::with_capacity(16 * 1024),
            reassembler: Reassembler::new(),
            send_scratch: Vec::with_capacity(64 * 1024),
            persistent_id: name_hash(SENDER_NAME),
        }
    }

    /// Identify outbound messages under a different sender name.
    pub fn with_sender_name(mut self, name: &str) -> Self {
        self.persistent_id = name_hash(name);
        self
    }

    /// Feed raw bytes as they come off the socket.
    ///
    /// A chunk may hold a partial header, several whole packets, or any
    /// mixture; parsing resumes across calls.
    pub fn handle_bytes(&mut self, chunk: &[u8]) -> Result<()> {
        self.recv_buf.extend_from_slice(chunk);
        while let Some(packet) = self.codec.decode(&mut self.recv_buf)? {
            self.handle_packet(packet)?;
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) -> Result<()> {
        match packet.packet_type() {
            packet_type::INITIATE_CONNECTION => {
                debug!("initiate-connection packet; nothing to process");
                Ok(())
            }
            packet_type::REMOTE_TOOLS_CONNECT => {
                let connect = RemoteToolsConnect::read_from(&packet.payload)?;
                info!(
                    display_name = %connect.display_name,
                    capabilities = connect.capabilities,
                    "engine introduced itself"
                );
                self.emit(SessionEvent::Connected {
                    capabilities: connect.capabilities,
                    persistent_id: connect.persistent_id,
                    display_name: connect.display_name,
                })?;
                // Attach to the script debug agent right away, as the
                // tool always wants a debugging session once the engine
                // has introduced itself.
                self.send_attach_request()
            }
            packet_type::REMOTE_TOOLS_MESSAGE => {
                let fragment = RemoteToolsMessage::read_from(&packet.payload)?;
                if let Some(whole) = self.reassembler.push(&fragment)? {
                    self.handle_complete_message(&whole)?;
                }
                Ok(())
            }
            other => {
                warn!(packet_type = other, "ignoring unknown packet type");
                Ok(())
            }
        }
    }

    fn handle_complete_message(&mut self, buf: &[u8]) -> Result<()> {
        let stream = ObjectStream::new(&self.registry);
        let object = stream.read_from(buf)?;
        match self.dispatcher.dispatch(&object) {
            Ok(event) => self.emit(event),
            Err(ProtocolError::UnexpectedMessage(uuid)) => {
                // Unknown result types are survivable; the decode itself
                // succeeded.
                warn!(uuid = %uuid, "no handler for decoded object");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Run one caller command.
    pub fn apply_command(&mut self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::Attach => self.send_attach_request(),
            SessionCommand::Request { request, context } => {
                self.send_request(&request, &context)
            }
            SessionCommand::AddBreakpoint { context, line } => {
                self.send_breakpoint_request(request::ADD_BREAKPOINT, &context, line)
            }
            SessionCommand::RemoveBreakpoint { context, line } => {
                self.send_breakpoint_request(request::REMOVE_BREAKPOINT, &context, line)
            }
            SessionCommand::SetValue(value) => self.send_set_value(value),
        }
    }

    pub fn send_attach_request(&mut self) -> Result<()> {
        self.send_request(request::ATTACH_DEBUGGER, DEFAULT_CONTEXT)
    }

    /// Send a plain verb+context request to the agent.
    pub fn send_request(&mut self, verb: &str, context: &str) -> Result<()> {
        let message = ScriptDebugRequest::to_agent(verb, context);
        self.send_object(&message.to_net_object(), verb)
    }

    pub fn send_breakpoint_request(&mut self, verb: &str, context: &str, line: u32) -> Result<()> {
        let message = ScriptDebugBreakpointRequest::to_agent(verb, context, line);
        self.send_object(&message.to_net_object(), verb)
    }

    pub fn send_set_value(&mut self, value: DebugValue) -> Result<()> {
        let message = ScriptDebugSetValue::to_agent(value);
        self.send_object(&message.to_net_object(), "SetValue")
    }

    /// Encode, fragment, frame, and queue one outbound object.
    fn send_object(&mut self, object: &NetObject, dbg_info: &str) -> Result<()> {
        let stream = ObjectStream::new(&self.registry);
        stream.write_to(object, &mut self.send_scratch)?;

        let fragments = split_message(self.persistent_id, &self.send_scratch);
        debug!(
            request = dbg_info,
            bytes = self.send_scratch.len(),
            fragments = fragments.len(),
            "sending message"
        );
        for fragment in &fragments {
            let frame = fragment.to_packet()?.to_frame();
            self.outbound
                .send(frame)
                .map_err(|_| ProtocolError::ConnectionClosed)?;
        }
        Ok(())
    }

    /// Drop any partial reassembly state (connection teardown).
    pub fn reset(&mut self) {
        self.recv_buf.clear();
        self.reassembler.reset();
    }

    fn emit(&self, event: SessionEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

/// Wire the known result classes to their events.
fn default_dispatcher() -> Dispatcher {
    let mut dispatcher = Dispatcher::new();

    let attach_request = name_hash(request::ATTACH_DEBUGGER);
    let ack_code = name_hash(ACK_CODE);
    dispatcher.register(ScriptDebugAck::UUID, move |obj| {
        let ack = ScriptDebugAck::try_from(obj)?;
        if ack.request == attach_request && ack.ack_code == ack_code {
            info!(agent = AGENT_NAME, "attached to the script debug agent");
            Ok(SessionEvent::Attached)
        } else {
            Ok(SessionEvent::Ack {
                request: ack.request,
                ack_code: ack.ack_code,
            })
        }
    });

    dispatcher.register(ScriptDebugAckBreakpoint::UUID, |obj| {
        let ack = ScriptDebugAckBreakpoint::try_from(obj)?;
        Ok(match ack.kind() {
            BreakpointAckKind::Hit => SessionEvent::BreakpointHit {
                module_name: ack.module_name,
                line: ack.line,
            },
            kind => SessionEvent::BreakpointAck {
                kind,
                module_name: ack.module_name,
                line: ack.line,
            },
        })
    });

    dispatcher.register(ScriptDebugAckExecute::UUID, |obj| {
        let ack = ScriptDebugAckExecute::try_from(obj)?;
        Ok(SessionEvent::ExecuteAck {
            module_name: ack.module_name,
            success: ack.result,
        })
    });

    dispatcher.register(ScriptDebugCallStackResult::UUID, |obj| {
        Ok(SessionEvent::CallStack(
            ScriptDebugCallStackResult::try_from(obj)?.callstack,
        ))
    });

    dispatcher.register(ScriptDebugEnumLocalsResult::UUID, |obj| {
        Ok(SessionEvent::EnumLocals(
            ScriptDebugEnumLocalsResult::try_from(obj)?.names,
        ))
    });

    dispatcher.register(ScriptDebugEnumContextsResult::UUID, |obj| {
        Ok(SessionEvent::EnumContexts(
            ScriptDebugEnumContextsResult::try_from(obj)?.names,
        ))
    });

    dispatcher.register(ScriptDebugGetValueResult::UUID, |obj| {
        Ok(SessionEvent::GetValue(
            ScriptDebugGetValueResult::try_from(obj)?.value,
        ))
    });

    dispatcher.register(ScriptDebugSetValueResult::UUID, |obj| {
        let result = ScriptDebugSetValueResult::try_from(obj)?;
        Ok(SessionEvent::SetValueResult {
            name: result.name,
            success: result.result,
        })
    });

    dispatcher.register(ScriptDebugRegisteredGlobalsResult::UUID, |obj| {
        let result = ScriptDebugRegisteredGlobalsResult::try_from(obj)?;
        Ok(SessionEvent::RegisteredGlobals {
            methods: result.methods,
            properties: result.properties,
        })
    });

    dispatcher.register(ScriptDebugRegisteredEBusesResult::UUID, |obj| {
        Ok(SessionEvent::RegisteredEbuses(
            ScriptDebugRegisteredEBusesResult::try_from(obj)?.ebuses,
        ))
    });

    dispatcher
}
