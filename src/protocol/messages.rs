//! # Typed Debug Messages
//!
//! The concrete request/response types exchanged with the engine's script
//! debug agent, and their conversions to and from the codec's flat value
//! form. The codec itself only ever sees `(uuid, values[])`; this module
//! is the typed-reconstruction step layered on top.
//!
//! Field order follows each class's schema declaration; a subclass's flat
//! list starts with its base class's slots.

use uuid::Uuid;

use crate::core::value::{NetObject, Value};
use crate::error::{ProtocolError, Result};
use crate::utils::name_hash;

/// Name of the engine-side component every request is addressed to.
pub const AGENT_NAME: &str = "ScriptDebugAgent";
/// Name hashed into the probe's persistent sender id.
pub const SENDER_NAME: &str = "LuaRemoteTools";
/// Context used when a request is not scoped to a script context.
pub const DEFAULT_CONTEXT: &str = "Default";

/// Request verbs understood by the agent.
pub mod request {
    pub const ATTACH_DEBUGGER: &str = "AttachDebugger";
    pub const DETACH_DEBUGGER: &str = "DetachDebugger";
    pub const GET_CALLSTACK: &str = "GetCallstack";
    pub const ENUM_LOCALS: &str = "EnumLocals";
    pub const ENUM_CONTEXTS: &str = "EnumContexts";
    pub const GET_VALUE: &str = "GetValue";
    pub const STEP_OVER: &str = "StepOver";
    pub const STEP_IN: &str = "StepIn";
    pub const STEP_OUT: &str = "StepOut";
    pub const CONTINUE: &str = "Continue";
    pub const ADD_BREAKPOINT: &str = "AddBreakpoint";
    pub const REMOVE_BREAKPOINT: &str = "RemoveBreakpoint";
}

/// Positive acknowledgement code.
pub const ACK_CODE: &str = "Ack";
/// Breakpoint ack id reported when execution stops on a line.
pub const BREAKPOINT_HIT: &str = "BreakpointHit";

/// The operation a breakpoint acknowledgement refers to, recovered from
/// its embedded id hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointAckKind {
    Added,
    Removed,
    Hit,
    Other(u32),
}

impl BreakpointAckKind {
    pub fn from_id(id: u32) -> Self {
        if id == name_hash(request::ADD_BREAKPOINT) {
            Self::Added
        } else if id == name_hash(request::REMOVE_BREAKPOINT) {
            Self::Removed
        } else if id == name_hash(BREAKPOINT_HIT) {
            Self::Hit
        } else {
            Self::Other(id)
        }
    }
}

/// A variable snapshot; nests through `elements` for tables and structs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebugValue {
    pub name: String,
    pub value: String,
    pub value_type: u8,
    pub flags: u8,
    pub elements: Vec<DebugValue>,
}

impl DebugValue {
    pub const UUID: Uuid = Uuid::from_u128(0xC32D1E88_2B8B_432C_91BC_D0B4B135279D);

    pub fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.name.as_str()),
            Value::from(self.value.as_str()),
            Value::from(self.value_type),
            Value::from(self.flags),
            Value::Seq(
                self.elements
                    .iter()
                    .map(|child| Value::Fields(child.to_values()))
                    .collect(),
            ),
        ]
    }

    pub fn from_values(values: &[Value]) -> Result<Self> {
        const CLASS: &str = "DebugValue";
        let elements = get_seq(values, 4, CLASS)?
            .iter()
            .map(|child| {
                child
                    .as_fields()
                    .ok_or_else(|| shape_error(CLASS, 4, "nested field list"))
                    .and_then(Self::from_values)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: get_string(values, 0, CLASS)?,
            value: get_string(values, 1, CLASS)?,
            value_type: get_u64(values, 2, CLASS)? as u8,
            flags: get_u64(values, 3, CLASS)? as u8,
            elements,
        })
    }
}

/// Outbound request: `{ MsgId, request, context }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugRequest {
    pub msg_id: u64,
    pub request: u32,
    pub context: String,
}

impl ScriptDebugRequest {
    pub const UUID: Uuid = Uuid::from_u128(0x2137E01A_F2AE_4137_A17E_6B82F3B7E4DE);

    /// A request addressed to the script debug agent.
    pub fn to_agent(verb: &str, context: &str) -> Self {
        Self {
            msg_id: u64::from(name_hash(AGENT_NAME)),
            request: name_hash(verb),
            context: context.to_owned(),
        }
    }

    pub fn to_net_object(&self) -> NetObject {
        NetObject::new(
            Self::UUID,
            vec![
                Value::UInt(self.msg_id),
                Value::from(self.request),
                Value::from(self.context.as_str()),
            ],
        )
    }
}

/// Outbound request scoping a breakpoint operation to a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugBreakpointRequest {
    pub msg_id: u64,
    pub request: u32,
    pub context: String,
    pub line: u32,
}

impl ScriptDebugBreakpointRequest {
    pub const UUID: Uuid = Uuid::from_u128(0x707F97AB_1CA0_4191_82E0_FFE9C9D0F788);

    pub fn to_agent(verb: &str, context: &str, line: u32) -> Self {
        Self {
            msg_id: u64::from(name_hash(AGENT_NAME)),
            request: name_hash(verb),
            context: context.to_owned(),
            line,
        }
    }

    pub fn to_net_object(&self) -> NetObject {
        NetObject::new(
            Self::UUID,
            vec![
                Value::UInt(self.msg_id),
                Value::from(self.request),
                Value::from(self.context.as_str()),
                Value::from(self.line),
            ],
        )
    }
}

/// Outbound request writing a variable back into the running script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugSetValue {
    pub msg_id: u64,
    pub value: DebugValue,
}

impl ScriptDebugSetValue {
    pub const UUID: Uuid = Uuid::from_u128(0x11E0E012_BD54_457D_A44B_FDDA55736ED3);

    pub fn to_agent(value: DebugValue) -> Self {
        Self {
            msg_id: u64::from(name_hash(AGENT_NAME)),
            value,
        }
    }

    pub fn to_net_object(&self) -> NetObject {
        NetObject::new(
            Self::UUID,
            vec![
                Value::UInt(self.msg_id),
                Value::Fields(self.value.to_values()),
            ],
        )
    }
}

/// Inbound: generic acknowledgement `{ request, ackCode }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugAck {
    pub msg_id: u64,
    pub request: u32,
    pub ack_code: u32,
}

impl ScriptDebugAck {
    pub const UUID: Uuid = Uuid::from_u128(0x0CA1671A_BAFD_499C_B2CD_7B7E3DD5E2A8);
}

impl TryFrom<&NetObject> for ScriptDebugAck {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugAck";
        check_uuid(obj, Self::UUID, CLASS)?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            request: get_u64(&obj.values, 1, CLASS)? as u32,
            ack_code: get_u64(&obj.values, 2, CLASS)? as u32,
        })
    }
}

/// Inbound: breakpoint lifecycle acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugAckBreakpoint {
    pub msg_id: u64,
    pub id: u32,
    pub module_name: String,
    pub line: u32,
}

impl ScriptDebugAckBreakpoint {
    pub const UUID: Uuid = Uuid::from_u128(0xD9644B8A_92FD_43B6_A579_77E123A72EC2);

    pub fn kind(&self) -> BreakpointAckKind {
        BreakpointAckKind::from_id(self.id)
    }
}

impl TryFrom<&NetObject> for ScriptDebugAckBreakpoint {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugAckBreakpoint";
        check_uuid(obj, Self::UUID, CLASS)?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            id: get_u64(&obj.values, 1, CLASS)? as u32,
            module_name: get_string(&obj.values, 2, CLASS)?,
            line: get_u64(&obj.values, 3, CLASS)? as u32,
        })
    }
}

/// Inbound: result of executing a script snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugAckExecute {
    pub msg_id: u64,
    pub module_name: String,
    pub result: bool,
}

impl ScriptDebugAckExecute {
    pub const UUID: Uuid = Uuid::from_u128(0xF5B24F7E_85DA_4FE8_B720_AABE35CE631D);
}

impl TryFrom<&NetObject> for ScriptDebugAckExecute {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugAckExecute";
        check_uuid(obj, Self::UUID, CLASS)?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            module_name: get_string(&obj.values, 1, CLASS)?,
            result: get_bool(&obj.values, 2, CLASS)?,
        })
    }
}

/// Inbound: the whole call stack as one preformatted text block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugCallStackResult {
    pub msg_id: u64,
    pub callstack: String,
}

impl ScriptDebugCallStackResult {
    pub const UUID: Uuid = Uuid::from_u128(0xB2606AC6_F966_4991_8144_BA6117F4A54E);
}

impl TryFrom<&NetObject> for ScriptDebugCallStackResult {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugCallStackResult";
        check_uuid(obj, Self::UUID, CLASS)?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            callstack: get_string(&obj.values, 1, CLASS)?,
        })
    }
}

/// Inbound: names of the locals in the current frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugEnumLocalsResult {
    pub msg_id: u64,
    pub names: Vec<String>,
}

impl ScriptDebugEnumLocalsResult {
    pub const UUID: Uuid = Uuid::from_u128(0x201701DD_0B74_4886_AB84_93BDB338A8DD);
}

impl TryFrom<&NetObject> for ScriptDebugEnumLocalsResult {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugEnumLocalsResult";
        check_uuid(obj, Self::UUID, CLASS)?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            names: get_string_seq(&obj.values, 1, CLASS)?,
        })
    }
}

/// Inbound: names of the script contexts available for attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugEnumContextsResult {
    pub msg_id: u64,
    pub names: Vec<String>,
}

impl ScriptDebugEnumContextsResult {
    pub const UUID: Uuid = Uuid::from_u128(0x8CE74569_9B7D_4993_AFE8_38BB8CE419F5);
}

impl TryFrom<&NetObject> for ScriptDebugEnumContextsResult {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugEnumContextsResult";
        check_uuid(obj, Self::UUID, CLASS)?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            names: get_string_seq(&obj.values, 1, CLASS)?,
        })
    }
}

/// Inbound: one variable's value tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugGetValueResult {
    pub msg_id: u64,
    pub value: DebugValue,
}

impl ScriptDebugGetValueResult {
    pub const UUID: Uuid = Uuid::from_u128(0xB10720F1_B8FE_476F_A39D_6E80711580FD);
}

impl TryFrom<&NetObject> for ScriptDebugGetValueResult {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugGetValueResult";
        check_uuid(obj, Self::UUID, CLASS)?;
        let fields = get(&obj.values, 1, CLASS)?
            .as_fields()
            .ok_or_else(|| shape_error(CLASS, 1, "field list"))?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            value: DebugValue::from_values(fields)?,
        })
    }
}

/// Inbound: whether a set-value request took effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugSetValueResult {
    pub msg_id: u64,
    pub name: String,
    pub result: bool,
}

impl ScriptDebugSetValueResult {
    pub const UUID: Uuid = Uuid::from_u128(0x2E2BD168_1805_43D6_8602_FDE14CED8E53);
}

impl TryFrom<&NetObject> for ScriptDebugSetValueResult {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugSetValueResult";
        check_uuid(obj, Self::UUID, CLASS)?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            name: get_string(&obj.values, 1, CLASS)?,
            result: get_bool(&obj.values, 2, CLASS)?,
        })
    }
}

/// One scriptable method exposed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUserMethodInfo {
    pub name: String,
    pub info: String,
}

impl ScriptUserMethodInfo {
    pub const UUID: Uuid = Uuid::from_u128(0x32FE4B43_2C23_4AB4_9374_3D13CF050002);

    fn from_values(values: &[Value]) -> Result<Self> {
        const CLASS: &str = "ScriptUserMethodInfo";
        Ok(Self {
            name: get_string(values, 0, CLASS)?,
            info: get_string(values, 1, CLASS)?,
        })
    }
}

/// One scriptable property exposed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUserPropertyInfo {
    pub name: String,
    pub is_read: bool,
    pub is_write: bool,
}

impl ScriptUserPropertyInfo {
    pub const UUID: Uuid = Uuid::from_u128(0x6CD9F5BE_B2CD_41BB_9DA5_1B053548CF56);

    fn from_values(values: &[Value]) -> Result<Self> {
        const CLASS: &str = "ScriptUserPropertyInfo";
        Ok(Self {
            name: get_string(values, 0, CLASS)?,
            is_read: get_bool(values, 1, CLASS)?,
            is_write: get_bool(values, 2, CLASS)?,
        })
    }
}

/// An event bus method; extends [`ScriptUserMethodInfo`] with a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUserEBusMethodInfo {
    pub name: String,
    pub info: String,
    pub category: String,
}

impl ScriptUserEBusMethodInfo {
    pub const UUID: Uuid = Uuid::from_u128(0xFD805F6C_8612_41CF_85FE_3B97683C98F2);

    fn from_values(values: &[Value]) -> Result<Self> {
        const CLASS: &str = "ScriptUserEBusMethodInfo";
        Ok(Self {
            name: get_string(values, 0, CLASS)?,
            info: get_string(values, 1, CLASS)?,
            category: get_string(values, 2, CLASS)?,
        })
    }
}

/// One scriptable event bus and its events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUserEBusInfo {
    pub name: String,
    pub events: Vec<ScriptUserEBusMethodInfo>,
    pub can_broadcast: bool,
    pub can_queue: bool,
    pub has_handler: bool,
}

impl ScriptUserEBusInfo {
    pub const UUID: Uuid = Uuid::from_u128(0x2376407E_1621_4D7F_B4AD_DE04A81A2616);

    fn from_values(values: &[Value]) -> Result<Self> {
        const CLASS: &str = "ScriptUserEBusInfo";
        let events = get_seq(values, 1, CLASS)?
            .iter()
            .map(|item| {
                item.as_fields()
                    .ok_or_else(|| shape_error(CLASS, 1, "nested field list"))
                    .and_then(ScriptUserEBusMethodInfo::from_values)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: get_string(values, 0, CLASS)?,
            events,
            can_broadcast: get_bool(values, 2, CLASS)?,
            can_queue: get_bool(values, 3, CLASS)?,
            has_handler: get_bool(values, 4, CLASS)?,
        })
    }
}

/// Inbound: global methods and properties registered for scripting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugRegisteredGlobalsResult {
    pub msg_id: u64,
    pub methods: Vec<ScriptUserMethodInfo>,
    pub properties: Vec<ScriptUserPropertyInfo>,
}

impl ScriptDebugRegisteredGlobalsResult {
    pub const UUID: Uuid = Uuid::from_u128(0xCEE4E889_0249_4D59_9D56_CD4BD159E411);
}

impl TryFrom<&NetObject> for ScriptDebugRegisteredGlobalsResult {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugRegisteredGlobalsResult";
        check_uuid(obj, Self::UUID, CLASS)?;
        let methods = get_seq(&obj.values, 1, CLASS)?
            .iter()
            .map(|item| {
                item.as_fields()
                    .ok_or_else(|| shape_error(CLASS, 1, "nested field list"))
                    .and_then(ScriptUserMethodInfo::from_values)
            })
            .collect::<Result<Vec<_>>>()?;
        let properties = get_seq(&obj.values, 2, CLASS)?
            .iter()
            .map(|item| {
                item.as_fields()
                    .ok_or_else(|| shape_error(CLASS, 2, "nested field list"))
                    .and_then(ScriptUserPropertyInfo::from_values)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            methods,
            properties,
        })
    }
}

/// Inbound: event buses registered for scripting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDebugRegisteredEBusesResult {
    pub msg_id: u64,
    pub ebuses: Vec<ScriptUserEBusInfo>,
}

impl ScriptDebugRegisteredEBusesResult {
    pub const UUID: Uuid = Uuid::from_u128(0xD2B5D77C_09F3_476D_A611_49B0A1B9EDFB);
}

impl TryFrom<&NetObject> for ScriptDebugRegisteredEBusesResult {
    type Error = ProtocolError;

    fn try_from(obj: &NetObject) -> Result<Self> {
        const CLASS: &str = "ScriptDebugRegisteredEBusesResult";
        check_uuid(obj, Self::UUID, CLASS)?;
        let ebuses = get_seq(&obj.values, 1, CLASS)?
            .iter()
            .map(|item| {
                item.as_fields()
                    .ok_or_else(|| shape_error(CLASS, 1, "nested field list"))
                    .and_then(ScriptUserEBusInfo::from_values)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            msg_id: get_u64(&obj.values, 0, CLASS)?,
            ebuses,
        })
    }
}

fn check_uuid(obj: &NetObject, expected: Uuid, class: &str) -> Result<()> {
    if obj.class_uuid != expected {
        return Err(ProtocolError::DeserializeError(format!(
            "object uuid {} is not a {class}",
            obj.class_uuid
        )));
    }
    Ok(())
}

fn shape_error(class: &str, slot: usize, expected: &str) -> ProtocolError {
    ProtocolError::DeserializeError(format!("{class}: slot {slot} is not a {expected}"))
}

fn get<'v>(values: &'v [Value], slot: usize, class: &str) -> Result<&'v Value> {
    values.get(slot).ok_or_else(|| {
        ProtocolError::DeserializeError(format!("{class}: missing value slot {slot}"))
    })
}

fn get_u64(values: &[Value], slot: usize, class: &str) -> Result<u64> {
    get(values, slot, class)?
        .as_u64()
        .ok_or_else(|| shape_error(class, slot, "number"))
}

fn get_bool(values: &[Value], slot: usize, class: &str) -> Result<bool> {
    Ok(get_u64(values, slot, class)? != 0)
}

fn get_string(values: &[Value], slot: usize, class: &str) -> Result<String> {
    get(values, slot, class)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| shape_error(class, slot, "string"))
}

fn get_seq<'v>(values: &'v [Value], slot: usize, class: &str) -> Result<&'v [Value]> {
    get(values, slot, class)?
        .as_seq()
        .ok_or_else(|| shape_error(class, slot, "sequence"))
}

fn get_string_seq(values: &[Value], slot: usize, class: &str) -> Result<Vec<String>> {
    get_seq(values, slot, class)?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| shape_error(class, slot, "sequence of strings"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_targets_the_agent() {
        let request = ScriptDebugRequest::to_agent(request::GET_CALLSTACK, DEFAULT_CONTEXT);
        assert_eq!(request.msg_id, u64::from(name_hash(AGENT_NAME)));
        assert_eq!(request.request, name_hash(request::GET_CALLSTACK));

        let obj = request.to_net_object();
        assert_eq!(obj.class_uuid, ScriptDebugRequest::UUID);
        assert_eq!(obj.values.len(), 3);
    }

    #[test]
    fn debug_value_tree_roundtrips_through_values() {
        let value = DebugValue {
            name: "player".into(),
            value: "table".into(),
            value_type: 5,
            flags: 1,
            elements: vec![DebugValue {
                name: "health".into(),
                value: "100".into(),
                value_type: 2,
                flags: 0,
                elements: Vec::new(),
            }],
        };
        let rebuilt = DebugValue::from_values(&value.to_values()).unwrap();
        assert_eq!(rebuilt, value);
    }

    #[test]
    fn ack_conversion_checks_uuid() {
        let wrong = NetObject::new(Uuid::from_u128(1), vec![Value::UInt(0)]);
        assert!(ScriptDebugAck::try_from(&wrong).is_err());
    }

    #[test]
    fn breakpoint_ack_kinds() {
        assert_eq!(
            BreakpointAckKind::from_id(name_hash(request::ADD_BREAKPOINT)),
            BreakpointAckKind::Added
        );
        assert_eq!(
            BreakpointAckKind::from_id(name_hash(BREAKPOINT_HIT)),
            BreakpointAckKind::Hit
        );
        assert!(matches!(
            BreakpointAckKind::from_id(12345),
            BreakpointAckKind::Other(12345)
        ));
    }
}
