//! # Object Stream
//!
//! Serializes a full object graph to the engine's tagged-element byte
//! stream, and deserializes such a stream back into a flat value tree,
//! by recursively walking a class schema. The walk is depth-first over
//! an explicit frame stack so that arbitrarily deep object graphs never
//! threaten the call stack and partial states stay testable.
//!
//! Stream layout: a 5-byte header (1-byte format tag, 4-byte format
//! version, both fixed), the root element tree, and a final end sentinel.
//! Every opened element is closed by exactly one end sentinel at the same
//! nesting depth. Decoding fails closed on any header mismatch.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::element::{
    decode_primitive, decode_string, read_element, write_element, write_end, DataElement,
};
use crate::core::schema::{ClassDescriptor, CodecKind, SchemaRegistry};
use crate::core::value::{NetObject, Value};
use crate::error::{ProtocolError, Result};
use crate::utils::name_hash;

/// Fixed first byte of every object stream.
pub const STREAM_TAG: u8 = 0;
/// Fixed format version; no migration across versions, mismatch is fatal.
pub const STREAM_VERSION: u32 = 3;
/// Bytes occupied by the stream header.
pub const STREAM_HEADER_SIZE: usize = 5;

/// Synthetic field name carried by every container item.
const CONTAINER_ITEM_NAME: &str = "element";

/// Schema-driven object codec. Cheap to construct; borrows the shared
/// read-only registry.
pub struct ObjectStream<'a> {
    registry: &'a SchemaRegistry,
    item_name_crc: u32,
}

impl<'a> ObjectStream<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            item_name_crc: name_hash(CONTAINER_ITEM_NAME),
        }
    }

    /// Serialize `object` into `out`, replacing its contents.
    ///
    /// The buffer is cleared rather than reallocated so a session can keep
    /// reusing one scratch buffer across sends.
    pub fn write_to<'v>(&self, object: &'v NetObject, out: &mut Vec<u8>) -> Result<()>
    where
        'a: 'v,
    {
        out.clear();
        out.push(STREAM_TAG);
        out.extend_from_slice(&STREAM_VERSION.to_be_bytes());

        let root_class = self.registry.require(&object.class_uuid)?;
        let mut stack: Vec<EncodeFrame<'v>> = Vec::new();
        self.push_flat(out, &mut stack, root_class, 0, &object.values)?;

        while let Some(step) = next_encode_step(&mut stack)? {
            match step {
                EncodeStep::Close => {
                    write_end(out);
                    stack.pop();
                }
                EncodeStep::BaseSlot {
                    type_uuid,
                    name_crc,
                    values,
                } => {
                    let base = self.registry.require(&type_uuid)?;
                    self.push_flat(out, &mut stack, base, name_crc, values)?;
                }
                EncodeStep::Child {
                    type_uuid,
                    name_crc,
                    value,
                } => {
                    let child = self.registry.require(&type_uuid)?;
                    self.push_value(out, &mut stack, child, name_crc, value)?;
                }
            }
        }

        // End-of-stream sentinel, after the root's own end marker.
        write_end(out);
        Ok(())
    }

    /// Serialize into a fresh buffer.
    pub fn encode(&self, object: &NetObject) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(object, &mut out)?;
        Ok(out)
    }

    /// Deserialize one object from `buf`.
    ///
    /// Returns the root's class uuid and flat value list; reconstructing a
    /// concrete typed object from the pair is the caller's business.
    pub fn read_from(&self, buf: &[u8]) -> Result<NetObject> {
        let mut cursor = self.read_header(buf)?;

        let mut stack: Vec<DecodeFrame<'a>> = Vec::new();
        let mut root: Option<NetObject> = None;

        while !cursor.is_empty() {
            let Some(element) = read_element(&mut cursor)? else {
                // End sentinel: close the innermost open element. Extra
                // sentinels at depth zero are the stream trailer.
                if let Some(frame) = stack.pop() {
                    complete_frame(frame, &mut stack, &mut root)?;
                }
                continue;
            };

            let class = self.registry.require(&element.type_uuid)?;

            if stack.is_empty() {
                if root.is_some() {
                    return Err(ProtocolError::MalformedElement(
                        "data after the root object's end".into(),
                    ));
                }
                if class.codec_kind()? != CodecKind::Composite {
                    return Err(ProtocolError::DeserializeError(format!(
                        "root element {} is not a composite",
                        class.name
                    )));
                }
                debug!(class = %class.name, uuid = %class.uuid, "decoding root object");
                stack.push(DecodeFrame::Composite {
                    class,
                    values: vec![Value::Null; class.value_slot_count()],
                    dest: Dest::Root,
                });
                continue;
            }

            let Some(dest) = destination_for(&stack, &element)? else {
                // Not a slot in our schema version: drop exactly this
                // element's subtree and keep decoding its siblings.
                warn!(
                    name_crc = element.name_crc,
                    uuid = %element.type_uuid,
                    "skipping element with no matching field"
                );
                skip_subtree(&mut cursor)?;
                continue;
            };

            match class.codec_kind()? {
                CodecKind::Primitive { .. } => {
                    let value = Value::UInt(decode_primitive(class, element.data.as_deref())?);
                    store(&mut stack, dest, value)?;
                    stack.push(DecodeFrame::Leaf);
                }
                CodecKind::StringLike => {
                    let value = Value::Str(decode_string(element.data.as_deref())?);
                    store(&mut stack, dest, value)?;
                    stack.push(DecodeFrame::Leaf);
                }
                CodecKind::Container => {
                    stack.push(DecodeFrame::Container {
                        items: Vec::new(),
                        dest,
                    });
                }
                CodecKind::Composite => {
                    if dest == Dest::BaseSlot {
                        // Inheritance: children keep filling the owning
                        // object's flat list through this frame.
                        stack.push(DecodeFrame::Base { class });
                    } else {
                        stack.push(DecodeFrame::Composite {
                            class,
                            values: vec![Value::Null; class.value_slot_count()],
                            dest,
                        });
                    }
                }
            }
        }

        root.ok_or_else(|| {
            ProtocolError::DeserializeError("stream contained no root object".into())
        })
    }

    fn read_header<'b>(&self, buf: &'b [u8]) -> Result<&'b [u8]> {
        if buf.len() < STREAM_HEADER_SIZE {
            return Err(ProtocolError::DeserializeError(
                "stream shorter than its header".into(),
            ));
        }
        if buf[0] != STREAM_TAG {
            return Err(ProtocolError::BadStreamTag(buf[0]));
        }
        let version = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        if version != STREAM_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: STREAM_VERSION,
                actual: version,
            });
        }
        Ok(&buf[STREAM_HEADER_SIZE..])
    }

    /// Open a node whose children consume a flat slot list directly:
    /// the root object and base-class slots.
    fn push_flat<'v>(
        &self,
        out: &mut Vec<u8>,
        stack: &mut Vec<EncodeFrame<'v>>,
        class: &'v ClassDescriptor,
        name_crc: u32,
        values: &'v [Value],
    ) -> Result<()> {
        if class.codec_kind()? != CodecKind::Composite {
            return Err(ProtocolError::SerializeError(format!(
                "class {} must be a composite here",
                class.name
            )));
        }
        write_element(out, class, name_crc, None)?;
        stack.push(EncodeFrame::Composite {
            class,
            values,
            next: 0,
        });
        Ok(())
    }

    /// Open (or fully write, for leaves) a node for one runtime value.
    fn push_value<'v>(
        &self,
        out: &mut Vec<u8>,
        stack: &mut Vec<EncodeFrame<'v>>,
        class: &'v ClassDescriptor,
        name_crc: u32,
        value: &'v Value,
    ) -> Result<()>
    where
        'a: 'v,
    {
        match class.codec_kind()? {
            CodecKind::Primitive { .. } | CodecKind::StringLike => {
                write_element(out, class, name_crc, Some(value))?;
                write_end(out);
            }
            CodecKind::Container => {
                let items = value.as_seq().ok_or_else(|| {
                    ProtocolError::SerializeError(format!(
                        "class {} expects a sequence value",
                        class.name
                    ))
                })?;
                let item_uuid = class.container_element_type().ok_or_else(|| {
                    ProtocolError::SchemaError(format!(
                        "container {} lacks an element type",
                        class.name
                    ))
                })?;
                self.registry.require(&item_uuid)?;
                write_element(out, class, name_crc, None)?;
                stack.push(EncodeFrame::Container {
                    item_type_uuid: item_uuid,
                    item_name_crc: self.item_name_crc,
                    items,
                    next: 0,
                });
            }
            CodecKind::Composite => {
                let slots = value.as_fields().ok_or_else(|| {
                    ProtocolError::SerializeError(format!(
                        "class {} expects a field-list value",
                        class.name
                    ))
                })?;
                write_element(out, class, name_crc, None)?;
                stack.push(EncodeFrame::Composite {
                    class,
                    values: slots,
                    next: 0,
                });
            }
        }
        Ok(())
    }
}

enum EncodeFrame<'v> {
    Composite {
        class: &'v ClassDescriptor,
        values: &'v [Value],
        next: usize,
    },
    Container {
        item_type_uuid: Uuid,
        item_name_crc: u32,
        items: &'v [Value],
        next: usize,
    },
}

enum EncodeStep<'v> {
    /// The current frame has no more children; emit its end sentinel.
    Close,
    /// A base-class slot: same flat list, base descriptor.
    BaseSlot {
        type_uuid: Uuid,
        name_crc: u32,
        values: &'v [Value],
    },
    /// An ordinary child carrying its own value.
    Child {
        type_uuid: Uuid,
        name_crc: u32,
        value: &'v Value,
    },
}

/// Advance the top encode frame by one child, if any.
fn next_encode_step<'v>(stack: &mut [EncodeFrame<'v>]) -> Result<Option<EncodeStep<'v>>> {
    let Some(frame) = stack.last_mut() else {
        return Ok(None);
    };
    match frame {
        EncodeFrame::Composite { class, values, next } => {
            let class: &'v ClassDescriptor = *class;
            let values: &'v [Value] = *values;
            let Some(field) = class.fields.get(*next) else {
                return Ok(Some(EncodeStep::Close));
            };
            *next += 1;
            if field.is_base_class {
                // The base consumes the same flat list as its subclass.
                return Ok(Some(EncodeStep::BaseSlot {
                    type_uuid: field.type_uuid,
                    name_crc: field.name_crc,
                    values,
                }));
            }
            let value = values.get(field.index).ok_or_else(|| {
                ProtocolError::SerializeError(format!(
                    "class {}: no value for field {} (slot {})",
                    class.name, field.name, field.index
                ))
            })?;
            Ok(Some(EncodeStep::Child {
                type_uuid: field.type_uuid,
                name_crc: field.name_crc,
                value,
            }))
        }
        EncodeFrame::Container {
            item_type_uuid,
            item_name_crc,
            items,
            next,
        } => {
            let items: &'v [Value] = *items;
            let Some(item) = items.get(*next) else {
                return Ok(Some(EncodeStep::Close));
            };
            *next += 1;
            Ok(Some(EncodeStep::Child {
                type_uuid: *item_type_uuid,
                name_crc: *item_name_crc,
                value: item,
            }))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dest {
    /// This frame is the stream's root object.
    Root,
    /// Store into the owning composite's flat list at this index.
    Slot(usize),
    /// Append to the enclosing container.
    Append,
    /// Inheritance slot: children fill the owner's flat list directly.
    BaseSlot,
}

enum DecodeFrame<'s> {
    Composite {
        class: &'s ClassDescriptor,
        values: Vec<Value>,
        dest: Dest,
    },
    Container {
        items: Vec<Value>,
        dest: Dest,
    },
    /// A base-class element; owns no storage of its own.
    Base { class: &'s ClassDescriptor },
    /// A leaf element awaiting its end sentinel.
    Leaf,
}

/// Where does this element land relative to the innermost open frame?
///
/// `None` means "skip": either no field of the current class carries the
/// element's name hash, or the named field declares a different type uuid.
/// The payload of such an element is deliberately not inspected further
/// (forward compatibility).
fn destination_for(stack: &[DecodeFrame<'_>], element: &DataElement) -> Result<Option<Dest>> {
    let class = match stack.last() {
        Some(DecodeFrame::Container { .. }) => return Ok(Some(Dest::Append)),
        Some(DecodeFrame::Composite { class, .. }) => class,
        Some(DecodeFrame::Base { class }) => class,
        Some(DecodeFrame::Leaf) => {
            return Err(ProtocolError::MalformedElement(
                "element nested under a leaf value".into(),
            ))
        }
        None => unreachable!("caller handles the empty stack"),
    };

    match class.field_by_name_crc(element.name_crc) {
        Some(field) if field.type_uuid == element.type_uuid => {
            if field.is_base_class {
                Ok(Some(Dest::BaseSlot))
            } else {
                Ok(Some(Dest::Slot(field.index)))
            }
        }
        _ => Ok(None),
    }
}

/// Store a finished value into the innermost frame that owns storage
/// (base and leaf frames are transparent).
fn store(stack: &mut [DecodeFrame<'_>], dest: Dest, value: Value) -> Result<()> {
    let owner = stack.iter_mut().rev().find(|frame| {
        matches!(
            frame,
            DecodeFrame::Composite { .. } | DecodeFrame::Container { .. }
        )
    });
    match (owner, dest) {
        (Some(DecodeFrame::Composite { values, class, .. }), Dest::Slot(index)) => {
            if index >= values.len() {
                return Err(ProtocolError::DeserializeError(format!(
                    "class {}: slot {index} out of range",
                    class.name
                )));
            }
            values[index] = value;
            Ok(())
        }
        (Some(DecodeFrame::Container { items, .. }), Dest::Append) => {
            items.push(value);
            Ok(())
        }
        _ => Err(ProtocolError::MalformedElement(
            "value has no enclosing storage".into(),
        )),
    }
}

/// Handle an end sentinel: fold the closed frame into its parent (or
/// surface it as the decoded root).
fn complete_frame(
    frame: DecodeFrame<'_>,
    stack: &mut [DecodeFrame<'_>],
    root: &mut Option<NetObject>,
) -> Result<()> {
    match frame {
        DecodeFrame::Leaf | DecodeFrame::Base { .. } => Ok(()),
        DecodeFrame::Composite {
            class,
            values,
            dest,
        } => match dest {
            Dest::Root => {
                *root = Some(NetObject::new(class.uuid, values));
                Ok(())
            }
            dest => store(stack, dest, Value::Fields(values)),
        },
        DecodeFrame::Container { items, dest } => store(stack, dest, Value::Seq(items)),
    }
}

/// Consume exactly one element's subtree, including its end sentinel.
/// Every element on the wire is closed by one sentinel, so depth counting
/// over raw records suffices; type uuids inside the subtree are not
/// resolved.
fn skip_subtree(cursor: &mut &[u8]) -> Result<()> {
    let mut depth = 1usize;
    while depth > 0 {
        match read_element(cursor)? {
            Some(_) => depth += 1,
            None => depth -= 1,
        }
    }
    Ok(())
}

/// Read the root element's class uuid without decoding the whole stream.
pub fn peek_root_uuid(buf: &[u8]) -> Option<Uuid> {
    if buf.len() < STREAM_HEADER_SIZE {
        return None;
    }
    let mut cursor = &buf[STREAM_HEADER_SIZE..];
    match read_element(&mut cursor) {
        Ok(Some(element)) => Some(element.type_uuid),
        _ => None,
    }
}
