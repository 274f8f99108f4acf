//! # Class Schema Registry
//!
//! In-memory catalog of the engine's reflected type metadata. The registry
//! answers two questions for the codec: "what shape does the class with
//! uuid X have" and "how is a value of this class encoded".
//!
//! The registry is built once from an external schema file (a JSON dump
//! produced per engine build by the engine-side exporter), validated, and
//! never mutated afterward. It is read-only and safe to share across
//! concurrent codec operations behind an `Arc`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ProtocolError, Result};
use crate::utils::name_hash;

/// Class name of the engine's dynamic string type.
const STRING_CLASS_NAME: &str = "AZStd::string";
/// Prefix shared by all instantiations of the engine's string template.
const STRING_TEMPLATE_PREFIX: &str = "AZStd::basic_string";

/// Largest value size a primitive leaf may declare.
const MAX_PRIMITIVE_SIZE: usize = 8;

/// One declared field of a composite class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassField {
    pub name: String,
    /// 32-bit hash of `name`; the wire identifies fields by this alone.
    pub name_crc: u32,
    /// Marks the inheritance slot. Must be the first field when present.
    pub is_base_class: bool,
    pub type_uuid: Uuid,
    /// Layout info carried through from the engine dump; unused by the
    /// codec but kept so a registry round-trips its source file.
    pub byte_offset: usize,
    pub byte_size: usize,
    /// Slot in the flat value array at the language boundary.
    pub index: usize,
}

/// Schema record describing one reflected engine type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: String,
    pub uuid: Uuid,
    pub version: u8,
    /// What this container holds; empty for non-containers, one entry
    /// otherwise.
    pub container_element_types: Vec<Uuid>,
    pub byte_size: usize,
    pub fields: Vec<ClassField>,
}

/// How the codec treats a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// Fixed-width unsigned numeric leaf.
    Primitive { byte_size: usize },
    /// UTF-8 string leaf.
    StringLike,
    /// Homogeneous sequence of one element type.
    Container,
    /// Struct-like type with positional fields.
    Composite,
}

impl ClassDescriptor {
    /// Classify this descriptor for the codec.
    ///
    /// Priority order matters: a string-family class must be treated as a
    /// string even when its declared size would also qualify it as a
    /// primitive. A descriptor matching no category is reported as an
    /// error, never silently coerced.
    pub fn codec_kind(&self) -> Result<CodecKind> {
        if self.is_string_like() {
            return Ok(CodecKind::StringLike);
        }
        if self.byte_size <= MAX_PRIMITIVE_SIZE
            && self.container_element_types.is_empty()
            && self.fields.is_empty()
        {
            return Ok(CodecKind::Primitive {
                byte_size: self.byte_size,
            });
        }
        if !self.container_element_types.is_empty() {
            return Ok(CodecKind::Container);
        }
        if !self.fields.is_empty() {
            return Ok(CodecKind::Composite);
        }
        Err(ProtocolError::UnclassifiableClass {
            name: self.name.clone(),
            uuid: self.uuid,
        })
    }

    /// Whether this class carries inline value bytes on the wire.
    pub fn is_leaf(&self) -> Result<bool> {
        Ok(matches!(
            self.codec_kind()?,
            CodecKind::Primitive { .. } | CodecKind::StringLike
        ))
    }

    fn is_string_like(&self) -> bool {
        self.name == STRING_CLASS_NAME || self.name.starts_with(STRING_TEMPLATE_PREFIX)
    }

    /// The element type held by this container.
    pub fn container_element_type(&self) -> Option<Uuid> {
        self.container_element_types.first().copied()
    }

    /// Length of the flat value list for this composite: one slot per
    /// declared positional index, sized by the last (highest) index.
    pub fn value_slot_count(&self) -> usize {
        self.fields.last().map(|f| f.index + 1).unwrap_or(0)
    }

    /// Find a field by its wire name hash.
    pub fn field_by_name_crc(&self, name_crc: u32) -> Option<&ClassField> {
        self.fields.iter().find(|f| f.name_crc == name_crc)
    }
}

/// Raw schema-file record, in the engine exporter's field naming.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClassElement {
    name: String,
    /// Precomputed by the exporter; computed from `name` when absent.
    #[serde(default)]
    name_crc: Option<u32>,
    #[serde(default)]
    is_base_class: bool,
    uuid: String,
    #[serde(default)]
    cpp_offset: usize,
    #[serde(default)]
    cpp_size: usize,
    element_index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClassData {
    name: String,
    uuid: String,
    #[serde(default)]
    version: u8,
    #[serde(default)]
    container_types: Vec<String>,
    type_size: usize,
    #[serde(default)]
    elements: Vec<RawClassElement>,
}

#[derive(Debug, Deserialize)]
struct RawSchemaFile {
    classes: Vec<RawClassData>,
}

/// Immutable database of all serializable classes known to this build.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    classes: HashMap<Uuid, ClassDescriptor>,
}

impl SchemaRegistry {
    /// Build a registry from descriptors, validating shape invariants.
    pub fn from_classes(classes: Vec<ClassDescriptor>) -> Result<Self> {
        let mut map = HashMap::with_capacity(classes.len());
        for class in classes {
            validate_descriptor(&class)?;
            if map.insert(class.uuid, class).is_some() {
                return Err(ProtocolError::SchemaError(
                    "duplicate class uuid in schema source".into(),
                ));
            }
        }
        Ok(Self { classes: map })
    }

    /// Load the schema data file the engine exporter produces.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSchemaFile = serde_json::from_str(json)
            .map_err(|e| ProtocolError::SchemaError(format!("failed to parse schema: {e}")))?;

        let mut classes = Vec::with_capacity(raw.classes.len());
        for class in raw.classes {
            classes.push(convert_raw_class(class)?);
        }
        Self::from_classes(classes)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            ProtocolError::SchemaError(format!(
                "failed to read schema file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json(&contents)
    }

    /// Look up a class descriptor by uuid.
    pub fn find(&self, uuid: &Uuid) -> Option<&ClassDescriptor> {
        self.classes.get(uuid)
    }

    /// Like [`find`](Self::find) but mapping absence to the decode-fatal
    /// error the codec reports.
    pub fn require(&self, uuid: &Uuid) -> Result<&ClassDescriptor> {
        self.find(uuid)
            .ok_or(ProtocolError::UnknownTypeUuid(*uuid))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text.trim_start_matches('{').trim_end_matches('}'))
        .map_err(|e| ProtocolError::SchemaError(format!("invalid uuid {text:?}: {e}")))
}

fn convert_raw_class(raw: RawClassData) -> Result<ClassDescriptor> {
    let mut container_element_types = Vec::with_capacity(raw.container_types.len());
    for uuid in &raw.container_types {
        container_element_types.push(parse_uuid(uuid)?);
    }

    let mut fields = Vec::with_capacity(raw.elements.len());
    for element in raw.elements {
        let name_crc = element.name_crc.unwrap_or_else(|| name_hash(&element.name));
        fields.push(ClassField {
            name_crc,
            is_base_class: element.is_base_class,
            type_uuid: parse_uuid(&element.uuid)?,
            byte_offset: element.cpp_offset,
            byte_size: element.cpp_size,
            index: element.element_index,
            name: element.name,
        });
    }

    Ok(ClassDescriptor {
        uuid: parse_uuid(&raw.uuid)?,
        version: raw.version,
        container_element_types,
        byte_size: raw.type_size,
        fields,
        name: raw.name,
    })
}

fn validate_descriptor(class: &ClassDescriptor) -> Result<()> {
    if class.container_element_types.len() > 1 {
        return Err(ProtocolError::SchemaError(format!(
            "class {} declares {} container element types",
            class.name,
            class.container_element_types.len()
        )));
    }
    if !class.container_element_types.is_empty() && !class.fields.is_empty() {
        return Err(ProtocolError::SchemaError(format!(
            "container class {} must not declare fields",
            class.name
        )));
    }
    let mut last_index: Option<usize> = None;
    for (pos, field) in class.fields.iter().enumerate() {
        if field.is_base_class && pos != 0 {
            return Err(ProtocolError::SchemaError(format!(
                "class {}: base-class slot {} is not the first field",
                class.name, field.name
            )));
        }
        if let Some(prev) = last_index {
            if field.index <= prev {
                return Err(ProtocolError::SchemaError(format!(
                    "class {}: field indices must be strictly increasing",
                    class.name
                )));
            }
        }
        last_index = Some(field.index);
    }
    Ok(())
}
