//! JSON-deserializable structure and CIF definitions.
//!
//! A schema front end hands these shapes to the core. They compile into frozen
//! [PackedStruct] and [CifGroup] values through a [TypeTable]; the configured field
//! modes and initial values are then applied to a fresh [Container].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cif::{CifBuilder, CifField, CifGroup};
use crate::container::Container;
use crate::errors::{ConfigError, LayoutError};
use crate::item::{Enable, Field, FieldType, Reserved, StructItem};
use crate::layout::{LayoutOptions, PackedStruct, StructBuilder};
use crate::leaf::TypeTable;
use crate::mode::Mode;
use crate::position::BitPosition;

fn one() -> usize {
    1
}

fn yes() -> bool {
    true
}

/// Shape of a field's value.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeDef {
    Boolean {
        #[serde(default = "one")]
        bits: usize,
    },
    Integer {
        bits: usize,
        #[serde(default)]
        signed: bool,
    },
    FixedPoint {
        bits: usize,
        radix: u32,
        /// Fixed-point quantities are signed unless stated otherwise.
        #[serde(default = "yes")]
        signed: bool,
    },
    NonZeroSize {
        bits: usize,
    },
    Enum {
        name: String,
        bits: usize,
        symbols: Vec<SymbolDef>,
    },
    /// Nested structure, laid out on its own.
    Struct(StructDef),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SymbolDef {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModeDef {
    Disabled,
    Optional,
    Required,
    Mandatory,
}

impl From<ModeDef> for Mode {
    fn from(value: ModeDef) -> Self {
        match value {
            ModeDef::Disabled => Mode::Disabled,
            ModeDef::Optional => Mode::Optional,
            ModeDef::Required => Mode::Required,
            ModeDef::Mandatory => Mode::Mandatory,
        }
    }
}

/// Explicit placement; on a derived structure this rebinds reserved bits of the base.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct PositionDef {
    pub word: usize,
    pub bit: u32,
}

impl From<PositionDef> for BitPosition {
    fn from(value: PositionDef) -> Self {
        BitPosition::new(value.word, value.bit)
    }
}

/// Initial value of a field. Strings name enum symbols.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ValueDef {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Symbol(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: TypeDef,
    #[serde(default)]
    pub mode: Option<ModeDef>,
    /// Name of the enable item gating this field.
    #[serde(default)]
    pub enabled_by: Option<String>,
    #[serde(default = "yes")]
    pub editable: bool,
    #[serde(default)]
    pub position: Option<PositionDef>,
    #[serde(default)]
    pub value: Option<ValueDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnableDef {
    pub name: String,
    #[serde(default = "one")]
    pub bits: usize,
    /// Field gated by this enable when the field does not name it itself.
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReservedDef {
    #[serde(default)]
    pub name: Option<String>,
    pub bits: usize,
}

/// One entry of a structure's content list.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum ItemDef {
    Field(FieldDef),
    Enable(EnableDef),
    Reserved(ReservedDef),
}

/// Top-level structure definition.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StructDef {
    pub name: String,
    /// Items in declaration order.
    pub items: Vec<ItemDef>,
    #[serde(default)]
    pub dynamic_size: bool,
    /// Reject layouts that produce warnings.
    #[serde(default)]
    pub strict: bool,
}

impl TypeDef {
    pub fn compile(&self, types: &TypeTable) -> Result<FieldType, LayoutError> {
        let ty = match self {
            TypeDef::Boolean { bits } => types.boolean(*bits)?,
            TypeDef::Integer { bits, signed } => types.integer(*bits, *signed)?,
            TypeDef::FixedPoint {
                bits,
                radix,
                signed,
            } => types.fixed_point(*bits, *radix, *signed)?,
            TypeDef::NonZeroSize { bits } => types.non_zero_size(*bits)?,
            TypeDef::Enum {
                name,
                bits,
                symbols,
            } => types.enumeration(
                name,
                *bits,
                symbols.iter().map(|s| (s.name.as_str(), s.value)),
            )?,
            TypeDef::Struct(def) => return Ok(FieldType::Struct(Arc::new(def.compile(types, None)?))),
        };
        Ok(FieldType::Leaf(ty))
    }
}

impl FieldDef {
    pub fn compile(&self, types: &TypeTable) -> Result<Field, LayoutError> {
        let mut field = Field::new(self.name.clone(), self.kind.compile(types)?);
        if let Some(enable) = &self.enabled_by {
            field = field.enabled_by(enable.clone());
        }
        if let Some(mode) = self.mode {
            field = field.mode(mode.into());
        }
        if !self.editable {
            field = field.read_only();
        }
        Ok(field)
    }
}

impl From<&EnableDef> for Enable {
    fn from(value: &EnableDef) -> Self {
        Enable {
            name: value.name.clone(),
            bits: value.bits,
            field: value.field.clone(),
        }
    }
}

impl From<&ReservedDef> for Reserved {
    fn from(value: &ReservedDef) -> Self {
        Reserved {
            name: value.name.clone(),
            bits: value.bits,
        }
    }
}

impl StructDef {
    /// Lays out the definition, on top of `base` when given.
    pub fn compile(
        &self,
        types: &TypeTable,
        base: Option<&PackedStruct>,
    ) -> Result<PackedStruct, LayoutError> {
        let mut builder = match base {
            Some(base) => StructBuilder::extend(self.name.clone(), base),
            None => StructBuilder::new(self.name.clone()),
        }
        .options(LayoutOptions {
            strict: self.strict,
        });
        if self.dynamic_size {
            builder = builder.dynamic_size(true);
        }

        for item in &self.items {
            builder = match item {
                ItemDef::Field(def) => {
                    let field = def.compile(types)?;
                    match def.position {
                        Some(position) => builder.rebind(position.into(), field),
                        None => builder.field(field),
                    }
                }
                ItemDef::Enable(def) => builder.item(StructItem::Enable(def.into())),
                ItemDef::Reserved(def) => builder.item(StructItem::Reserved(def.into())),
            };
        }

        builder.build()
    }

    /// A container for `layout` holding the configured initial values.
    ///
    /// Assigning a value to a disabled field makes it required.
    pub fn instantiate(&self, layout: Arc<PackedStruct>) -> Result<Container, ConfigError> {
        let mut container = Container::new(layout);
        self.apply(&mut container)?;
        Ok(container)
    }

    fn apply(&self, container: &mut Container) -> Result<(), ConfigError> {
        for item in &self.items {
            let ItemDef::Field(def) = item else {
                continue;
            };

            if let TypeDef::Struct(nested) = &def.kind
                && nested.has_values()
            {
                nested.apply(container.nested_mut(&def.name)?)?;
            }

            let Some(value) = &def.value else {
                continue;
            };
            let mode = container.mode(&def.name)?;
            if mode.with_value() != mode {
                container.set_mode(&def.name, mode.with_value())?;
            }
            match value {
                ValueDef::Bool(v) => container.set_value(&def.name, *v)?,
                ValueDef::Int(v) => container.set_value(&def.name, *v)?,
                ValueDef::UInt(v) => container.set_value(&def.name, *v)?,
                ValueDef::Float(v) => container.set_value(&def.name, *v)?,
                ValueDef::Symbol(symbol) => container.set_symbol(&def.name, symbol)?,
            }
        }
        Ok(())
    }

    fn has_values(&self) -> bool {
        self.items.iter().any(|item| match item {
            ItemDef::Field(def) => {
                def.value.is_some() || matches!(&def.kind, TypeDef::Struct(nested) if nested.has_values())
            }
            _ => false,
        })
    }
}

/// One CIF bit declaration.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum CifFieldDef {
    Content {
        name: String,
        bit: u32,
        kind: TypeDef,
        #[serde(default)]
        mode: Option<ModeDef>,
    },
    Indicator {
        name: String,
        bit: u32,
    },
    Reserved {
        bit: u32,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CifDef {
    pub name: String,
    pub fields: Vec<CifFieldDef>,
}

impl CifDef {
    pub fn compile(&self, types: &TypeTable) -> Result<CifGroup, LayoutError> {
        let mut builder = CifBuilder::new(self.name.clone());
        for def in &self.fields {
            let entry = match def {
                CifFieldDef::Content {
                    name,
                    bit,
                    kind,
                    mode,
                } => {
                    let entry = CifField::content(name.clone(), *bit, kind.compile(types)?);
                    match mode {
                        Some(mode) => entry.mode((*mode).into()),
                        None => entry,
                    }
                }
                CifFieldDef::Indicator { name, bit } => CifField::indicator(name.clone(), *bit),
                CifFieldDef::Reserved { bit } => CifField::reserved(*bit),
            };
            builder = builder.entry(entry);
        }
        builder.build(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cif::CifContainer;
    use crate::errors::ModeError;

    const EXAMPLE: &str = r#"{
        "name": "example",
        "items": [
            { "item": "field", "name": "first", "kind": { "type": "integer", "bits": 16, "signed": true }, "value": -30000 },
            { "item": "field", "name": "second", "kind": { "type": "fixed_point", "bits": 16, "radix": 7 }, "value": -17.625 },
            { "item": "field", "name": "third", "kind": { "type": "boolean" }, "value": true },
            { "item": "reserved", "bits": 15 },
            { "item": "enable", "name": "count_enable" },
            { "item": "field", "name": "count", "kind": { "type": "integer", "bits": 15 }, "enabled_by": "count_enable", "value": 12345 }
        ]
    }"#;

    #[test]
    fn test_compile_and_instantiate_example() {
        let types = TypeTable::new();
        let def: StructDef = serde_json::from_str(EXAMPLE).unwrap();
        let layout = Arc::new(def.compile(&types, None).unwrap());
        assert_eq!(layout.bits(), 64);

        let c = def.instantiate(layout).unwrap();
        assert_eq!(c.pack(), vec![0x8A, 0xD0, 0xF7, 0x30, 0x80, 0x00, 0xB0, 0x39]);
    }

    #[test]
    fn test_value_upgrades_disabled_field() {
        let types = TypeTable::new();
        let def: StructDef = serde_json::from_str(
            r#"{
                "name": "s",
                "items": [
                    { "item": "enable", "name": "e" },
                    { "item": "field", "name": "v", "kind": { "type": "integer", "bits": 31 },
                      "enabled_by": "e", "mode": "disabled", "value": 3 }
                ]
            }"#,
        )
        .unwrap();
        let layout = Arc::new(def.compile(&types, None).unwrap());
        let c = def.instantiate(layout).unwrap();
        assert_eq!(c.mode("v").unwrap(), Mode::Required);
        assert_eq!(c.pack(), vec![0x80, 0, 0, 3]);
    }

    #[test]
    fn test_rebind_through_position() {
        let types = TypeTable::new();
        let base: StructDef = serde_json::from_str(
            r#"{
                "name": "header",
                "items": [
                    { "item": "field", "name": "packet_type", "kind": { "type": "integer", "bits": 4 } },
                    { "item": "reserved", "bits": 4 },
                    { "item": "field", "name": "size", "kind": { "type": "integer", "bits": 24 } }
                ]
            }"#,
        )
        .unwrap();
        let derived: StructDef = serde_json::from_str(
            r#"{
                "name": "data_header",
                "items": [
                    { "item": "field", "name": "trailer_included", "kind": { "type": "boolean" },
                      "position": { "word": 0, "bit": 26 }, "value": true }
                ]
            }"#,
        )
        .unwrap();

        let base_layout = base.compile(&types, None).unwrap();
        let layout = Arc::new(derived.compile(&types, Some(&base_layout)).unwrap());
        assert_eq!(layout.bits(), 32);
        assert_eq!(
            layout.position_of("trailer_included"),
            Some(BitPosition::new(0, 26))
        );
        assert_eq!(layout.position_of("size"), base_layout.position_of("size"));

        let c = derived.instantiate(layout).unwrap();
        assert_eq!(c.pack(), vec![0x04, 0, 0, 0]);
    }

    #[test]
    fn test_enum_symbols_and_nested_values() {
        let types = TypeTable::new();
        let def: StructDef = serde_json::from_str(
            r#"{
                "name": "outer",
                "items": [
                    { "item": "field", "name": "tsi",
                      "kind": { "type": "enum", "name": "TSI", "bits": 2, "symbols": [
                          { "name": "none", "value": 0 }, { "name": "utc", "value": 1 },
                          { "name": "gps", "value": 2 }, { "name": "other", "value": 3 } ] },
                      "value": "gps" },
                    { "item": "reserved", "bits": 30 },
                    { "item": "field", "name": "gain", "kind": { "type": "struct", "name": "gain", "items": [
                        { "item": "field", "name": "stage2", "kind": { "type": "fixed_point", "bits": 16, "radix": 7 } },
                        { "item": "field", "name": "stage1", "kind": { "type": "fixed_point", "bits": 16, "radix": 7 }, "value": 1.5 }
                    ] } }
                ]
            }"#,
        )
        .unwrap();
        let layout = Arc::new(def.compile(&types, None).unwrap());
        let c = def.instantiate(layout).unwrap();
        assert_eq!(c.pack(), vec![0x80, 0, 0, 0, 0, 0, 0x00, 0xC0]);
    }

    #[test]
    fn test_mandatory_blocks_disabling() {
        let types = TypeTable::new();
        let def: StructDef = serde_json::from_str(
            r#"{
                "name": "s",
                "items": [
                    { "item": "field", "name": "id", "kind": { "type": "integer", "bits": 32 }, "mode": "mandatory" }
                ]
            }"#,
        )
        .unwrap();
        let layout = Arc::new(def.compile(&types, None).unwrap());
        let mut c = def.instantiate(layout).unwrap();
        assert!(matches!(
            c.set_mode("id", Mode::Disabled),
            Err(ModeError::MandatoryLocked { .. })
        ));
    }

    #[test]
    fn test_bad_value_is_reported() {
        let types = TypeTable::new();
        let def: StructDef = serde_json::from_str(
            r#"{
                "name": "s",
                "items": [
                    { "item": "field", "name": "small", "kind": { "type": "integer", "bits": 8 }, "value": 300 },
                    { "item": "reserved", "bits": 24 }
                ]
            }"#,
        )
        .unwrap();
        let layout = Arc::new(def.compile(&types, None).unwrap());
        assert!(matches!(
            def.instantiate(layout),
            Err(ConfigError::Value(_))
        ));
    }

    #[test]
    fn test_strict_definition() {
        let types = TypeTable::new();
        let def: StructDef = serde_json::from_str(
            r#"{ "name": "short", "strict": true,
                 "items": [ { "item": "field", "name": "a", "kind": { "type": "integer", "bits": 16 } } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            def.compile(&types, None),
            Err(LayoutError::Strict(_))
        ));
    }

    #[test]
    fn test_cif_definition() {
        let types = TypeTable::new();
        let def: CifDef = serde_json::from_str(
            r#"{
                "name": "cif0",
                "fields": [
                    { "entry": "indicator", "name": "change_indicator", "bit": 31 },
                    { "entry": "content", "name": "bandwidth", "bit": 29,
                      "kind": { "type": "fixed_point", "bits": 64, "radix": 20 }, "mode": "required" },
                    { "entry": "reserved", "bit": 0 }
                ]
            }"#,
        )
        .unwrap();
        let group = Arc::new(def.compile(&types).unwrap());
        assert_eq!(group.presence(), Mode::Required);

        let c = CifContainer::new(group);
        assert_eq!(&c.pack()[0..4], &[0x20, 0, 0, 0]);
    }
}
