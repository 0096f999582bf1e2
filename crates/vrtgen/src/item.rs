//! Items declared in a structure: user-visible fields, enable flags and reserved padding.

use std::sync::Arc;

use crate::layout::PackedStruct;
use crate::leaf::LeafType;
use crate::mode::Mode;

/// Type of a field: a leaf value or a nested frozen structure.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Leaf(Arc<LeafType>),
    Struct(Arc<PackedStruct>),
}

impl FieldType {
    pub fn bits(&self) -> usize {
        match self {
            FieldType::Leaf(leaf) => leaf.bits(),
            FieldType::Struct(layout) => layout.bits(),
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafType> {
        match self {
            FieldType::Leaf(leaf) => Some(leaf),
            FieldType::Struct(_) => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Arc<PackedStruct>> {
        match self {
            FieldType::Struct(layout) => Some(layout),
            FieldType::Leaf(_) => None,
        }
    }
}

impl From<Arc<LeafType>> for FieldType {
    fn from(value: Arc<LeafType>) -> Self {
        FieldType::Leaf(value)
    }
}

impl From<Arc<PackedStruct>> for FieldType {
    fn from(value: Arc<PackedStruct>) -> Self {
        FieldType::Struct(value)
    }
}

impl From<PackedStruct> for FieldType {
    fn from(value: PackedStruct) -> Self {
        FieldType::Struct(Arc::new(value))
    }
}

/// A named, settable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    /// Declared presence policy; containers start from it.
    pub mode: Mode,
    /// Name of the enable gating this field, if it is optional.
    pub enabled_by: Option<String>,
    /// Read-only fields reject assignment after construction.
    pub editable: bool,
    /// Indicator bit number when the field is CIF content. Independent of its layout position.
    pub cif_bit: Option<u32>,
}

impl Field {
    /// A required, editable field.
    pub fn new(name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        Field {
            name: name.into(),
            ty: ty.into(),
            mode: Mode::Required,
            enabled_by: None,
            editable: true,
            cif_bit: None,
        }
    }

    /// Links this field to the enable named `enable` and makes it optional.
    pub fn enabled_by(mut self, enable: impl Into<String>) -> Self {
        self.enabled_by = Some(enable.into());
        if self.mode == Mode::Required {
            self.mode = Mode::Optional;
        }
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn cif_bit(mut self, bit: u32) -> Self {
        self.cif_bit = Some(bit);
        self
    }

    pub fn bits(&self) -> usize {
        self.ty.bits()
    }
}

/// Presence flag of an optional field, 1 bit wide unless it is a legacy multi-bit gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Enable {
    pub name: String,
    pub bits: usize,
    /// Linked field. Set by the layout engine for same-structure links, or up front
    /// when the field lives in another structure (CIF matrices).
    pub field: Option<String>,
}

impl Enable {
    pub fn new(name: impl Into<String>) -> Self {
        Enable {
            name: name.into(),
            bits: 1,
            field: None,
        }
    }

    /// Enable whose field lives outside the structure being declared.
    pub fn linked(name: impl Into<String>, field: impl Into<String>) -> Self {
        Enable {
            field: Some(field.into()),
            ..Enable::new(name)
        }
    }

    pub fn bits(mut self, bits: usize) -> Self {
        self.bits = bits;
        self
    }
}

/// Constant-zero padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reserved {
    pub name: Option<String>,
    pub bits: usize,
}

impl Reserved {
    pub fn new(bits: usize) -> Self {
        Reserved { name: None, bits }
    }

    pub fn named(name: impl Into<String>, bits: usize) -> Self {
        Reserved {
            name: Some(name.into()),
            bits,
        }
    }
}

/// One entry of a structure's content list.
#[derive(Debug, Clone, PartialEq)]
pub enum StructItem {
    Field(Field),
    Enable(Enable),
    Reserved(Reserved),
}

impl StructItem {
    pub fn name(&self) -> Option<&str> {
        match self {
            StructItem::Field(f) => Some(&f.name),
            StructItem::Enable(e) => Some(&e.name),
            StructItem::Reserved(r) => r.name.as_deref(),
        }
    }

    pub fn bits(&self) -> usize {
        match self {
            StructItem::Field(f) => f.bits(),
            StructItem::Enable(e) => e.bits,
            StructItem::Reserved(r) => r.bits,
        }
    }

    pub fn as_field(&self) -> Option<&Field> {
        match self {
            StructItem::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_enable(&self) -> Option<&Enable> {
        match self {
            StructItem::Enable(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, StructItem::Reserved(_))
    }

    /// Label used in layout diagnostics.
    pub(crate) fn label(&self) -> String {
        self.name().map_or_else(|| "<reserved>".to_string(), str::to_string)
    }
}

impl From<Field> for StructItem {
    fn from(value: Field) -> Self {
        StructItem::Field(value)
    }
}

impl From<Enable> for StructItem {
    fn from(value: Enable) -> Self {
        StructItem::Enable(value)
    }
}

impl From<Reserved> for StructItem {
    fn from(value: Reserved) -> Self {
        StructItem::Reserved(value)
    }
}
