//! Context/Command Indicator Field groups.
//!
//! A CIF group pairs a 32-bit indicator word ("enables") with the optional payload
//! fields it gates. Every content field owns the indicator bit given by its CIF bit
//! number; the payload follows the indicator word in descending bit order, each
//! field present only when its bit is set.

use std::sync::Arc;

use crate::bits::{bytes_for, read_bits_at, write_bits_at};
use crate::container::Container;
use crate::errors::{LayoutError, LayoutWarning, ModeError, UnpackError, ValueError};
use crate::item::{Enable, Field, FieldType, Reserved, StructItem};
use crate::layout::{FieldId, PackedStruct, StructBuilder};
use crate::leaf::TypeTable;
use crate::mode::Mode;
use crate::position::{BitPosition, WORD_BITS};
use crate::value::Value;

/// What a CIF bit stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum CifEntryKind {
    /// Gates a payload field of this type.
    Content(FieldType),
    /// Pure state flag with no payload.
    Indicator,
    Reserved,
}

/// Declaration of one CIF bit.
#[derive(Debug, Clone, PartialEq)]
pub struct CifField {
    pub name: String,
    pub bit: u32,
    pub kind: CifEntryKind,
    pub mode: Mode,
}

impl CifField {
    /// Optional payload field.
    pub fn content(name: impl Into<String>, bit: u32, ty: impl Into<FieldType>) -> Self {
        CifField {
            name: name.into(),
            bit,
            kind: CifEntryKind::Content(ty.into()),
            mode: Mode::Optional,
        }
    }

    pub fn indicator(name: impl Into<String>, bit: u32) -> Self {
        CifField {
            name: name.into(),
            bit,
            kind: CifEntryKind::Indicator,
            mode: Mode::Optional,
        }
    }

    pub fn reserved(bit: u32) -> Self {
        CifField {
            name: format!("reserved_{bit}"),
            bit,
            kind: CifEntryKind::Reserved,
            mode: Mode::Disabled,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

/// A payload field of a frozen CIF group.
#[derive(Debug, Clone, PartialEq)]
pub struct CifContent {
    field: Field,
    enable: FieldId,
    enable_position: BitPosition,
}

impl CifContent {
    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    /// CIF bit number of the field.
    pub fn bit(&self) -> u32 {
        self.field.cif_bit.unwrap_or_default()
    }

    pub fn ty(&self) -> &FieldType {
        &self.field.ty
    }

    pub fn mode(&self) -> Mode {
        self.field.mode
    }

    /// Enable item in the indicator word.
    pub fn enable(&self) -> FieldId {
        self.enable
    }

    /// Position of the enable inside the indicator word.
    pub fn enable_position(&self) -> BitPosition {
        self.enable_position
    }
}

/// Collects CIF bit declarations and derives the indicator word.
#[derive(Debug, Clone, Default)]
pub struct CifBuilder {
    name: String,
    entries: Vec<CifField>,
}

impl CifBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        CifBuilder {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn entry(mut self, entry: CifField) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn content(self, name: impl Into<String>, bit: u32, ty: impl Into<FieldType>) -> Self {
        self.entry(CifField::content(name, bit, ty))
    }

    pub fn indicator(self, name: impl Into<String>, bit: u32) -> Self {
        self.entry(CifField::indicator(name, bit))
    }

    pub fn reserved(self, bit: u32) -> Self {
        self.entry(CifField::reserved(bit))
    }

    /// Builds the indicator word and the ordered payload list.
    ///
    /// Bits with no declaration become reserved. Adjacent reserved bits share one run.
    pub fn build(self, types: &TypeTable) -> Result<CifGroup, LayoutError> {
        let CifBuilder { name, entries } = self;

        let mut by_bit: [Option<usize>; WORD_BITS] = [None; WORD_BITS];
        for (i, entry) in entries.iter().enumerate() {
            let Some(cell) = by_bit.get_mut(entry.bit as usize) else {
                return Err(LayoutError::CifBitOutOfRange {
                    group: name,
                    field: entry.name.clone(),
                    bit: entry.bit,
                });
            };
            if let Some(first) = cell {
                return Err(LayoutError::CifBitCollision {
                    group: name,
                    bit: entry.bit,
                    first: entries[*first].name.clone(),
                    second: entry.name.clone(),
                });
            }
            *cell = Some(i);
        }

        let mut matrix = StructBuilder::new(format!("{name}_enables"));
        let mut reserved_run = 0;
        for bit in (0..WORD_BITS).rev() {
            let entry = by_bit[bit].map(|i| &entries[i]);
            let item: StructItem = match entry {
                None => {
                    reserved_run += 1;
                    continue;
                }
                Some(e) => match &e.kind {
                    CifEntryKind::Reserved => {
                        reserved_run += 1;
                        continue;
                    }
                    CifEntryKind::Content(_) => Enable::linked(&e.name, &e.name).into(),
                    CifEntryKind::Indicator => {
                        Field::new(&e.name, types.boolean(1)?).mode(e.mode).into()
                    }
                },
            };
            if reserved_run > 0 {
                matrix = matrix.item(Reserved::new(reserved_run));
                reserved_run = 0;
            }
            matrix = matrix.item(item);
        }
        if reserved_run > 0 {
            matrix = matrix.item(Reserved::new(reserved_run));
        }
        let enables = matrix.build()?;

        let mut content = Vec::new();
        let mut warnings = Vec::new();
        for bit in (0..WORD_BITS).rev() {
            let Some(entry) = by_bit[bit].map(|i| &entries[i]) else {
                continue;
            };
            let CifEntryKind::Content(ty) = &entry.kind else {
                continue;
            };

            let enable = enables
                .field_id(&entry.name)
                .filter(|&id| enables.slot(id).is_some_and(|s| s.item().as_enable().is_some()));
            let Some(enable) = enable else {
                return Err(LayoutError::UnknownEnable {
                    structure: enables.name().to_string(),
                    field: entry.name.clone(),
                    enable: entry.name.clone(),
                });
            };
            let enable_position = enables.position_of(&entry.name).unwrap_or_default();
            if enable_position.word() != 0 || enable_position.bit() != entry.bit {
                return Err(LayoutError::CifBitMismatch {
                    group: name,
                    field: entry.name.clone(),
                    bit: entry.bit,
                    position: enable_position,
                });
            }

            if ty.bits() % WORD_BITS != 0 {
                warnings.push(LayoutWarning::ContentSize {
                    group: name.clone(),
                    field: entry.name.clone(),
                    bits: ty.bits(),
                });
            }

            content.push(CifContent {
                field: Field::new(entry.name.clone(), ty.clone())
                    .mode(entry.mode)
                    .cif_bit(entry.bit),
                enable,
                enable_position,
            });
        }

        for warning in &warnings {
            log::warn!("{warning}");
        }
        log::debug!("built CIF group `{name}`: {} content fields", content.len());

        Ok(CifGroup {
            name,
            enables: Arc::new(enables),
            content,
            warnings,
        })
    }
}

/// A frozen CIF group: indicator word plus payload descriptors in CIF bit order.
#[derive(Debug, Clone, PartialEq)]
pub struct CifGroup {
    name: String,
    enables: Arc<PackedStruct>,
    content: Vec<CifContent>,
    warnings: Vec<LayoutWarning>,
}

impl CifGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The 32-bit indicator word.
    pub fn enables(&self) -> &Arc<PackedStruct> {
        &self.enables
    }

    /// Payload fields, highest CIF bit first.
    pub fn content(&self) -> &[CifContent] {
        &self.content
    }

    pub fn content_field(&self, name: &str) -> Option<&CifContent> {
        self.content.iter().find(|c| c.name() == name)
    }

    pub fn warnings(&self) -> &[LayoutWarning] {
        &self.warnings
    }

    /// At least one payload field is in use.
    pub fn has_enabled_fields(&self) -> bool {
        has_enabled(self.content.iter().map(CifContent::mode))
    }

    /// Every payload field in use is optional.
    pub fn all_optional_fields(&self) -> bool {
        all_optional(self.content.iter().map(CifContent::mode))
    }

    /// Mode implied for the group as a whole, e.g. for the indicator bit announcing it.
    pub fn presence(&self) -> Mode {
        presence(self.content.iter().map(CifContent::mode))
    }

    /// Bits of the fixed payload when every content field is present.
    pub fn max_payload_bits(&self) -> usize {
        self.content.iter().map(|c| c.ty().bits()).sum()
    }
}

fn has_enabled(mut modes: impl Iterator<Item = Mode>) -> bool {
    modes.any(Mode::is_enabled)
}

fn all_optional(mut modes: impl Iterator<Item = Mode>) -> bool {
    modes.all(|m| !m.is_enabled() || m.is_optional())
}

fn presence(modes: impl Iterator<Item = Mode> + Clone) -> Mode {
    if !has_enabled(modes.clone()) {
        Mode::Disabled
    } else if all_optional(modes) {
        Mode::Optional
    } else {
        Mode::Required
    }
}

/// Values of one CIF group instance: the indicator word plus payload values.
#[derive(Debug, Clone)]
pub struct CifContainer {
    group: Arc<CifGroup>,
    enables: Container,
    values: Vec<Value>,
    modes: Vec<Mode>,
}

impl CifContainer {
    pub fn new(group: Arc<CifGroup>) -> Self {
        let mut enables = Container::new(Arc::clone(&group.enables));
        let mut values = Vec::with_capacity(group.content.len());
        let mut modes = Vec::with_capacity(group.content.len());

        for content in &group.content {
            values.push(match content.ty() {
                FieldType::Leaf(leaf) => leaf.default_value(),
                FieldType::Struct(nested) => Value::Struct(Container::new(Arc::clone(nested))),
            });
            modes.push(content.mode());
            if let Some(present) = content.mode().implied_presence() {
                enables.set_enable(content.enable(), present);
            }
        }

        CifContainer {
            group,
            enables,
            values,
            modes,
        }
    }

    pub fn group(&self) -> &Arc<CifGroup> {
        &self.group
    }

    /// Indicator word values.
    pub fn enables(&self) -> &Container {
        &self.enables
    }

    fn content_index(&self, name: &str) -> Option<usize> {
        self.group.content.iter().position(|c| c.name() == name)
    }

    fn is_enabled(&self, index: usize) -> bool {
        let enable = self.group.content[index].enable();
        matches!(self.enables.get(enable), Some(Value::Bool(true)))
    }

    /// Payload value or indicator state; `None` for absent payload fields.
    pub fn get_value(&self, name: &str) -> Result<Option<&Value>, ValueError> {
        match self.content_index(name) {
            Some(i) if self.is_enabled(i) => Ok(Some(&self.values[i])),
            Some(_) => Ok(None),
            None => self.enables.get_value(name),
        }
    }

    /// Assigns a payload field (setting its indicator bit) or an indicator flag.
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ValueError> {
        let value = value.into();
        let Some(i) = self.content_index(name) else {
            return self.enables.set_value(name, value);
        };

        let content = &self.group.content[i];
        self.values[i] = match content.ty() {
            FieldType::Leaf(leaf) => leaf.coerce(value)?,
            FieldType::Struct(nested) => match value {
                Value::Struct(c) if c.layout() == nested => Value::Struct(c),
                other => {
                    return Err(ValueError::Type {
                        expected: "structure",
                        found: other.kind(),
                    });
                }
            },
        };
        self.enables.set_enable(content.enable(), true);
        Ok(())
    }

    /// Marks a payload field absent by clearing its indicator bit.
    pub fn clear_value(&mut self, name: &str) -> Result<(), ValueError> {
        let Some(i) = self.content_index(name) else {
            return self.enables.clear_value(name);
        };
        self.enables.set_enable(self.group.content[i].enable(), false);
        Ok(())
    }

    /// Nested payload structure; marks it present.
    pub fn nested_mut(&mut self, name: &str) -> Result<&mut Container, ValueError> {
        let i = self
            .content_index(name)
            .ok_or_else(|| ValueError::UnknownField(name.to_string()))?;
        let enable = self.group.content[i].enable();
        match &mut self.values[i] {
            Value::Struct(c) => {
                self.enables.set_enable(enable, true);
                Ok(c)
            }
            other => Err(ValueError::Type {
                expected: "structure",
                found: other.kind(),
            }),
        }
    }

    pub fn mode(&self, name: &str) -> Result<Mode, ModeError> {
        match self.content_index(name) {
            Some(i) => Ok(self.modes[i]),
            None => self.enables.mode(name),
        }
    }

    /// Applies a mode request to a payload field and keeps its indicator bit consistent.
    pub fn set_mode(&mut self, name: &str, mode: Mode) -> Result<(), ModeError> {
        let Some(i) = self.content_index(name) else {
            return self.enables.set_mode(name, mode);
        };
        let next = self.modes[i].transition(mode, name)?;
        self.modes[i] = next;
        if let Some(present) = next.implied_presence() {
            self.enables.set_enable(self.group.content[i].enable(), present);
        }
        Ok(())
    }

    pub fn has_enabled_fields(&self) -> bool {
        has_enabled(self.modes.iter().copied())
    }

    pub fn all_optional_fields(&self) -> bool {
        all_optional(self.modes.iter().copied())
    }

    pub fn presence(&self) -> Mode {
        presence(self.modes.iter().copied())
    }

    /// Bits produced by [CifContainer::pack] for the current indicator state.
    pub fn packed_bits(&self) -> usize {
        let payload: usize = (0..self.values.len())
            .filter(|&i| self.is_enabled(i))
            .map(|i| self.group.content[i].ty().bits())
            .sum();
        self.group.enables.bits() + payload
    }

    /// Indicator word followed by every present payload field, highest CIF bit first.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = vec![0u8; bytes_for(self.packed_bits())];
        self.enables.pack_into(&mut out, 0);

        let mut cursor = self.group.enables.bits();
        for (i, content) in self.group.content.iter().enumerate() {
            if !self.is_enabled(i) {
                continue;
            }
            match (content.ty(), &self.values[i]) {
                (FieldType::Leaf(leaf), value) => {
                    write_bits_at(&mut out, cursor, leaf.bits(), leaf.encode(value));
                }
                (FieldType::Struct(_), Value::Struct(nested)) => nested.pack_into(&mut out, cursor),
                (FieldType::Struct(_), _) => {}
            }
            cursor += content.ty().bits();
        }
        out
    }

    /// Reads the indicator word, then exactly the payload fields it announces.
    pub fn unpack(group: Arc<CifGroup>, data: &[u8]) -> Result<Self, UnpackError> {
        let enables = Container::unpack(Arc::clone(&group.enables), data)?;
        let mut container = CifContainer::new(Arc::clone(&group));
        container.enables = enables;

        let mut cursor = group.enables.bits();
        for (i, content) in group.content.iter().enumerate() {
            if !container.is_enabled(i) {
                continue;
            }

            let bits = content.ty().bits();
            let required = bytes_for(cursor + bits);
            if data.len() < required {
                return Err(UnpackError::PacketTooShort {
                    required,
                    actual: data.len(),
                });
            }

            container.values[i] = match content.ty() {
                FieldType::Leaf(leaf) => {
                    let raw = read_bits_at(data, cursor, bits)?;
                    leaf.from_binary(raw)
                        .map_err(|source| UnpackError::InvalidValue {
                            field: content.name().to_string(),
                            source,
                        })?
                }
                FieldType::Struct(nested) => {
                    Value::Struct(Container::unpack_at(Arc::clone(nested), data, cursor)?)
                }
            };
            cursor += bits;
        }

        Ok(container)
    }
}

impl PartialEq for CifContainer {
    /// Same observable state: indicator word plus the payload values it announces.
    /// Modes are configuration and do not travel on the wire.
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.group, &other.group) || self.group == other.group)
            && self.enables == other.enables
            && (0..self.values.len())
                .filter(|&i| self.is_enabled(i))
                .all(|i| self.values[i] == other.values[i])
    }
}
