//! Layout engine: assigns bit positions to a structure's items and freezes the result.
//!
//! Items are placed MSB-first starting at word 0, bit 31, each one immediately after
//! the previous. A derived structure may start from a frozen base and *rebind* reserved
//! bits of the base to concrete fields without moving anything else.

use std::collections::HashMap;

use crate::bits::bytes_for;
use crate::errors::{LayoutError, LayoutWarning};
use crate::item::{Enable, Field, FieldType, Reserved, StructItem};
use crate::mode::Mode;
use crate::position::{BitPosition, WORD_BITS};

/// Typed index of an item inside a [PackedStruct].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(usize);

impl FieldId {
    pub(crate) fn from_index(index: usize) -> Self {
        FieldId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// A laid-out item.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    item: StructItem,
    position: BitPosition,
    link: Option<usize>,
}

impl Slot {
    pub fn item(&self) -> &StructItem {
        &self.item
    }

    pub fn position(&self) -> BitPosition {
        self.position
    }

    pub fn bits(&self) -> usize {
        self.item.bits()
    }

    /// Position immediately following this item.
    pub fn end(&self) -> BitPosition {
        self.position + self.bits()
    }

    pub fn name(&self) -> Option<&str> {
        self.item.name()
    }

    /// For a field, its enable; for an enable, its field when both live in this structure.
    pub fn link(&self) -> Option<FieldId> {
        self.link.map(FieldId)
    }
}

/// Knobs for [StructBuilder::build].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Promote the first layout warning to [LayoutError::Strict].
    pub strict: bool,
}

/// A frozen, laid-out structure definition.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedStruct {
    name: String,
    slots: Vec<Slot>,
    bits: usize,
    index: HashMap<String, usize>,
    warnings: Vec<LayoutWarning>,
    dynamic_size: bool,
}

impl PackedStruct {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total length in bits.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Bytes needed to pack the structure.
    pub fn bytes(&self) -> usize {
        bytes_for(self.bits)
    }

    pub fn words(&self) -> usize {
        self.bits.div_ceil(WORD_BITS)
    }

    /// Items in layout order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, id: FieldId) -> Option<&Slot> {
        self.slots.get(id.0)
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.index.get(name).copied().map(FieldId)
    }

    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.index.get(name).map(|&i| &self.slots[i])
    }

    pub fn position_of(&self, name: &str) -> Option<BitPosition> {
        self.get(name).map(Slot::position)
    }

    /// Fields in layout order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &Field)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.item.as_field().map(|f| (FieldId(i), f)))
    }

    /// Enable slot gating the named field.
    pub fn enable_of(&self, field: &str) -> Option<&Slot> {
        let slot = self.get(field)?;
        slot.item.as_field()?;
        slot.link.map(|i| &self.slots[i])
    }

    pub fn warnings(&self) -> &[LayoutWarning] {
        &self.warnings
    }

    /// Gated fields whose declared mode is not disabled.
    fn enabled_gated_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields()
            .filter(|(id, f)| self.slots[id.0].link.is_some() && f.mode.is_enabled())
            .map(|(_, f)| f)
    }

    /// True when at least one enable-gated field is in use.
    pub fn has_enabled_fields(&self) -> bool {
        self.enabled_gated_fields().next().is_some()
    }

    /// True when no gated field in use is required, i.e. the structure as a whole may be omitted.
    pub fn all_optional_fields(&self) -> bool {
        self.enabled_gated_fields().all(|f| f.mode.is_optional())
    }

    /// The frozen layout only covers the fixed-size prefix of the structure.
    pub fn dynamic_size(&self) -> bool {
        self.dynamic_size
    }

    /// Dynamic-size, or containing a dynamic-size structure.
    pub fn is_template(&self) -> bool {
        self.dynamic_size
            || self.fields().any(|(_, f)| match &f.ty {
                FieldType::Struct(nested) => nested.is_template(),
                FieldType::Leaf(_) => false,
            })
    }

    /// Derives a new structure with the reserved bits at `position` replaced by `field`.
    pub fn rebind(&self, position: BitPosition, field: Field) -> Result<PackedStruct, LayoutError> {
        StructBuilder::extend(self.name.clone(), self)
            .rebind(position, field)
            .build()
    }
}

enum Pending {
    Append(StructItem),
    Rebind(BitPosition, Field),
}

/// Declares a structure, then freezes it into a [PackedStruct].
///
/// ```
/// use vrtgen::item::{Enable, Field};
/// use vrtgen::layout::StructBuilder;
/// use vrtgen::leaf::TypeTable;
/// use vrtgen::position::BitPosition;
///
/// let types = TypeTable::new();
/// let layout = StructBuilder::new("example")
///     .field(Field::new("first", types.int(16).unwrap()))
///     .reserved(15)
///     .enable(Enable::new("count_enable"))
///     .field(Field::new("count", types.uint(16).unwrap()).enabled_by("count_enable"))
///     .build()
///     .unwrap();
///
/// assert_eq!(layout.bits(), 48);
/// assert_eq!(layout.position_of("count"), Some(BitPosition::new(1, 31)));
/// ```
pub struct StructBuilder {
    name: String,
    placed: Vec<(StructItem, BitPosition)>,
    cursor: BitPosition,
    pending: Vec<Pending>,
    options: LayoutOptions,
    dynamic_size: bool,
}

impl StructBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        StructBuilder {
            name: name.into(),
            placed: Vec::new(),
            cursor: BitPosition::START,
            pending: Vec::new(),
            options: LayoutOptions::default(),
            dynamic_size: false,
        }
    }

    /// Starts from the frozen layout of `base`; new items go after its last bit.
    pub fn extend(name: impl Into<String>, base: &PackedStruct) -> Self {
        StructBuilder {
            placed: base
                .slots
                .iter()
                .map(|slot| (slot.item.clone(), slot.position))
                .collect(),
            cursor: BitPosition::from_offset(base.bits),
            dynamic_size: base.dynamic_size,
            ..StructBuilder::new(name)
        }
    }

    pub fn item(mut self, item: impl Into<StructItem>) -> Self {
        self.pending.push(Pending::Append(item.into()));
        self
    }

    pub fn field(self, field: Field) -> Self {
        self.item(field)
    }

    pub fn enable(self, enable: Enable) -> Self {
        self.item(enable)
    }

    pub fn reserved(self, bits: usize) -> Self {
        self.item(Reserved::new(bits))
    }

    /// Replaces reserved bits at `position` with `field` in place.
    pub fn rebind(mut self, position: BitPosition, field: Field) -> Self {
        self.pending.push(Pending::Rebind(position, field));
        self
    }

    pub fn options(mut self, options: LayoutOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dynamic_size(mut self, dynamic: bool) -> Self {
        self.dynamic_size = dynamic;
        self
    }

    /// Places all items, validates the layout and freezes it.
    pub fn build(self) -> Result<PackedStruct, LayoutError> {
        let StructBuilder {
            name,
            mut placed,
            mut cursor,
            pending,
            options,
            dynamic_size,
        } = self;

        for step in pending {
            match step {
                Pending::Append(item) => {
                    let next = advance(cursor, &item)?;
                    placed.push((item, cursor));
                    cursor = next;
                }
                Pending::Rebind(position, field) => {
                    rebind_in_place(&name, &mut placed, position, field)?;
                }
            }
        }

        freeze(name, placed, options, dynamic_size)
    }
}

/// Enables are decoded as a single unsigned read.
const MAX_ENABLE_BITS: usize = 64;

/// A VRT packet is at most 65535 words long.
const MAX_STRUCT_BITS: usize = 65535 * WORD_BITS;

/// Position following `item` placed at `cursor`.
fn advance(cursor: BitPosition, item: &StructItem) -> Result<BitPosition, LayoutError> {
    let bits = item.bits();
    let (kind, limit) = match item {
        StructItem::Field(_) => ("field", MAX_STRUCT_BITS),
        StructItem::Enable(_) => ("enable", MAX_ENABLE_BITS),
        StructItem::Reserved(_) => ("reserved", MAX_STRUCT_BITS),
    };

    cursor
        .offset()
        .checked_add(bits)
        .filter(|&end| bits <= limit && end <= MAX_STRUCT_BITS)
        .map(BitPosition::from_offset)
        .ok_or(LayoutError::InvalidWidth { kind, bits })
}

fn rebind_in_place(
    structure: &str,
    placed: &mut Vec<(StructItem, BitPosition)>,
    position: BitPosition,
    field: Field,
) -> Result<(), LayoutError> {
    let target = placed
        .iter()
        .position(|(item, start)| *start <= position && position < *start + item.bits());

    let Some(index) = target.filter(|&i| placed[i].0.is_reserved()) else {
        return Err(LayoutError::RebindTargetNotFound {
            structure: structure.to_string(),
            field: field.name,
            position,
        });
    };

    let (run, start) = &placed[index];
    let start = *start;
    let run_end = start + run.bits();
    let end = position + field.bits();

    if end > run_end {
        return Err(LayoutError::RebindOverflow {
            structure: structure.to_string(),
            field: field.name.clone(),
            position,
            bits: field.bits(),
        });
    }

    log::trace!("{structure}: rebinding {position} to `{}`", field.name);

    let mut replacement = Vec::with_capacity(3);
    if position > start {
        replacement.push((Reserved::new(position - start).into(), start));
    }
    replacement.push((StructItem::Field(field), position));
    if end < run_end {
        replacement.push((Reserved::new(run_end - end).into(), end));
    }

    placed.splice(index..=index, replacement);
    Ok(())
}

/// Required start alignment of a field of `bits` bits.
fn natural_alignment(bits: usize) -> usize {
    match bits {
        8 | 16 | 32 => bits,
        24 => 8,
        b if b > WORD_BITS && b % WORD_BITS == 0 => WORD_BITS,
        _ => 1,
    }
}

fn freeze(
    name: String,
    placed: Vec<(StructItem, BitPosition)>,
    options: LayoutOptions,
    dynamic_size: bool,
) -> Result<PackedStruct, LayoutError> {
    let mut expected = BitPosition::START;
    let mut index: HashMap<String, usize> = HashMap::with_capacity(placed.len());

    for (i, (item, position)) in placed.iter().enumerate() {
        if item.bits() == 0 {
            return Err(LayoutError::InvalidWidth {
                kind: "structure item",
                bits: 0,
            });
        }

        if *position != expected {
            return Err(LayoutError::Discontinuity {
                structure: name.clone(),
                item: item.label(),
                expected,
                found: *position,
            });
        }
        expected = *position + item.bits();

        if let Some(item_name) = item.name()
            && index.insert(item_name.to_string(), i).is_some()
        {
            return Err(LayoutError::DuplicateName {
                structure: name.clone(),
                name: item_name.to_string(),
            });
        }
    }

    let mut slots: Vec<Slot> = placed
        .into_iter()
        .map(|(item, position)| Slot {
            item,
            position,
            link: None,
        })
        .collect();

    link_enables(&name, &mut slots, &index)?;

    let bits = expected.offset();
    let warnings = check_layout(&name, &slots, bits);

    for warning in &warnings {
        log::warn!("{warning}");
    }
    if options.strict
        && let Some(first) = warnings.first()
    {
        return Err(LayoutError::Strict(first.clone()));
    }

    log::debug!("froze `{name}`: {} items, {bits} bits", slots.len());

    Ok(PackedStruct {
        name,
        slots,
        bits,
        index,
        warnings,
        dynamic_size,
    })
}

fn link_enables(
    structure: &str,
    slots: &mut [Slot],
    index: &HashMap<String, usize>,
) -> Result<(), LayoutError> {
    for i in 0..slots.len() {
        let Some(field) = slots[i].item.as_field() else {
            continue;
        };
        let Some(enable_name) = field.enabled_by.clone() else {
            continue;
        };
        let field_name = field.name.clone();

        let enable_index = index
            .get(&enable_name)
            .copied()
            .filter(|&e| slots[e].item.as_enable().is_some())
            .ok_or_else(|| LayoutError::UnknownEnable {
                structure: structure.to_string(),
                field: field_name.clone(),
                enable: enable_name.clone(),
            })?;

        if let StructItem::Enable(enable) = &mut slots[enable_index].item {
            match &enable.field {
                Some(linked) if *linked != field_name => {
                    return Err(LayoutError::EnableAlreadyLinked {
                        structure: structure.to_string(),
                        enable: enable_name,
                        linked: linked.clone(),
                        field: field_name,
                    });
                }
                _ => enable.field = Some(field_name),
            }
        }

        slots[i].link = Some(enable_index);
        slots[enable_index].link = Some(i);
    }

    for i in 0..slots.len() {
        let Some(enable) = slots[i].item.as_enable() else {
            continue;
        };
        if slots[i].link.is_some() {
            continue;
        }
        let Some(field_name) = enable.field.clone() else {
            return Err(LayoutError::UnlinkedEnable {
                structure: structure.to_string(),
                enable: enable.name.clone(),
            });
        };
        let enable_name = enable.name.clone();

        // A field named by the enable but declaring no enable of its own is linked here;
        // names that are not local fields refer to content in another structure.
        let Some(&f) = index.get(&field_name) else {
            continue;
        };
        if let StructItem::Field(field) = &mut slots[f].item {
            if let Some(other) = &field.enabled_by {
                return Err(LayoutError::EnableAlreadyLinked {
                    structure: structure.to_string(),
                    enable: other.clone(),
                    linked: field_name,
                    field: enable_name,
                });
            }
            field.enabled_by = Some(enable_name);
            if field.mode == Mode::Required {
                field.mode = Mode::Optional;
            }
            slots[f].link = Some(i);
            slots[i].link = Some(f);
        }
    }

    Ok(())
}

fn check_layout(structure: &str, slots: &[Slot], bits: usize) -> Vec<LayoutWarning> {
    let mut warnings = Vec::new();

    if bits % WORD_BITS != 0 {
        warnings.push(LayoutWarning::Size {
            structure: structure.to_string(),
            bits,
        });
    }

    for slot in slots {
        let Some(field) = slot.item.as_field() else {
            continue;
        };
        let alignment = natural_alignment(field.bits());
        if !slot.position.is_aligned_to(alignment) {
            warnings.push(LayoutWarning::Alignment {
                structure: structure.to_string(),
                field: field.name.clone(),
                position: slot.position,
                bits: field.bits(),
                alignment,
            });
        }
    }

    warnings
}
