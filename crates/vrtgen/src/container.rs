//! Values of one structure instance, with name-based access and bit-exact pack/unpack.

use std::sync::Arc;

use crate::bits::{mask, read_bits_at, write_bits_at};
use crate::errors::{ModeError, UnpackError, ValueError};
use crate::item::{FieldType, StructItem};
use crate::layout::{FieldId, PackedStruct};
use crate::mode::Mode;
use crate::value::Value;

/// Concrete values for a [PackedStruct].
///
/// Optional fields read as `None` while their enable is false, whatever value is
/// stored underneath. Assigning a value sets the enable, clearing the field resets it.
#[derive(Debug, Clone)]
pub struct Container {
    layout: Arc<PackedStruct>,
    values: Vec<Value>,
    modes: Vec<Mode>,
}

impl Container {
    /// Instance holding default values; enables follow the declared field modes.
    pub fn new(layout: Arc<PackedStruct>) -> Self {
        let values = layout
            .slots()
            .iter()
            .map(|slot| match slot.item() {
                StructItem::Field(field) => default_for(&field.ty),
                StructItem::Enable(_) => {
                    let present = slot
                        .link()
                        .and_then(|id| layout.slot(id))
                        .and_then(|s| s.item().as_field())
                        .and_then(|f| f.mode.implied_presence())
                        .unwrap_or(false);
                    Value::Bool(present)
                }
                StructItem::Reserved(_) => Value::U64(0),
            })
            .collect();

        let modes = layout
            .slots()
            .iter()
            .map(|slot| slot.item().as_field().map_or(Mode::Disabled, |f| f.mode))
            .collect();

        Container {
            layout,
            values,
            modes,
        }
    }

    pub fn layout(&self) -> &Arc<PackedStruct> {
        &self.layout
    }

    pub fn id(&self, name: &str) -> Result<FieldId, ValueError> {
        self.layout
            .field_id(name)
            .ok_or_else(|| ValueError::UnknownField(name.to_string()))
    }

    /// Current value, `None` for an optional field whose enable is false.
    pub fn get(&self, id: FieldId) -> Option<&Value> {
        let slot = self.layout.slot(id)?;
        if slot.item().as_field().is_some()
            && let Some(enable) = slot.link()
            && !self.enable_state(enable)
        {
            return None;
        }
        self.values.get(id.index())
    }

    pub fn get_value(&self, name: &str) -> Result<Option<&Value>, ValueError> {
        Ok(self.get(self.id(name)?))
    }

    pub fn is_present(&self, name: &str) -> Result<bool, ValueError> {
        Ok(self.get_value(name)?.is_some())
    }

    /// Assigns `value` to the item `id`; `None` means absent.
    ///
    /// For a field with an enable, `None` clears the enable and keeps the stored value;
    /// anything else is validated against the field type and sets the enable.
    pub fn set(&mut self, id: FieldId, value: Option<Value>) -> Result<(), ValueError> {
        let layout = Arc::clone(&self.layout);
        let Some(slot) = layout.slot(id) else {
            return Err(ValueError::UnknownField(format!("#{}", id.index())));
        };

        match slot.item() {
            StructItem::Reserved(_) => Err(ValueError::Reserved(slot.item().label())),
            StructItem::Enable(enable) => {
                let present = match value {
                    None => false,
                    Some(Value::Bool(v)) => v,
                    Some(v @ (Value::I64(_) | Value::U64(_))) => {
                        v.as_i128()
                            .is_some_and(|raw| (raw & mask(enable.bits) as i128) != 0)
                    }
                    Some(other) => {
                        return Err(ValueError::Type {
                            expected: "boolean",
                            found: other.kind(),
                        });
                    }
                };
                self.values[id.index()] = Value::Bool(present);
                Ok(())
            }
            StructItem::Field(field) => {
                if !field.editable {
                    return Err(ValueError::ReadOnly(field.name.clone()));
                }

                let Some(value) = value else {
                    let Some(enable) = slot.link() else {
                        return Err(ValueError::NotOptional(field.name.clone()));
                    };
                    self.values[enable.index()] = Value::Bool(false);
                    return Ok(());
                };

                let value = match &field.ty {
                    FieldType::Leaf(leaf) => leaf.coerce(value)?,
                    FieldType::Struct(nested) => match value {
                        Value::Struct(c)
                            if Arc::ptr_eq(&c.layout, nested) || *c.layout == **nested =>
                        {
                            Value::Struct(c)
                        }
                        other => {
                            return Err(ValueError::Type {
                                expected: "structure",
                                found: other.kind(),
                            });
                        }
                    },
                };

                self.values[id.index()] = value;
                if let Some(enable) = slot.link() {
                    self.values[enable.index()] = Value::Bool(true);
                }
                Ok(())
            }
        }
    }

    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ValueError> {
        let id = self.id(name)?;
        self.set(id, Some(value.into()))
    }

    /// Marks an optional field absent.
    pub fn clear_value(&mut self, name: &str) -> Result<(), ValueError> {
        let id = self.id(name)?;
        self.set(id, None)
    }

    /// Assigns an enum field by symbol name.
    pub fn set_symbol(&mut self, name: &str, symbol: &str) -> Result<(), ValueError> {
        let id = self.id(name)?;
        let table = self
            .layout
            .slot(id)
            .and_then(|s| s.item().as_field())
            .and_then(|f| f.ty.as_leaf())
            .and_then(|leaf| leaf.as_enum())
            .ok_or(ValueError::Type {
                expected: "enum",
                found: "non-enum field",
            })?;
        let value = table.value_of(symbol).ok_or_else(|| ValueError::Enum {
            name: table.name().to_string(),
            value: symbol.to_string(),
        })?;
        self.set(id, Some(Value::U64(value)))
    }

    pub fn mode(&self, name: &str) -> Result<Mode, ModeError> {
        let id = self.mode_id(name)?;
        Ok(self.modes[id.index()])
    }

    /// Applies a mode change request, keeping the linked enable consistent.
    ///
    /// A rejected request leaves the mode unchanged.
    pub fn set_mode(&mut self, name: &str, mode: Mode) -> Result<(), ModeError> {
        let id = self.mode_id(name)?;
        let next = self.modes[id.index()].transition(mode, name)?;
        self.modes[id.index()] = next;

        let link = self.layout.slot(id).and_then(|slot| slot.link());
        if let (Some(enable), Some(present)) = (link, next.implied_presence()) {
            self.values[enable.index()] = Value::Bool(present);
        }
        Ok(())
    }

    fn mode_id(&self, name: &str) -> Result<FieldId, ModeError> {
        self.layout
            .field_id(name)
            .filter(|&id| {
                self.layout
                    .slot(id)
                    .is_some_and(|s| s.item().as_field().is_some())
            })
            .ok_or_else(|| ModeError::UnknownField(name.to_string()))
    }

    pub fn nested(&self, name: &str) -> Result<&Container, ValueError> {
        let id = self.id(name)?;
        match &self.values[id.index()] {
            Value::Struct(c) => Ok(c),
            other => Err(ValueError::Type {
                expected: "structure",
                found: other.kind(),
            }),
        }
    }

    /// Mutable access to a nested structure; marks it present.
    pub fn nested_mut(&mut self, name: &str) -> Result<&mut Container, ValueError> {
        let id = self.id(name)?;
        let value = &self.values[id.index()];
        if !matches!(value, Value::Struct(_)) {
            return Err(ValueError::Type {
                expected: "structure",
                found: value.kind(),
            });
        }
        if let Some(enable) = self.layout.slot(id).and_then(|s| s.link()) {
            self.set_enable(enable, true);
        }
        match &mut self.values[id.index()] {
            Value::Struct(c) => Ok(c),
            other => Err(ValueError::Type {
                expected: "structure",
                found: other.kind(),
            }),
        }
    }

    /// Named items with their current value, in layout order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.layout.slots().iter().enumerate().filter_map(|(i, slot)| {
            slot.name()
                .filter(|_| !slot.item().is_reserved())
                .map(|name| (name, self.get(FieldId::from_index(i))))
        })
    }

    /// Writes an enable's state directly, bypassing value coercion.
    pub(crate) fn set_enable(&mut self, enable: FieldId, present: bool) {
        if let Some(value) = self.values.get_mut(enable.index()) {
            *value = Value::Bool(present);
        }
    }

    fn enable_state(&self, enable: FieldId) -> bool {
        matches!(self.values.get(enable.index()), Some(Value::Bool(true)))
    }

    /// Serialises the structure big-endian, MSB-first. Absent fields and reserved bits are zero.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.layout.bytes()];
        self.pack_into(&mut out, 0);
        out
    }

    /// Writes the structure into a zeroed `buf` starting at bit `base`.
    pub(crate) fn pack_into(&self, buf: &mut [u8], base: usize) {
        for (i, slot) in self.layout.slots().iter().enumerate() {
            let at = base + slot.position().offset();
            match slot.item() {
                StructItem::Reserved(_) => {}
                StructItem::Enable(enable) => {
                    let raw = if self.enable_state(FieldId::from_index(i)) {
                        mask(enable.bits)
                    } else {
                        0
                    };
                    write_bits_at(buf, at, enable.bits, raw);
                }
                StructItem::Field(field) => {
                    let Some(value) = self.get(FieldId::from_index(i)) else {
                        continue;
                    };
                    match (&field.ty, value) {
                        (FieldType::Leaf(leaf), value) => {
                            write_bits_at(buf, at, leaf.bits(), leaf.encode(value));
                        }
                        (FieldType::Struct(_), Value::Struct(nested)) => {
                            nested.pack_into(buf, at);
                        }
                        (FieldType::Struct(_), _) => {}
                    }
                }
            }
        }
    }

    /// Rebuilds an instance from bytes. `data` must hold at least the structure's bytes.
    pub fn unpack(layout: Arc<PackedStruct>, data: &[u8]) -> Result<Self, UnpackError> {
        let required = layout.bytes();
        if data.len() < required {
            return Err(UnpackError::PacketTooShort {
                required,
                actual: data.len(),
            });
        }
        Self::unpack_at(layout, data, 0)
    }

    /// Decodes the structure starting at bit `base` of `data`.
    pub(crate) fn unpack_at(
        layout: Arc<PackedStruct>,
        data: &[u8],
        base: usize,
    ) -> Result<Self, UnpackError> {
        let mut container = Container::new(Arc::clone(&layout));

        // Enables first: absent fields are not decoded.
        for (i, slot) in layout.slots().iter().enumerate() {
            if let StructItem::Enable(enable) = slot.item() {
                let raw = read_bits_at(data, base + slot.position().offset(), enable.bits)?;
                container.values[i] = Value::Bool(raw != 0);
            }
        }

        for (i, slot) in layout.slots().iter().enumerate() {
            let StructItem::Field(field) = slot.item() else {
                continue;
            };
            if let Some(enable) = slot.link()
                && !container.enable_state(enable)
            {
                continue;
            }

            let at = base + slot.position().offset();
            container.values[i] = match &field.ty {
                FieldType::Leaf(leaf) => {
                    let raw = read_bits_at(data, at, leaf.bits())?;
                    leaf.from_binary(raw)
                        .map_err(|source| UnpackError::InvalidValue {
                            field: field.name.clone(),
                            source,
                        })?
                }
                FieldType::Struct(nested) => {
                    Value::Struct(Container::unpack_at(Arc::clone(nested), data, at)?)
                }
            };
        }

        Ok(container)
    }
}

fn default_for(ty: &FieldType) -> Value {
    match ty {
        FieldType::Leaf(leaf) => leaf.default_value(),
        FieldType::Struct(nested) => Value::Struct(Container::new(Arc::clone(nested))),
    }
}

impl PartialEq for Container {
    /// Same layout and same observable values; stale values behind a false enable are ignored.
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.layout, &other.layout) || self.layout == other.layout)
            && (0..self.values.len()).all(|i| {
                let id = FieldId::from_index(i);
                self.get(id) == other.get(id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Enable, Field};
    use crate::layout::StructBuilder;
    use crate::leaf::TypeTable;
    use proptest::prelude::*;

    fn example(types: &TypeTable) -> Arc<PackedStruct> {
        Arc::new(
            StructBuilder::new("example")
                .field(Field::new("first", types.int(16).unwrap()))
                .field(Field::new("second", types.fixed_point(16, 7, true).unwrap()))
                .field(Field::new("third", types.boolean(1).unwrap()))
                .reserved(15)
                .enable(Enable::new("count_enable"))
                .field(Field::new("count", types.uint(15).unwrap()).enabled_by("count_enable"))
                .build()
                .unwrap(),
        )
    }

    fn populated(types: &TypeTable) -> Container {
        let mut c = Container::new(example(types));
        c.set_value("first", -30000).unwrap();
        c.set_value("second", -17.625).unwrap();
        c.set_value("third", true).unwrap();
        c.set_value("count", 12345).unwrap();
        c
    }

    #[test]
    fn test_pack_example() {
        let types = TypeTable::new();
        let packed = populated(&types).pack();
        assert_eq!(packed, vec![0x8A, 0xD0, 0xF7, 0x30, 0x80, 0x00, 0xB0, 0x39]);
    }

    #[test]
    fn test_unpack_example() {
        let types = TypeTable::new();
        let layout = example(&types);
        let c = Container::unpack(
            Arc::clone(&layout),
            &[0x8A, 0xD0, 0xF7, 0x30, 0x80, 0x00, 0xB0, 0x39],
        )
        .unwrap();
        assert_eq!(c.get_value("first").unwrap(), Some(&Value::I64(-30000)));
        assert_eq!(c.get_value("second").unwrap(), Some(&Value::F64(-17.625)));
        assert_eq!(c.get_value("third").unwrap(), Some(&Value::Bool(true)));
        assert_eq!(c.get_value("count").unwrap(), Some(&Value::U64(12345)));
        assert_eq!(c, populated(&types));
    }

    #[test]
    fn test_unpack_too_short() {
        let types = TypeTable::new();
        let err = Container::unpack(example(&types), &[0x8A, 0xD0, 0xF7]).unwrap_err();
        assert_eq!(
            err,
            UnpackError::PacketTooShort {
                required: 8,
                actual: 3
            }
        );
    }

    #[test]
    fn test_optional_field_starts_absent() {
        let types = TypeTable::new();
        let c = Container::new(example(&types));
        assert_eq!(c.get_value("count").unwrap(), None);
        assert_eq!(c.get_value("count_enable").unwrap(), Some(&Value::Bool(false)));
        assert_eq!(c.get_value("first").unwrap(), Some(&Value::I64(0)));
    }

    #[test]
    fn test_enable_linkage() {
        let types = TypeTable::new();
        let mut c = populated(&types);
        assert_eq!(c.get_value("count_enable").unwrap(), Some(&Value::Bool(true)));

        c.clear_value("count").unwrap();
        assert_eq!(c.get_value("count").unwrap(), None);
        assert_eq!(c.get_value("count_enable").unwrap(), Some(&Value::Bool(false)));
        assert_eq!(&c.pack()[4..], &[0x80, 0x00, 0x00, 0x00]);

        // Re-enabling exposes the untouched stored value.
        c.set_value("count_enable", true).unwrap();
        assert_eq!(c.get_value("count").unwrap(), Some(&Value::U64(12345)));
    }

    #[test]
    fn test_absent_field_round_trips_as_absent() {
        let types = TypeTable::new();
        let mut c = populated(&types);
        c.clear_value("count").unwrap();

        let back = Container::unpack(Arc::clone(c.layout()), &c.pack()).unwrap();
        assert_eq!(back.get_value("count").unwrap(), None);
        assert_eq!(back, c);
    }

    #[test]
    fn test_reserved_cannot_be_set() {
        let types = TypeTable::new();
        let mut c = Container::new(example(&types));
        let reserved = FieldId::from_index(3);
        assert!(c.layout().slot(reserved).unwrap().item().is_reserved());
        assert_eq!(
            c.set(reserved, Some(Value::U64(0))).unwrap_err(),
            ValueError::Reserved("<reserved>".to_string())
        );
    }

    #[test]
    fn test_set_errors() {
        let types = TypeTable::new();
        let mut c = Container::new(example(&types));
        assert!(matches!(
            c.set_value("first", 40000),
            Err(ValueError::Range { .. })
        ));
        assert_eq!(c.get_value("first").unwrap(), Some(&Value::I64(0)));
        assert_eq!(
            c.clear_value("first").unwrap_err(),
            ValueError::NotOptional("first".to_string())
        );
        assert_eq!(
            c.set_value("missing", 1).unwrap_err(),
            ValueError::UnknownField("missing".to_string())
        );
        assert!(matches!(
            c.set_value("third", 0.5),
            Err(ValueError::Type { .. })
        ));
    }

    #[test]
    fn test_read_only_field() {
        let types = TypeTable::new();
        let layout = StructBuilder::new("constant")
            .field(Field::new("version", types.uint(32).unwrap()).read_only())
            .build()
            .unwrap();
        let mut c = Container::new(Arc::new(layout));
        assert_eq!(
            c.set_value("version", 2).unwrap_err(),
            ValueError::ReadOnly("version".to_string())
        );
    }

    #[test]
    fn test_modes_drive_enable() {
        let types = TypeTable::new();
        let mut c = Container::new(example(&types));
        assert_eq!(c.mode("count").unwrap(), Mode::Optional);

        c.set_mode("count", Mode::Required).unwrap();
        assert_eq!(c.get_value("count").unwrap(), Some(&Value::U64(0)));

        c.set_mode("count", Mode::Mandatory).unwrap();
        for relaxed in [Mode::Disabled, Mode::Optional] {
            assert!(matches!(
                c.set_mode("count", relaxed),
                Err(ModeError::MandatoryLocked { .. })
            ));
            assert_eq!(c.mode("count").unwrap(), Mode::Mandatory);
        }
        assert!(c.is_present("count").unwrap());

        assert_eq!(
            c.set_mode("count_enable", Mode::Required).unwrap_err(),
            ModeError::UnknownField("count_enable".to_string())
        );
    }

    #[test]
    fn test_disable_clears_enable() {
        let types = TypeTable::new();
        let mut c = populated(&types);
        c.set_mode("count", Mode::Disabled).unwrap();
        assert!(!c.is_present("count").unwrap());
    }

    #[test]
    fn test_required_declared_field_starts_enabled() {
        let types = TypeTable::new();
        let layout = StructBuilder::new("s")
            .enable(Enable::new("e"))
            .field(
                Field::new("v", types.uint(31).unwrap())
                    .enabled_by("e")
                    .mode(Mode::Required),
            )
            .build()
            .unwrap();
        let c = Container::new(Arc::new(layout));
        assert_eq!(c.pack(), vec![0x80, 0, 0, 0]);
    }

    #[test]
    fn test_enum_symbols() {
        let types = TypeTable::new();
        let tsi = types
            .enumeration("TSI", 2, [("none", 0), ("utc", 1), ("gps", 2), ("other", 3)])
            .unwrap();
        let layout = StructBuilder::new("s")
            .field(Field::new("tsi", tsi))
            .reserved(30)
            .build()
            .unwrap();
        let mut c = Container::new(Arc::new(layout));
        c.set_symbol("tsi", "gps").unwrap();
        assert_eq!(c.pack(), vec![0x80, 0, 0, 0]);
        assert!(matches!(
            c.set_symbol("tsi", "tai"),
            Err(ValueError::Enum { .. })
        ));
    }

    #[test]
    fn test_unpack_rejects_undeclared_enum() {
        let types = TypeTable::new();
        let kind = types.enumeration("Kind", 2, [("a", 0), ("b", 1)]).unwrap();
        let layout = Arc::new(
            StructBuilder::new("s")
                .field(Field::new("kind", kind))
                .reserved(30)
                .build()
                .unwrap(),
        );
        let err = Container::unpack(layout, &[0xC0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, UnpackError::InvalidValue { ref field, .. } if field == "kind"));
    }

    #[test]
    fn test_nested_structure() {
        let types = TypeTable::new();
        let gain = Arc::new(
            StructBuilder::new("gain")
                .field(Field::new("stage2", types.fixed_point(16, 7, true).unwrap()))
                .field(Field::new("stage1", types.fixed_point(16, 7, true).unwrap()))
                .build()
                .unwrap(),
        );
        let outer = Arc::new(
            StructBuilder::new("outer")
                .field(Field::new("id", types.uint(32).unwrap()))
                .field(Field::new("gain", Arc::clone(&gain)))
                .build()
                .unwrap(),
        );

        let mut c = Container::new(Arc::clone(&outer));
        c.set_value("id", 0x0102_0304u32).unwrap();
        c.nested_mut("gain").unwrap().set_value("stage1", 1.5).unwrap();
        c.nested_mut("gain").unwrap().set_value("stage2", -1.0).unwrap();

        let packed = c.pack();
        assert_eq!(
            packed,
            vec![0x01, 0x02, 0x03, 0x04, 0xFF, 0x80, 0x00, 0xC0]
        );

        let back = Container::unpack(outer, &packed).unwrap();
        assert_eq!(
            back.nested("gain").unwrap().get_value("stage1").unwrap(),
            Some(&Value::F64(1.5))
        );
        assert_eq!(back, c);

        let mut wrong = Container::new(Arc::clone(&gain));
        assert!(matches!(
            wrong.set_value("stage1", Container::new(gain)),
            Err(ValueError::Type { .. })
        ));
    }

    #[test]
    fn test_nested_mut_on_leaf_leaves_field_absent() {
        let types = TypeTable::new();
        let layout = StructBuilder::new("gated")
            .enable(Enable::new("v_enable"))
            .field(Field::new("v", types.uint(31).unwrap()).enabled_by("v_enable"))
            .build()
            .unwrap();
        let mut c = Container::new(Arc::new(layout));

        assert!(matches!(
            c.nested_mut("v"),
            Err(ValueError::Type {
                expected: "structure",
                ..
            })
        ));
        assert_eq!(c.get_value("v").unwrap(), None);
        assert_eq!(c.get_value("v_enable").unwrap(), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_wide_enable_round_trips() {
        let types = TypeTable::new();
        let layout = Arc::new(
            StructBuilder::new("wide")
                .enable(Enable::new("flag").bits(64))
                .field(Field::new("value", types.uint(32).unwrap()).enabled_by("flag"))
                .build()
                .unwrap(),
        );
        let mut c = Container::new(Arc::clone(&layout));
        c.set_value("value", 0xDEAD_BEEFu32).unwrap();

        let packed = c.pack();
        assert_eq!(&packed[0..8], &[0xFF; 8]);
        assert_eq!(Container::unpack(layout, &packed).unwrap(), c);
    }

    #[test]
    fn test_entries_skip_reserved() {
        let types = TypeTable::new();
        let c = populated(&types);
        let names: Vec<&str> = c.entries().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["first", "second", "third", "count_enable", "count"]);
    }

    proptest! {
        #[test]
        fn prop_pack_unpack_round_trip(
            first in any::<i16>(),
            second in -32768i32..=32767,
            third in any::<bool>(),
            count in proptest::option::of(0u64..=0x7FFF),
        ) {
            let types = TypeTable::new();
            let mut c = Container::new(example(&types));
            c.set_value("first", first as i64).unwrap();
            c.set_value("second", second as f64 / 128.0).unwrap();
            c.set_value("third", third).unwrap();
            match count {
                Some(v) => c.set_value("count", v).unwrap(),
                None => c.clear_value("count").unwrap(),
            }

            let packed = c.pack();
            prop_assert_eq!(packed.len(), 8);
            let back = Container::unpack(Arc::clone(c.layout()), &packed).unwrap();
            prop_assert_eq!(back, c);
        }
    }
}
