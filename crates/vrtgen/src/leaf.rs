//! Primitive value shapes and the interning factory that hands them out.
//!
//! A [LeafType] knows its bit width, its legal range, and how to convert a
//! [Value] to and from the unsigned bit pattern stored on the wire.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::bits::{mask, sign_extend};
use crate::errors::{LayoutError, ValueError};
use crate::value::Value;

/// Symbol table of an enumerated leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    name: String,
    bits: usize,
    symbols: Vec<(String, u64)>,
}

impl EnumType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared `(symbol, value)` pairs in declaration order.
    pub fn symbols(&self) -> &[(String, u64)] {
        &self.symbols
    }

    pub fn symbol(&self, value: u64) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(s, _)| s.as_str())
    }

    pub fn value_of(&self, symbol: &str) -> Option<u64> {
        self.symbols
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
            .map(|(_, v)| *v)
    }
}

/// A primitive value shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeafType {
    /// Any non-zero pattern reads as `true`; `true` writes all ones.
    Boolean { bits: usize },
    /// Two's complement when signed.
    Integer { bits: usize, signed: bool },
    /// Integer storage scaled by `2^radix`.
    FixedPoint { bits: usize, radix: u32, signed: bool },
    /// Stores `value - 1`; legal values are `1..=2^bits`.
    NonZeroSize { bits: usize },
    Enum(EnumType),
}

fn check_width(kind: &'static str, bits: usize, max: usize) -> Result<(), LayoutError> {
    if bits == 0 || bits > max {
        return Err(LayoutError::InvalidWidth { kind, bits });
    }
    Ok(())
}

impl LeafType {
    pub fn boolean(bits: usize) -> Result<Self, LayoutError> {
        check_width("boolean", bits, 64)?;
        Ok(LeafType::Boolean { bits })
    }

    pub fn integer(bits: usize, signed: bool) -> Result<Self, LayoutError> {
        check_width("integer", bits, 64)?;
        Ok(LeafType::Integer { bits, signed })
    }

    pub fn fixed_point(bits: usize, radix: u32, signed: bool) -> Result<Self, LayoutError> {
        check_width("fixed-point", bits, 64)?;
        if radix as usize > bits {
            return Err(LayoutError::InvalidRadix { bits, radix });
        }
        Ok(LeafType::FixedPoint {
            bits,
            radix,
            signed,
        })
    }

    pub fn non_zero_size(bits: usize) -> Result<Self, LayoutError> {
        check_width("non-zero size", bits, 63)?;
        Ok(LeafType::NonZeroSize { bits })
    }

    pub fn enumeration<S: Into<String>>(
        name: &str,
        bits: usize,
        symbols: impl IntoIterator<Item = (S, u64)>,
    ) -> Result<Self, LayoutError> {
        check_width("enum", bits, 64)?;
        let invalid = |reason: String| LayoutError::InvalidEnum {
            name: name.to_string(),
            reason,
        };

        let mut table: Vec<(String, u64)> = Vec::new();
        for (symbol, value) in symbols {
            let symbol = symbol.into();
            if value > mask(bits) {
                return Err(invalid(format!("{symbol} = {value} does not fit {bits} bits")));
            }
            if table.iter().any(|(s, v)| *s == symbol || *v == value) {
                return Err(invalid(format!("{symbol} = {value} is declared twice")));
            }
            table.push((symbol, value));
        }

        if table.is_empty() {
            return Err(invalid("no symbols".to_string()));
        }

        Ok(LeafType::Enum(EnumType {
            name: name.to_string(),
            bits,
            symbols: table,
        }))
    }

    pub fn bits(&self) -> usize {
        match self {
            LeafType::Boolean { bits }
            | LeafType::Integer { bits, .. }
            | LeafType::FixedPoint { bits, .. }
            | LeafType::NonZeroSize { bits } => *bits,
            LeafType::Enum(e) => e.bits,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            LeafType::Integer { signed: true, .. } | LeafType::FixedPoint { signed: true, .. }
        )
    }

    /// Short type name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            LeafType::Boolean { .. } => "boolean",
            LeafType::Integer { .. } => "integer",
            LeafType::FixedPoint { .. } => "fixed-point",
            LeafType::NonZeroSize { .. } => "non-zero size",
            LeafType::Enum(_) => "enum",
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            LeafType::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Smallest increment of a fixed-point type, `2^-radix`. 1 for everything else.
    pub fn resolution(&self) -> f64 {
        match self {
            LeafType::FixedPoint { radix, .. } => 1.0 / scale(*radix),
            _ => 1.0,
        }
    }

    /// Legal integer range of integer and non-zero-size types.
    pub fn int_range(&self) -> Option<(i128, i128)> {
        match self {
            LeafType::Integer { bits, signed: true } => {
                let half = 1i128 << (bits - 1);
                Some((-half, half - 1))
            }
            LeafType::Integer {
                bits,
                signed: false,
            } => Some((0, (1i128 << bits) - 1)),
            LeafType::NonZeroSize { bits } => Some((1, 1i128 << bits)),
            _ => None,
        }
    }

    /// Legal range of a fixed-point type in the scaled (real) domain.
    pub fn float_range(&self) -> Option<(f64, f64)> {
        match self {
            LeafType::FixedPoint {
                bits,
                radix,
                signed,
            } => {
                let scale = scale(*radix);
                if *signed {
                    let half = (1i128 << (bits - 1)) as f64;
                    Some((-half / scale, (half - 1.0) / scale))
                } else {
                    Some((0.0, ((1i128 << bits) - 1) as f64 / scale))
                }
            }
            _ => None,
        }
    }

    /// Value a field holds before anything is assigned.
    pub fn default_value(&self) -> Value {
        match self {
            LeafType::Boolean { .. } => Value::Bool(false),
            LeafType::Integer { signed: true, .. } => Value::I64(0),
            LeafType::Integer { signed: false, .. } => Value::U64(0),
            LeafType::FixedPoint { .. } => Value::F64(0.0),
            LeafType::NonZeroSize { .. } => Value::U64(1),
            LeafType::Enum(e) => Value::U64(e.symbols[0].1),
        }
    }

    /// Validates `value` against this type and normalises its variant.
    pub fn coerce(&self, value: Value) -> Result<Value, ValueError> {
        let type_error = |value: &Value| ValueError::Type {
            expected: self.kind(),
            found: value.kind(),
        };

        match self {
            LeafType::Boolean { .. } => match value {
                Value::Bool(v) => Ok(Value::Bool(v)),
                Value::I64(_) | Value::U64(_) => {
                    Ok(Value::Bool(value.as_i128().is_some_and(|v| v != 0)))
                }
                other => Err(type_error(&other)),
            },
            LeafType::Integer { .. } | LeafType::NonZeroSize { .. } => {
                let signed = self.is_signed();
                let Some(v) = int_input(&value) else {
                    return Err(type_error(&value));
                };
                let (min, max) = self.int_range().unwrap_or((0, 0));
                if v < min || v > max {
                    return Err(ValueError::Range {
                        value: value.describe(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                if signed {
                    Ok(Value::I64(v as i64))
                } else {
                    Ok(Value::U64(v as u64))
                }
            }
            LeafType::FixedPoint { .. } => {
                let v = match value {
                    Value::F64(_) | Value::I64(_) | Value::U64(_) => value.as_f64(),
                    _ => None,
                };
                let Some(v) = v else {
                    return Err(type_error(&value));
                };
                let (min, max) = self.float_range().unwrap_or((0.0, 0.0));
                if !(v >= min && v <= max) {
                    return Err(ValueError::Range {
                        value: value.describe(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                Ok(Value::F64(v))
            }
            LeafType::Enum(e) => {
                let Some(v) = int_input(&value) else {
                    return Err(type_error(&value));
                };
                match u64::try_from(v) {
                    Ok(v) if e.symbol(v).is_some() => Ok(Value::U64(v)),
                    _ => Err(ValueError::Enum {
                        name: e.name.clone(),
                        value: value.describe(),
                    }),
                }
            }
        }
    }

    /// Unsigned wire pattern of an already coerced value. Mismatched variants encode as zero.
    pub(crate) fn encode(&self, value: &Value) -> u64 {
        let bits = self.bits();
        let raw = match (self, value) {
            (LeafType::Boolean { .. }, Value::Bool(true)) => u64::MAX,
            (LeafType::Boolean { .. }, _) => 0,
            (LeafType::Integer { .. }, Value::I64(v)) => *v as u64,
            (LeafType::Integer { .. }, Value::U64(v)) => *v,
            (LeafType::FixedPoint { radix, signed, .. }, Value::F64(v)) => {
                let scaled = (v * scale(*radix)).round();
                if *signed {
                    scaled as i64 as u64
                } else {
                    scaled as u64
                }
            }
            (LeafType::NonZeroSize { .. }, Value::U64(v)) => v.saturating_sub(1),
            (LeafType::Enum(_), Value::U64(v)) => *v,
            _ => 0,
        };
        raw & mask(bits)
    }

    /// Validates `value` and returns its unsigned wire pattern.
    pub fn to_binary(&self, value: &Value) -> Result<u64, ValueError> {
        let value = self.coerce(value.clone())?;
        Ok(self.encode(&value))
    }

    /// Decodes a wire pattern, sign-extending and descaling as needed.
    pub fn from_binary(&self, raw: u64) -> Result<Value, ValueError> {
        let bits = self.bits();
        let raw = raw & mask(bits);

        match self {
            LeafType::Boolean { .. } => Ok(Value::Bool(raw != 0)),
            LeafType::Integer { signed: true, .. } => Ok(Value::I64(sign_extend(raw, bits))),
            LeafType::Integer { signed: false, .. } => Ok(Value::U64(raw)),
            LeafType::FixedPoint { radix, signed, .. } => {
                let v = if *signed {
                    sign_extend(raw, bits) as f64
                } else {
                    raw as f64
                };
                Ok(Value::F64(v / scale(*radix)))
            }
            LeafType::NonZeroSize { .. } => Ok(Value::U64(raw + 1)),
            LeafType::Enum(e) => match e.symbol(raw) {
                Some(_) => Ok(Value::U64(raw)),
                None => Err(ValueError::Enum {
                    name: e.name.clone(),
                    value: raw.to_string(),
                }),
            },
        }
    }
}

fn scale(radix: u32) -> f64 {
    2f64.powi(radix as i32)
}

fn int_input(value: &Value) -> Option<i128> {
    match value {
        Value::I64(_) | Value::U64(_) => value.as_i128(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LeafKey {
    Boolean(usize),
    Integer(usize, bool),
    FixedPoint(usize, u32, bool),
    NonZeroSize(usize),
    Enum(String),
}

/// Interning factory for leaf types.
///
/// Equal parameters always yield the same `Arc`, so layouts and emitters can compare
/// types with [Arc::ptr_eq]. Reads take a shared lock; only the first request for a
/// given shape takes the write lock.
#[derive(Debug, Default)]
pub struct TypeTable {
    types: RwLock<HashMap<LeafKey, Arc<LeafType>>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide table.
    pub fn global() -> &'static TypeTable {
        static GLOBAL: OnceLock<TypeTable> = OnceLock::new();
        GLOBAL.get_or_init(TypeTable::new)
    }

    fn intern(
        &self,
        key: LeafKey,
        make: impl FnOnce() -> Result<LeafType, LayoutError>,
    ) -> Result<Arc<LeafType>, LayoutError> {
        if let Some(ty) = self.types.read().get(&key) {
            return Ok(Arc::clone(ty));
        }

        let mut types = self.types.write();
        if let Some(ty) = types.get(&key) {
            return Ok(Arc::clone(ty));
        }

        let ty = Arc::new(make()?);
        types.insert(key, Arc::clone(&ty));
        Ok(ty)
    }

    pub fn boolean(&self, bits: usize) -> Result<Arc<LeafType>, LayoutError> {
        self.intern(LeafKey::Boolean(bits), || LeafType::boolean(bits))
    }

    pub fn integer(&self, bits: usize, signed: bool) -> Result<Arc<LeafType>, LayoutError> {
        self.intern(LeafKey::Integer(bits, signed), || {
            LeafType::integer(bits, signed)
        })
    }

    pub fn int(&self, bits: usize) -> Result<Arc<LeafType>, LayoutError> {
        self.integer(bits, true)
    }

    pub fn uint(&self, bits: usize) -> Result<Arc<LeafType>, LayoutError> {
        self.integer(bits, false)
    }

    pub fn fixed_point(
        &self,
        bits: usize,
        radix: u32,
        signed: bool,
    ) -> Result<Arc<LeafType>, LayoutError> {
        self.intern(LeafKey::FixedPoint(bits, radix, signed), || {
            LeafType::fixed_point(bits, radix, signed)
        })
    }

    pub fn non_zero_size(&self, bits: usize) -> Result<Arc<LeafType>, LayoutError> {
        self.intern(LeafKey::NonZeroSize(bits), || LeafType::non_zero_size(bits))
    }

    /// Enums are keyed by name. Redeclaring a name with a different table fails.
    pub fn enumeration<S: Into<String>>(
        &self,
        name: &str,
        bits: usize,
        symbols: impl IntoIterator<Item = (S, u64)>,
    ) -> Result<Arc<LeafType>, LayoutError> {
        let declared = LeafType::enumeration(name, bits, symbols)?;
        let ty = self.intern(LeafKey::Enum(name.to_string()), || Ok(declared.clone()))?;

        if *ty != declared {
            return Err(LayoutError::InvalidEnum {
                name: name.to_string(),
                reason: "redeclared with a different symbol table".to_string(),
            });
        }
        Ok(ty)
    }

    /// Number of interned types.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_interning_returns_same_arc() {
        let types = TypeTable::new();
        let a = types.int(16).unwrap();
        let b = types.integer(16, true).unwrap();
        let c = types.uint(16).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(types.len(), 2);

        let f1 = types.fixed_point(16, 7, true).unwrap();
        let f2 = types.fixed_point(16, 7, true).unwrap();
        assert!(Arc::ptr_eq(&f1, &f2));
    }

    #[test]
    fn test_global_table_is_shared() {
        let a = TypeTable::global().boolean(1).unwrap();
        let b = TypeTable::global().boolean(1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_invalid_widths() {
        let types = TypeTable::new();
        assert_eq!(
            types.uint(0).unwrap_err(),
            LayoutError::InvalidWidth {
                kind: "integer",
                bits: 0
            }
        );
        assert!(types.int(65).is_err());
        assert!(types.non_zero_size(64).is_err());
        assert_eq!(
            types.fixed_point(16, 17, true).unwrap_err(),
            LayoutError::InvalidRadix { bits: 16, radix: 17 }
        );
        assert!(types.is_empty());
    }

    #[test]
    fn test_integer_ranges() {
        let int16 = LeafType::integer(16, true).unwrap();
        assert_eq!(int16.int_range(), Some((-32768, 32767)));
        assert!(int16.coerce(Value::I64(-32768)).is_ok());
        assert!(matches!(
            int16.coerce(Value::I64(32768)),
            Err(ValueError::Range { .. })
        ));

        let uint15 = LeafType::integer(15, false).unwrap();
        assert_eq!(uint15.coerce(Value::I64(12345)).unwrap(), Value::U64(12345));
        assert!(uint15.coerce(Value::I64(-1)).is_err());
        assert!(uint15.coerce(Value::U64(32768)).is_err());

        let uint64 = LeafType::integer(64, false).unwrap();
        assert_eq!(uint64.to_binary(&Value::U64(u64::MAX)).unwrap(), u64::MAX);
    }

    #[test]
    fn test_integer_rejects_float() {
        let int8 = LeafType::integer(8, true).unwrap();
        assert_eq!(
            int8.coerce(Value::F64(1.0)).unwrap_err(),
            ValueError::Type {
                expected: "integer",
                found: "float"
            }
        );
    }

    #[test]
    fn test_signed_integer_binary() {
        let int16 = LeafType::integer(16, true).unwrap();
        assert_eq!(int16.to_binary(&Value::I64(-30000)).unwrap(), 0x8AD0);
        assert_eq!(int16.from_binary(0x8AD0).unwrap(), Value::I64(-30000));
    }

    #[test]
    fn test_fixed_point() {
        let fixed = LeafType::fixed_point(16, 7, true).unwrap();
        assert_eq!(fixed.to_binary(&Value::F64(-17.625)).unwrap(), 0xF730);
        assert_eq!(fixed.from_binary(0xF730).unwrap(), Value::F64(-17.625));
        assert_eq!(fixed.resolution(), 1.0 / 128.0);

        let (min, max) = fixed.float_range().unwrap();
        assert_eq!(min, -256.0);
        assert_eq!(max, 32767.0 / 128.0);
        assert!(fixed.coerce(Value::F64(256.0)).is_err());
        assert!(fixed.coerce(Value::F64(f64::NAN)).is_err());
        assert_eq!(fixed.coerce(Value::I64(3)).unwrap(), Value::F64(3.0));
    }

    #[test]
    fn test_fixed_point_rounds_to_nearest() {
        let fixed = LeafType::fixed_point(16, 2, false).unwrap();
        assert_eq!(fixed.to_binary(&Value::F64(1.13)).unwrap(), 5);
        assert_eq!(fixed.to_binary(&Value::F64(1.12)).unwrap(), 4);
    }

    #[test]
    fn test_non_zero_size_encoding() {
        let size = LeafType::non_zero_size(6).unwrap();
        assert_eq!(size.to_binary(&Value::U64(1)).unwrap(), 0);
        assert_eq!(size.to_binary(&Value::U64(64)).unwrap(), 63);
        assert!(matches!(
            size.to_binary(&Value::U64(0)),
            Err(ValueError::Range { .. })
        ));
        assert!(size.to_binary(&Value::U64(65)).is_err());
        assert_eq!(size.from_binary(0).unwrap(), Value::U64(1));
        assert_eq!(size.from_binary(63).unwrap(), Value::U64(64));
        assert_eq!(size.default_value(), Value::U64(1));
    }

    #[test]
    fn test_boolean() {
        let flag = LeafType::boolean(1).unwrap();
        assert_eq!(flag.to_binary(&Value::Bool(true)).unwrap(), 1);
        assert_eq!(flag.coerce(Value::U64(1)).unwrap(), Value::Bool(true));

        let gate = LeafType::boolean(2).unwrap();
        assert_eq!(gate.to_binary(&Value::Bool(true)).unwrap(), 0b11);
        assert_eq!(gate.from_binary(0b10).unwrap(), Value::Bool(true));
        assert_eq!(gate.from_binary(0).unwrap(), Value::Bool(false));
        assert!(gate.coerce(Value::F64(1.0)).is_err());
    }

    #[test]
    fn test_enum() {
        let tsi = LeafType::enumeration("TSI", 2, [("none", 0), ("utc", 1), ("gps", 2), ("other", 3)])
            .unwrap();
        let table = tsi.as_enum().unwrap();
        assert_eq!(table.symbol(2), Some("gps"));
        assert_eq!(table.value_of("UTC"), Some(1));
        assert_eq!(tsi.coerce(Value::I64(3)).unwrap(), Value::U64(3));

        let mode = LeafType::enumeration("Mode", 3, [("a", 0), ("b", 5)]).unwrap();
        assert_eq!(
            mode.coerce(Value::U64(1)).unwrap_err(),
            ValueError::Enum {
                name: "Mode".to_string(),
                value: "1".to_string()
            }
        );
        assert!(mode.from_binary(1).is_err());
        assert_eq!(mode.from_binary(5).unwrap(), Value::U64(5));
    }

    #[test]
    fn test_enum_validation() {
        assert!(LeafType::enumeration::<&str>("Empty", 2, []).is_err());
        assert!(LeafType::enumeration("Wide", 1, [("a", 0), ("b", 2)]).is_err());
        assert!(LeafType::enumeration("Dup", 2, [("a", 0), ("a", 1)]).is_err());
    }

    #[test]
    fn test_enum_redeclaration() {
        let types = TypeTable::new();
        let a = types.enumeration("Tsf", 2, [("none", 0), ("sample_count", 1)]).unwrap();
        let b = types.enumeration("Tsf", 2, [("none", 0), ("sample_count", 1)]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(types.enumeration("Tsf", 2, [("none", 0)]).is_err());
    }

    proptest! {
        #[test]
        fn prop_signed_round_trip(bits in 1usize..=64, seed in any::<i64>()) {
            let int = LeafType::integer(bits, true).unwrap();
            let (min, max) = int.int_range().unwrap();
            let span = (max - min + 1) as u128;
            let v = (min + ((seed as i128 as u128) % span) as i128) as i64;

            let raw = int.to_binary(&Value::I64(v)).unwrap();
            prop_assert!(raw <= mask(bits));
            prop_assert_eq!(int.from_binary(raw).unwrap(), Value::I64(v));
        }

        #[test]
        fn prop_unsigned_round_trip(bits in 1usize..=64, seed in any::<u64>()) {
            let uint = LeafType::integer(bits, false).unwrap();
            let v = seed & mask(bits);
            let raw = uint.to_binary(&Value::U64(v)).unwrap();
            prop_assert_eq!(uint.from_binary(raw).unwrap(), Value::U64(v));
        }
    }
}
