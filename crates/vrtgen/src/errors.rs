//! Error and warning types for structure layout, value assignment and unpacking.

use crate::mode::Mode;
use crate::position::BitPosition;

/// Errors produced while declaring leaf types or laying out and freezing a structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// Leaf width is 0 or wider than 64 bits (or the type's own limit).
    #[error("invalid width of {bits} bits for {kind}")]
    InvalidWidth { kind: &'static str, bits: usize },
    /// Fixed-point radix does not leave room for the integer part.
    #[error("radix {radix} is out of range for a {bits}-bit fixed-point type")]
    InvalidRadix { bits: usize, radix: u32 },
    /// Enum type has no symbols, a symbol repeats, or a value does not fit the width.
    #[error("invalid enum `{name}`: {reason}")]
    InvalidEnum { name: String, reason: String },
    /// Two items in one structure share a name.
    #[error("`{structure}` declares `{name}` more than once")]
    DuplicateName { structure: String, name: String },
    /// A field names an enable that does not exist or is not an enable.
    #[error("`{structure}.{field}` is linked to unknown enable `{enable}`")]
    UnknownEnable {
        structure: String,
        field: String,
        enable: String,
    },
    /// An enable is already linked to another field.
    #[error("`{structure}.{enable}` is already linked to `{linked}`, cannot link `{field}`")]
    EnableAlreadyLinked {
        structure: String,
        enable: String,
        linked: String,
        field: String,
    },
    /// An enable reached freezing without a linked field.
    #[error("`{structure}.{enable}` is not linked to any field")]
    UnlinkedEnable { structure: String, enable: String },
    /// No reserved run covers the rebind position.
    #[error("`{structure}` has no reserved bits at {position} to rebind `{field}`")]
    RebindTargetNotFound {
        structure: String,
        field: String,
        position: BitPosition,
    },
    /// The rebound field is wider than the reserved run it replaces.
    #[error("`{structure}.{field}` ({bits} bits) overflows the reserved run at {position}")]
    RebindOverflow {
        structure: String,
        field: String,
        position: BitPosition,
        bits: usize,
    },
    /// Replaying the frozen list found a gap or overlap.
    #[error("`{structure}.{item}` starts at {found}, expected {expected}")]
    Discontinuity {
        structure: String,
        item: String,
        expected: BitPosition,
        found: BitPosition,
    },
    /// CIF bit number outside 0..=31.
    #[error("`{group}.{field}` uses CIF bit {bit}, outside 0..=31")]
    CifBitOutOfRange { group: String, field: String, bit: u32 },
    /// Two CIF entries claim the same bit.
    #[error("`{group}` maps both `{first}` and `{second}` to CIF bit {bit}")]
    CifBitCollision {
        group: String,
        bit: u32,
        first: String,
        second: String,
    },
    /// An enable's matrix position disagrees with the CIF bit of its content field.
    #[error("`{group}.{field}` has CIF bit {bit} but its enable sits at {position}")]
    CifBitMismatch {
        group: String,
        field: String,
        bit: u32,
        position: BitPosition,
    },
    /// A warning promoted to an error by [crate::layout::LayoutOptions::strict].
    #[error("strict layout: {0}")]
    Strict(LayoutWarning),
}

/// Non-fatal layout findings. Legacy VITA-49 structures trigger these legitimately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutWarning {
    /// Total size is not a multiple of 32 bits.
    #[error("`{structure}` is {bits} bits, not a multiple of 32")]
    Size { structure: String, bits: usize },
    /// Field does not start on its natural alignment.
    #[error("`{structure}.{field}` ({bits} bits) at {position} is not {alignment}-bit aligned")]
    Alignment {
        structure: String,
        field: String,
        position: BitPosition,
        bits: usize,
        alignment: usize,
    },
    /// CIF content payload is not a whole number of words.
    #[error("`{group}.{field}` payload is {bits} bits, not a whole number of words")]
    ContentSize {
        group: String,
        field: String,
        bits: usize,
    },
}

/// Errors produced when assigning a value to an item of a container.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// Value outside the legal range of the leaf type.
    #[error("value {value} is outside [{min}, {max}]")]
    Range {
        value: String,
        min: String,
        max: String,
    },
    /// Value is not declared in the enum's symbol table.
    #[error("`{value}` is not a member of enum `{name}`")]
    Enum { name: String, value: String },
    /// Value variant cannot represent the leaf type (e.g. a float for a boolean).
    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },
    /// Reserved bits are constant zero.
    #[error("reserved item `{0}` cannot be set")]
    Reserved(String),
    /// Field is not editable.
    #[error("field `{0}` is read-only")]
    ReadOnly(String),
    /// Only fields with a linked enable can be absent.
    #[error("field `{0}` has no enable and cannot be cleared")]
    NotOptional(String),
    /// No item with that name.
    #[error("no field named `{0}`")]
    UnknownField(String),
}

/// Rejected mode transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    /// Mandatory fields cannot be relaxed.
    #[error("field `{field}` is mandatory and cannot become {requested}")]
    MandatoryLocked { field: String, requested: Mode },
    /// Mode requested for an item that has no mode (unknown name, enable or reserved).
    #[error("no field named `{0}`")]
    UnknownField(String),
    /// Mode name not recognised.
    #[error("unknown mode `{0}`")]
    UnknownMode(String),
}

/// Errors produced when reading bits from a byte slice (e.g. during [crate::container::Container::unpack]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnpackError {
    /// Requested bit range is beyond the end of the data.
    #[error("bit range out of bounds")]
    OutOfBounds,
    /// More than 64 bits were requested in a single read.
    #[error("more than 64 bits requested in one read")]
    TooManyBitsRead,
    /// Input data is shorter than the structure's total byte length.
    #[error("packet too short: need {required} bytes, have {actual}")]
    PacketTooShort { required: usize, actual: usize },
    /// Bits decode to a value the leaf type rejects.
    #[error("invalid value for `{field}`: {source}")]
    InvalidValue { field: String, source: ValueError },
}

/// Errors produced when a structure definition's modes and initial values are applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Mode(#[from] ModeError),
}
