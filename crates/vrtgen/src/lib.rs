//! # vrtgen
//!
//! Bit-exact structure model for VITA-49.2 (VRT) packet definitions.
//!
//! Structures are declared as ordered lists of fields, enable flags and reserved bits,
//! laid out MSB-first in 32-bit big-endian words and frozen. CIF groups derive their
//! indicator word from the content fields they gate. Containers hold concrete values
//! and pack them to, or unpack them from, the exact wire bytes.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use vrtgen::container::Container;
//! use vrtgen::item::{Enable, Field};
//! use vrtgen::layout::StructBuilder;
//! use vrtgen::leaf::TypeTable;
//!
//! let types = TypeTable::new();
//! let layout = StructBuilder::new("example")
//!     .field(Field::new("first", types.int(16).unwrap()))
//!     .field(Field::new("second", types.fixed_point(16, 7, true).unwrap()))
//!     .field(Field::new("third", types.boolean(1).unwrap()))
//!     .reserved(15)
//!     .enable(Enable::new("count_enable"))
//!     .field(Field::new("count", types.uint(15).unwrap()).enabled_by("count_enable"))
//!     .build()
//!     .unwrap();
//!
//! let mut c = Container::new(Arc::new(layout));
//! c.set_value("first", -30000).unwrap();
//! c.set_value("second", -17.625).unwrap();
//! c.set_value("third", true).unwrap();
//! c.set_value("count", 12345).unwrap();
//! assert_eq!(c.pack(), vec![0x8A, 0xD0, 0xF7, 0x30, 0x80, 0x00, 0xB0, 0x39]);
//! ```

pub mod bits;
pub mod cif;
pub mod container;
pub mod errors;
pub mod item;
pub mod layout;
pub mod leaf;
pub mod mode;
pub mod position;
#[cfg(feature = "serde")]
pub mod serde;
pub mod value;
pub mod vrt;
