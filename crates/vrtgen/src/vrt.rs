//! Standard VITA-49.2 structures built with the layout engine.
//!
//! The generic packet header keeps bits 26..24 reserved; each packet kind derives its
//! own header by rebinding some of them. CIF0 follows the standard indicator bit map.

use std::sync::Arc;

use crate::cif::{CifBuilder, CifGroup};
use crate::errors::LayoutError;
use crate::item::{Enable, Field};
use crate::layout::{PackedStruct, StructBuilder};
use crate::leaf::{LeafType, TypeTable};
use crate::position::BitPosition;

/// Packet type codes of header bits 31..28.
pub fn packet_type(types: &TypeTable) -> Result<Arc<LeafType>, LayoutError> {
    types.enumeration(
        "PacketType",
        4,
        [
            ("signal_data", 0),
            ("signal_data_stream_id", 1),
            ("extension_data", 2),
            ("extension_data_stream_id", 3),
            ("context", 4),
            ("extension_context", 5),
            ("command", 6),
            ("extension_command", 7),
        ],
    )
}

/// Integer-seconds timestamp code.
pub fn tsi(types: &TypeTable) -> Result<Arc<LeafType>, LayoutError> {
    types.enumeration(
        "TSI",
        2,
        [("none", 0), ("utc", 1), ("gps", 2), ("other", 3)],
    )
}

/// Fractional-seconds timestamp code.
pub fn tsf(types: &TypeTable) -> Result<Arc<LeafType>, LayoutError> {
    types.enumeration(
        "TSF",
        2,
        [
            ("none", 0),
            ("sample_count", 1),
            ("real_time", 2),
            ("free_running", 3),
        ],
    )
}

pub fn timestamp_mode(types: &TypeTable) -> Result<Arc<LeafType>, LayoutError> {
    types.enumeration("TSM", 1, [("precise", 0), ("general", 1)])
}

/// Generic first header word. Bits 26..24 are reserved for the packet kind.
pub fn header(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    StructBuilder::new("header")
        .field(Field::new("packet_type", packet_type(types)?))
        .enable(Enable::linked("class_id_enable", "class_id"))
        .reserved(3)
        .field(Field::new("tsi", tsi(types)?))
        .field(Field::new("tsf", tsf(types)?))
        .field(Field::new("packet_count", types.uint(4)?))
        .field(Field::new("packet_size", types.uint(16)?))
        .build()
}

/// Signal/extension data header.
pub fn data_header(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    let flag = types.boolean(1)?;
    StructBuilder::extend("data_header", &header(types)?)
        .rebind(
            BitPosition::new(0, 26),
            Field::new("trailer_included", Arc::clone(&flag)),
        )
        .rebind(
            BitPosition::new(0, 25),
            Field::new("not_v49d0", Arc::clone(&flag)),
        )
        .rebind(
            BitPosition::new(0, 24),
            Field::new("signal_spectrum", flag),
        )
        .build()
}

pub fn context_header(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    StructBuilder::extend("context_header", &header(types)?)
        .rebind(
            BitPosition::new(0, 25),
            Field::new("not_v49d0", types.boolean(1)?),
        )
        .rebind(
            BitPosition::new(0, 24),
            Field::new("timestamp_mode", timestamp_mode(types)?),
        )
        .build()
}

pub fn command_header(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    let flag = types.boolean(1)?;
    StructBuilder::extend("command_header", &header(types)?)
        .rebind(
            BitPosition::new(0, 26),
            Field::new("acknowledge_packet", Arc::clone(&flag)),
        )
        .rebind(
            BitPosition::new(0, 24),
            Field::new("cancellation_packet", flag),
        )
        .build()
}

/// Class identifier of the prologue, present when `class_id_enable` is set.
pub fn class_id(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    StructBuilder::new("class_id")
        .field(Field::new("pad_bit_count", types.uint(5)?))
        .reserved(3)
        .field(Field::new("oui", types.uint(24)?))
        .field(Field::new("information_class_code", types.uint(16)?))
        .field(Field::new("packet_class_code", types.uint(16)?))
        .build()
}

fn reference_level(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    StructBuilder::new("reference_level")
        .reserved(16)
        .field(Field::new("value", types.fixed_point(16, 7, true)?))
        .build()
}

fn gain(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    let db = types.fixed_point(16, 7, true)?;
    StructBuilder::new("gain")
        .field(Field::new("stage2", Arc::clone(&db)))
        .field(Field::new("stage1", db))
        .build()
}

fn temperature(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    StructBuilder::new("temperature")
        .reserved(16)
        .field(Field::new("value", types.fixed_point(16, 6, true)?))
        .build()
}

fn device_id(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    StructBuilder::new("device_id")
        .reserved(8)
        .field(Field::new("manufacturer_oui", types.uint(24)?))
        .reserved(16)
        .field(Field::new("device_code", types.uint(16)?))
        .build()
}

const STATE_EVENTS: [&str; 8] = [
    "calibrated_time",
    "valid_data",
    "reference_lock",
    "agc_mgc",
    "detected_signal",
    "spectral_inversion",
    "over_range",
    "sample_loss",
];

/// Enables in bits 31..24 gate the indicators in bits 19..12.
fn state_event_indicators(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    let flag = types.boolean(1)?;
    let mut builder = StructBuilder::new("state_event_indicators");
    for name in STATE_EVENTS {
        builder = builder.enable(Enable::linked(format!("{name}_enable"), name));
    }
    builder = builder.reserved(4);
    for name in STATE_EVENTS {
        builder = builder.field(Field::new(name, Arc::clone(&flag)));
    }
    builder
        .reserved(4)
        .field(Field::new("user_defined", types.uint(8)?))
        .build()
}

fn signal_data_format(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    let packing = types.enumeration(
        "PackingMethod",
        1,
        [("processing_efficient", 0), ("link_efficient", 1)],
    )?;
    let real_complex = types.enumeration(
        "DataSampleType",
        2,
        [("real", 0), ("complex_cartesian", 1), ("complex_polar", 2)],
    )?;
    let item_format = types.enumeration(
        "DataItemFormat",
        5,
        [
            ("signed_fixed", 0x00),
            ("signed_vrt1", 0x01),
            ("signed_vrt2", 0x02),
            ("signed_vrt3", 0x03),
            ("signed_vrt4", 0x04),
            ("signed_vrt5", 0x05),
            ("signed_vrt6", 0x06),
            ("signed_fixed_non_normalized", 0x07),
            ("ieee754_half", 0x0D),
            ("ieee754_single", 0x0E),
            ("ieee754_double", 0x0F),
            ("unsigned_fixed", 0x10),
            ("unsigned_vrt1", 0x11),
            ("unsigned_vrt2", 0x12),
            ("unsigned_vrt3", 0x13),
            ("unsigned_vrt4", 0x14),
            ("unsigned_vrt5", 0x15),
            ("unsigned_vrt6", 0x16),
            ("unsigned_fixed_non_normalized", 0x17),
        ],
    )?;

    StructBuilder::new("signal_data_format")
        .field(Field::new("packing_method", packing))
        .field(Field::new("real_complex_type", real_complex))
        .field(Field::new("data_item_format", item_format))
        .field(Field::new("repeat_indicator", types.boolean(1)?))
        .field(Field::new("event_tag_size", types.uint(3)?))
        .field(Field::new("channel_tag_size", types.uint(4)?))
        .field(Field::new("data_item_fraction_size", types.uint(4)?))
        .field(Field::new("item_packing_field_size", types.non_zero_size(6)?))
        .field(Field::new("data_item_size", types.non_zero_size(6)?))
        .field(Field::new("repeat_count", types.non_zero_size(16)?))
        .field(Field::new("vector_size", types.non_zero_size(16)?))
        .build()
}

/// Shared first four words of the geolocation and ephemeris records.
fn geolocation_prefix(name: &str, types: &TypeTable) -> Result<StructBuilder, LayoutError> {
    Ok(StructBuilder::new(name)
        .reserved(4)
        .field(Field::new("tsi", tsi(types)?))
        .field(Field::new("tsf", tsf(types)?))
        .field(Field::new("manufacturer_oui", types.uint(24)?))
        .field(Field::new("integer_timestamp", types.uint(32)?))
        .field(Field::new("fractional_timestamp", types.uint(64)?)))
}

fn geolocation(name: &str, types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    let angle = types.fixed_point(32, 22, true)?;
    geolocation_prefix(name, types)?
        .field(Field::new("latitude", Arc::clone(&angle)))
        .field(Field::new("longitude", Arc::clone(&angle)))
        .field(Field::new("altitude", types.fixed_point(32, 5, true)?))
        .field(Field::new("speed_over_ground", types.fixed_point(32, 16, true)?))
        .field(Field::new("heading_angle", Arc::clone(&angle)))
        .field(Field::new("track_angle", Arc::clone(&angle)))
        .field(Field::new("magnetic_variation", angle))
        .build()
}

fn ephemeris(name: &str, types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    let position = types.fixed_point(32, 5, true)?;
    let angle = types.fixed_point(32, 22, true)?;
    let velocity = types.fixed_point(32, 16, true)?;
    let mut builder = geolocation_prefix(name, types)?;
    for axis in ["x", "y", "z"] {
        builder = builder.field(Field::new(format!("position_{axis}"), Arc::clone(&position)));
    }
    for axis in ["alpha", "beta", "phi"] {
        builder = builder.field(Field::new(format!("attitude_{axis}"), Arc::clone(&angle)));
    }
    for axis in ["x", "y", "z"] {
        builder = builder.field(Field::new(format!("velocity_{axis}"), Arc::clone(&velocity)));
    }
    builder.build()
}

/// Only the word-count prefix is fixed; the ASCII payload follows.
fn gps_ascii(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    StructBuilder::new("gps_ascii")
        .reserved(8)
        .field(Field::new("manufacturer_oui", types.uint(24)?))
        .field(Field::new("number_of_words", types.uint(32)?))
        .dynamic_size(true)
        .build()
}

/// List sizes; the lists themselves follow.
fn context_association_lists(types: &TypeTable) -> Result<PackedStruct, LayoutError> {
    StructBuilder::new("context_association_lists")
        .reserved(7)
        .field(Field::new("source_list_size", types.uint(9)?))
        .reserved(7)
        .field(Field::new("system_list_size", types.uint(9)?))
        .field(Field::new("vector_component_list_size", types.uint(16)?))
        .field(Field::new("asynchronous_channel_tag_list_enable", types.boolean(1)?))
        .field(Field::new("asynchronous_channel_list_size", types.uint(15)?))
        .dynamic_size(true)
        .build()
}

/// CIF0 with the standard bit assignments.
pub fn cif0(types: &TypeTable) -> Result<CifGroup, LayoutError> {
    let frequency = types.fixed_point(64, 20, true)?;

    CifBuilder::new("cif0")
        .indicator("change_indicator", 31)
        .content("reference_point_id", 30, types.uint(32)?)
        .content("bandwidth", 29, Arc::clone(&frequency))
        .content("if_reference_frequency", 28, Arc::clone(&frequency))
        .content("rf_reference_frequency", 27, Arc::clone(&frequency))
        .content("rf_reference_frequency_offset", 26, Arc::clone(&frequency))
        .content("if_band_offset", 25, Arc::clone(&frequency))
        .content("reference_level", 24, reference_level(types)?)
        .content("gain", 23, gain(types)?)
        .content("over_range_count", 22, types.uint(32)?)
        .content("sample_rate", 21, frequency)
        .content("timestamp_adjustment", 20, types.int(64)?)
        .content("timestamp_calibration_time", 19, types.uint(32)?)
        .content("temperature", 18, temperature(types)?)
        .content("device_id", 17, device_id(types)?)
        .content("state_event_indicators", 16, state_event_indicators(types)?)
        .content("signal_data_format", 15, signal_data_format(types)?)
        .content("formatted_gps", 14, geolocation("formatted_gps", types)?)
        .content("formatted_ins", 13, geolocation("formatted_ins", types)?)
        .content("ecef_ephemeris", 12, ephemeris("ecef_ephemeris", types)?)
        .content("relative_ephemeris", 11, ephemeris("relative_ephemeris", types)?)
        .content("ephemeris_reference_id", 10, types.uint(32)?)
        .content("gps_ascii", 9, gps_ascii(types)?)
        .content("context_association_lists", 8, context_association_lists(types)?)
        .indicator("cif7_enable", 7)
        .reserved(6)
        .reserved(5)
        .reserved(4)
        .indicator("cif3_enable", 3)
        .indicator("cif2_enable", 2)
        .indicator("cif1_enable", 1)
        .reserved(0)
        .build(types)
}
