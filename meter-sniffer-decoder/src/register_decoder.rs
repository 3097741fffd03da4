//! Register Value Decoding Engine
//!
//! Converts raw response payload bytes into labelled physical values using the
//! register map: byte reordering, IEEE-754 interpretation, numeric sanity
//! checks, scaling, rounding and plausibility filtering.

use byteorder::{BigEndian, ByteOrder};

use crate::registers::{FloatByteOrder, PlausibilityFilter, RegisterFormat, RegisterMap};
use crate::types::{Diagnostic, Reading};

/// Decoded magnitudes above this are treated as garbage
pub const SANITY_LIMIT: f64 = 1.0e10;

/// Decoded magnitudes below this are snapped to exactly zero
pub const ZERO_SNAP: f64 = 1.0e-10;

/// Decode a word-swapped (`CDAB`) float register
pub fn decode_float(chunk: [u8; 4]) -> Option<f64> {
    decode_float_with(chunk, FloatByteOrder::WordSwapped)
}

/// Decode a float register transmitted in `order`
///
/// Returns `None` for NaN, infinities and values outside ±[`SANITY_LIMIT`].
pub fn decode_float_with(chunk: [u8; 4], order: FloatByteOrder) -> Option<f64> {
    let standard = order.to_big_endian(chunk);
    sanitize(f64::from(BigEndian::read_f32(&standard)))
}

/// Decode one value of `format` from exactly `format.width()` bytes
pub fn decode_value(bytes: &[u8], format: RegisterFormat) -> Option<f64> {
    if bytes.len() != format.width() {
        return None;
    }
    match format {
        RegisterFormat::Float32 { byte_order } => {
            let chunk = [bytes[0], bytes[1], bytes[2], bytes[3]];
            decode_float_with(chunk, byte_order)
        }
        RegisterFormat::UInt16 => Some(f64::from(BigEndian::read_u16(bytes))),
        RegisterFormat::Int16 => Some(f64::from(BigEndian::read_i16(bytes))),
    }
}

/// Round to three decimal digits
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn sanitize(value: f64) -> Option<f64> {
    if !value.is_finite() || value.abs() > SANITY_LIMIT {
        None
    } else if value.abs() < ZERO_SNAP {
        Some(0.0)
    } else {
        Some(value)
    }
}

/// Register decoder - turns a response payload into readings
pub struct RegisterDecoder<'a> {
    register_map: &'a RegisterMap,
    filter: &'a PlausibilityFilter,
    address_stride: u16,
}

impl<'a> RegisterDecoder<'a> {
    pub fn new(register_map: &'a RegisterMap, filter: &'a PlausibilityFilter, address_stride: u16) -> Self {
        Self {
            register_map,
            filter,
            address_stride,
        }
    }

    /// Decode a response payload whose first value sits at `start_register`
    ///
    /// Values are read in the width of each register's format. A trailing
    /// partial value is dropped. Undecodable and implausible values become 0.0
    /// and a diagnostic is pushed for each.
    pub fn decode_payload(
        &self,
        payload: &[u8],
        start_register: u16,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(payload.len() / 4);
        let mut offset = 0;
        let mut address = start_register;

        while offset < payload.len() {
            let format = self.register_map.format(address);
            let end = offset + format.width();
            if end > payload.len() {
                log::debug!(
                    "Dropping {} trailing payload bytes at register 0x{:04X}",
                    payload.len() - offset,
                    address
                );
                break;
            }

            readings.push(self.decode_register(&payload[offset..end], address, format, diagnostics));

            offset = end;
            address = address.wrapping_add(self.address_stride);
        }

        readings
    }

    /// Decode a single register value and apply scale and plausibility
    fn decode_register(
        &self,
        bytes: &[u8],
        address: u16,
        format: RegisterFormat,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Reading {
        let descriptor = self.register_map.get(address);
        let label = self.register_map.label(address).into_owned();
        let unit = descriptor.map(|d| d.unit.clone()).unwrap_or_default();

        let value = match decode_value(bytes, format) {
            Some(raw) => {
                let scaled = round3(raw * descriptor.map_or(1.0, |d| d.scale));
                match descriptor {
                    Some(descriptor) => {
                        let (value, diagnostic) = self.filter.check(descriptor, scaled);
                        diagnostics.extend(diagnostic);
                        value
                    }
                    None => scaled,
                }
            }
            None => {
                diagnostics.push(Diagnostic::DecodeFailure {
                    register: address,
                    label: label.clone(),
                });
                0.0
            }
        };

        Reading {
            register: address,
            label,
            unit,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::meter;

    #[test]
    fn test_word_swapped_voltage() {
        // 230.7 is 0x4366B333; the meter sends the low word first
        let value = decode_float([0xB3, 0x33, 0x43, 0x66]).unwrap();
        assert_eq!(round3(value), 230.7);
    }

    #[test]
    fn test_same_bytes_in_other_orders() {
        let big_endian = decode_float_with([0x43, 0x66, 0xB3, 0x33], FloatByteOrder::BigEndian).unwrap();
        let little_endian =
            decode_float_with([0x33, 0xB3, 0x66, 0x43], FloatByteOrder::LittleEndian).unwrap();
        let byte_swapped =
            decode_float_with([0x66, 0x43, 0x33, 0xB3], FloatByteOrder::ByteSwapped).unwrap();
        assert_eq!(round3(big_endian), 230.7);
        assert_eq!(big_endian, little_endian);
        assert_eq!(big_endian, byte_swapped);
    }

    #[test]
    fn test_captured_chunk_depends_on_word_order() {
        // Word-swapped, 45 14 60 00 becomes 0x60004514 (about 3.7e19): rejected
        assert_eq!(decode_float([0x45, 0x14, 0x60, 0x00]), None);
        // Read straight big-endian it is 2374.0
        assert_eq!(
            decode_float_with([0x45, 0x14, 0x60, 0x00], FloatByteOrder::BigEndian),
            Some(2374.0)
        );
    }

    #[test]
    fn test_nan_and_infinity_rejected() {
        // 0x7FC00000 (NaN) and 0x7F800000 (+inf), word-swapped on the wire
        assert_eq!(decode_float([0x00, 0x00, 0x7F, 0xC0]), None);
        assert_eq!(decode_float([0x00, 0x00, 0x7F, 0x80]), None);
    }

    #[test]
    fn test_tiny_values_snap_to_zero() {
        // 0x00000001 is the smallest subnormal
        assert_eq!(decode_float_with([0, 0, 0, 1], FloatByteOrder::BigEndian), Some(0.0));
        assert_eq!(decode_float([0, 0, 0, 0]), Some(0.0));
    }

    #[test]
    fn test_integer_formats() {
        assert_eq!(decode_value(&[0x01, 0x2C], RegisterFormat::UInt16), Some(300.0));
        assert_eq!(decode_value(&[0xFF, 0xFE], RegisterFormat::Int16), Some(-2.0));
        assert_eq!(decode_value(&[0xFF], RegisterFormat::Int16), None);
    }

    #[test]
    fn test_decode_payload_labels_and_truncation() {
        let map = meter::default_map();
        let filter = PlausibilityFilter::default();
        let decoder = RegisterDecoder::new(&map, &filter, 1);

        // Voltage L1 = 230.7, Voltage L2 = 900.0 (implausible), then 2 stray bytes
        let payload = [0xB3, 0x33, 0x43, 0x66, 0x00, 0x00, 0x44, 0x61, 0xAA, 0xBB];
        let mut diagnostics = Vec::new();
        let readings = decoder.decode_payload(&payload, 0x2000, &mut diagnostics);

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].label, "Voltage L1");
        assert_eq!(readings[0].unit, "V");
        assert_eq!(readings[0].value, 230.7);
        assert_eq!(readings[1].label, "Voltage L2");
        assert_eq!(readings[1].value, 0.0);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind(), "implausible");
    }

    #[test]
    fn test_unknown_register_uses_generic_label() {
        let map = meter::default_map();
        let filter = PlausibilityFilter::default();
        let decoder = RegisterDecoder::new(&map, &filter, 1);

        let mut diagnostics = Vec::new();
        // -5.0 = 0xC0A00000, never range checked without a descriptor
        let readings = decoder.decode_payload(&[0x00, 0x00, 0xC0, 0xA0], 0x3000, &mut diagnostics);
        assert_eq!(readings[0].label, "Register0x3000");
        assert_eq!(readings[0].value, -5.0);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_decode_failure_reported() {
        let map = meter::default_map();
        let filter = PlausibilityFilter::default();
        let decoder = RegisterDecoder::new(&map, &filter, 1);

        let mut diagnostics = Vec::new();
        let readings = decoder.decode_payload(&[0x00, 0x00, 0x7F, 0xC0], 0x2000, &mut diagnostics);
        assert_eq!(readings[0].value, 0.0);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::DecodeFailure {
                register: 0x2000,
                label: "Voltage L1".to_string()
            }]
        );
    }
}
