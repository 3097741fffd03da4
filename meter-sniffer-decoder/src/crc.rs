//! Modbus CRC16
//!
//! Polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF, LSB first.
//! The checksum is appended low byte first. Captured traffic from some
//! installations carries it high byte first, so validation can optionally
//! accept that order too.

/// Byte order in which a trailing CRC was found to match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcOrder {
    /// Low byte first, as the Modbus RTU standard requires
    LittleEndian,
    /// High byte first (compatibility fallback)
    BigEndian,
}

/// Compute the Modbus CRC16 of `data`
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// CRC trailer bytes for `data`, low byte first
pub fn crc16_le_bytes(data: &[u8]) -> [u8; 2] {
    crc16(data).to_le_bytes()
}

/// Validate a complete frame (CRC included) in either byte order
///
/// Equivalent to `validate_with(frame, true).is_some()`.
pub fn validate(frame: &[u8]) -> bool {
    validate_with(frame, true).is_some()
}

/// Validate a complete frame, returning the order the CRC matched in
///
/// The little-endian reading is always tried first. The big-endian reading is
/// only tried when `accept_big_endian` is set.
pub fn validate_with(frame: &[u8], accept_big_endian: bool) -> Option<CrcOrder> {
    if frame.len() < 3 {
        return None;
    }
    let (data, trailer) = frame.split_at(frame.len() - 2);
    let expected = crc16(data);

    if u16::from_le_bytes([trailer[0], trailer[1]]) == expected {
        Some(CrcOrder::LittleEndian)
    } else if accept_big_endian && u16::from_be_bytes([trailer[0], trailer[1]]) == expected {
        Some(CrcOrder::BigEndian)
    } else {
        None
    }
}

/// Append the standard (low byte first) CRC trailer to `data`
pub fn with_crc(data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 2);
    frame.extend_from_slice(data);
    frame.extend_from_slice(&crc16_le_bytes(data));
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_request_crc() {
        // Read 10 holding registers from slave 1 at 0x0000: 01 03 00 00 00 0A C5 CD
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16_le_bytes(&frame), [0xC5, 0xCD]);
        assert!(validate(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]));
    }

    #[test]
    fn test_empty_input_is_initial_value() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_round_trip_little_endian() {
        let frame = with_crc(&[0x05, 0x04, 0x20, 0x00, 0x00, 0x02]);
        assert_eq!(validate_with(&frame, false), Some(CrcOrder::LittleEndian));
    }

    #[test]
    fn test_big_endian_fallback() {
        let data = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        let mut frame = data.to_vec();
        frame.extend_from_slice(&crc16(&data).to_be_bytes());

        assert_eq!(validate_with(&frame, true), Some(CrcOrder::BigEndian));
        assert_eq!(validate_with(&frame, false), None);
    }

    #[test]
    fn test_corrupted_frame_rejected() {
        let mut frame = with_crc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        frame[3] ^= 0x40;
        assert!(!validate(&frame));
    }

    #[test]
    fn test_too_short() {
        assert!(!validate(&[]));
        assert!(!validate(&[0xFF, 0xFF]));
    }
}
