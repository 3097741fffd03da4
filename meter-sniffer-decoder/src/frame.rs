//! Frame classification
//!
//! Turns a CRC-valid candidate into an owned [`ParsedFrame`] and tags it as a
//! request, response, exception or write purely from its address, function
//! code and length. No state is consulted.

use byteorder::{BigEndian, ByteOrder};

use crate::scanner::{CandidateFrame, EXCEPTION_LEN, REQUEST_LEN};
use crate::types::{FrameKind, ParsedFrame, WRITE_MULTIPLE_REGISTERS};

impl ParsedFrame {
    /// Copy a validated candidate out of the buffer
    pub fn from_candidate(candidate: &CandidateFrame<'_>) -> Self {
        let bytes = candidate.bytes;
        Self {
            address: bytes[0],
            function: bytes[1],
            payload: bytes[2..bytes.len() - 2].to_vec(),
            crc_ok: true,
            crc_order: candidate.crc_order,
            raw: bytes.to_vec(),
        }
    }

    /// Register data of a read response (payload after the byte count)
    pub fn register_data(&self) -> &[u8] {
        self.payload.get(1..).unwrap_or(&[])
    }
}

/// Frame classifier
pub struct FrameClassifier;

impl FrameClassifier {
    /// Classify a validated frame
    ///
    /// Returns `None` for shapes that do not belong to any recognised kind.
    pub fn classify(frame: &ParsedFrame, master_address: u8, read_functions: &[u8]) -> Option<FrameKind> {
        if frame.is_exception() {
            return (frame.len() == EXCEPTION_LEN).then(|| FrameKind::ExceptionResponse {
                exception_code: frame.payload[0],
            });
        }

        if read_functions.contains(&frame.function) {
            if frame.address == master_address && frame.len() == REQUEST_LEN {
                let (start_register, register_count) = Self::register_range(&frame.payload);
                return Some(FrameKind::ReadRequest {
                    start_register,
                    register_count,
                });
            }
            let byte_count = *frame.payload.first()?;
            return (usize::from(byte_count) == frame.payload.len() - 1)
                .then_some(FrameKind::ReadResponse { byte_count });
        }

        if frame.function == WRITE_MULTIPLE_REGISTERS && frame.payload.len() >= 4 {
            let (start_register, register_count) = Self::register_range(&frame.payload);
            return Some(if frame.len() == REQUEST_LEN {
                FrameKind::WriteAck {
                    start_register,
                    register_count,
                }
            } else {
                FrameKind::WriteRequest {
                    start_register,
                    register_count,
                }
            });
        }

        None
    }

    /// Start register and count from the first four payload bytes
    fn register_range(payload: &[u8]) -> (u16, u16) {
        (BigEndian::read_u16(&payload[0..2]), BigEndian::read_u16(&payload[2..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::{with_crc, CrcOrder};
    use crate::types::{READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS};

    fn parse(data: &[u8]) -> ParsedFrame {
        let bytes = with_crc(data);
        let candidate = CandidateFrame {
            start: 0,
            bytes: &bytes,
            crc_order: CrcOrder::LittleEndian,
        };
        ParsedFrame::from_candidate(&candidate)
    }

    const READS: &[u8] = &[READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS];

    #[test]
    fn test_parsed_frame_fields() {
        let frame = parse(&[0x01, 0x03, 0x20, 0x04, 0x00, 0x15]);
        assert_eq!(frame.address, 0x01);
        assert_eq!(frame.function, 0x03);
        assert_eq!(frame.payload, vec![0x20, 0x04, 0x00, 0x15]);
        assert!(frame.crc_ok);
        assert_eq!(frame.len(), 8);
    }

    #[test]
    fn test_classify_request() {
        let frame = parse(&[0x01, 0x03, 0x20, 0x04, 0x00, 0x15]);
        assert_eq!(
            FrameClassifier::classify(&frame, 0x01, READS),
            Some(FrameKind::ReadRequest {
                start_register: 0x2004,
                register_count: 21
            })
        );
    }

    #[test]
    fn test_classify_response() {
        let frame = parse(&[0x01, 0x04, 0x04, 0x00, 0x00, 0x43, 0x66]);
        assert_eq!(
            FrameClassifier::classify(&frame, 0x01, READS),
            Some(FrameKind::ReadResponse { byte_count: 4 })
        );
        assert_eq!(frame.register_data(), &[0x00, 0x00, 0x43, 0x66]);
    }

    #[test]
    fn test_classify_exception() {
        let frame = parse(&[0x05, 0x83, 0x02]);
        assert_eq!(
            FrameClassifier::classify(&frame, 0x01, READS),
            Some(FrameKind::ExceptionResponse { exception_code: 2 })
        );
    }

    #[test]
    fn test_classify_writes() {
        let request = parse(&[0x01, 0x10, 0x00, 0x10, 0x00, 0x01, 0x02, 0x00, 0x0A]);
        assert_eq!(
            FrameClassifier::classify(&request, 0x01, READS),
            Some(FrameKind::WriteRequest {
                start_register: 0x0010,
                register_count: 1
            })
        );
        let ack = parse(&[0x05, 0x10, 0x00, 0x10, 0x00, 0x01]);
        assert_eq!(
            FrameClassifier::classify(&ack, 0x01, READS),
            Some(FrameKind::WriteAck {
                start_register: 0x0010,
                register_count: 1
            })
        );
    }

    #[test]
    fn test_unknown_function() {
        let frame = parse(&[0x05, 0x06, 0x00, 0x10, 0x00, 0x01]);
        assert_eq!(FrameClassifier::classify(&frame, 0x01, READS), None);
    }
}
