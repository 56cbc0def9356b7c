// THEORY:
// The `osc` module is the wire codec for outbound messages. Downstream sound
// engines speak Open Sound Control, so every tick the engine ships a single OSC
// message in one UDP datagram.
//
// OSC 1.0 message layout:
// 1.  **Address**: ASCII string starting with '/', NUL-terminated, zero-padded
//     to a multiple of four bytes.
// 2.  **Type tags**: ',' followed by one 'f' per argument, same termination
//     and padding rules.
// 3.  **Arguments**: big-endian IEEE-754 float32, in tag order.
//
// The engine only ever sends floats, so 'f' is the only tag supported in
// either direction. Decoding exists so that tests and loopback consumers can
// read back what was sent.

pub mod osc {
    use crate::error::{MotionError, MotionResult};
    use bytes::{Buf, BufMut, Bytes, BytesMut};

    /// Address of the dominant-cell message: motion value, x, y.
    pub const SQUARE_ADDR: &str = "/OpticalFlowExample/Square";
    /// Address of the single-float elapsed frame count message.
    pub const ELAPSED_FRAMES_ADDR: &str = "/OpticalFlowExample/elapsedFrames";
    /// Address of the single-float elapsed seconds message.
    pub const ELAPSED_SECS_ADDR: &str = "/OpticalFlowExample/elapsedSeconds";

    /// An address-tagged OSC message.
    #[derive(Debug, Clone, PartialEq)]
    pub struct OscMessage {
        address: String,
        args: Vec<f32>,
    }

    impl OscMessage {
        pub fn new(address: impl Into<String>) -> MotionResult<Self> {
            let address = address.into();
            validate_address(&address)?;
            if !address.starts_with('/') {
                return Err(MotionError::invalid_input(format!(
                    "OSC address must start with '/', got {:?}",
                    address
                )));
            }
            Ok(Self {
                address,
                args: Vec::new(),
            })
        }

        /// A message carrying one float, used by the elapsed-time messages.
        pub fn single_float(address: impl Into<String>, value: f32) -> MotionResult<Self> {
            Ok(Self::new(address)?.with_float(value))
        }

        pub fn with_float(mut self, value: f32) -> Self {
            self.args.push(value);
            self
        }

        pub fn address(&self) -> &str {
            &self.address
        }

        pub fn args(&self) -> &[f32] {
            &self.args
        }

        pub fn floats(&self) -> Vec<f32> {
            self.args.clone()
        }

        pub fn encode(&self) -> Bytes {
            let mut buf = BytesMut::with_capacity(self.encoded_len());
            put_padded_str(&mut buf, &self.address);

            let mut tags = String::with_capacity(self.args.len() + 1);
            tags.push(',');
            tags.extend(std::iter::repeat_n('f', self.args.len()));
            put_padded_str(&mut buf, &tags);

            for &arg in &self.args {
                buf.put_f32(arg);
            }
            buf.freeze()
        }

        pub fn encoded_len(&self) -> usize {
            padded_len(self.address.len()) + padded_len(self.args.len() + 1) + 4 * self.args.len()
        }

        pub fn decode(packet: &[u8]) -> MotionResult<Self> {
            let mut buf = packet;
            let address = take_padded_str(&mut buf)?;
            if !address.starts_with('/') {
                return Err(MotionError::osc(format!(
                    "not an OSC message, address {:?}",
                    address
                )));
            }

            let tags = take_padded_str(&mut buf)?;
            let tags = tags
                .strip_prefix(',')
                .ok_or_else(|| MotionError::osc("type tag string must start with ','"))?;

            let mut args = Vec::with_capacity(tags.len());
            for tag in tags.chars() {
                if tag != 'f' {
                    return Err(MotionError::osc(format!("unsupported type tag {:?}", tag)));
                }
                args.push(take_word(&mut buf)?.get_f32());
            }

            if buf.has_remaining() {
                return Err(MotionError::osc(format!(
                    "{} trailing bytes after arguments",
                    buf.remaining()
                )));
            }

            Ok(Self { address, args })
        }
    }

    fn validate_address(address: &str) -> MotionResult<()> {
        if !address.is_ascii() || address.contains('\0') {
            return Err(MotionError::invalid_input(
                "OSC address must be ASCII without NUL bytes",
            ));
        }
        Ok(())
    }

    /// Length of a string plus its NUL terminator, rounded up to four bytes.
    fn padded_len(len: usize) -> usize {
        (len + 4) & !3
    }

    fn put_padded_str(buf: &mut BytesMut, s: &str) {
        buf.put_slice(s.as_bytes());
        buf.put_bytes(0, padded_len(s.len()) - s.len());
    }

    fn take_padded_str(buf: &mut &[u8]) -> MotionResult<String> {
        let end = buf
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| MotionError::osc("unterminated string"))?;
        let total = padded_len(end);
        if buf.len() < total {
            return Err(MotionError::osc("string padding truncated"));
        }
        if buf[end..total].iter().any(|&b| b != 0) {
            return Err(MotionError::osc("non-zero string padding"));
        }
        let text = std::str::from_utf8(&buf[..end])
            .map_err(|e| MotionError::osc(format!("invalid string: {}", e)))?
            .to_string();
        buf.advance(total);
        Ok(text)
    }

    fn take_word<'a>(buf: &mut &'a [u8]) -> MotionResult<&'a [u8]> {
        if buf.len() < 4 {
            return Err(MotionError::osc("argument truncated"));
        }
        let (word, rest) = buf.split_at(4);
        *buf = rest;
        Ok(word)
    }
}

pub use osc::*;

#[cfg(test)]
mod tests {
    use super::osc::*;
    use crate::error::MotionError;

    #[test]
    fn square_message_layout_is_byte_exact() {
        let msg = OscMessage::new("/a")
            .unwrap()
            .with_float(1.0)
            .with_float(0.5)
            .with_float(-2.0);
        let bytes = msg.encode();
        let expected: Vec<u8> = [
            &b"/a\0\0"[..],
            &b",fff\0\0\0\0"[..],
            &1.0f32.to_be_bytes()[..],
            &0.5f32.to_be_bytes()[..],
            &(-2.0f32).to_be_bytes()[..],
        ]
        .concat();
        assert_eq!(bytes.as_ref(), expected.as_slice());
        assert_eq!(msg.encoded_len(), bytes.len());
    }

    #[test]
    fn addresses_of_exact_word_length_get_a_full_padding_word() {
        let bytes = OscMessage::new("/abc").unwrap().encode();
        assert_eq!(&bytes[..8], b"/abc\0\0\0\0");
        assert_eq!(&bytes[8..12], b",\0\0\0");
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn default_square_address_encodes_to_aligned_length() {
        let msg = OscMessage::new(SQUARE_ADDR)
            .unwrap()
            .with_float(15360.0)
            .with_float(0.525)
            .with_float(0.5);
        let bytes = msg.encode();
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(OscMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn single_float_message_reads_back() {
        let msg = OscMessage::single_float(ELAPSED_FRAMES_ADDR, 300.0).unwrap();
        let decoded = OscMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.address(), ELAPSED_FRAMES_ADDR);
        assert_eq!(decoded.floats(), vec![300.0]);
    }

    #[test]
    fn non_float_tags_fail_to_decode() {
        let int_packet = [&b"/x\0\0"[..], &b",i\0\0"[..], &7i32.to_be_bytes()[..]].concat();
        assert!(matches!(
            OscMessage::decode(&int_packet),
            Err(MotionError::Osc { .. })
        ));
        let str_packet = [&b"/x\0\0"[..], &b",s\0\0"[..], &b"hi\0\0"[..]].concat();
        assert!(OscMessage::decode(&str_packet).is_err());
    }

    #[test]
    fn address_without_slash_is_rejected() {
        assert!(matches!(
            OscMessage::new("Square"),
            Err(MotionError::InvalidInput { .. })
        ));
        assert!(OscMessage::new("/bad\0addr").is_err());
    }

    #[test]
    fn truncated_packets_fail_to_decode() {
        let bytes = OscMessage::single_float("/x", 1.0).unwrap().encode();
        assert!(OscMessage::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(OscMessage::decode(&bytes[..3]).is_err());
    }

    #[test]
    fn unknown_type_tags_fail_to_decode() {
        let packet = [&b"/x\0\0"[..], &b",d\0\0"[..], &[0u8; 8][..]].concat();
        assert!(matches!(
            OscMessage::decode(&packet),
            Err(MotionError::Osc { .. })
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut bytes = OscMessage::single_float("/x", 1.0).unwrap().encode().to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(OscMessage::decode(&bytes).is_err());
    }
}
