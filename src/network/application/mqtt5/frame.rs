//! Incremental frame reader.
//!
//! Assembles complete control packets from arbitrarily split reads. The
//! reader keeps its position between calls, so a header byte, a
//! remaining-length byte or a slice of payload can arrive in any number of
//! pieces.
//!
//! ```text
//! WaitHeader --1 byte--> WaitLength --VBI done--> WaitPayload --len bytes--> (frame)
//!      ^                                                                        |
//!      +------------------------------- clear_state ---------------------------+
//! ```

use bytes::BytesMut;

use super::cursor::VAR_INT_MAX;
use super::error::CodecError;

/// Position of the reader inside the current packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadState {
    /// Waiting for the fixed header byte.
    WaitHeader,
    /// Reading the remaining-length Variable Byte Integer.
    WaitLength,
    /// Reading the packet body.
    WaitPayload,
}

/// A complete packet: fixed header byte plus exactly remaining-length bytes.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Frame {
    /// Fixed header byte.
    pub header: u8,
    /// Variable header and payload.
    pub body: BytesMut,
}

/// Restartable packet assembler.
#[derive(Debug)]
pub struct FrameReader {
    state: ReadState,
    header: u8,
    remaining: u32,
    length_bytes: u8,
    body: BytesMut,
    filled: usize,
    maximum_packet_size: u32,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(VAR_INT_MAX)
    }
}

impl FrameReader {
    /// A reader refusing packets larger than `maximum_packet_size` bytes.
    pub fn new(maximum_packet_size: u32) -> Self {
        Self {
            state: ReadState::WaitHeader,
            header: 0,
            remaining: 0,
            length_bytes: 0,
            body: BytesMut::new(),
            filled: 0,
            maximum_packet_size,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Largest packet accepted, fixed header included.
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// Change the largest accepted packet size.
    pub fn set_maximum_packet_size(&mut self, maximum: u32) {
        self.maximum_packet_size = maximum;
    }

    /// Drop any partially read packet and wait for a new fixed header.
    pub fn clear_state(&mut self) {
        self.state = ReadState::WaitHeader;
        self.header = 0;
        self.remaining = 0;
        self.length_bytes = 0;
        self.body = BytesMut::new();
        self.filled = 0;
    }

    /// Consume bytes from `input` until one packet is complete or the input
    /// runs out.
    ///
    /// Returns how many bytes were consumed and the completed frame, if any.
    /// Bytes past the end of a completed frame are left for the next call.
    /// On error the reader is cleared; the stream cannot be resynchronised
    /// and the connection has to be dropped.
    pub fn feed(&mut self, input: &[u8]) -> Result<(usize, Option<Frame>), CodecError> {
        match self.feed_inner(input) {
            Ok(result) => Ok(result),
            Err(e) => {
                self.clear_state();
                Err(e)
            }
        }
    }

    fn feed_inner(&mut self, input: &[u8]) -> Result<(usize, Option<Frame>), CodecError> {
        let mut consumed = 0;

        while consumed < input.len() {
            match self.state {
                ReadState::WaitHeader => {
                    self.header = input[consumed];
                    consumed += 1;
                    self.state = ReadState::WaitLength;
                }
                ReadState::WaitLength => {
                    let byte = input[consumed];
                    consumed += 1;
                    self.remaining |= u32::from(byte & 0x7F) << (7 * u32::from(self.length_bytes));
                    self.length_bytes += 1;
                    if byte & 0x80 != 0 {
                        if self.length_bytes >= 4 {
                            return Err(CodecError::MalformedVariableInteger);
                        }
                        continue;
                    }
                    let total = 1 + u32::from(self.length_bytes) + self.remaining;
                    if total > self.maximum_packet_size {
                        return Err(CodecError::PacketTooLarge {
                            len: self.remaining,
                        });
                    }
                    if self.remaining == 0 {
                        return Ok((consumed, Some(self.complete())));
                    }
                    self.body = BytesMut::zeroed(self.remaining as usize);
                    self.filled = 0;
                    self.state = ReadState::WaitPayload;
                }
                ReadState::WaitPayload => {
                    let wanted = self.body.len() - self.filled;
                    let take = wanted.min(input.len() - consumed);
                    self.body[self.filled..self.filled + take]
                        .copy_from_slice(&input[consumed..consumed + take]);
                    self.filled += take;
                    consumed += take;
                    if self.filled == self.body.len() {
                        return Ok((consumed, Some(self.complete())));
                    }
                }
            }
        }
        Ok((consumed, None))
    }

    fn complete(&mut self) -> Frame {
        let frame = Frame {
            header: self.header,
            body: core::mem::take(&mut self.body),
        };
        self.clear_state();
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn feed_all(reader: &mut FrameReader, mut input: &[u8], frames: &mut Vec<Frame>) {
        while !input.is_empty() {
            let (used, frame) = reader.feed(input).unwrap();
            assert!(used > 0);
            input = &input[used..];
            frames.extend(frame);
        }
    }

    fn sample_stream() -> (Vec<u8>, Vec<Frame>) {
        let mut stream = Vec::new();
        let mut expected = Vec::new();

        stream.extend_from_slice(&[0xC0, 0x00]);
        expected.push(Frame {
            header: 0xC0,
            body: BytesMut::new(),
        });

        stream.extend_from_slice(&[0x40, 0x02, 0x00, 0x05]);
        expected.push(Frame {
            header: 0x40,
            body: BytesMut::from(&[0x00, 0x05][..]),
        });

        let payload: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        stream.extend_from_slice(&[0x30, 0xAC, 0x02]);
        stream.extend_from_slice(&payload);
        expected.push(Frame {
            header: 0x30,
            body: BytesMut::from(&payload[..]),
        });

        (stream, expected)
    }

    #[test]
    fn whole_stream_in_one_call_yields_one_frame_at_a_time() {
        let (stream, expected) = sample_stream();
        let mut reader = FrameReader::default();
        let (used, frame) = reader.feed(&stream).unwrap();
        assert_eq!(used, 2);
        assert_eq!(frame.as_ref(), Some(&expected[0]));
        assert_eq!(reader.state(), ReadState::WaitHeader);

        let mut frames = vec![frame.unwrap()];
        feed_all(&mut reader, &stream[used..], &mut frames);
        assert_eq!(frames, expected);
    }

    #[test]
    fn byte_at_a_time() {
        let (stream, expected) = sample_stream();
        let mut reader = FrameReader::default();
        let mut frames = Vec::new();
        for byte in &stream {
            let (used, frame) = reader.feed(core::slice::from_ref(byte)).unwrap();
            assert_eq!(used, 1);
            frames.extend(frame);
        }
        assert_eq!(frames, expected);
    }

    #[test]
    fn random_splits_reassemble_the_same_frames() {
        let (stream, expected) = sample_stream();
        let mut rng = StdRng::seed_from_u64(0x6d71_7474);
        for _ in 0..200 {
            let mut reader = FrameReader::default();
            let mut frames = Vec::new();
            let mut rest = &stream[..];
            while !rest.is_empty() {
                let chunk = rng.gen_range(1..=rest.len().min(40));
                feed_all(&mut reader, &rest[..chunk], &mut frames);
                rest = &rest[chunk..];
            }
            assert_eq!(frames, expected);
            assert_eq!(reader.state(), ReadState::WaitHeader);
        }
    }

    #[test]
    fn states_advance_in_order() {
        let mut reader = FrameReader::default();
        assert_eq!(reader.state(), ReadState::WaitHeader);
        reader.feed(&[0x30]).unwrap();
        assert_eq!(reader.state(), ReadState::WaitLength);
        reader.feed(&[0x80]).unwrap();
        assert_eq!(reader.state(), ReadState::WaitLength);
        reader.feed(&[0x01]).unwrap();
        assert_eq!(reader.state(), ReadState::WaitPayload);
        reader.clear_state();
        assert_eq!(reader.state(), ReadState::WaitHeader);
    }

    #[test]
    fn five_length_bytes_are_malformed() {
        let mut reader = FrameReader::default();
        assert_eq!(
            reader.feed(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF]),
            Err(CodecError::MalformedVariableInteger)
        );
        assert_eq!(reader.state(), ReadState::WaitHeader);
    }

    #[test]
    fn oversized_packet_is_refused_before_allocation() {
        let mut reader = FrameReader::new(64);
        assert_eq!(
            reader.feed(&[0x30, 0x80, 0x01]),
            Err(CodecError::PacketTooLarge { len: 128 })
        );
        assert_eq!(reader.state(), ReadState::WaitHeader);
    }
}
