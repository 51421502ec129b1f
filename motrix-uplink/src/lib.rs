mod client;
pub mod stats;

#[macro_use]
extern crate log;

pub use client::Client;

use self::stats::Stats;

/// Frame marker preceding every telemetry frame on the wire.
const MAGIC: [u8; 2] = [0xde, 0xad];

/// Checksum covering the size byte, the channel index byte and the payload.
///
/// This is the common zlib CRC32 so the firmware can reuse its vendor
/// checksum peripheral.
const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// One decoded telemetry frame.
///
/// The payload is opaque at this level. The channel index selects the
/// packet shape and the receiver decodes the payload against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(channel: u8, payload: Vec<u8>) -> Self {
        Self { channel, payload }
    }

    /// Encode the frame in wire format, marker to trailer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let size = self.payload.len() as u8;

        let mut buffer = Vec::with_capacity(4 + self.payload.len() + 4);
        buffer.extend_from_slice(&MAGIC);
        buffer.push(size);
        buffer.push(self.channel);
        buffer.extend_from_slice(&self.payload);

        let mut digest = CRC32.digest();
        digest.update(&[size, self.channel]);
        digest.update(&self.payload);
        buffer.extend_from_slice(&digest.finalize().to_le_bytes());

        buffer
    }
}

enum DecodeState {
    Marker0,
    Marker1,
    Size,
    Index,
    Payload,
    Trailer,
}

/// Resynchronizing frame decoder.
///
/// The decoder consumes the stream one byte at a time. Any byte that
/// does not advance a frame is dropped, so the decoder recovers from
/// noise or a partial frame as soon as the next marker arrives. A
/// frame with a bad checksum is counted and discarded without ever
/// reaching the caller.
pub struct Decoder {
    state: DecodeState,
    size: u8,
    channel: u8,
    payload: Vec<u8>,
    trailer: [u8; 4],
    trailer_len: usize,
    /// Decoder statistics.
    pub stats: Stats,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Marker0,
            size: 0,
            channel: 0,
            payload: Vec::new(),
            trailer: [0; 4],
            trailer_len: 0,
            stats: Stats::new(),
        }
    }

    /// Feed a single byte, returning a frame when one completes.
    pub fn advance(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecodeState::Marker0 => {
                if byte == MAGIC[0] {
                    self.state = DecodeState::Marker1;
                } else {
                    self.stats.sync_skipped += 1;
                }
            }
            DecodeState::Marker1 => {
                if byte == MAGIC[1] {
                    self.state = DecodeState::Size;
                } else if byte == MAGIC[0] {
                    // First marker byte again, keep waiting for the second.
                    self.stats.sync_skipped += 1;
                } else {
                    self.stats.sync_skipped += 2;
                    self.state = DecodeState::Marker0;
                }
            }
            DecodeState::Size => {
                self.size = byte;
                self.state = DecodeState::Index;
            }
            DecodeState::Index => {
                self.channel = byte;
                self.payload.clear();
                self.trailer_len = 0;
                self.state = if self.size == 0 {
                    DecodeState::Trailer
                } else {
                    DecodeState::Payload
                };
            }
            DecodeState::Payload => {
                self.payload.push(byte);
                if self.payload.len() == self.size as usize {
                    self.state = DecodeState::Trailer;
                }
            }
            DecodeState::Trailer => {
                self.trailer[self.trailer_len] = byte;
                self.trailer_len += 1;
                if self.trailer_len == self.trailer.len() {
                    self.state = DecodeState::Marker0;
                    return self.finish();
                }
            }
        }

        None
    }

    fn finish(&mut self) -> Option<Frame> {
        self.stats.rx_count += 1;

        let mut digest = CRC32.digest();
        digest.update(&[self.size, self.channel]);
        digest.update(&self.payload);

        if digest.finalize() != u32::from_le_bytes(self.trailer) {
            self.stats.rx_failure += 1;
            debug!("Drop frame on channel {}: checksum mismatch", self.channel);
            return None;
        }

        Some(Frame::new(self.channel, std::mem::take(&mut self.payload)))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
