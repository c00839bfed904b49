//! CRC16 checksum used by the frame codec.
//!
//! CCITT polynomial 0x1021, initial register 0xFFFF, MSB-first, no
//! reflection and no final XOR (sometimes called CRC-16/CCITT-FALSE).

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

/// Incremental CRC16 accumulator.
///
/// Lets the codec checksum a header and a payload held in separate buffers.
#[derive(Debug, Clone, Copy)]
pub struct Crc16 {
    register: u16,
}

impl Crc16 {
    pub fn new() -> Self {
        Self { register: INIT }
    }

    /// Feeds bytes into the register.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.register ^= (byte as u16) << 8;
            for _ in 0..8 {
                self.register = if self.register & 0x8000 != 0 {
                    (self.register << 1) ^ POLY
                } else {
                    self.register << 1
                };
            }
        }
    }

    pub fn finish(&self) -> u16 {
        self.register
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the CRC16 of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.update(data);
    crc.finish()
}
