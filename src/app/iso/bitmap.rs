use crate::app::error::GatewayError;

/// Presence map for data elements 1..=128.
///
/// Bit 1 of the primary bitmap means "a secondary bitmap follows"; when set,
/// fields 65..=128 are addressable. Encoding on the wire is either raw bytes
/// (`use_binary_bitmap = true`) or hex ASCII — the two must never be mixed
/// between parse and pack on the same stream.
#[derive(Debug, Clone)]
pub struct Bitmap {
    bits: [bool; 128],
}

impl Bitmap {
    pub fn new() -> Self {
        Self { bits: [false; 128] }
    }

    pub fn from_fields(fields: &[u8]) -> Self {
        let mut bitmap = Self::new();
        for &de in fields {
            bitmap.set(de);
        }
        bitmap
    }

    pub fn set(&mut self, field: u8) {
        if (1..=128).contains(&field) {
            self.bits[field as usize - 1] = true;
            if field > 64 {
                self.bits[0] = true;
            }
        }
    }

    pub fn is_set(&self, field: u8) -> bool {
        (1..=128).contains(&field) && self.bits[field as usize - 1]
    }

    pub fn has_secondary(&self) -> bool {
        self.bits.iter().skip(64).any(|&b| b)
    }

    pub fn set_bits(&self) -> Vec<u8> {
        self.bits
            .iter()
            .enumerate()
            .filter(|&(_, &set)| set)
            .map(|(idx, _)| (idx + 1) as u8)
            .collect()
    }

    /// Raw byte form: 8 bytes, or 16 if a secondary bitmap is required.
    pub fn to_raw_bytes(&self) -> Vec<u8> {
        let byte_count = if self.has_secondary() { 16 } else { 8 };
        let mut bytes = vec![0u8; byte_count];
        for byte_idx in 0..byte_count {
            let mut byte = 0u8;
            for bit_idx in 0..8 {
                let bit_position = byte_idx * 8 + bit_idx;
                if bit_position < 128 && self.bits[bit_position] {
                    byte |= 1 << (7 - bit_idx);
                }
            }
            bytes[byte_idx] = byte;
        }
        bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.to_raw_bytes())
    }

    /// Decode a bitmap from its wire form, consuming 8 or 16 bytes (binary
    /// mode) or 16/32 hex characters (ASCII mode) from the front of `data`.
    /// Returns the bitmap and the number of source bytes consumed.
    pub fn parse(data: &[u8], use_binary_bitmap: bool) -> Result<(Self, usize), GatewayError> {
        if use_binary_bitmap {
            if data.len() < 8 {
                return Err(GatewayError::FrameIncomplete);
            }
            let has_secondary = data[0] & 0x80 != 0;
            let total = if has_secondary { 16 } else { 8 };
            if data.len() < total {
                return Err(GatewayError::FrameIncomplete);
            }
            Ok((Self::from_raw_bytes(&data[..total])?, total))
        } else {
            if data.len() < 16 {
                return Err(GatewayError::FrameIncomplete);
            }
            let primary_hex = std::str::from_utf8(&data[..16])
                .map_err(|_| GatewayError::FrameMalformed("bitmap is not valid ASCII".into()))?;
            let primary_bytes = hex::decode(primary_hex)
                .map_err(|e| GatewayError::FrameMalformed(format!("bad bitmap hex: {e}")))?;
            let has_secondary = primary_bytes[0] & 0x80 != 0;
            if !has_secondary {
                return Ok((Self::from_raw_bytes(&primary_bytes)?, 16));
            }
            if data.len() < 32 {
                return Err(GatewayError::FrameIncomplete);
            }
            let secondary_hex = std::str::from_utf8(&data[16..32])
                .map_err(|_| GatewayError::FrameMalformed("bitmap is not valid ASCII".into()))?;
            let secondary_bytes = hex::decode(secondary_hex)
                .map_err(|e| GatewayError::FrameMalformed(format!("bad bitmap hex: {e}")))?;
            let mut all = primary_bytes;
            all.extend_from_slice(&secondary_bytes);
            Ok((Self::from_raw_bytes(&all)?, 32))
        }
    }

    pub fn encode(&self, use_binary_bitmap: bool) -> Vec<u8> {
        if use_binary_bitmap {
            self.to_raw_bytes()
        } else {
            self.to_hex().into_bytes()
        }
    }

    fn from_raw_bytes(bytes: &[u8]) -> Result<Self, GatewayError> {
        let mut bitmap = Self::new();
        for (byte_idx, &byte) in bytes.iter().enumerate() {
            for bit_idx in 0..8 {
                if byte & (1 << (7 - bit_idx)) != 0 {
                    let position = (byte_idx * 8 + bit_idx) + 1;
                    if position <= 128 {
                        bitmap.bits[position - 1] = true;
                    }
                }
            }
        }
        Ok(bitmap)
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primary_only() {
        let mut b = Bitmap::new();
        b.set(2);
        b.set(3);
        b.set(4);
        let hex = b.to_hex();
        let (parsed, consumed) = Bitmap::parse(hex.as_bytes(), false).unwrap();
        assert_eq!(consumed, 16);
        assert!(parsed.is_set(2));
        assert!(parsed.is_set(3));
        assert!(parsed.is_set(4));
        assert!(!parsed.is_set(5));
        assert!(!parsed.has_secondary());
    }

    #[test]
    fn secondary_bitmap_auto_sets_bit_one() {
        let mut b = Bitmap::new();
        b.set(70);
        assert!(b.is_set(1));
        assert!(b.has_secondary());
        let hex = b.to_hex();
        assert_eq!(hex.len(), 32);
    }

    #[test]
    fn binary_mode_round_trip() {
        let mut b = Bitmap::new();
        b.set(11);
        b.set(41);
        let raw = b.encode(true);
        let (parsed, consumed) = Bitmap::parse(&raw, true).unwrap();
        assert_eq!(consumed, 8);
        assert!(parsed.is_set(11));
        assert!(parsed.is_set(41));
    }
}
