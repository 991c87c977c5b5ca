//! Self-describing binary JSON (SMILE) parsing.
//!
//! Snapshot metadata payloads are encoded in the SMILE format: a compact
//! binary serialization of a JSON document tree marked by the 3-byte header
//! `:)\n`. This module decodes one document from a byte buffer into a
//! [`serde_json::Value`], supporting the token classes legacy producers
//! emit: tiny/short/long ASCII and Unicode strings, shared key and value
//! back-references, zigzag vint integers, 7-bit packed floats, literals,
//! arrays and objects.
//!
//! Raw binary payloads and big-number tokens are rejected as unsupported:
//! no known metadata generation emits them, and guessing at their layout
//! would defeat the fail-explicitly contract.

use serde_json::{Map, Number, Value};

use crate::error::{ReliquaryError, Result};

/// The 3-byte header sequence every SMILE document starts with.
pub const SMILE_HEADER: [u8; 3] = [0x3A, 0x29, 0x0A];

/// Terminator byte for variable-length string tokens.
const END_OF_STRING: u8 = 0xFC;

/// Shared-name/value tables reset once they reach the encoder's capacity.
const MAX_SHARED_ENTRIES: usize = 1024;

/// Locate the first SMILE header within `bytes`, returning its offset.
pub fn find_header(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(SMILE_HEADER.len())
        .position(|window| window == SMILE_HEADER)
}

/// Parse one SMILE document from the start of `bytes`.
///
/// Trailing bytes after the first complete document are ignored; legacy
/// producers pad blobs past the encoded tree.
pub fn parse(bytes: &[u8]) -> Result<Value> {
    let mut reader = SmileReader::new(bytes)?;
    reader.read_value()
}

struct SmileReader<'a> {
    buf: &'a [u8],
    pos: usize,
    share_names: bool,
    share_values: bool,
    seen_names: Vec<String>,
    seen_values: Vec<String>,
}

impl<'a> SmileReader<'a> {
    fn new(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < 4 || buf[..3] != SMILE_HEADER {
            return Err(ReliquaryError::malformed(
                "missing SMILE header at start of payload",
            ));
        }
        let config = buf[3];
        if config >> 4 != 0 {
            return Err(ReliquaryError::malformed(format!(
                "unsupported SMILE version {:#04x}",
                config >> 4
            )));
        }
        Ok(SmileReader {
            buf,
            pos: 4,
            share_names: config & 0x01 != 0,
            share_values: config & 0x02 != 0,
            seen_names: Vec::new(),
            seen_values: Vec::new(),
        })
    }

    fn next_byte(&mut self) -> Result<u8> {
        let byte = *self.buf.get(self.pos).ok_or_else(|| {
            ReliquaryError::malformed(format!("SMILE payload truncated at byte {}", self.pos))
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        let end = end.ok_or_else(|| {
            ReliquaryError::malformed(format!(
                "SMILE payload truncated: wanted {len} bytes at offset {}",
                self.pos
            ))
        })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_value(&mut self) -> Result<Value> {
        let token = self.next_byte()?;
        match token {
            // Short shared value string reference.
            0x01..=0x1F => self.shared_value((token - 1) as usize),
            0x20 => Ok(Value::String(String::new())),
            0x21 => Ok(Value::Null),
            0x22 => Ok(Value::Bool(false)),
            0x23 => Ok(Value::Bool(true)),
            // 32-bit and 64-bit zigzag vints.
            0x24 | 0x25 => {
                let value = self.read_signed_vint()?;
                Ok(Value::Number(Number::from(value)))
            }
            0x28 => {
                let bits = self.read_packed_bits(5)? as u32;
                self.float_value(f32::from_bits(bits) as f64)
            }
            0x29 => {
                let bits = self.read_packed_bits(10)?;
                self.float_value(f64::from_bits(bits))
            }
            0x26 | 0x2A => Err(ReliquaryError::malformed(format!(
                "unsupported SMILE big-number token {token:#04x} at byte {}",
                self.pos - 1
            ))),
            // Tiny/small ASCII and Unicode strings share one decode path;
            // only the length arithmetic differs.
            0x40..=0x5F => self.read_short_string((token & 0x1F) as usize + 1),
            0x60..=0x7F => self.read_short_string((token & 0x1F) as usize + 33),
            0x80..=0x9F => self.read_short_string((token & 0x1F) as usize + 2),
            0xA0..=0xBF => self.read_short_string((token & 0x1F) as usize + 34),
            // Small integers, zigzag packed into the token itself.
            0xC0..=0xDF => {
                let value = zigzag_decode((token & 0x1F) as u64);
                Ok(Value::Number(Number::from(value)))
            }
            0xE0 | 0xE4 => {
                let text = self.read_terminated_string()?;
                Ok(Value::String(text))
            }
            // Two-byte shared value string reference.
            0xEC..=0xEF => {
                let low = self.next_byte()?;
                self.shared_value((((token & 0x03) as usize) << 8) | low as usize)
            }
            0xE8 | 0xFD => Err(ReliquaryError::malformed(format!(
                "unsupported SMILE binary token {token:#04x} at byte {}",
                self.pos - 1
            ))),
            0xF8 => self.read_array(),
            0xFA => self.read_object(),
            _ => Err(ReliquaryError::malformed(format!(
                "unexpected SMILE value token {token:#04x} at byte {}",
                self.pos - 1
            ))),
        }
    }

    fn read_array(&mut self) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            match self.buf.get(self.pos) {
                Some(&0xF9) => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                Some(_) => items.push(self.read_value()?),
                None => {
                    return Err(ReliquaryError::malformed(
                        "SMILE payload truncated inside array",
                    ));
                }
            }
        }
    }

    fn read_object(&mut self) -> Result<Value> {
        let mut map = Map::new();
        loop {
            let token = self.next_byte()?;
            if token == 0xFB {
                return Ok(Value::Object(map));
            }
            let key = self.read_key(token)?;
            let value = self.read_value()?;
            map.insert(key, value);
        }
    }

    fn read_key(&mut self, token: u8) -> Result<String> {
        match token {
            0x20 => Ok(String::new()),
            // Two-byte shared key reference.
            0x30..=0x33 => {
                let low = self.next_byte()?;
                self.shared_name((((token & 0x03) as usize) << 8) | low as usize)
            }
            0x34 => {
                let name = self.read_terminated_string()?;
                Ok(name)
            }
            // One-byte shared key reference.
            0x40..=0x7F => self.shared_name((token - 0x40) as usize),
            0x80..=0xBF => {
                let name = self.read_utf8((token & 0x3F) as usize + 1)?;
                self.remember_name(&name);
                Ok(name)
            }
            0xC0..=0xF7 => {
                let name = self.read_utf8((token - 0xC0) as usize + 2)?;
                self.remember_name(&name);
                Ok(name)
            }
            _ => Err(ReliquaryError::malformed(format!(
                "unexpected SMILE key token {token:#04x} at byte {}",
                self.pos - 1
            ))),
        }
    }

    fn read_short_string(&mut self, len: usize) -> Result<Value> {
        let text = self.read_utf8(len)?;
        if self.share_values {
            if self.seen_values.len() >= MAX_SHARED_ENTRIES {
                self.seen_values.clear();
            }
            self.seen_values.push(text.clone());
        }
        Ok(Value::String(text))
    }

    fn read_utf8(&mut self, len: usize) -> Result<String> {
        let offset = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            ReliquaryError::malformed(format!("invalid UTF-8 in SMILE string at byte {offset}"))
        })
    }

    fn read_terminated_string(&mut self) -> Result<String> {
        let start = self.pos;
        let end = self.buf[self.pos..]
            .iter()
            .position(|b| *b == END_OF_STRING)
            .map(|rel| self.pos + rel)
            .ok_or_else(|| {
                ReliquaryError::malformed(format!(
                    "unterminated SMILE string starting at byte {start}"
                ))
            })?;
        let text = String::from_utf8(self.buf[start..end].to_vec()).map_err(|_| {
            ReliquaryError::malformed(format!("invalid UTF-8 in SMILE string at byte {start}"))
        })?;
        self.pos = end + 1;
        Ok(text)
    }

    fn remember_name(&mut self, name: &str) {
        if self.share_names {
            if self.seen_names.len() >= MAX_SHARED_ENTRIES {
                self.seen_names.clear();
            }
            self.seen_names.push(name.to_string());
        }
    }

    fn shared_name(&self, index: usize) -> Result<String> {
        self.seen_names.get(index).cloned().ok_or_else(|| {
            ReliquaryError::malformed(format!(
                "SMILE shared key reference {index} out of range at byte {}",
                self.pos
            ))
        })
    }

    fn shared_value(&self, index: usize) -> Result<Value> {
        self.seen_values
            .get(index)
            .map(|s| Value::String(s.clone()))
            .ok_or_else(|| {
                ReliquaryError::malformed(format!(
                    "SMILE shared value reference {index} out of range at byte {}",
                    self.pos
                ))
            })
    }

    /// Zigzag vints store 7 bits per byte big-endian; the final byte has its
    /// high bit set and carries only 6 bits.
    fn read_signed_vint(&mut self) -> Result<i64> {
        let mut accum: u64 = 0;
        loop {
            let byte = self.next_byte()?;
            if byte & 0x80 != 0 {
                accum = (accum << 6) | (byte & 0x3F) as u64;
                return Ok(zigzag_decode(accum));
            }
            accum = (accum << 7) | byte as u64;
        }
    }

    /// Floats are packed 7 bits per byte, big-endian: 5 bytes for an f32
    /// bit pattern, 10 for an f64.
    fn read_packed_bits(&mut self, count: usize) -> Result<u64> {
        let mut accum: u64 = 0;
        for _ in 0..count {
            accum = (accum << 7) | (self.next_byte()? & 0x7F) as u64;
        }
        Ok(accum)
    }

    fn float_value(&self, value: f64) -> Result<Value> {
        Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| ReliquaryError::malformed("non-finite float in SMILE payload"))
    }
}

fn zigzag_decode(encoded: u64) -> i64 {
    ((encoded >> 1) as i64) ^ -((encoded & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(body: &[u8]) -> Vec<u8> {
        // Header with shared names enabled (the producers' default config).
        let mut bytes = vec![0x3A, 0x29, 0x0A, 0x01];
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse(&doc(&[0x21])).unwrap(), Value::Null);
        assert_eq!(parse(&doc(&[0x22])).unwrap(), json!(false));
        assert_eq!(parse(&doc(&[0x23])).unwrap(), json!(true));
        assert_eq!(parse(&doc(&[0x20])).unwrap(), json!(""));
    }

    #[test]
    fn test_small_integers() {
        // Token 0xC0 + zigzag(n): 0 -> 0xC0, 1 -> 0xC2, -1 -> 0xC1, 15 -> 0xDE.
        assert_eq!(parse(&doc(&[0xC0])).unwrap(), json!(0));
        assert_eq!(parse(&doc(&[0xC2])).unwrap(), json!(1));
        assert_eq!(parse(&doc(&[0xC1])).unwrap(), json!(-1));
        assert_eq!(parse(&doc(&[0xDE])).unwrap(), json!(15));
        assert_eq!(parse(&doc(&[0xDF])).unwrap(), json!(-16));
    }

    #[test]
    fn test_vint_integers() {
        // 123456 zigzag-encodes to 246912: 7-bit groups 0x1E, 0x12, then a
        // final high-bit byte carrying six zero bits.
        assert_eq!(parse(&doc(&[0x24, 0x1E, 0x12, 0x80])).unwrap(), json!(123456));
        // -3 zigzag-encodes to 5, a single final byte: 0x80 | 5.
        assert_eq!(parse(&doc(&[0x24, 0x85])).unwrap(), json!(-3));
        // 64-bit token shares the wire form.
        assert_eq!(parse(&doc(&[0x25, 0x85])).unwrap(), json!(-3));
    }

    #[test]
    fn test_floats() {
        // f32 1.5 = 0x3FC00000 packed into 5 x 7 bits (big-endian).
        let bits = 0x3FC00000u32 as u64;
        let packed: Vec<u8> = (0..5)
            .rev()
            .map(|i| ((bits >> (7 * i)) & 0x7F) as u8)
            .collect();
        let mut body = vec![0x28];
        body.extend(packed);
        assert_eq!(parse(&doc(&body)).unwrap(), json!(1.5));

        let bits = 2.25f64.to_bits();
        let packed: Vec<u8> = (0..10)
            .rev()
            .map(|i| ((bits >> (7 * i)) & 0x7F) as u8)
            .collect();
        let mut body = vec![0x29];
        body.extend(packed);
        assert_eq!(parse(&doc(&body)).unwrap(), json!(2.25));
    }

    #[test]
    fn test_tiny_ascii_string() {
        // 0x40 | (len - 1), then the bytes.
        let mut body = vec![0x40 + 4];
        body.extend_from_slice(b"hello");
        assert_eq!(parse(&doc(&body)).unwrap(), json!("hello"));
    }

    #[test]
    fn test_tiny_unicode_string() {
        // "héllo" is 6 UTF-8 bytes; unicode tiny token is 0x80 | (len - 2).
        let bytes = "héllo".as_bytes();
        let mut body = vec![0x80 + (bytes.len() as u8 - 2)];
        body.extend_from_slice(bytes);
        assert_eq!(parse(&doc(&body)).unwrap(), json!("héllo"));
    }

    #[test]
    fn test_long_string() {
        let mut body = vec![0xE0];
        body.extend_from_slice(b"a longer piece of text");
        body.push(0xFC);
        assert_eq!(parse(&doc(&body)).unwrap(), json!("a longer piece of text"));
    }

    #[test]
    fn test_array() {
        let body = [0xF8, 0xC2, 0xC4, 0xC6, 0xF9];
        assert_eq!(parse(&doc(&body)).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_object_with_short_keys() {
        // {"a": 1, "b": [true]}
        let body = [
            0xFA, // start object
            0x80, b'a', // key "a" (short ascii, len 1)
            0xC2, // 1
            0x80, b'b', // key "b"
            0xF8, 0x23, 0xF9, // [true]
            0xFB, // end object
        ];
        assert_eq!(parse(&doc(&body)).unwrap(), json!({"a": 1, "b": [true]}));
    }

    #[test]
    fn test_shared_key_back_reference() {
        // [{"idx": 1}, {"idx": 2}]; the second "idx" is shared ref 0x40.
        let body = [
            0xF8, //
            0xFA, 0x82, b'i', b'd', b'x', 0xC2, 0xFB, //
            0xFA, 0x40, 0xC4, 0xFB, //
            0xF9,
        ];
        assert_eq!(
            parse(&doc(&body)).unwrap(),
            json!([{"idx": 1}, {"idx": 2}])
        );
    }

    #[test]
    fn test_shared_value_back_reference() {
        // Config byte with shared values enabled (0x02 | 0x01).
        let mut bytes = vec![0x3A, 0x29, 0x0A, 0x03];
        // ["green", "green"]; the second occurrence is value ref #0, token 0x01.
        bytes.extend_from_slice(&[0xF8, 0x44, b'g', b'r', b'e', b'e', b'n', 0x01, 0xF9]);
        assert_eq!(parse(&bytes).unwrap(), json!(["green", "green"]));
    }

    #[test]
    fn test_missing_header_fails() {
        let err = parse(&[0xFA, 0xFB]).unwrap_err();
        assert!(matches!(err, ReliquaryError::MalformedDocument(_)));
    }

    #[test]
    fn test_truncated_payload_fails() {
        let err = parse(&doc(&[0xFA, 0x80, b'a'])).unwrap_err();
        assert!(matches!(err, ReliquaryError::MalformedDocument(_)));
    }

    #[test]
    fn test_determinism() {
        let body = [
            0xFA, 0x84, b'f', b'i', b'e', b'l', b'd', 0xF8, 0xC2, 0xC4, 0xF9, 0xFB,
        ];
        let first = parse(&doc(&body)).unwrap();
        let second = parse(&doc(&body)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_find_header_with_prefix() {
        let mut blob = vec![0xDE, 0xAD, 0xBE, 0xEF];
        blob.extend_from_slice(&doc(&[0xC2]));
        let offset = find_header(&blob).unwrap();
        assert_eq!(offset, 4);
        assert_eq!(parse(&blob[offset..]).unwrap(), json!(1));
    }
}
