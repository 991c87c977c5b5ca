//! Binary metadata envelope decoding.
//!
//! Newer repository generations wrap every metadata blob in a checksummed
//! envelope:
//!
//! ```text
//! [magic][format name][format version][object id]   header
//! [b"DFL\0"][raw deflate stream]                    payload
//! [footer magic][algorithm id][checksum]            footer
//! ```
//!
//! [`decode_checksummed`] validates the envelope gate by gate (whole-file
//! checksum, header, framing marker, inflate, binary-JSON parse, content
//! sanity) and fails at the first unmet precondition without speculatively
//! parsing past it. One older generation stores the binary-JSON payload
//! embedded in a larger unframed blob; [`decode_embedded`] locates it by its
//! 3-byte start marker instead. Both paths converge on the SMILE parse and
//! the sanity gate.

pub mod smile;

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use serde_json::Value;

use crate::error::{ReliquaryError, Result};

/// Header magic opening every enveloped blob.
pub const CODEC_MAGIC: u32 = 0x3FD7_6C17;

/// Footer magic; the bitwise complement of [`CODEC_MAGIC`].
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;

/// Compression framing marker preceding the deflate stream.
pub const DEFLATE_MARKER: [u8; 4] = *b"DFL\0";

/// Footer layout: magic (4) + algorithm id (4) + checksum (8).
const FOOTER_LEN: usize = 16;

/// Unique object id embedded in the header.
const OBJECT_ID_LEN: usize = 16;

/// Parsed envelope header; exists only for the duration of a decode.
#[derive(Debug)]
struct EnvelopeHeader {
    format_name: String,
    format_version: i32,
    object_id: [u8; OBJECT_ID_LEN],
    /// Offset of the first payload byte.
    payload_start: usize,
}

/// Decode an enveloped metadata blob into a document tree.
///
/// `expected_format` names the envelope kind the caller is prepared to
/// handle (e.g. `"index-metadata"`); `min_version..=max_version` is the
/// closed range of supported format versions. Anything else fails fast with
/// [`ReliquaryError::UnsupportedFormat`] rather than attempting best-effort
/// parsing.
pub fn decode_checksummed(
    bytes: &[u8],
    expected_format: &str,
    min_version: i32,
    max_version: i32,
) -> Result<Value> {
    verify_checksum(bytes)?;
    let header = read_header(bytes, expected_format, min_version, max_version)?;
    tracing::trace!(
        format = %header.format_name,
        version = header.format_version,
        id = ?header.object_id,
        "validated envelope header"
    );
    let compressed = check_framing(bytes, header.payload_start)?;
    let inflated = inflate(compressed)?;
    let tree = smile::parse(&inflated)?;
    sanity_check(tree)
}

/// Decode the legacy unframed generation: scan for the 3-byte binary-JSON
/// start marker and parse everything from the first match onward. Arbitrary
/// prefix bytes before the marker do not affect the result.
pub fn decode_embedded(bytes: &[u8]) -> Result<Value> {
    let offset = smile::find_header(bytes).ok_or_else(|| {
        ReliquaryError::malformed("no binary-JSON start marker found in unframed blob")
    })?;
    let tree = smile::parse(&bytes[offset..])?;
    sanity_check(tree)
}

/// Gate 1: the trailing digest must match a CRC32 over everything before it.
/// Any mismatch is fatal corruption, independent of what follows.
fn verify_checksum(bytes: &[u8]) -> Result<()> {
    if bytes.len() < FOOTER_LEN {
        return Err(ReliquaryError::unsupported_format(format!(
            "blob of {} bytes is too short to carry an envelope footer",
            bytes.len()
        )));
    }
    let body = &bytes[..bytes.len() - 8];
    let mut footer = &bytes[bytes.len() - FOOTER_LEN..];

    let magic = footer.read_u32::<BigEndian>()?;
    if magic != FOOTER_MAGIC {
        return Err(ReliquaryError::CorruptMetadata {
            context: "envelope footer".to_string(),
            expected: FOOTER_MAGIC,
            actual: magic,
        });
    }
    let algorithm = footer.read_u32::<BigEndian>()?;
    if algorithm != 0 {
        return Err(ReliquaryError::unsupported_format(format!(
            "unknown footer checksum algorithm {algorithm}"
        )));
    }

    let expected = footer.read_u64::<BigEndian>()?;
    let actual = crc32fast::hash(body) as u64;
    if expected != actual {
        return Err(ReliquaryError::CorruptMetadata {
            context: "envelope".to_string(),
            expected: expected as u32,
            actual: actual as u32,
        });
    }
    Ok(())
}

/// Gate 2: fixed-format magic header naming a recognized envelope kind with
/// a format version inside the supported closed range.
fn read_header(
    bytes: &[u8],
    expected_format: &str,
    min_version: i32,
    max_version: i32,
) -> Result<EnvelopeHeader> {
    let mut cursor = &bytes[..];
    let magic = cursor.read_u32::<BigEndian>().map_err(|_| {
        ReliquaryError::unsupported_format("blob too short for envelope header")
    })?;
    if magic != CODEC_MAGIC {
        return Err(ReliquaryError::unsupported_format(format!(
            "bad header magic {magic:#010x} (expected {CODEC_MAGIC:#010x})"
        )));
    }

    let name_len = read_varint(&mut cursor)? as usize;
    let mut consumed = bytes.len() - cursor.len();
    if consumed + name_len > bytes.len() {
        return Err(ReliquaryError::unsupported_format(
            "envelope format name overruns the blob",
        ));
    }
    let format_name = String::from_utf8(cursor[..name_len].to_vec()).map_err(|_| {
        ReliquaryError::unsupported_format("envelope format name is not valid UTF-8")
    })?;
    cursor = &cursor[name_len..];
    if format_name != expected_format {
        return Err(ReliquaryError::unsupported_format(format!(
            "envelope kind \"{format_name}\" (expected \"{expected_format}\")"
        )));
    }

    let format_version = cursor.read_i32::<BigEndian>().map_err(|_| {
        ReliquaryError::unsupported_format("blob too short for format version")
    })?;
    if format_version < min_version || format_version > max_version {
        return Err(ReliquaryError::unsupported_format(format!(
            "format version {format_version} outside supported range [{min_version}, {max_version}]"
        )));
    }

    let mut object_id = [0u8; OBJECT_ID_LEN];
    cursor.read_exact(&mut object_id).map_err(|_| {
        ReliquaryError::unsupported_format("blob too short for envelope object id")
    })?;

    consumed = bytes.len() - cursor.len();
    Ok(EnvelopeHeader {
        format_name,
        format_version,
        object_id,
        payload_start: consumed,
    })
}

/// Gate 3: the 4-byte compression framing marker must immediately follow the
/// header. Its absence means a layout this decoder does not understand.
fn check_framing(bytes: &[u8], payload_start: usize) -> Result<&[u8]> {
    let payload_end = bytes.len() - FOOTER_LEN;
    let payload = &bytes[payload_start..payload_end];
    if payload.len() < DEFLATE_MARKER.len() || payload[..DEFLATE_MARKER.len()] != DEFLATE_MARKER {
        return Err(ReliquaryError::InvalidFraming {
            offset: payload_start,
            message: format!(
                "expected {:?} marker, found {:?}",
                DEFLATE_MARKER,
                &payload[..payload.len().min(DEFLATE_MARKER.len())]
            ),
        });
    }
    Ok(&payload[DEFLATE_MARKER.len()..])
}

/// Gate 4: headerless raw inflate of the remaining payload.
fn inflate(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut inflated = Vec::new();
    DeflateDecoder::new(compressed)
        .read_to_end(&mut inflated)
        .map_err(|e| ReliquaryError::decompression(e.to_string()))?;
    Ok(inflated)
}

/// Gate 6: a tree that resolves to a bare scalar or an empty structure is a
/// parse failure, not a valid empty document. Legacy producers emit such
/// byte sequences on truncation.
fn sanity_check(tree: Value) -> Result<Value> {
    let empty = match &tree {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => true,
    };
    if empty {
        return Err(ReliquaryError::malformed(format!(
            "decoded tree is empty or scalar: {tree}"
        )));
    }
    Ok(tree)
}

/// Header strings carry a little-endian base-128 length prefix.
fn read_varint(cursor: &mut &[u8]) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = cursor.read_u8().map_err(|_| {
            ReliquaryError::unsupported_format("blob too short for header length prefix")
        })?;
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift > 63 {
            return Err(ReliquaryError::unsupported_format(
                "header length prefix overflows",
            ));
        }
    }
}
