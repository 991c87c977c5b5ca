//! Test fixtures: a minimal binary-JSON (SMILE) encoder and envelope
//! writer for authoring synthetic repository blobs, plus helpers that lay
//! whole repositories out on disk.
#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::DeflateEncoder;
use serde_json::Value;

const SMILE_HEADER: [u8; 4] = [0x3A, 0x29, 0x0A, 0x00];
const CODEC_MAGIC: u32 = 0x3FD7_6C17;
const DEFLATE_MARKER: [u8; 4] = *b"DFL\0";

/// Encode a document tree as SMILE (no shared-string back-references).
pub fn smile_encode(value: &Value) -> Vec<u8> {
    let mut out = SMILE_HEADER.to_vec();
    encode_value(value, &mut out);
    out
}

fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(0x21),
        Value::Bool(false) => out.push(0x22),
        Value::Bool(true) => out.push(0x23),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                encode_int(i, out);
            } else {
                out.push(0x29);
                let bits = n.as_f64().unwrap().to_bits();
                for shift in (0..10).rev() {
                    out.push(((bits >> (7 * shift)) & 0x7F) as u8);
                }
            }
        }
        Value::String(s) => encode_string(s, out),
        Value::Array(items) => {
            out.push(0xF8);
            for item in items {
                encode_value(item, out);
            }
            out.push(0xF9);
        }
        Value::Object(map) => {
            out.push(0xFA);
            for (key, item) in map {
                encode_key(key, out);
                encode_value(item, out);
            }
            out.push(0xFB);
        }
    }
}

fn encode_int(value: i64, out: &mut Vec<u8>) {
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    if (-16..=15).contains(&value) {
        out.push(0xC0 + zigzag as u8);
        return;
    }
    out.push(0x24);
    // Final byte carries 6 bits with the high bit set; preceding bytes
    // carry 7 bits each, big-endian.
    let mut groups = vec![0x80 | (zigzag & 0x3F) as u8];
    let mut rest = zigzag >> 6;
    while rest > 0 {
        groups.push((rest & 0x7F) as u8);
        rest >>= 7;
    }
    groups.reverse();
    out.extend_from_slice(&groups);
}

fn encode_string(s: &str, out: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        out.push(0x20);
        return;
    }
    if s.is_ascii() {
        match bytes.len() {
            1..=32 => out.push(0x40 + (bytes.len() as u8 - 1)),
            33..=64 => out.push(0x60 + (bytes.len() as u8 - 33)),
            _ => {
                out.push(0xE0);
                out.extend_from_slice(bytes);
                out.push(0xFC);
                return;
            }
        }
    } else {
        match bytes.len() {
            2..=33 => out.push(0x80 + (bytes.len() as u8 - 2)),
            34..=65 => out.push(0xA0 + (bytes.len() as u8 - 34)),
            _ => {
                out.push(0xE4);
                out.extend_from_slice(bytes);
                out.push(0xFC);
                return;
            }
        }
    }
    out.extend_from_slice(bytes);
}

fn encode_key(key: &str, out: &mut Vec<u8>) {
    let bytes = key.as_bytes();
    if bytes.is_empty() {
        out.push(0x20);
        return;
    }
    if key.is_ascii() && bytes.len() <= 64 {
        out.push(0x80 + (bytes.len() as u8 - 1));
        out.extend_from_slice(bytes);
    } else if !key.is_ascii() && (2..=57).contains(&bytes.len()) {
        out.push(0xC0 + (bytes.len() as u8 - 2));
        out.extend_from_slice(bytes);
    } else {
        out.push(0x34);
        out.extend_from_slice(bytes);
        out.push(0xFC);
    }
}

/// Wrap a document in the checksummed envelope the modern generations use.
pub fn enveloped_blob(format_name: &str, format_version: i32, tree: &Value) -> Vec<u8> {
    let smile = smile_encode(tree);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&CODEC_MAGIC.to_be_bytes());
    bytes.push(format_name.len() as u8);
    bytes.extend_from_slice(format_name.as_bytes());
    bytes.extend_from_slice(&format_version.to_be_bytes());
    bytes.extend_from_slice(&[0x5A; 16]);
    bytes.extend_from_slice(&DEFLATE_MARKER);

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&smile).unwrap();
    bytes.extend_from_slice(&encoder.finish().unwrap());

    bytes.extend_from_slice(&(!CODEC_MAGIC).to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    let crc = crc32fast::hash(&bytes) as u64;
    bytes.extend_from_slice(&crc.to_be_bytes());
    bytes
}

/// An unframed legacy blob: arbitrary prefix bytes, then the bare SMILE
/// payload.
pub fn embedded_blob(prefix: &[u8], tree: &Value) -> Vec<u8> {
    let mut bytes = prefix.to_vec();
    bytes.extend_from_slice(&smile_encode(tree));
    bytes
}

/// Write `bytes` at `path`, creating parent directories.
pub fn write_blob(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

/// A shard manifest tree with the given file list.
pub fn shard_manifest(snapshot_name: &str, files: &[(&str, &str, u64, &str)]) -> Value {
    let files: Vec<Value> = files
        .iter()
        .map(|(name, physical, length, checksum)| {
            serde_json::json!({
                "name": name,
                "physical_name": physical,
                "length": length,
                "checksum": checksum,
                "part_size": 104857600u64,
            })
        })
        .collect();
    let total: u64 = files.iter().map(|f| f["length"].as_u64().unwrap()).sum();
    serde_json::json!({
        "name": snapshot_name,
        "index_version": 7,
        "start_time": 1599999999000i64,
        "time": 12345,
        "number_of_files": files.len(),
        "total_size": total,
        "files": files,
    })
}
