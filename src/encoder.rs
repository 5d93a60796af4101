//! PlantUML text encoding.
//!
//! The PlantUML server accepts diagram text in the URL path: the UTF-8 source
//! is compressed with raw DEFLATE (no zlib header) and the bytes are written
//! out in 3-byte groups using the alphabet `0-9A-Za-z-_`.

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to compress diagram source: {0}")]
    Compress(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },
    #[error("failed to inflate diagram source: {0}")]
    Inflate(#[from] io::Error),
    #[error("decoded diagram source is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Turns diagram text into the path segment understood by the render server.
pub trait TextEncoder {
    fn encode(&self, text: &str) -> Result<String, EncodeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlantUmlEncoder;

impl TextEncoder for PlantUmlEncoder {
    fn encode(&self, text: &str) -> Result<String, EncodeError> {
        encode(text)
    }
}

pub fn encode(text: &str) -> Result<String, EncodeError> {
    let mut deflater = DeflateEncoder::new(Vec::new(), Compression::best());
    deflater.write_all(text.as_bytes())?;
    let compressed = deflater.finish()?;
    Ok(encode64(&compressed))
}

pub fn decode(encoded: &str) -> Result<String, DecodeError> {
    let compressed = decode64(encoded.trim())?;
    let mut inflater = DeflateDecoder::new(compressed.as_slice());
    let mut raw = Vec::new();
    inflater.read_to_end(&mut raw)?;
    Ok(String::from_utf8(raw)?)
}

fn encode64(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b1 = chunk[0];
        let b2 = chunk.get(1).copied().unwrap_or(0);
        let b3 = chunk.get(2).copied().unwrap_or(0);
        out.push(encode6bit(b1 >> 2));
        out.push(encode6bit(((b1 & 0x3) << 4) | (b2 >> 4)));
        out.push(encode6bit(((b2 & 0xF) << 2) | (b3 >> 6)));
        out.push(encode6bit(b3 & 0x3F));
    }
    out
}

fn decode64(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let mut sextets = Vec::with_capacity(encoded.len());
    for (position, ch) in encoded.chars().enumerate() {
        let value = decode6bit(ch).ok_or(DecodeError::InvalidCharacter { ch, position })?;
        sextets.push(value);
    }

    let mut out = Vec::with_capacity(sextets.len() / 4 * 3);
    for group in sextets.chunks(4) {
        let c1 = group[0];
        let c2 = group.get(1).copied().unwrap_or(0);
        let c3 = group.get(2).copied().unwrap_or(0);
        let c4 = group.get(3).copied().unwrap_or(0);
        out.push((c1 << 2) | (c2 >> 4));
        out.push(((c2 & 0xF) << 4) | (c3 >> 2));
        out.push(((c3 & 0x3) << 6) | c4);
    }
    Ok(out)
}

fn encode6bit(value: u8) -> char {
    let value = value & 0x3F;
    let byte = match value {
        0..=9 => b'0' + value,
        10..=35 => b'A' + (value - 10),
        36..=61 => b'a' + (value - 36),
        62 => b'-',
        _ => b'_',
    };
    byte as char
}

fn decode6bit(ch: char) -> Option<u8> {
    match ch {
        '0'..='9' => Some(ch as u8 - b'0'),
        'A'..='Z' => Some(ch as u8 - b'A' + 10),
        'a'..='z' => Some(ch as u8 - b'a' + 36),
        '-' => Some(62),
        '_' => Some(63),
        _ => None,
    }
}
