//! PNG payload codec.
//!
//! The bridge can wrap any message in a `png` envelope: the JSON text is
//! packed three bytes per pixel into a square-ish RGB image, then
//! PNG-encoded and base64-armored. [`decode`] reverses the wrapping and
//! returns the raw byte payload, including the trailing newline padding
//! (JSON parsing tolerates it). [`encode`] produces a payload the decoder
//! accepts and exists mainly for tests and tooling.
//!
//! The decoder covers the subset of PNG that bridge peers emit: 8-bit
//! depth, grayscale/RGB/alpha color types, no interlacing, all five
//! scanline filters.

use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};

use crate::errors::BridgeError;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn decoding(detail: impl Into<String>) -> BridgeError {
    BridgeError::Decoding {
        detail: detail.into(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Decode a base64-armored PNG payload back into raw bytes.
///
/// Returns the concatenated pixel bytes. Any padding the encoder added to
/// fill the last pixel row is still present at the end of the buffer.
pub fn decode(data: &str) -> Result<Vec<u8>, BridgeError> {
    let png = BASE64
        .decode(data.trim())
        .map_err(|err| decoding(format!("invalid base64 payload: {err}")))?;
    decode_image(&png)
}

struct Header {
    width: usize,
    height: usize,
    channels: usize,
}

impl Header {
    #[allow(clippy::cast_possible_truncation)]
    fn parse(data: &[u8]) -> Result<Self, BridgeError> {
        if data.len() != 13 {
            return Err(decoding("malformed IHDR chunk"));
        }
        let width = read_u32_be(data, 0) as usize;
        let height = read_u32_be(data, 4) as usize;
        let bit_depth = data[8];
        let color_type = data[9];
        let compression = data[10];
        let filter = data[11];
        let interlace = data[12];

        if bit_depth != 8 {
            return Err(decoding(format!("unsupported bit depth {bit_depth}")));
        }
        let channels = match color_type {
            0 => 1,
            2 => 3,
            4 => 2,
            6 => 4,
            other => return Err(decoding(format!("unsupported color type {other}"))),
        };
        if compression != 0 || filter != 0 {
            return Err(decoding("unsupported compression or filter method"));
        }
        if interlace != 0 {
            return Err(decoding("interlaced images are not supported"));
        }
        Ok(Self {
            width,
            height,
            channels,
        })
    }
}

fn decode_image(png: &[u8]) -> Result<Vec<u8>, BridgeError> {
    if png.len() < PNG_SIGNATURE.len() || png[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
        return Err(decoding("not a PNG stream"));
    }

    let mut header: Option<Header> = None;
    let mut compressed = Vec::new();
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= png.len() {
        let len = read_u32_be(png, pos) as usize;
        let kind = &png[pos + 4..pos + 8];
        let data_start = pos + 8;
        let data_end = data_start
            .checked_add(len)
            .ok_or_else(|| decoding("truncated chunk"))?;
        if png.len() < data_end.saturating_add(4) {
            return Err(decoding("truncated chunk"));
        }
        let data = &png[data_start..data_end];
        match kind {
            b"IHDR" => header = Some(Header::parse(data)?),
            b"IDAT" => compressed.extend_from_slice(data),
            b"IEND" => break,
            _ => {}
        }
        pos = data_end + 4;
    }

    let header = header.ok_or_else(|| decoding("missing IHDR chunk"))?;
    if compressed.is_empty() {
        return Err(decoding("missing IDAT data"));
    }

    let mut raw = Vec::new();
    let mut inflater = ZlibDecoder::new(compressed.as_slice());
    let _ = inflater
        .read_to_end(&mut raw)
        .map_err(|err| decoding(format!("inflate failed: {err}")))?;

    unfilter(&header, &raw)
}

/// Reverse the per-scanline filters and return the flat pixel bytes.
#[allow(clippy::cast_possible_truncation)]
fn unfilter(header: &Header, raw: &[u8]) -> Result<Vec<u8>, BridgeError> {
    let bpp = header.channels;
    let stride = header
        .width
        .checked_mul(bpp)
        .ok_or_else(|| decoding("image dimensions overflow"))?;
    let expected = stride
        .checked_add(1)
        .and_then(|line| line.checked_mul(header.height))
        .ok_or_else(|| decoding("image dimensions overflow"))?;
    if raw.len() != expected {
        return Err(decoding(format!(
            "pixel data length mismatch: got {}, want {expected}",
            raw.len()
        )));
    }

    let mut out = vec![0u8; header.height * stride];
    for row in 0..header.height {
        let line_start = row * (stride + 1);
        let filter = raw[line_start];
        let line = &raw[line_start + 1..=line_start + stride];
        let (done, rest) = out.split_at_mut(row * stride);
        let prior: &[u8] = if row == 0 {
            &[]
        } else {
            &done[(row - 1) * stride..]
        };
        let current = &mut rest[..stride];

        match filter {
            0 => current.copy_from_slice(line),
            1 => {
                for i in 0..stride {
                    let left = if i >= bpp { current[i - bpp] } else { 0 };
                    current[i] = line[i].wrapping_add(left);
                }
            }
            2 => {
                for i in 0..stride {
                    let up = prior.get(i).copied().unwrap_or(0);
                    current[i] = line[i].wrapping_add(up);
                }
            }
            3 => {
                for i in 0..stride {
                    let left = if i >= bpp { current[i - bpp] } else { 0 };
                    let up = prior.get(i).copied().unwrap_or(0);
                    let average = ((u16::from(left) + u16::from(up)) / 2) as u8;
                    current[i] = line[i].wrapping_add(average);
                }
            }
            4 => {
                for i in 0..stride {
                    let left = if i >= bpp { current[i - bpp] } else { 0 };
                    let up = prior.get(i).copied().unwrap_or(0);
                    let up_left = if i >= bpp {
                        prior.get(i - bpp).copied().unwrap_or(0)
                    } else {
                        0
                    };
                    current[i] = line[i].wrapping_add(paeth(left, up, up_left));
                }
            }
            other => return Err(decoding(format!("unknown scanline filter {other}"))),
        }
    }
    Ok(out)
}

#[allow(clippy::similar_names)]
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn read_u32_be(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Pack raw bytes into a base64-armored RGB PNG.
///
/// The payload is padded with newlines to fill the last pixel row, matching
/// what bridge servers send. The decoder keeps that padding; JSON consumers
/// treat it as trailing whitespace.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn encode(bytes: &[u8]) -> String {
    let width = (((bytes.len() as f64) / 3.0).sqrt().floor() as usize).max(1);
    let height = ((bytes.len() as f64) / 3.0 / (width as f64)).ceil().max(1.0) as usize;
    let mut padded = bytes.to_vec();
    padded.resize(width * height * 3, b'\n');
    BASE64.encode(encode_image(&padded, width, height))
}

#[allow(clippy::cast_possible_truncation)]
fn encode_image(pixels: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() / 2 + 64);
    out.extend_from_slice(&PNG_SIGNATURE);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr.extend_from_slice(&(height as u32).to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);
    write_chunk(&mut out, b"IHDR", &ihdr);

    let stride = width * 3;
    let mut filtered = Vec::with_capacity(pixels.len() + height);
    for row in pixels.chunks(stride) {
        filtered.push(0);
        filtered.extend_from_slice(row);
    }
    let mut deflater = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writes into a Vec cannot fail.
    let _ = deflater.write_all(&filtered);
    let compressed = deflater.finish().unwrap_or_default();
    write_chunk(&mut out, b"IDAT", &compressed);

    write_chunk(&mut out, b"IEND", &[]);
    out
}

#[allow(clippy::cast_possible_truncation)]
fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
