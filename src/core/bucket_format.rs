//! Binary layout of bucket files.
//!
//! A bucket file is a plain concatenation of records, one per directory:
//!
//! ```text
//! [path_len: u32][payload_len: u32][path: path_len UTF-16 units][payload: payload_len bytes]
//! ```
//!
//! and each payload is
//!
//! ```text
//! [entry_count: u32] then entry_count x [name_len: u32][name: name_len UTF-16 units][status_code: u32]
//! ```
//!
//! All integers and UTF-16 code units are big-endian. The layout must stay
//! bit-exact so caches survive process restarts.

use crate::core::status::StatusRecord;
use std::collections::HashMap;
use std::io::{self, Read};

/// Number of distinct hash slots directories are spread across.
pub const BUCKET_SLOTS: i32 = 173;

/// Suffix of committed bucket files.
pub const BUCKET_EXTENSION: &str = "bin";

/// Suffix appended to a bucket file name while it is being rewritten.
pub const TEMP_SUFFIX: &str = ".new";

/// Java-compatible `String.hashCode()` over UTF-16 code units.
pub fn string_hash(key: &str) -> i32 {
    key.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Bucket a directory key lands in, in `0..=344`.
///
/// The remainder keeps the sign of the hash, so negative hashes fill the
/// lower half of the range.
pub fn bucket_id(key: &str) -> i32 {
    string_hash(key) % BUCKET_SLOTS + (BUCKET_SLOTS - 1)
}

/// File name of a bucket: `<id>.bin`.
pub fn bucket_file_name(id: i32) -> String {
    let mut buffer = itoa::Buffer::new();
    format!("{}.{}", buffer.format(id), BUCKET_EXTENSION)
}

/// Parse a bucket id back out of a file name, ignoring anything else in the cache root.
pub fn parse_bucket_file_name(name: &str) -> Option<i32> {
    let stem = name.strip_suffix(BUCKET_EXTENSION)?.strip_suffix('.')?;
    stem.parse().ok()
}

/// Record header: lengths of the path (in UTF-16 units) and of the payload (in bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub path_len: u32,
    pub payload_len: u32,
}

impl RecordHeader {
    pub const SIZE: usize = 8;

    pub fn path_bytes(&self) -> u64 {
        u64::from(self.path_len) * 2
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&self.path_len.to_be_bytes());
        out[4..].copy_from_slice(&self.payload_len.to_be_bytes());
        out
    }
}

/// Number of UTF-16 code units in `key`.
pub fn utf16_len(key: &str) -> usize {
    key.encode_utf16().count()
}

pub fn encode_utf16(value: &str, out: &mut Vec<u8>) {
    for unit in value.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
}

pub fn decode_utf16(bytes: &[u8]) -> io::Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(invalid_data("odd number of bytes in UTF-16 string"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| invalid_data("invalid UTF-16 string"))
}

/// Serialize a directory's entries into a payload.
pub fn encode_payload<'a, I>(entries: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a String, &'a StatusRecord)>,
{
    let mut body = Vec::new();
    let mut count: u32 = 0;
    for (name, record) in entries {
        body.extend_from_slice(&(utf16_len(name) as u32).to_be_bytes());
        encode_utf16(name, &mut body);
        body.extend_from_slice(&record.to_code().to_be_bytes());
        count += 1;
    }

    let mut payload = Vec::with_capacity(body.len() + 4);
    payload.extend_from_slice(&count.to_be_bytes());
    payload.extend_from_slice(&body);
    payload
}

pub fn decode_payload(payload: &[u8]) -> io::Result<HashMap<String, StatusRecord>> {
    let mut reader = payload;
    let count = read_u32(&mut reader)?;
    let mut entries = HashMap::new();
    for _ in 0..count {
        let name_len = read_u32(&mut reader)? as usize;
        let name_bytes = name_len
            .checked_mul(2)
            .filter(|len| *len <= reader.len())
            .ok_or_else(|| truncated("entry name runs past the payload"))?;
        let name = decode_utf16(&reader[..name_bytes])?;
        reader = &reader[name_bytes..];
        let code = read_u32(&mut reader)?;
        entries.insert(name, StatusRecord::from_code(code));
    }
    Ok(entries)
}

/// Encode one complete record, header included.
pub fn encode_record<'a, I>(key: &str, entries: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a String, &'a StatusRecord)>,
{
    let payload = encode_payload(entries);
    let header = RecordHeader {
        path_len: utf16_len(key) as u32,
        payload_len: payload.len() as u32,
    };

    let mut out = Vec::with_capacity(RecordHeader::SIZE + header.path_bytes() as usize + payload.len());
    out.extend_from_slice(&header.to_bytes());
    encode_utf16(key, &mut out);
    out.extend_from_slice(&payload);
    out
}

/// Read the next record header.
///
/// `Ok(None)` means a clean end of file on a record boundary; a header cut
/// short is an `UnexpectedEof` error.
pub fn read_header<R: Read>(reader: &mut R) -> io::Result<Option<RecordHeader>> {
    let mut buf = [0u8; RecordHeader::SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    match filled {
        0 => Ok(None),
        RecordHeader::SIZE => Ok(Some(RecordHeader {
            path_len: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            payload_len: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })),
        _ => Err(truncated("record header cut short")),
    }
}

/// Read exactly `len` bytes without trusting `len` for the allocation size.
pub fn read_bytes<R: Read>(reader: &mut R, len: u64) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut out)?;
    if out.len() as u64 != len {
        return Err(truncated("record body cut short"));
    }
    Ok(out)
}

/// Skip `len` bytes, failing if the file ends first.
pub fn skip_bytes<R: Read>(reader: &mut R, len: u64) -> io::Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
    if skipped != len {
        return Err(truncated("record body cut short"));
    }
    Ok(())
}

fn read_u32(reader: &mut &[u8]) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|_| truncated("integer cut short"))?;
    Ok(u32::from_be_bytes(buf))
}

fn truncated(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, reason.to_string())
}

fn invalid_data(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.to_string())
}
