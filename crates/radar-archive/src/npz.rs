//! NumPy `.npz` archives.
//!
//! An `.npz` file is a zip archive whose members are `.npy` payloads. Only
//! what `numpy.savez` / `numpy.savez_compressed` produce is handled: stored
//! or deflated members, optional zip64 records, single disk.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use bytes::Bytes;
use flate2::read::DeflateDecoder;
use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};
use crate::npy::{parse_npy, RawArray};

const EOCD_SIG: u32 = 0x0605_4b50;
const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;
const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
const CENTRAL_SIG: u32 = 0x0201_4b50;
const LOCAL_SIG: u32 = 0x0403_4b50;

const ZIP64_EXTRA_ID: u16 = 0x0001;

const EOCD_LEN: usize = 22;
const MAX_COMMENT: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Stored,
    Deflated,
}

#[derive(Debug, Clone)]
struct Entry {
    method: Method,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
}

/// An in-memory `.npz` archive.
#[derive(Debug, Clone)]
pub struct NpzArchive {
    data: Bytes,
    names: Vec<String>,
    entries: HashMap<String, Entry>,
}

impl NpzArchive {
    /// Read an archive from disk.
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(Bytes::from(data))
    }

    /// Index an archive held in memory.
    pub fn from_bytes(data: Bytes) -> ArchiveResult<Self> {
        let eocd = find_eocd(&data)?;
        let (count, cd_offset) = central_directory_location(&data, eocd)?;

        let mut names = Vec::with_capacity(count);
        let mut entries = HashMap::with_capacity(count);
        let mut pos = to_usize(cd_offset)?;

        for _ in 0..count {
            if le_u32(&data, pos)? != CENTRAL_SIG {
                return Err(ArchiveError::invalid(format!(
                    "bad central directory signature at offset {}",
                    pos
                )));
            }
            let method = match le_u16(&data, pos + 10)? {
                0 => Method::Stored,
                8 => Method::Deflated,
                m => {
                    return Err(ArchiveError::Unsupported(format!(
                        "zip compression method {}",
                        m
                    )))
                }
            };
            let crc32 = le_u32(&data, pos + 16)?;
            let mut compressed_size = le_u32(&data, pos + 20)? as u64;
            let mut uncompressed_size = le_u32(&data, pos + 24)? as u64;
            let name_len = le_u16(&data, pos + 28)? as usize;
            let extra_len = le_u16(&data, pos + 30)? as usize;
            let comment_len = le_u16(&data, pos + 32)? as usize;
            let mut local_header_offset = le_u32(&data, pos + 42)? as u64;

            let name_start = pos + 46;
            let name = slice(&data, name_start, name_len)?;
            let name = String::from_utf8_lossy(name).into_owned();

            let extra = slice(&data, name_start + name_len, extra_len)?;
            apply_zip64_extra(
                extra,
                &mut uncompressed_size,
                &mut compressed_size,
                &mut local_header_offset,
            )?;

            names.push(name.clone());
            entries.insert(
                name,
                Entry {
                    method,
                    crc32,
                    compressed_size,
                    uncompressed_size,
                    local_header_offset,
                },
            );

            pos = name_start + name_len + extra_len + comment_len;
        }

        debug!(members = names.len(), "Indexed npz archive");

        Ok(Self {
            data,
            names,
            entries,
        })
    }

    /// Member names in central-directory order.
    pub fn member_names(&self) -> &[String] {
        &self.names
    }

    /// Raw (decompressed) bytes of a member.
    pub fn read_member(&self, name: &str) -> ArchiveResult<Bytes> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ArchiveError::missing(format!("npz member '{}'", name)))?;

        let local = to_usize(entry.local_header_offset)?;
        if le_u32(&self.data, local)? != LOCAL_SIG {
            return Err(ArchiveError::invalid(format!(
                "bad local header signature for '{}'",
                name
            )));
        }
        // Local header sizes may be placeholders; the central directory is authoritative.
        let name_len = le_u16(&self.data, local + 26)? as usize;
        let extra_len = le_u16(&self.data, local + 28)? as usize;
        let start = local + 30 + name_len + extra_len;
        let compressed = slice(&self.data, start, to_usize(entry.compressed_size)?)?;

        let content = match entry.method {
            Method::Stored => self.data.slice(start..start + compressed.len()),
            Method::Deflated => {
                let mut out = Vec::with_capacity(to_usize(entry.uncompressed_size)?);
                DeflateDecoder::new(compressed)
                    .read_to_end(&mut out)
                    .map_err(|e| {
                        ArchiveError::invalid(format!("inflate of '{}' failed: {}", name, e))
                    })?;
                Bytes::from(out)
            }
        };

        if content.len() as u64 != entry.uncompressed_size {
            return Err(ArchiveError::invalid(format!(
                "member '{}' inflated to {} bytes, expected {}",
                name,
                content.len(),
                entry.uncompressed_size
            )));
        }
        let crc = crc32fast::hash(&content);
        if crc != entry.crc32 {
            return Err(ArchiveError::invalid(format!(
                "CRC mismatch for '{}': {:08x} != {:08x}",
                name, crc, entry.crc32
            )));
        }

        Ok(content)
    }

    /// Decode a member as an array. `name` may omit the `.npy` suffix.
    pub fn read_array(&self, name: &str) -> ArchiveResult<RawArray> {
        let key = if self.entries.contains_key(name) {
            name.to_string()
        } else {
            format!("{}.npy", name)
        };
        let bytes = self.read_member(&key)?;
        parse_npy(&bytes)
    }
}

/// Offset of the end-of-central-directory record.
fn find_eocd(data: &[u8]) -> ArchiveResult<usize> {
    if data.len() < EOCD_LEN {
        return Err(ArchiveError::invalid("file too small to be a zip archive"));
    }
    let lowest = data.len().saturating_sub(EOCD_LEN + MAX_COMMENT);
    (lowest..=data.len() - EOCD_LEN)
        .rev()
        .find(|&pos| le_u32(data, pos).map(|s| s == EOCD_SIG).unwrap_or(false))
        .ok_or_else(|| ArchiveError::invalid("end of central directory not found"))
}

/// Entry count and central directory offset, following zip64 records when present.
fn central_directory_location(data: &[u8], eocd: usize) -> ArchiveResult<(usize, u64)> {
    let count = le_u16(data, eocd + 10)?;
    let offset = le_u32(data, eocd + 16)?;

    if count != u16::MAX && offset != u32::MAX {
        return Ok((count as usize, offset as u64));
    }

    let locator = eocd
        .checked_sub(20)
        .ok_or_else(|| ArchiveError::invalid("missing zip64 locator"))?;
    if le_u32(data, locator)? != ZIP64_LOCATOR_SIG {
        return Err(ArchiveError::invalid("missing zip64 locator"));
    }
    let record = to_usize(le_u64(data, locator + 8)?)?;
    if le_u32(data, record)? != ZIP64_EOCD_SIG {
        return Err(ArchiveError::invalid("bad zip64 end of central directory"));
    }
    let count = to_usize(le_u64(data, record + 32)?)?;
    let offset = le_u64(data, record + 48)?;
    Ok((count, offset))
}

/// Replace saturated 32-bit fields with their zip64 extra values.
fn apply_zip64_extra(
    extra: &[u8],
    uncompressed: &mut u64,
    compressed: &mut u64,
    offset: &mut u64,
) -> ArchiveResult<()> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let id = le_u16(extra, pos)?;
        let len = le_u16(extra, pos + 2)? as usize;
        if id == ZIP64_EXTRA_ID {
            let mut field = pos + 4;
            for value in [uncompressed, compressed, offset] {
                if *value == u32::MAX as u64 {
                    *value = le_u64(extra, field)?;
                    field += 8;
                }
            }
            return Ok(());
        }
        pos += 4 + len;
    }
    Ok(())
}

fn slice(data: &[u8], start: usize, len: usize) -> ArchiveResult<&[u8]> {
    data.get(start..start + len)
        .ok_or_else(|| ArchiveError::invalid("unexpected end of zip data"))
}

fn le_u16(data: &[u8], pos: usize) -> ArchiveResult<u16> {
    let b = slice(data, pos, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn le_u32(data: &[u8], pos: usize) -> ArchiveResult<u32> {
    let b = slice(data, pos, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn le_u64(data: &[u8], pos: usize) -> ArchiveResult<u64> {
    let b = slice(data, pos, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(b);
    Ok(u64::from_le_bytes(buf))
}

fn to_usize(v: u64) -> ArchiveResult<usize> {
    usize::try_from(v).map_err(|_| ArchiveError::invalid("zip offset exceeds address space"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::npy::npy_f32_bytes;
    use test_utils::npz::NpzBuilder;

    #[test]
    fn test_read_stored_member() {
        let npy = npy_f32_bytes(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let zip = NpzBuilder::new().stored("arr_0.npy", &npy).build();

        let archive = NpzArchive::from_bytes(Bytes::from(zip)).unwrap();
        assert_eq!(archive.member_names(), &["arr_0.npy".to_string()]);
        assert_eq!(archive.read_member("arr_0.npy").unwrap().as_ref(), &npy[..]);

        let array = archive.read_array("arr_0").unwrap();
        assert_eq!(array.shape, vec![2, 2]);
        assert_eq!(array.data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_read_deflated_member_with_zip64_extras() {
        let values: Vec<f32> = (0..64).map(|i| (i % 7) as f32).collect();
        let npy = npy_f32_bytes(&[8, 8], &values);
        let zip = NpzBuilder::new()
            .zip64_extras(true)
            .deflated("arr_0.npy", &npy)
            .stored("other.npy", &npy_f32_bytes(&[1], &[9.0]))
            .build();

        let archive = NpzArchive::from_bytes(Bytes::from(zip)).unwrap();
        assert_eq!(archive.member_names().len(), 2);
        let array = archive.read_array("arr_0").unwrap();
        assert_eq!(array.data, values);
        assert_eq!(archive.read_array("other").unwrap().data, vec![9.0]);
    }

    #[test]
    fn test_missing_member() {
        let zip = NpzBuilder::new()
            .stored("arr_0.npy", &npy_f32_bytes(&[1], &[0.0]))
            .build();
        let archive = NpzArchive::from_bytes(Bytes::from(zip)).unwrap();
        assert!(matches!(
            archive.read_array("precip"),
            Err(ArchiveError::MissingData(_))
        ));
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let npy = npy_f32_bytes(&[2], &[1.0, 2.0]);
        let mut zip = NpzBuilder::new().stored("arr_0.npy", &npy).build();

        // Flip the last payload byte; local header is 30 bytes + name.
        let payload_end = 30 + "arr_0.npy".len() + npy.len();
        zip[payload_end - 1] ^= 0xFF;

        let archive = NpzArchive::from_bytes(Bytes::from(zip)).unwrap();
        assert!(matches!(
            archive.read_member("arr_0.npy"),
            Err(ArchiveError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(NpzArchive::from_bytes(Bytes::from_static(b"definitely not a zip archive")).is_err());
    }
}
