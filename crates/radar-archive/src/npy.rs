//! NumPy `.npy` array files.
//!
//! Reads any C-ordered numeric array (1-8 byte integers, 32/64-bit floats,
//! either endianness) into `f32`, and writes `float32` arrays.
//!
//! Layout (format versions 1.0, 2.0 and 3.0):
//!
//! ```text
//! \x93NUMPY | major | minor | header_len (u16 LE, u32 LE for v2+) | header dict | data
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{ArchiveError, ArchiveResult};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Header + data are padded so the data starts on this boundary.
const HEADER_ALIGN: usize = 64;

/// A decoded n-dimensional array, values widened/narrowed to `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArray {
    pub shape: Vec<usize>,
    /// Row-major values.
    pub data: Vec<f32>,
}

impl RawArray {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> ArchiveResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ArchiveError::invalid(format!(
                "array shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Shape with all unit axes removed.
    pub fn squeezed_shape(&self) -> Vec<usize> {
        self.shape.iter().copied().filter(|&d| d != 1).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Signed,
    Unsigned,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    kind: Kind,
    size: usize,
    big_endian: bool,
}

impl Dtype {
    fn parse(descr: &str) -> ArchiveResult<Self> {
        let mut chars = descr.chars();
        let order = chars
            .next()
            .ok_or_else(|| ArchiveError::invalid("empty dtype descriptor"))?;
        let big_endian = match order {
            '>' => true,
            '<' | '|' | '=' => false,
            _ => return Err(ArchiveError::invalid(format!("unknown byte order in {}", descr))),
        };
        let kind = match chars.next() {
            Some('f') => Kind::Float,
            Some('i') => Kind::Signed,
            Some('u') => Kind::Unsigned,
            Some('b') => Kind::Bool,
            _ => {
                return Err(ArchiveError::Unsupported(format!(
                    "dtype {} is not numeric",
                    descr
                )))
            }
        };
        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| ArchiveError::invalid(format!("bad dtype size in {}", descr)))?;

        let supported = match kind {
            Kind::Float => matches!(size, 4 | 8),
            Kind::Signed | Kind::Unsigned => matches!(size, 1 | 2 | 4 | 8),
            Kind::Bool => size == 1,
        };
        if !supported {
            return Err(ArchiveError::Unsupported(format!("dtype {}", descr)));
        }

        Ok(Self {
            kind,
            size,
            big_endian,
        })
    }

    fn decode(&self, bytes: &[u8]) -> f32 {
        let mut buf = [0u8; 8];
        buf[..self.size].copy_from_slice(bytes);
        if self.big_endian {
            buf[..self.size].reverse();
        }
        match (self.kind, self.size) {
            (Kind::Float, 4) => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            (Kind::Float, _) => f64::from_le_bytes(buf) as f32,
            (Kind::Signed, 1) => buf[0] as i8 as f32,
            (Kind::Signed, 2) => i16::from_le_bytes([buf[0], buf[1]]) as f32,
            (Kind::Signed, 4) => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f32,
            (Kind::Signed, _) => i64::from_le_bytes(buf) as f32,
            (Kind::Unsigned, 1) | (Kind::Bool, _) => buf[0] as f32,
            (Kind::Unsigned, 2) => u16::from_le_bytes([buf[0], buf[1]]) as f32,
            (Kind::Unsigned, 4) => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f32,
            (Kind::Unsigned, _) => u64::from_le_bytes(buf) as f32,
        }
    }
}

/// Parse a complete `.npy` payload.
pub fn parse_npy(data: &[u8]) -> ArchiveResult<RawArray> {
    if data.len() < 10 || &data[0..6] != MAGIC {
        return Err(ArchiveError::invalid("Invalid NPY magic bytes"));
    }

    let major = data[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        2 | 3 => {
            if data.len() < 12 {
                return Err(ArchiveError::invalid("Truncated NPY preamble"));
            }
            (
                u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
                12,
            )
        }
        v => {
            return Err(ArchiveError::Unsupported(format!(
                "NPY format version {}",
                v
            )))
        }
    };

    let data_start = header_start + header_len;
    if data.len() < data_start {
        return Err(ArchiveError::invalid("Truncated NPY header"));
    }
    let header = std::str::from_utf8(&data[header_start..data_start])
        .map_err(|_| ArchiveError::invalid("NPY header is not valid text"))?;

    let descr = dict_value(header, "descr")
        .and_then(quoted)
        .ok_or_else(|| ArchiveError::missing("NPY header 'descr'"))?;
    let dtype = Dtype::parse(descr)?;

    let fortran = dict_value(header, "fortran_order")
        .ok_or_else(|| ArchiveError::missing("NPY header 'fortran_order'"))?;
    if fortran.starts_with("True") {
        return Err(ArchiveError::Unsupported(
            "Fortran-ordered NPY arrays".to_string(),
        ));
    }

    let shape = dict_value(header, "shape")
        .and_then(parse_shape)
        .ok_or_else(|| ArchiveError::missing("NPY header 'shape'"))?;

    let count: usize = shape.iter().product();
    let payload = &data[data_start..];
    let needed = count * dtype.size;
    if payload.len() < needed {
        return Err(ArchiveError::invalid(format!(
            "NPY payload has {} bytes, shape {:?} needs {}",
            payload.len(),
            shape,
            needed
        )));
    }

    let values = payload[..needed]
        .chunks_exact(dtype.size)
        .map(|chunk| dtype.decode(chunk))
        .collect();

    Ok(RawArray {
        shape,
        data: values,
    })
}

/// Read a `.npy` file from disk.
pub fn read_npy(path: &Path) -> ArchiveResult<RawArray> {
    let bytes = std::fs::read(path)?;
    parse_npy(&bytes)
}

/// Encode a `float32` array as a version 1.0 `.npy` payload.
pub fn encode_npy_f32(shape: &[usize], data: &[f32]) -> ArchiveResult<Vec<u8>> {
    let expected: usize = shape.iter().product();
    if data.len() != expected {
        return Err(ArchiveError::invalid(format!(
            "Data length mismatch: got {}, expected {} for shape {:?}",
            data.len(),
            expected,
            shape
        )));
    }

    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_str = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let header_dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape_str
    );

    // Preamble (10 bytes) + dict + newline, padded with spaces
    let unpadded = 10 + header_dict.len() + 1;
    let pad = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    let header = format!("{}{}\n", header_dict, " ".repeat(pad));
    let header_len = u16::try_from(header.len())
        .map_err(|_| ArchiveError::invalid("NPY header too long"))?;

    let mut out = Vec::with_capacity(10 + header.len() + data.len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for value in data {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

/// Write a `float32` array to a `.npy` file.
pub fn write_npy_f32(path: &Path, shape: &[usize], data: &[f32]) -> ArchiveResult<()> {
    let encoded = encode_npy_f32(shape, data)?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, File::create(path)?);
    writer.write_all(&encoded)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Header dictionary helpers
// =============================================================================

/// Text following `'key':` in a Python dict literal.
fn dict_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let quoted_key = format!("'{}'", key);
    let pos = header
        .find(&quoted_key)
        .or_else(|| header.find(&format!("\"{}\"", key)))?;
    let rest = &header[pos + quoted_key.len()..];
    let colon = rest.find(':')?;
    Some(rest[colon + 1..].trim_start())
}

/// Contents of a leading single- or double-quoted string.
fn quoted(value: &str) -> Option<&str> {
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &value[1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}

fn parse_shape(value: &str) -> Option<Vec<usize>> {
    let inner = value.strip_prefix('(')?;
    let end = inner.find(')')?;
    inner[..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handmade(descr: &str, shape: &str, payload: &[u8]) -> Vec<u8> {
        let dict = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}\n",
            descr, shape
        );
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        out.extend_from_slice(dict.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_encoded_header_is_aligned() {
        let bytes = encode_npy_f32(&[3, 2], &[0.0; 6]).unwrap();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % HEADER_ALIGN, 0);
        assert_eq!(bytes.len(), 10 + header_len + 6 * 4);
    }

    #[test]
    fn test_encode_then_parse_preserves_nan() {
        let data = vec![0.0, 1.5, f32::NAN, -2.0];
        let parsed = parse_npy(&encode_npy_f32(&[2, 2], &data).unwrap()).unwrap();
        assert_eq!(parsed.shape, vec![2, 2]);
        assert_eq!(parsed.data[1], 1.5);
        assert!(parsed.data[2].is_nan());
        assert_eq!(parsed.data[3], -2.0);
    }

    #[test]
    fn test_parse_u16_little_endian() {
        let payload: Vec<u8> = [1u16, 65535, 300]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let parsed = parse_npy(&handmade("<u2", "(1, 3)", &payload)).unwrap();
        assert_eq!(parsed.shape, vec![1, 3]);
        assert_eq!(parsed.data, vec![1.0, 65535.0, 300.0]);
        assert_eq!(parsed.squeezed_shape(), vec![3]);
    }

    #[test]
    fn test_parse_big_endian_i16() {
        let payload: Vec<u8> = [-1i16, 42].iter().flat_map(|v| v.to_be_bytes()).collect();
        let parsed = parse_npy(&handmade(">i2", "(2,)", &payload)).unwrap();
        assert_eq!(parsed.data, vec![-1.0, 42.0]);
    }

    #[test]
    fn test_parse_f64() {
        let payload: Vec<u8> = [0.25f64, -9999.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let parsed = parse_npy(&handmade("<f8", "(2,)", &payload)).unwrap();
        assert_eq!(parsed.data, vec![0.25, -9999.0]);
    }

    #[test]
    fn test_reject_fortran_order() {
        let dict = "{'descr': '<f4', 'fortran_order': True, 'shape': (1,), }\n";
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        assert!(matches!(parse_npy(&bytes), Err(ArchiveError::Unsupported(_))));
    }

    #[test]
    fn test_reject_truncated_payload() {
        let bytes = handmade("<f4", "(4,)", &[0u8; 8]);
        assert!(matches!(parse_npy(&bytes), Err(ArchiveError::InvalidFormat(_))));
    }

    #[test]
    fn test_reject_bad_magic() {
        assert!(parse_npy(b"NOTNUMPY0000").is_err());
    }

    #[test]
    fn test_encode_length_mismatch() {
        assert!(encode_npy_f32(&[2, 2], &[1.0]).is_err());
    }
}
