//! Minimal zip writer producing `.npz` archives.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

const LOCAL_SIG: u32 = 0x0403_4b50;
const CENTRAL_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;
const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;

/// DOS date for 1980-01-01.
const DOS_EPOCH_DATE: u16 = 0x21;

struct Member {
    name: String,
    content: Vec<u8>,
    deflate: bool,
}

/// Builds an in-memory zip archive of `.npy` members.
///
/// With [`NpzBuilder::zip64_extras`] every size field is routed through zip64
/// extra fields and a zip64 end record, as `numpy.savez_compressed` does.
#[derive(Default)]
pub struct NpzBuilder {
    members: Vec<Member>,
    zip64: bool,
}

impl NpzBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zip64_extras(mut self, enabled: bool) -> Self {
        self.zip64 = enabled;
        self
    }

    pub fn stored(mut self, name: &str, content: &[u8]) -> Self {
        self.members.push(Member {
            name: name.to_string(),
            content: content.to_vec(),
            deflate: false,
        });
        self
    }

    pub fn deflated(mut self, name: &str, content: &[u8]) -> Self {
        self.members.push(Member {
            name: name.to_string(),
            content: content.to_vec(),
            deflate: true,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();
        let version: u16 = if self.zip64 { 45 } else { 20 };

        for member in &self.members {
            let crc = crc32fast::hash(&member.content);
            let (method, data) = if member.deflate {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&member.content).expect("deflate");
                (8u16, encoder.finish().expect("deflate"))
            } else {
                (0u16, member.content.clone())
            };

            let (size32_c, size32_u, extra) = if self.zip64 {
                let mut extra = Vec::new();
                put_u16(&mut extra, 0x0001);
                put_u16(&mut extra, 16);
                put_u64(&mut extra, member.content.len() as u64);
                put_u64(&mut extra, data.len() as u64);
                (u32::MAX, u32::MAX, extra)
            } else {
                (data.len() as u32, member.content.len() as u32, Vec::new())
            };

            let local_offset = out.len() as u32;

            put_u32(&mut out, LOCAL_SIG);
            put_u16(&mut out, version);
            put_u16(&mut out, 0);
            put_u16(&mut out, method);
            put_u16(&mut out, 0);
            put_u16(&mut out, DOS_EPOCH_DATE);
            put_u32(&mut out, crc);
            put_u32(&mut out, size32_c);
            put_u32(&mut out, size32_u);
            put_u16(&mut out, member.name.len() as u16);
            put_u16(&mut out, extra.len() as u16);
            out.extend_from_slice(member.name.as_bytes());
            out.extend_from_slice(&extra);
            out.extend_from_slice(&data);

            put_u32(&mut central, CENTRAL_SIG);
            put_u16(&mut central, version);
            put_u16(&mut central, version);
            put_u16(&mut central, 0);
            put_u16(&mut central, method);
            put_u16(&mut central, 0);
            put_u16(&mut central, DOS_EPOCH_DATE);
            put_u32(&mut central, crc);
            put_u32(&mut central, size32_c);
            put_u32(&mut central, size32_u);
            put_u16(&mut central, member.name.len() as u16);
            put_u16(&mut central, extra.len() as u16);
            put_u16(&mut central, 0); // comment
            put_u16(&mut central, 0); // disk start
            put_u16(&mut central, 0); // internal attrs
            put_u32(&mut central, 0); // external attrs
            put_u32(&mut central, local_offset);
            central.extend_from_slice(member.name.as_bytes());
            central.extend_from_slice(&extra);
        }

        let cd_offset = out.len();
        let cd_size = central.len();
        let count = self.members.len();
        out.extend_from_slice(&central);

        if self.zip64 {
            let record_offset = out.len() as u64;
            put_u32(&mut out, ZIP64_EOCD_SIG);
            put_u64(&mut out, 44);
            put_u16(&mut out, 45);
            put_u16(&mut out, 45);
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
            put_u64(&mut out, count as u64);
            put_u64(&mut out, count as u64);
            put_u64(&mut out, cd_size as u64);
            put_u64(&mut out, cd_offset as u64);

            put_u32(&mut out, ZIP64_LOCATOR_SIG);
            put_u32(&mut out, 0);
            put_u64(&mut out, record_offset);
            put_u32(&mut out, 1);
        }

        let (count16, size32, offset32) = if self.zip64 {
            (u16::MAX, u32::MAX, u32::MAX)
        } else {
            (count as u16, cd_size as u32, cd_offset as u32)
        };
        put_u32(&mut out, EOCD_SIG);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        put_u16(&mut out, count16);
        put_u16(&mut out, count16);
        put_u32(&mut out, size32);
        put_u32(&mut out, offset32);
        put_u16(&mut out, 0);

        out
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_ends_with_eocd() {
        let zip = NpzBuilder::new().stored("a.npy", b"abc").build();
        let eocd = zip.len() - 22;
        assert_eq!(&zip[eocd..eocd + 4], &EOCD_SIG.to_le_bytes());
        assert_eq!(&zip[0..4], &LOCAL_SIG.to_le_bytes());
    }
}
