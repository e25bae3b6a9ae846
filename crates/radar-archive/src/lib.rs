//! Radar frame archive readers.
//!
//! Frames are archived one file per timestamp in one of three formats:
//! - ODIM HDF5 composites (`odim` feature)
//! - NumPy `.npz` archives
//! - NumPy `.npy` arrays
//!
//! [`read_frame`] reads any of them and decodes the raw counts into a rain
//! rate grid plus a per-cell out-of-coverage flag.

pub mod decode;
pub mod downsample;
pub mod error;
pub mod npy;
pub mod npz;
#[cfg(feature = "odim")]
pub mod odim;
pub mod reader;

pub use decode::{decode_frame, DecodedFrame};
pub use error::{ArchiveError, ArchiveResult};
pub use npy::{encode_npy_f32, parse_npy, read_npy, write_npy_f32, RawArray};
pub use npz::NpzArchive;
pub use reader::{read_frame, read_raw};
