//! Format dispatch for archived frame files.

use std::path::Path;

use nowcast_common::{DecodeConfig, FrameFormat};
use tracing::{debug, instrument};

use crate::decode::{decode_frame, DecodedFrame};
use crate::error::{ArchiveError, ArchiveResult};
use crate::npy::{read_npy, RawArray};
use crate::npz::NpzArchive;

/// Read the undecoded grid stored in `path`.
pub fn read_raw(path: &Path, format: FrameFormat, config: &DecodeConfig) -> ArchiveResult<RawArray> {
    match format {
        FrameFormat::Npy => read_npy(path),
        FrameFormat::Npz => NpzArchive::open(path)?.read_array(&config.npz_member),
        FrameFormat::OdimH5 => read_odim(path, &config.dataset_path),
    }
}

/// Read and decode one frame file.
#[instrument(skip(config), fields(path = %path.display()))]
pub fn read_frame(
    path: &Path,
    format: FrameFormat,
    config: &DecodeConfig,
    rate_factor: f32,
) -> ArchiveResult<DecodedFrame> {
    let raw = read_raw(path, format, config)?;
    debug!(shape = ?raw.shape, "Read raw frame");
    decode_frame(raw, config, rate_factor)
}

#[cfg(feature = "odim")]
fn read_odim(path: &Path, dataset_path: &str) -> ArchiveResult<RawArray> {
    crate::odim::read_odim(path, dataset_path)
}

#[cfg(not(feature = "odim"))]
fn read_odim(path: &Path, _dataset_path: &str) -> ArchiveResult<RawArray> {
    Err(ArchiveError::Unsupported(format!(
        "{}: ODIM HDF5 support requires the `odim` feature",
        path.display()
    )))
}
