//! ODIM HDF5 composite reader.
//!
//! Composites keep the rain-depth grid at a nested group path such as
//! `dataset1/data1/data`. libnetcdf opens plain HDF5 files, so the path is
//! walked group by group and the final component read as a variable.

use std::path::Path;
use std::sync::Once;

use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};
use crate::npy::RawArray;

/// Silence HDF5's automatic error printing.
///
/// Looking up optional groups makes libhdf5 dump diagnostic stacks to stderr
/// even though the error is handled. Safe to call repeatedly.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 with null handlers only disables printing.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Read the dataset at `dataset_path` (slash separated) as `f32`.
pub fn read_odim(path: &Path, dataset_path: &str) -> ArchiveResult<RawArray> {
    silence_hdf5_errors();

    let parts: Vec<&str> = dataset_path.split('/').filter(|p| !p.is_empty()).collect();
    let (var_name, groups) = parts
        .split_last()
        .ok_or_else(|| ArchiveError::invalid("empty ODIM dataset path"))?;

    let file = netcdf::open(path)
        .map_err(|e| ArchiveError::invalid(format!("Failed to open HDF5 {}: {}", path.display(), e)))?;

    let array = match groups.split_first() {
        None => {
            let var = file
                .variable(var_name)
                .ok_or_else(|| ArchiveError::missing(format!("variable '{}'", var_name)))?;
            read_variable(&var)?
        }
        Some((first, rest)) => {
            let group = file
                .group(first)
                .map_err(|e| ArchiveError::invalid(format!("group '{}': {}", first, e)))?
                .ok_or_else(|| ArchiveError::missing(format!("group '{}'", first)))?;
            read_in_group(&group, rest, var_name)?
        }
    };

    debug!(
        path = %path.display(),
        dataset = dataset_path,
        shape = ?array.shape,
        "Read ODIM dataset"
    );
    Ok(array)
}

fn read_in_group(
    group: &netcdf::Group<'_>,
    groups: &[&str],
    var_name: &str,
) -> ArchiveResult<RawArray> {
    match groups.split_first() {
        None => {
            let var = group
                .variable(var_name)
                .ok_or_else(|| ArchiveError::missing(format!("variable '{}'", var_name)))?;
            read_variable(&var)
        }
        Some((head, rest)) => {
            let child = group
                .group(head)
                .ok_or_else(|| ArchiveError::missing(format!("group '{}'", head)))?;
            read_in_group(&child, rest, var_name)
        }
    }
}

fn read_variable(var: &netcdf::Variable<'_>) -> ArchiveResult<RawArray> {
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    // libnetcdf converts the stored integer type to float on read
    let values: Vec<f32> = var
        .get_values(..)
        .map_err(|e| ArchiveError::invalid(format!("Failed to read '{}': {}", var.name(), e)))?;
    RawArray::new(shape, values)
}
