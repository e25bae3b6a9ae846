//! On-disk frame archives for pipeline tests.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use nowcast_common::{
    DecodeConfig, ForecasterKind, FrameFormat, GridShape, NowcastConfig,
};
use tempfile::TempDir;

use crate::npy::npy_f32_bytes;
use crate::npz::NpzBuilder;

/// Raw-count scale under which a stored value equals its rate in mm/h at
/// 5-minute steps.
pub const IDENTITY_DEPTH_SCALE: f32 = 1.0 / 12.0;

/// A temporary frame archive laid out with a strftime file naming pattern.
pub struct ArchiveFixture {
    dir: TempDir,
    pattern: String,
}

impl ArchiveFixture {
    /// `pattern` decides the format through its extension (`.npy` / `.npz`).
    pub fn new(pattern: &str) -> Self {
        let dir = crate::temp_test_dir_with_prefix("radar_archive_");
        Self {
            dir,
            pattern: pattern.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    pub fn path_for(&self, ts: DateTime<Utc>) -> PathBuf {
        self.dir.path().join(ts.format(&self.pattern).to_string())
    }

    /// Write one frame, picking the container from the pattern extension.
    pub fn write_frame(&self, ts: DateTime<Utc>, shape: GridShape, data: &[f32]) -> PathBuf {
        let path = self.path_for(ts);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        let npy = npy_f32_bytes(&[shape.rows, shape.cols], data);
        let bytes = match FrameFormat::from_path(&path) {
            Some(FrameFormat::Npz) => NpzBuilder::new()
                .zip64_extras(true)
                .deflated("arr_0.npy", &npy)
                .build(),
            _ => npy,
        };
        std::fs::write(&path, bytes).expect("write fixture frame");
        path
    }

    /// Write `count` consecutive frames ending at `last`, oldest first.
    ///
    /// `field(i)` produces frame `i` (0 = oldest).
    pub fn write_sequence<F>(
        &self,
        last: DateTime<Utc>,
        step_minutes: i64,
        count: usize,
        shape: GridShape,
        field: F,
    ) -> Vec<PathBuf>
    where
        F: Fn(usize) -> Vec<f32>,
    {
        (0..count)
            .map(|i| {
                let back = (count - 1 - i) as i64 * step_minutes;
                let ts = last - Duration::minutes(back);
                self.write_frame(ts, shape, &field(i))
            })
            .collect()
    }

    /// A valid config reading this archive with identity decode and the
    /// persistence forecaster, writing artifacts under [`Self::output_dir`].
    pub fn config(&self, grid: GridShape, model_input: GridShape) -> NowcastConfig {
        let format = FrameFormat::from_path(Path::new(&self.pattern)).unwrap_or(FrameFormat::Npy);

        let mut config = NowcastConfig {
            grid,
            model_input,
            ..NowcastConfig::default()
        };
        config.archive.root = self.root().to_path_buf();
        config.archive.filename_pattern = self.pattern.clone();
        config.archive.format = format;
        config.archive.decode = Some(DecodeConfig {
            depth_scale_mm: IDENTITY_DEPTH_SCALE,
            downsample: 1,
            ..DecodeConfig::for_format(format)
        });
        config.forecaster.kind = ForecasterKind::Persistence;
        config.output.dir = self.output_dir();
        config.output.lock_retry_delay_ms = 10;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sequence_paths_follow_pattern() {
        let fixture = ArchiveFixture::new("%Y%m%d%H%M.npz");
        let last = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let shape = GridShape::new(2, 2);

        let paths = fixture.write_sequence(last, 5, 3, shape, |i| vec![i as f32; 4]);
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["202405011150.npz", "202405011155.npz", "202405011200.npz"]
        );
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_fixture_config_is_valid() {
        let fixture = ArchiveFixture::new("%Y_%m_%d_%H_%M.npy");
        let config = fixture.config(GridShape::new(8, 8), GridShape::new(8, 8));
        config.validate().unwrap();
        assert_eq!(config.archive.format, FrameFormat::Npy);
    }
}
