//! Typed configuration for a nowcast deployment.
//!
//! A single [`NowcastConfig`] is built once at process start (defaults, then a
//! YAML file, then `NOWCAST_*` environment overrides) and passed by reference
//! into every pipeline component.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::lock::LockSettings;

/// Placeholders accepted in [`ForecasterConfig::args`].
pub const FORECASTER_PLACEHOLDERS: &[&str] = &["{input}", "{output}", "{run_time}"];

// ============================================================================
// Grid shape
// ============================================================================

/// Spatial shape of a grid, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Which input frame the validity mask is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaskSource {
    /// Most recent input frame (index `H - 1`).
    #[default]
    Latest,
    /// Oldest input frame (index 0).
    Earliest,
}

impl MaskSource {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "latest" | "last" => Some(Self::Latest),
            "earliest" | "first" => Some(Self::Earliest),
            _ => None,
        }
    }
}

/// When a downsampled cell counts as out of coverage, given how many native
/// cells of its block carry the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaskRule {
    /// Every native cell of the block.
    #[default]
    All,
    /// More than half of the block.
    Majority,
    /// At least one native cell.
    Any,
}

impl MaskRule {
    /// Apply the rule to `flagged` sentinel cells out of `total`.
    #[inline]
    pub fn holds(&self, flagged: usize, total: usize) -> bool {
        match self {
            MaskRule::All => flagged == total,
            MaskRule::Majority => 2 * flagged > total,
            MaskRule::Any => flagged > 0,
        }
    }
}

/// On-disk encoding of archived radar frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// ODIM HDF5 national mosaic.
    #[default]
    OdimH5,
    /// NumPy zip archive holding one array member.
    Npz,
    /// Bare NumPy array file.
    Npy,
}

impl FrameFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "h5" | "hdf5" | "hdf" => Some(Self::OdimH5),
            "npz" => Some(Self::Npz),
            "npy" => Some(Self::Npy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OdimH5 => "odim_h5",
            Self::Npz => "npz",
            Self::Npy => "npy",
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How out-of-coverage cells are encoded in raw frame values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sentinel {
    /// A single reserved raw value (65535 in ODIM mosaics).
    Equals { value: f32 },
    /// Any negative raw value.
    Negative,
}

impl Sentinel {
    /// True when a raw value marks a cell outside radar coverage.
    ///
    /// NaN raw values are always treated as out of coverage.
    #[inline]
    pub fn matches(&self, raw: f32) -> bool {
        if raw.is_nan() {
            return true;
        }
        match *self {
            Sentinel::Equals { value } => raw == value,
            Sentinel::Negative => raw < 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForecasterKind {
    /// External model-serving command exchanging `.npy` files.
    #[default]
    Command,
    /// Repeats the most recent input frame over the whole horizon.
    Persistence,
}

// ============================================================================
// Sections
// ============================================================================

/// Per-format decode parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Encoding of out-of-coverage cells.
    pub sentinel: Sentinel,
    /// Cumulated depth, in mm, represented by one raw count.
    pub depth_scale_mm: f32,
    /// Block-mean downsampling factor applied after sentinel handling (1 = native).
    pub downsample: usize,
    /// Coverage rule for downsampled blocks.
    pub mask_rule: MaskRule,
    /// Top-left crop applied after downsampling.
    pub crop: Option<GridShape>,
    /// Dataset path inside ODIM HDF5 files.
    pub dataset_path: String,
    /// Member name inside NPZ archives.
    pub npz_member: String,
}

impl DecodeConfig {
    /// Decode defaults matching each archive flavour.
    pub fn for_format(format: FrameFormat) -> Self {
        let base = Self {
            sentinel: Sentinel::Equals { value: 65535.0 },
            depth_scale_mm: 0.01,
            downsample: 2,
            mask_rule: MaskRule::All,
            crop: None,
            dataset_path: "dataset1/data1/data".to_string(),
            npz_member: "arr_0".to_string(),
        };
        match format {
            FrameFormat::OdimH5 => base,
            FrameFormat::Npz | FrameFormat::Npy => Self {
                sentinel: Sentinel::Negative,
                downsample: 1,
                ..base
            },
        }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self::for_format(FrameFormat::OdimH5)
    }
}

/// Location and naming of the radar frame archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub root: PathBuf,
    /// strftime pattern producing one file name per frame timestamp.
    pub filename_pattern: String,
    pub format: FrameFormat,
    /// Explicit decode parameters; defaults depend on `format` when absent.
    pub decode: Option<DecodeConfig>,
}

impl ArchiveConfig {
    /// Effective decode parameters for this archive.
    pub fn decode(&self) -> DecodeConfig {
        self.decode
            .clone()
            .unwrap_or_else(|| DecodeConfig::for_format(self.format))
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/data/radar"),
            filename_pattern: "%Y_%m_%d_%H_%M.h5".to_string(),
            format: FrameFormat::OdimH5,
            decode: None,
        }
    }
}

/// Forecasting capability selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecasterConfig {
    pub kind: ForecasterKind,
    /// Program launched by the command forecaster.
    pub program: String,
    /// Arguments; `{input}`, `{output}` and `{run_time}` are substituted per call.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub working_dir: Option<PathBuf>,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            kind: ForecasterKind::Command,
            program: "python3".to_string(),
            args: vec![
                "serve_model.py".to_string(),
                "--input".to_string(),
                "{input}".to_string(),
                "--output".to_string(),
                "{output}".to_string(),
            ],
            timeout_secs: 600,
            working_dir: None,
        }
    }
}

/// Where run artifacts are written and how the artifact lock behaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub lock_file: String,
    pub lock_retries: u32,
    pub lock_retry_delay_ms: u64,
}

impl OutputConfig {
    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            path: self.dir.join(&self.lock_file),
            retries: self.lock_retries,
            retry_delay: std::time::Duration::from_millis(self.lock_retry_delay_ms),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/data/nowcast/plot"),
            lock_file: "lock_file.txt".to_string(),
            lock_retries: 5,
            lock_retry_delay_ms: 1000,
        }
    }
}

// ============================================================================
// Top-level configuration
// ============================================================================

/// Complete configuration of one nowcast deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NowcastConfig {
    /// Canonical full-grid shape after decode.
    pub grid: GridShape,
    /// Fixed input shape required by the forecasting model.
    pub model_input: GridShape,
    /// Time step between frames.
    pub step_minutes: u32,
    /// Reference times are rounded down to a multiple of this interval.
    pub alignment_minutes: u32,
    /// Number of conditioning frames (H).
    pub input_steps: usize,
    /// Number of predicted frames (P).
    pub prediction_steps: usize,
    /// Width of the overlap band sourced from the earlier-written window.
    pub overlap_px: usize,
    pub mask_source: MaskSource,
    /// Run per-window inference on the rayon pool.
    pub parallel_windows: bool,
    /// Delay subtracted from "now" so the latest frame has been archived.
    pub latency_minutes: u32,
    /// Delay subtracted from "now" for validation runs, so observations exist.
    pub validation_lag_minutes: u32,
    pub archive: ArchiveConfig,
    pub forecaster: ForecasterConfig,
    pub output: OutputConfig,
}

impl Default for NowcastConfig {
    fn default() -> Self {
        Self {
            grid: GridShape::new(1536, 1536),
            model_input: GridShape::new(1536, 1280),
            step_minutes: 5,
            alignment_minutes: 5,
            input_steps: 4,
            prediction_steps: 18,
            overlap_px: 256,
            mask_source: MaskSource::Latest,
            parallel_windows: false,
            latency_minutes: 5,
            validation_lag_minutes: 120,
            archive: ArchiveConfig::default(),
            forecaster: ForecasterConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl NowcastConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` are substituted before parsing, then
    /// `NOWCAST_*` environment overrides are applied and the result validated.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML content (with variable substitution) without env overrides or validation.
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let expanded = expand_env_vars(content)?;
        Ok(serde_yaml::from_str(&expanded)?)
    }

    /// Load configuration from defaults plus environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `NOWCAST_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("NOWCAST_ARCHIVE_ROOT") {
            self.archive.root = PathBuf::from(val);
        }
        if let Some(val) = lookup("NOWCAST_FILENAME_PATTERN") {
            self.archive.filename_pattern = val;
        }
        if let Some(val) = lookup("NOWCAST_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("NOWCAST_STEP_MINUTES") {
            self.step_minutes = parse_number("NOWCAST_STEP_MINUTES", &val)?;
        }
        if let Some(val) = lookup("NOWCAST_ALIGNMENT_MINUTES") {
            self.alignment_minutes = parse_number("NOWCAST_ALIGNMENT_MINUTES", &val)?;
        }
        if let Some(val) = lookup("NOWCAST_OVERLAP_PX") {
            self.overlap_px = parse_number("NOWCAST_OVERLAP_PX", &val)?;
        }
        if let Some(val) = lookup("NOWCAST_MASK_SOURCE") {
            self.mask_source = MaskSource::parse(&val).ok_or_else(|| {
                ConfigError::invalid_value("NOWCAST_MASK_SOURCE", "expected latest or earliest")
            })?;
        }
        if let Some(val) = lookup("NOWCAST_PARALLEL_WINDOWS") {
            self.parallel_windows = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(val) = lookup("NOWCAST_FORECASTER") {
            self.forecaster.kind = match val.to_lowercase().as_str() {
                "command" => ForecasterKind::Command,
                "persistence" => ForecasterKind::Persistence,
                _ => {
                    return Err(ConfigError::invalid_value(
                        "NOWCAST_FORECASTER",
                        "expected command or persistence",
                    ))
                }
            };
        }
        if let Some(val) = lookup("NOWCAST_FORECASTER_PROGRAM") {
            self.forecaster.program = val;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.grid.is_empty() {
            return Err(ConfigError::Invalid("grid shape must be non-empty".into()));
        }
        if self.model_input.is_empty() {
            return Err(ConfigError::Invalid(
                "model_input shape must be non-empty".into(),
            ));
        }
        if self.step_minutes == 0 {
            return Err(ConfigError::Invalid("step_minutes must be > 0".into()));
        }
        if self.alignment_minutes == 0 || self.alignment_minutes % self.step_minutes != 0 {
            return Err(ConfigError::Invalid(format!(
                "alignment_minutes ({}) must be a positive multiple of step_minutes ({})",
                self.alignment_minutes, self.step_minutes
            )));
        }
        if (24 * 60) % self.alignment_minutes != 0 {
            return Err(ConfigError::Invalid(format!(
                "alignment_minutes ({}) must divide a day",
                self.alignment_minutes
            )));
        }
        if self.input_steps == 0 || self.prediction_steps == 0 {
            return Err(ConfigError::Invalid(
                "input_steps and prediction_steps must be > 0".into(),
            ));
        }
        for (axis, length, extent) in [
            ("height", self.grid.rows, self.model_input.rows),
            ("width", self.grid.cols, self.model_input.cols),
        ] {
            if length <= extent {
                continue;
            }
            if self.overlap_px >= extent {
                return Err(ConfigError::Invalid(format!(
                    "overlap_px ({}) must be smaller than the model input {} ({})",
                    self.overlap_px, axis, extent
                )));
            }
            // Three or more windows: a middle window has a band on both sides
            let windows = (length - self.overlap_px).div_ceil(extent - self.overlap_px);
            if windows > 2 && 2 * self.overlap_px >= extent {
                return Err(ConfigError::Invalid(format!(
                    "overlap_px ({}) must be under half the model input {} ({}) when the grid {} ({}) needs more than two windows",
                    self.overlap_px, axis, extent, axis, length
                )));
            }
        }
        if self.archive.filename_pattern.is_empty() {
            return Err(ConfigError::Invalid(
                "archive.filename_pattern must not be empty".into(),
            ));
        }
        let pattern = &self.archive.filename_pattern;
        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::invalid_value(
                "archive.filename_pattern",
                format!("'{}' contains an invalid strftime specifier", pattern),
            ));
        }
        let decode = self.archive.decode();
        if decode.downsample == 0 {
            return Err(ConfigError::Invalid("decode.downsample must be >= 1".into()));
        }
        if decode.depth_scale_mm.is_nan() || decode.depth_scale_mm <= 0.0 {
            return Err(ConfigError::Invalid(
                "decode.depth_scale_mm must be > 0".into(),
            ));
        }
        if self.forecaster.kind == ForecasterKind::Command {
            if self.forecaster.program.is_empty() {
                return Err(ConfigError::Invalid(
                    "forecaster.program must be set for the command forecaster".into(),
                ));
            }
            for arg in &self.forecaster.args {
                if let Some(bad) = unknown_placeholder(arg) {
                    return Err(ConfigError::invalid_value(
                        "forecaster.args",
                        format!("unknown placeholder {}", bad),
                    ));
                }
            }
        }
        if self.output.lock_retries == 0 {
            return Err(ConfigError::Invalid("output.lock_retries must be >= 1".into()));
        }
        Ok(())
    }

    /// True when the grid cannot be fed to the model as a single window.
    pub fn needs_tiling(&self) -> bool {
        self.grid != self.model_input
    }

    /// Factor converting a depth cumulated over one step (mm) to a rate (mm/h).
    pub fn rate_factor(&self) -> f32 {
        60.0 / self.step_minutes as f32
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, val: &str) -> ConfigResult<T> {
    val.trim()
        .parse()
        .map_err(|_| ConfigError::invalid_value(key, format!("not a number: {}", val)))
}

/// Returns the first `{...}` token in `arg` that is not a known placeholder.
fn unknown_placeholder(arg: &str) -> Option<String> {
    let mut rest = arg;
    while let Some(start) = rest.find('{') {
        let tail = &rest[start..];
        let end = tail.find('}')?;
        let token = &tail[..=end];
        if !FORECASTER_PLACEHOLDERS.contains(&token) {
            return Some(token.to_string());
        }
        rest = &tail[end + 1..];
    }
    None
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content.
/// Supports ${VAR} and ${VAR:-default} syntax.
fn expand_env_vars(content: &str) -> ConfigResult<String> {
    let mut result = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => return Err(ConfigError::UnclosedSubstitution(var_expr)),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve variable expression (supports VAR and VAR:-default syntax).
fn resolve_var_expr(expr: &str) -> ConfigResult<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).map_err(|_| ConfigError::MissingVariable(expr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = NowcastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid, GridShape::new(1536, 1536));
        assert_eq!(config.model_input, GridShape::new(1536, 1280));
        assert_eq!(config.input_steps, 4);
        assert_eq!(config.prediction_steps, 18);
        assert!(config.needs_tiling());
        assert!((config.rate_factor() - 12.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_alignment_must_be_multiple_of_step() {
        let mut config = NowcastConfig::default();
        config.alignment_minutes = 7;
        assert!(config.validate().is_err());

        config.alignment_minutes = 15;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_fit_in_model_input() {
        let mut config = NowcastConfig::default();
        config.overlap_px = 1280;
        assert!(config.validate().is_err());

        // Rows do not need tiling, so only the column extent matters.
        config.overlap_px = 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_three_window_axis_needs_narrow_overlap() {
        let mut config = NowcastConfig::default();
        config.grid = GridShape::new(1536, 3000);
        config.overlap_px = 640;
        assert!(config.validate().is_err());

        config.overlap_px = 256;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_filename_pattern_rejected() {
        let mut config = NowcastConfig::default();
        config.archive.filename_pattern = "%Y%m%d%H%M%Q.npz".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "archive.filename_pattern"
        ));

        config.archive.filename_pattern = "%Y/%m/%d/%Y%m%d%H%M.npz".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mask_rule_thresholds() {
        assert!(MaskRule::All.holds(4, 4));
        assert!(!MaskRule::All.holds(3, 4));
        assert!(MaskRule::Majority.holds(3, 4));
        assert!(!MaskRule::Majority.holds(2, 4));
        assert!(MaskRule::Any.holds(1, 4));
        assert!(!MaskRule::Any.holds(0, 4));

        let decode: DecodeConfig = serde_yaml::from_str("mask_rule: majority").unwrap();
        assert_eq!(decode.mask_rule, MaskRule::Majority);
        assert_eq!(decode.downsample, 2);
    }

    #[test]
    fn test_unknown_forecaster_placeholder_rejected() {
        let mut config = NowcastConfig::default();
        config.forecaster.args.push("{model_dir}".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.forecaster.kind = ForecasterKind::Persistence;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
grid: { rows: 1736, cols: 1736 }
overlap_px: 128
archive:
  root: /tmp/radar
  filename_pattern: "%Y%m%d%H%M.npz"
  format: npz
forecaster:
  kind: persistence
"#;
        let config = NowcastConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.grid, GridShape::new(1736, 1736));
        assert_eq!(config.overlap_px, 128);
        assert_eq!(config.step_minutes, 5);
        assert_eq!(config.archive.format, FrameFormat::Npz);
        assert_eq!(config.archive.decode().sentinel, Sentinel::Negative);
        assert_eq!(config.archive.decode().downsample, 1);
        assert_eq!(config.forecaster.kind, ForecasterKind::Persistence);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_decode_section() {
        let yaml = r#"
archive:
  format: npz
  decode:
    sentinel: { kind: equals, value: -1.0 }
    crop: { rows: 1536, cols: 1280 }
"#;
        let config = NowcastConfig::from_yaml_str(yaml).unwrap();
        let decode = config.archive.decode();
        assert_eq!(decode.sentinel, Sentinel::Equals { value: -1.0 });
        assert_eq!(decode.crop, Some(GridShape::new(1536, 1280)));
        assert_eq!(decode.npz_member, "arr_0");
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("NOWCAST_ARCHIVE_ROOT", "/srv/radar"),
            ("NOWCAST_OVERLAP_PX", "64"),
            ("NOWCAST_MASK_SOURCE", "earliest"),
            ("NOWCAST_PARALLEL_WINDOWS", "1"),
            ("NOWCAST_FORECASTER", "persistence"),
        ]
        .into_iter()
        .collect();

        let mut config = NowcastConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.archive.root, PathBuf::from("/srv/radar"));
        assert_eq!(config.overlap_px, 64);
        assert_eq!(config.mask_source, MaskSource::Earliest);
        assert!(config.parallel_windows);
        assert_eq!(config.forecaster.kind, ForecasterKind::Persistence);
    }

    #[test]
    fn test_bad_numeric_override() {
        let mut config = NowcastConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "NOWCAST_STEP_MINUTES").then(|| "five".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("NOWCAST_TEST_UNSET_ROOT");
        let result = expand_env_vars("root: ${NOWCAST_TEST_UNSET_ROOT:-/data}/radar").unwrap();
        assert_eq!(result, "root: /data/radar");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("NOWCAST_TEST_REQUIRED");
        assert!(expand_env_vars("${NOWCAST_TEST_REQUIRED}").is_err());
        assert!(expand_env_vars("${UNCLOSED").is_err());
    }

    #[test]
    fn test_frame_format_from_path() {
        assert_eq!(
            FrameFormat::from_path(Path::new("2024_01_15_12_00.h5")),
            Some(FrameFormat::OdimH5)
        );
        assert_eq!(
            FrameFormat::from_path(Path::new("202401151200.npz")),
            Some(FrameFormat::Npz)
        );
        assert_eq!(FrameFormat::from_path(Path::new("frame.tif")), None);
    }

    #[test]
    fn test_sentinel_matches() {
        let odim = Sentinel::Equals { value: 65535.0 };
        assert!(odim.matches(65535.0));
        assert!(!odim.matches(0.0));
        assert!(odim.matches(f32::NAN));

        assert!(Sentinel::Negative.matches(-1.0));
        assert!(!Sentinel::Negative.matches(0.0));
    }
}
