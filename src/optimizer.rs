use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    #[error("Invalid optimization level of {0}")]
    InvalidLevel(String),
    #[error("Optimizer failed: {0}")]
    Runtime(String),
    #[error("No graph optimizer available, build with the `ort` feature")]
    Unavailable,
}

/// Graph optimization levels, from no rewriting to every available pass.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    Disable,
    #[default]
    Basic,
    Extended,
    All,
}

pub fn get_optimization_level(level: &str) -> Result<OptimizationLevel, OptimizeError> {
    OptimizationLevel::from_str(level).map_err(|_| OptimizeError::InvalidLevel(level.to_string()))
}

/// `model.onnx` becomes `model.<level>.optimized.onnx`. A path without an
/// `.onnx` suffix gets the new suffix appended.
pub fn default_optimized_path(model_path: &Path, level: OptimizationLevel) -> PathBuf {
    let file_name = model_path
        .file_name()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.strip_suffix(".onnx").unwrap_or(&file_name);
    model_path.with_file_name(format!("{stem}.{level}.optimized.onnx"))
}

pub trait GraphOptimizer {
    fn optimize(
        &self,
        model_path: &Path,
        output_path: &Path,
        level: OptimizationLevel,
    ) -> Result<(), OptimizeError>;
}

/// Run `optimizer` over `model_path`, writing to `output_path` or to
/// [`default_optimized_path`]. Returns the path written.
pub fn optimize_model(
    model_path: &Path,
    output_path: Option<&Path>,
    level: OptimizationLevel,
    optimizer: &impl GraphOptimizer,
) -> Result<PathBuf, OptimizeError> {
    let output_path = match output_path {
        Some(x) => x.to_path_buf(),
        None => default_optimized_path(model_path, level),
    };
    log::info!(
        "Optimizing {} at level {} into {}",
        model_path.display(),
        level,
        output_path.display()
    );
    optimizer.optimize(model_path, &output_path, level)?;
    Ok(output_path)
}

/// Optimizer backed by an ONNX Runtime session, which writes the optimized
/// graph while the session is being created.
#[cfg(feature = "ort")]
#[derive(Debug, Clone, Copy, Default)]
pub struct OrtOptimizer {
    pub verbose: bool,
}

#[cfg(feature = "ort")]
impl From<OptimizationLevel> for ort::session::builder::GraphOptimizationLevel {
    fn from(value: OptimizationLevel) -> Self {
        match value {
            OptimizationLevel::Disable => ort::session::builder::GraphOptimizationLevel::Disable,
            OptimizationLevel::Basic => ort::session::builder::GraphOptimizationLevel::Level1,
            OptimizationLevel::Extended => ort::session::builder::GraphOptimizationLevel::Level2,
            OptimizationLevel::All => ort::session::builder::GraphOptimizationLevel::Level3,
        }
    }
}

#[cfg(feature = "ort")]
impl GraphOptimizer for OrtOptimizer {
    fn optimize(
        &self,
        model_path: &Path,
        output_path: &Path,
        level: OptimizationLevel,
    ) -> Result<(), OptimizeError> {
        fn runtime_err(e: impl std::fmt::Display) -> OptimizeError {
            OptimizeError::Runtime(e.to_string())
        }
        let log_level = if self.verbose {
            ort::logging::LogLevel::Verbose
        } else {
            ort::logging::LogLevel::Error
        };
        let _session = ort::session::Session::builder()
            .map_err(runtime_err)?
            .with_log_level(log_level)
            .map_err(runtime_err)?
            .with_optimization_level(level.into())
            .map_err(runtime_err)?
            .with_optimized_model_path(output_path.to_string_lossy().into_owned())
            .map_err(runtime_err)?
            .commit_from_file(model_path)
            .map_err(runtime_err)?;
        Ok(())
    }
}
