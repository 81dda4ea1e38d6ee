//! mlguard - Static analysis for ML training pipelines
//!
//! Finds defects that silently inflate reported model performance or waste
//! resources, without running the pipeline: preprocessing fitted before the
//! train/test split, temporal future leakage, GPU tensor and gradient
//! accumulation, unexplained numeric thresholds, and slow data loading.
//!
//! Each [`AnalysisUnit`] is processed as a strict pipeline:
//!
//! ```text
//! AnalysisUnit ──► extract ──► EventLog ──► LineageTracker ──► Detectors ──► Vec<Finding>
//! ```
//!
//! Every unit gets its own event log and tracker, so units can be analyzed
//! in parallel with no shared state (see [`DetectorEngine::analyze_batch`]).
//!
//! ```ignore
//! use mlguard::{analyze, parsers::python::parse_source, AnalyzerConfig};
//!
//! let unit = parse_source(source, Path::new("train.py"))?;
//! for finding in analyze(&unit, &AnalyzerConfig::default())? {
//!     println!("{} {} {}", finding.location, finding.severity, finding.message);
//! }
//! ```

pub mod config;
pub mod detectors;
pub mod extract;
pub mod lineage;
pub mod models;
pub mod parsers;

pub use config::{load_config, AnalyzerConfig, ConfigError};
pub use detectors::{DetectorEngine, DetectorEngineBuilder, UnitReport};
pub use models::{Confidence, Finding, FindingsSummary, Location, PatternType, Severity};
pub use parsers::AnalysisUnit;

/// Run every enabled default detector over one unit.
///
/// The configuration is validated first; a malformed configuration is the
/// only error this returns.
pub fn analyze(unit: &AnalysisUnit, config: &AnalyzerConfig) -> Result<Vec<Finding>, ConfigError> {
    let engine = DetectorEngine::new(config.clone())?;
    Ok(engine.analyze(unit))
}
