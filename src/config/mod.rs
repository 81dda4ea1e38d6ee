//! Analyzer configuration
//!
//! Everything the extractor and detectors match against is data. Any subset
//! of the defaults can be overridden from a TOML (or JSON) file:
//!
//! ```toml
//! split_functions = ["train_test_split", "GroupKFold.split"]
//!
//! [leakage]
//! chain_decay = 0.7
//!
//! [thresholds]
//! literal_allowlist = [2, 10, 0.5, 42]
//! significant_digits = 5
//!
//! [[temporal.offset_severity]]
//! min_offset = 1
//! severity = "medium"
//!
//! [[temporal.offset_severity]]
//! min_offset = 3
//! severity = "high"
//!
//! [call_categories]
//! load_dataset = "tabular_load"
//!
//! [detectors.hardcoded-threshold]
//! enabled = false
//! ```

use crate::extract::{CallCategory, PreprocessMethod};
use crate::models::Severity;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;


/// Detector names the configuration may refer to (kebab-case)
pub const KNOWN_DETECTORS: &[&str] = &[
    "test-set-contamination",
    "data-leakage",
    "gpu-memory-leak",
    "hardcoded-threshold",
    "inefficient-data-loading",
];

/// Malformed configuration. Raised before any unit is analyzed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("chain decay factor must be in (0, 1), got {0}")]
    InvalidChainDecay(f64),
    #[error("confidence floor must be in [0, 1], got {0}")]
    InvalidConfidenceFloor(f64),
    #[error("max_chain_hops must be at least 1")]
    InvalidMaxHops,
    #[error("significant digit threshold must be at least 1")]
    InvalidSignificantDigits,
    #[error("temporal offset table must use positive, strictly increasing offsets with non-decreasing severity")]
    InvalidOffsetSeverity,
    #[error("{0} must not be empty")]
    EmptyList(&'static str),
    #[error("unknown detector '{0}' in configuration")]
    UnknownDetector(String),
}

/// Top-level configuration consumed by the extractor and every detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Plain names match any call's last segment; `Class.method` entries
    /// match method calls on known instances of `Class`
    pub split_functions: Vec<String>,
    pub preprocessing: PreprocessingConfig,
    /// Method or function name -> category tag
    pub call_categories: BTreeMap<String, CallCategory>,
    pub leakage: LeakageConfig,
    pub temporal: TemporalConfig,
    pub thresholds: ThresholdConfig,
    pub gpu: GpuConfig,
    pub data_loading: DataLoadingConfig,
    /// Per-detector overrides keyed by detector name
    pub detectors: BTreeMap<String, DetectorOverride>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            split_functions: default_split_functions(),
            preprocessing: PreprocessingConfig::default(),
            call_categories: default_call_categories(),
            leakage: LeakageConfig::default(),
            temporal: TemporalConfig::default(),
            thresholds: ThresholdConfig::default(),
            gpu: GpuConfig::default(),
            data_loading: DataLoadingConfig::default(),
            detectors: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    #[serde(default = "default_preprocessing_classes")]
    pub classes: Vec<String>,
    #[serde(default = "default_preprocessing_methods")]
    pub methods: BTreeMap<String, PreprocessMethod>,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            classes: default_preprocessing_classes(),
            methods: default_preprocessing_methods(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakageConfig {
    /// Confidence multiplier per intermediate assignment hop
    #[serde(default = "default_chain_decay")]
    pub chain_decay: f64,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_max_chain_hops")]
    pub max_chain_hops: u32,
}

impl Default for LeakageConfig {
    fn default() -> Self {
        Self {
            chain_decay: default_chain_decay(),
            confidence_floor: default_confidence_floor(),
            max_chain_hops: default_max_chain_hops(),
        }
    }
}

impl LeakageConfig {
    /// `max(floor, decay^(hops - 1))`; a direct argument is one hop
    pub fn chain_confidence(&self, hops: u32) -> f64 {
        let exp = hops.saturating_sub(1).min(i32::MAX as u32) as i32;
        self.chain_decay.powi(exp).max(self.confidence_floor).min(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetSeverity {
    pub min_offset: u32,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    #[serde(default = "default_offset_severity")]
    pub offset_severity: Vec<OffsetSeverity>,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            offset_severity: default_offset_severity(),
        }
    }
}

impl TemporalConfig {
    /// Severity for a shift of `magnitude` periods into the future
    pub fn severity_for(&self, magnitude: u64) -> Severity {
        self.offset_severity
            .iter()
            .filter(|entry| u64::from(entry.min_offset) <= magnitude)
            .map(|entry| entry.severity)
            .next_back()
            .unwrap_or(Severity::Low)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Values never reported, on top of 0, 1 and -1
    #[serde(default = "default_literal_allowlist")]
    pub literal_allowlist: Vec<f64>,
    #[serde(default = "default_significant_digits")]
    pub significant_digits: u32,
    /// Keyword arguments whose literal values are not thresholds
    #[serde(default = "default_ignored_keywords")]
    pub ignored_keywords: Vec<String>,
    /// Receivers that denote configuration access (`config.get(...)`)
    #[serde(default = "default_config_roots")]
    pub config_roots: Vec<String>,
    #[serde(default = "default_math_modules")]
    pub math_modules: Vec<String>,
    #[serde(default = "default_math_constants")]
    pub math_constants: Vec<String>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            literal_allowlist: default_literal_allowlist(),
            significant_digits: default_significant_digits(),
            ignored_keywords: default_ignored_keywords(),
            config_roots: default_config_roots(),
            math_modules: default_math_modules(),
            math_constants: default_math_constants(),
        }
    }
}

impl ThresholdConfig {
    pub fn is_idiomatic(&self, value: f64) -> bool {
        const EPS: f64 = 1e-12;
        [0.0, 1.0, -1.0]
            .iter()
            .chain(self.literal_allowlist.iter())
            .any(|allowed| (allowed - value).abs() < EPS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    #[serde(default = "default_loss_markers")]
    pub loss_markers: Vec<String>,
    #[serde(default = "default_optimizer_markers")]
    pub optimizer_markers: Vec<String>,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            loss_markers: default_loss_markers(),
            optimizer_markers: default_optimizer_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLoadingConfig {
    #[serde(default = "default_chunk_params")]
    pub chunk_params: Vec<String>,
    #[serde(default = "default_selection_params")]
    pub selection_params: Vec<String>,
    #[serde(default = "default_chunkable_loaders")]
    pub chunkable_loaders: Vec<String>,
}

impl Default for DataLoadingConfig {
    fn default() -> Self {
        Self {
            chunk_params: default_chunk_params(),
            selection_params: default_selection_params(),
            chunkable_loaders: default_chunkable_loaders(),
        }
    }
}

/// Per-detector override
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorOverride {
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_split_functions() -> Vec<String> {
    strings(&[
        "train_test_split",
        "TimeSeriesSplit.split",
        "KFold.split",
        "StratifiedKFold.split",
        "GroupKFold.split",
        "ShuffleSplit.split",
        "StratifiedShuffleSplit.split",
        "GroupShuffleSplit.split",
        "RepeatedKFold.split",
    ])
}

fn default_preprocessing_classes() -> Vec<String> {
    strings(&[
        "StandardScaler",
        "MinMaxScaler",
        "RobustScaler",
        "MaxAbsScaler",
        "Normalizer",
        "SimpleImputer",
        "KNNImputer",
        "IterativeImputer",
        "SelectKBest",
        "SelectPercentile",
        "VarianceThreshold",
        "RFE",
        "PCA",
        "LabelEncoder",
        "OneHotEncoder",
        "OrdinalEncoder",
        "PolynomialFeatures",
        "QuantileTransformer",
        "PowerTransformer",
        "TfidfVectorizer",
        "CountVectorizer",
    ])
}

fn default_preprocessing_methods() -> BTreeMap<String, PreprocessMethod> {
    BTreeMap::from([
        ("fit".to_string(), PreprocessMethod::Fit),
        ("fit_transform".to_string(), PreprocessMethod::FitTransform),
        ("transform".to_string(), PreprocessMethod::Transform),
    ])
}

fn default_call_categories() -> BTreeMap<String, CallCategory> {
    use CallCategory::*;
    let table: &[(&str, CallCategory)] = &[
        ("cross_val_score", CrossValidation),
        ("cross_validate", CrossValidation),
        ("cross_val_predict", CrossValidation),
        ("shift", TemporalShift),
        ("rolling", RollingWindow),
        ("intersection", SetIntersection),
        ("intersect1d", SetIntersection),
        ("isdisjoint", SetIntersection),
        ("read_csv", TabularLoad),
        ("read_table", TabularLoad),
        ("read_json", TabularLoad),
        ("read_parquet", TabularLoad),
        ("read_excel", TabularLoad),
        ("read_sql", TabularLoad),
        ("read_sql_query", TabularLoad),
        ("read_feather", TabularLoad),
        ("read_fwf", TabularLoad),
        ("cuda", DeviceTransfer),
        ("to", DeviceTransfer),
        ("empty_cache", CacheClear),
        ("zero_grad", GradientReset),
        ("backward", Backward),
        ("step", OptimizerStep),
        ("detach", Detach),
        ("item", Detach),
        ("cpu", Detach),
        ("numpy", Detach),
        ("tolist", Detach),
        ("append", ContainerAppend),
        ("extend", ContainerAppend),
        ("iterrows", RowIteration),
        ("itertuples", RowIteration),
        ("predict", ModelInference),
        ("predict_proba", ModelInference),
        ("decision_function", ModelInference),
    ];
    table
        .iter()
        .map(|(name, category)| (name.to_string(), *category))
        .collect()
}

fn default_chain_decay() -> f64 {
    0.8
}

fn default_confidence_floor() -> f64 {
    0.5
}

fn default_max_chain_hops() -> u32 {
    10
}

fn default_offset_severity() -> Vec<OffsetSeverity> {
    vec![
        OffsetSeverity {
            min_offset: 1,
            severity: Severity::Medium,
        },
        OffsetSeverity {
            min_offset: 5,
            severity: Severity::High,
        },
    ]
}

fn default_literal_allowlist() -> Vec<f64> {
    vec![2.0, 10.0, 100.0, 1000.0, 0.5]
}

fn default_significant_digits() -> u32 {
    4
}

fn default_ignored_keywords() -> Vec<String> {
    strings(&[
        "random_state",
        "seed",
        "verbose",
        "n_jobs",
        "axis",
        "dim",
        "num_workers",
        "device",
    ])
}

fn default_config_roots() -> Vec<String> {
    strings(&["config", "cfg", "conf", "settings", "params", "hparams", "args", "os.environ", "environ"])
}

fn default_math_modules() -> Vec<String> {
    strings(&["math", "numpy", "torch", "scipy.constants", "cmath"])
}

fn default_math_constants() -> Vec<String> {
    strings(&["pi", "e", "tau", "inf", "nan"])
}

fn default_loss_markers() -> Vec<String> {
    strings(&["loss", "criterion"])
}

fn default_optimizer_markers() -> Vec<String> {
    strings(&["optim", "opt"])
}

fn default_chunk_params() -> Vec<String> {
    strings(&["chunksize", "iterator"])
}

fn default_selection_params() -> Vec<String> {
    strings(&["dtype", "usecols", "columns", "converters", "nrows"])
}

fn default_chunkable_loaders() -> Vec<String> {
    strings(&[
        "read_csv",
        "read_table",
        "read_json",
        "read_sql",
        "read_sql_query",
        "read_fwf",
    ])
}

impl AnalyzerConfig {
    /// Reject malformed settings up front
    pub fn validate(&self) -> Result<(), ConfigError> {
        let decay = self.leakage.chain_decay;
        if !(decay > 0.0 && decay < 1.0) {
            return Err(ConfigError::InvalidChainDecay(decay));
        }
        let floor = self.leakage.confidence_floor;
        if !(0.0..=1.0).contains(&floor) {
            return Err(ConfigError::InvalidConfidenceFloor(floor));
        }
        if self.leakage.max_chain_hops == 0 {
            return Err(ConfigError::InvalidMaxHops);
        }
        if self.thresholds.significant_digits == 0 {
            return Err(ConfigError::InvalidSignificantDigits);
        }
        if self.split_functions.is_empty() {
            return Err(ConfigError::EmptyList("split_functions"));
        }
        if self.preprocessing.classes.is_empty() {
            return Err(ConfigError::EmptyList("preprocessing.classes"));
        }

        let table = &self.temporal.offset_severity;
        if table.is_empty() {
            return Err(ConfigError::EmptyList("temporal.offset_severity"));
        }
        let positive = table.iter().all(|entry| entry.min_offset > 0);
        let monotone = table
            .windows(2)
            .all(|w| w[0].min_offset < w[1].min_offset && w[0].severity <= w[1].severity);
        if !positive || !monotone {
            return Err(ConfigError::InvalidOffsetSeverity);
        }

        for name in self.detectors.keys() {
            let normalized = normalize_detector_name(name);
            if !KNOWN_DETECTORS.contains(&normalized.as_str()) {
                return Err(ConfigError::UnknownDetector(name.clone()));
            }
        }
        Ok(())
    }

    /// Check if a detector is enabled (defaults to true if not specified)
    pub fn is_detector_enabled(&self, name: &str) -> bool {
        let normalized = normalize_detector_name(name);

        self.detectors
            .iter()
            .find(|(key, _)| normalize_detector_name(key) == normalized)
            .and_then(|(_, c)| c.enabled)
            .unwrap_or(true)
    }

    /// Parse from TOML text and validate
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AnalyzerConfig =
            toml::from_str(text).context("Failed to parse analyzer config")?;
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration from a `.toml` or `.json` file and validate it
pub fn load_config(path: &Path) -> Result<AnalyzerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: AnalyzerConfig = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?
    };

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    debug!("Loaded analyzer config from {}", path.display());
    Ok(config)
}

/// Normalize detector name for config lookup
/// Converts various formats to kebab-case for matching
pub fn normalize_detector_name(name: &str) -> String {
    // DataLeakageDetector -> data-leakage
    // GPUMemoryLeakDetector -> gpu-memory-leak
    // data_leakage -> data-leakage

    let mut result = String::new();
    let chars: Vec<char> = name.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_is_lower = i > 0 && chars[i - 1].is_lowercase();
            let is_acronym_end = i > 0
                && chars[i - 1].is_uppercase()
                && i + 1 < chars.len()
                && chars[i + 1].is_lowercase();

            if prev_is_lower || is_acronym_end {
                result.push('-');
            }
            result.extend(c.to_lowercase());
        } else if *c == '_' {
            result.push('-');
        } else {
            result.push(*c);
        }
    }

    result.trim_end_matches("-detector").to_string()
}
