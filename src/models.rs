//! Core data models for mlguard
//!
//! These models are the shared reporting vocabulary: every detector
//! produces [`Finding`] values built from the types in this module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Generate a deterministic finding ID based on content hash.
///
/// This ensures findings have stable IDs across runs, enabling:
/// - Tracking findings over time (fixed vs new vs recurring)
/// - Suppression by ID in config files
/// - Reliable deduplication
///
/// The ID is a 16-character hex string derived from hashing:
/// - detector name (which detector found it)
/// - file path (where it was found)
/// - line number (specific location)
/// - message (what the issue is)
pub fn deterministic_finding_id(detector: &str, file: &str, line: u32, message: &str) -> String {
    // MD5 is stable across Rust/compiler versions, DefaultHasher is not.
    let input = format!("{detector}\n{file}\n{line}\n{message}");
    let digest = md5::compute(input.as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

/// Severity levels for findings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// The anti-pattern a finding reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    PreprocessingBeforeSplit,
    MissingDuplicateCheck,
    DuplicateContamination,
    FutureLeakage,
    DataLeakage,
    GpuTensorAccumulation,
    MissingCacheClear,
    MissingGradientReset,
    HardcodedThreshold,
    RowWiseIteration,
    UnchunkedLoad,
    MissingDtype,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::PreprocessingBeforeSplit => "preprocessing_before_split",
            PatternType::MissingDuplicateCheck => "missing_duplicate_check",
            PatternType::DuplicateContamination => "duplicate_contamination",
            PatternType::FutureLeakage => "future_leakage",
            PatternType::DataLeakage => "data_leakage",
            PatternType::GpuTensorAccumulation => "gpu_tensor_accumulation",
            PatternType::MissingCacheClear => "missing_cache_clear",
            PatternType::MissingGradientReset => "missing_gradient_reset",
            PatternType::HardcodedThreshold => "hardcoded_threshold",
            PatternType::RowWiseIteration => "row_wise_iteration",
            PatternType::UnchunkedLoad => "unchunked_load",
            PatternType::MissingDtype => "missing_dtype",
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source position. Lines are 1-based, columns are 0-based byte offsets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open source range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// True when `other` lies entirely inside this span
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_location(&self, loc: Location) -> bool {
        self.start <= loc && loc < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FindingError {
    #[error("confidence must be a number in [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),
}

/// Detector confidence, always within `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub const CERTAIN: Confidence = Confidence(1.0);

    /// Checked constructor. Rejects NaN and anything outside `[0, 1]`.
    pub fn new(value: f64) -> Result<Self, FindingError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(FindingError::ConfidenceOutOfRange(value))
        }
    }

    /// Literal score known when the detector is written. Out-of-range
    /// values panic, which fails the build when evaluated in a const context.
    pub const fn fixed(value: f64) -> Self {
        assert!(value >= 0.0 && value <= 1.0, "confidence literal must be in [0, 1]");
        Self(value)
    }

    /// Clamp a computed score into range. NaN maps to zero.
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = FindingError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Confidence::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// An ML anti-pattern finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub detector: String,
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub message: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub suggested_fix: Option<String>,
    pub location: Location,
    #[serde(default)]
    pub file_path: PathBuf,
    /// Identifiers involved in the finding (train/test names, loop variables, ...)
    #[serde(default)]
    pub variables: Vec<String>,
}

impl Finding {
    /// Build a finding. Severity and confidence are typed, so an out-of-range
    /// score cannot reach this point.
    pub fn new(
        detector: &str,
        pattern_type: PatternType,
        severity: Severity,
        confidence: Confidence,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            id: deterministic_finding_id(detector, "", location.line, &message),
            detector: detector.to_string(),
            pattern_type,
            severity,
            message,
            confidence,
            explanation: String::new(),
            suggested_fix: None,
            location,
            file_path: PathBuf::new(),
            variables: Vec::new(),
        }
    }

    /// Attach the analyzed file; the id is recomputed so it stays stable per file.
    pub fn in_file(mut self, path: &Path) -> Self {
        self.file_path = path.to_path_buf();
        self.id = deterministic_finding_id(
            &self.detector,
            &path.to_string_lossy(),
            self.location.line,
            &self.message,
        );
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    pub fn with_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Summary of findings by severity and pattern
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FindingsSummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    pub total: usize,
    pub by_pattern: BTreeMap<PatternType, usize>,
}

impl FindingsSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for f in findings {
            match f.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
            *summary.by_pattern.entry(f.pattern_type).or_default() += 1;
            summary.total += 1;
        }
        summary
    }

    /// Highest severity present, if any
    pub fn worst(&self) -> Option<Severity> {
        [
            (Severity::Critical, self.critical),
            (Severity::High, self.high),
            (Severity::Medium, self.medium),
            (Severity::Low, self.low),
            (Severity::Info, self.info),
        ]
        .into_iter()
        .find(|(_, count)| *count > 0)
        .map(|(severity, _)| severity)
    }
}
