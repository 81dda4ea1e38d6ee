//! ML anti-pattern detectors
//!
//! This module provides the detector framework and the five detectors that
//! run over one analyzed unit.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DetectorEngine                          │
//! │  - Validates config, registers enabled detectors            │
//! │  - Extracts events and ingests the tracker once per unit    │
//! │  - Runs units in parallel (rayon), detectors in order       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Detector Trait                         │
//! │  - name(): Unique kebab-case identifier                     │
//! │  - description(): Human-readable description                │
//! │  - detect(ctx): Read event log + tracker, return findings   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//! ┌──────────────────┐ ┌──────────────┐ ┌──────────────────┐
//! │ Flow-based       │ │ Pattern      │ │ Literal          │
//! │ (Contamination,  │ │ (GpuMemory,  │ │ (Hardcoded-      │
//! │  DataLeakage)    │ │  DataLoading)│ │  Threshold)      │
//! └──────────────────┘ └──────────────┘ └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use mlguard::detectors::DetectorEngine;
//! use mlguard::parsers::python::parse;
//!
//! let engine = DetectorEngine::new(AnalyzerConfig::default())?;
//! let unit = parse(Path::new("train.py"))?;
//! let findings = engine.analyze(&unit);
//! ```

mod base;
mod engine;
mod flow;

// Data-flow detectors
mod data_leakage;
mod test_contamination;

// Runtime-resource detectors
mod data_loading;
mod gpu_memory;

// Literal analysis
mod hardcoded_threshold;

pub use base::{DetectionContext, Detector};
pub use engine::{DetectorEngine, DetectorEngineBuilder, UnitReport};
pub use flow::{trace_to_sinks, LeakPath, SinkKind};

pub use data_leakage::DataLeakageDetector;
pub use data_loading::InefficientDataLoadingDetector;
pub use gpu_memory::GpuMemoryLeakDetector;
pub use hardcoded_threshold::HardcodedThresholdDetector;
pub use test_contamination::TestSetContaminationDetector;

use crate::config::AnalyzerConfig;
use std::sync::Arc;

/// Create the default set of detectors, in registration order
///
/// Findings are reported in this order, so it is part of the output contract.
pub fn default_detectors(config: &AnalyzerConfig) -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(TestSetContaminationDetector::new(config)),
        Arc::new(DataLeakageDetector::new(config)),
        Arc::new(GpuMemoryLeakDetector::new(config)),
        Arc::new(HardcodedThresholdDetector::new(config)),
        Arc::new(InefficientDataLoadingDetector::new(config)),
    ]
}

/// Run one detector over a source snippet, findings sorted by location
#[cfg(test)]
pub(crate) fn run_detector(detector: &dyn Detector, source: &str) -> Vec<crate::models::Finding> {
    use crate::lineage::LineageTracker;
    use crate::parsers::python::parse_source;
    use std::path::Path;

    let unit = parse_source(source, Path::new("test.py")).expect("test source parses");
    let log = crate::extract::extract(&unit, &AnalyzerConfig::default());
    let tracker = LineageTracker::ingest(&log);
    let ctx = DetectionContext::new(&unit, &log, &tracker);
    let mut findings = detector.detect(&ctx);
    findings.sort_by_key(|f| f.location);
    findings
}
