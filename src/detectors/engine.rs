//! Detector execution engine
//!
//! The DetectorEngine owns a validated configuration and the registered
//! detectors. For each unit it:
//! - Extracts the event log and ingests a fresh lineage tracker
//! - Runs every detector in registration order over the same context
//! - Attaches the file path and concatenates findings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    DetectorEngine                       │
//! ├─────────────────────────────────────────────────────────┤
//! │  1. Validate config, register enabled detectors         │
//! │  2. Per unit: extract events, ingest tracker            │
//! │  3. Run detectors in order, sort each by location       │
//! │  4. Concatenate findings (registration order)           │
//! │  5. Units in a batch fan out across rayon workers       │
//! └─────────────────────────────────────────────────────────┘
//! ```

use crate::config::{AnalyzerConfig, ConfigError};
use crate::detectors::base::{DetectionContext, Detector};
use crate::detectors::default_detectors;
use crate::extract::EventExtractor;
use crate::lineage::LineageTracker;
use crate::models::{Finding, FindingsSummary};
use crate::parsers::AnalysisUnit;
use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Findings for one unit plus what the report layer needs to present them
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub path: PathBuf,
    pub findings: Vec<Finding>,
    pub summary: FindingsSummary,
    /// ML frameworks the unit imports
    pub frameworks: Vec<String>,
}

/// Runs the registered detectors over analysis units
pub struct DetectorEngine {
    config: AnalyzerConfig,
    /// Registered detectors, in reporting order
    detectors: Vec<Arc<dyn Detector>>,
    /// Worker threads for batch analysis (0 = rayon default)
    workers: usize,
}

impl DetectorEngine {
    /// Validate `config` and register every enabled default detector
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        let mut engine = Self::empty(config)?;
        let enabled: Vec<_> = default_detectors(&engine.config)
            .into_iter()
            .filter(|d| {
                let enabled = engine.config.is_detector_enabled(d.name());
                if !enabled {
                    debug!("Detector {} disabled by config", d.name());
                }
                enabled
            })
            .collect();
        engine.register_all(enabled);
        Ok(engine)
    }

    /// Validate `config` without registering any detector
    pub fn empty(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            detectors: Vec::new(),
            workers: 0,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Register a detector; its findings follow those already registered
    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        debug!("Registering detector: {}", detector.name());
        self.detectors.push(detector);
    }

    /// Register multiple detectors at once
    pub fn register_all(&mut self, detectors: impl IntoIterator<Item = Arc<dyn Detector>>) {
        for detector in detectors {
            self.register(detector);
        }
    }

    /// Get the number of registered detectors
    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Get names of all registered detectors
    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Analyze one unit.
    ///
    /// Findings are ordered by detector registration, then by source
    /// location within each detector.
    pub fn analyze(&self, unit: &AnalysisUnit) -> Vec<Finding> {
        let start = Instant::now();
        let log = EventExtractor::new(&self.config).extract(unit);
        let tracker = LineageTracker::ingest(&log);
        let ctx = DetectionContext::new(unit, &log, &tracker);
        info!(
            "Analyzing {} ({} events, {} loops) with {} detectors",
            unit.path().display(),
            log.len(),
            log.loops().len(),
            self.detectors.len()
        );

        let mut all_findings = Vec::new();
        for detector in &self.detectors {
            debug!("Running detector: {}", detector.name());
            let mut findings = detector.detect(&ctx);
            findings.sort_by_key(|f| f.location);
            all_findings.extend(findings.into_iter().map(|f| f.in_file(unit.path())));
        }

        info!(
            "Analysis of {} complete: {} findings in {:?}",
            unit.path().display(),
            all_findings.len(),
            start.elapsed()
        );
        all_findings
    }

    /// Analyze one unit and summarize the result
    pub fn analyze_report(&self, unit: &AnalysisUnit) -> UnitReport {
        let findings = self.analyze(unit);
        UnitReport {
            path: unit.path().to_path_buf(),
            summary: FindingsSummary::from_findings(&findings),
            frameworks: unit.frameworks().into_iter().map(str::to_string).collect(),
            findings,
        }
    }

    /// Analyze independent units in parallel; reports keep the input order
    pub fn analyze_batch(&self, units: &[AnalysisUnit]) -> Result<Vec<UnitReport>> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;

        let reports: Vec<UnitReport> =
            pool.install(|| units.par_iter().map(|unit| self.analyze_report(unit)).collect());

        info!(
            "Batch complete: {} units, {} findings in {:?}",
            reports.len(),
            reports.iter().map(|r| r.findings.len()).sum::<usize>(),
            start.elapsed()
        );
        Ok(reports)
    }
}

/// Builder for DetectorEngine with fluent API
pub struct DetectorEngineBuilder {
    config: AnalyzerConfig,
    detectors: Vec<Arc<dyn Detector>>,
    with_defaults: bool,
    workers: usize,
}

impl DetectorEngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: AnalyzerConfig::default(),
            detectors: Vec::new(),
            with_defaults: true,
            workers: 0,
        }
    }

    pub fn config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set number of worker threads for batch analysis
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Whether the enabled default detectors are registered first (default: true)
    pub fn with_defaults(mut self, enabled: bool) -> Self {
        self.with_defaults = enabled;
        self
    }

    /// Add a detector
    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Add multiple detectors
    pub fn detectors(mut self, detectors: impl IntoIterator<Item = Arc<dyn Detector>>) -> Self {
        self.detectors.extend(detectors);
        self
    }

    /// Build the engine, validating the configuration
    pub fn build(self) -> Result<DetectorEngine, ConfigError> {
        let mut engine = if self.with_defaults {
            DetectorEngine::new(self.config)?
        } else {
            DetectorEngine::empty(self.config)?
        };
        engine.register_all(self.detectors);
        Ok(engine.with_workers(self.workers))
    }
}

impl Default for DetectorEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
