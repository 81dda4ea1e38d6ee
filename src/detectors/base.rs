//! Base detector trait and types
//!
//! This module defines the core abstractions for ML anti-pattern detection:
//! - `Detector` trait that all detectors must implement
//! - `DetectionContext` bundling what a detector may read for one unit

use crate::extract::EventLog;
use crate::lineage::LineageTracker;
use crate::models::Finding;
use crate::parsers::AnalysisUnit;

/// Read-only view of one analyzed unit
///
/// Built once per unit by the engine; every detector sees the same event
/// log and tracker and none of them can mutate either.
pub struct DetectionContext<'a> {
    pub unit: &'a AnalysisUnit,
    pub log: &'a EventLog,
    pub tracker: &'a LineageTracker<'a>,
}

impl<'a> DetectionContext<'a> {
    pub fn new(
        unit: &'a AnalysisUnit,
        log: &'a EventLog,
        tracker: &'a LineageTracker<'a>,
    ) -> Self {
        Self { unit, log, tracker }
    }
}

/// Trait for all ML anti-pattern detectors
///
/// # Example Implementation
///
/// ```ignore
/// pub struct MyDetector;
///
/// impl Detector for MyDetector {
///     fn name(&self) -> &'static str {
///         "my-detector"
///     }
///
///     fn description(&self) -> &'static str {
///         "Detects my specific anti-pattern"
///     }
///
///     fn detect(&self, ctx: &DetectionContext) -> Vec<Finding> {
///         vec![]
///     }
/// }
/// ```
pub trait Detector: Send + Sync {
    /// Unique kebab-case identifier, also the key for per-detector config
    fn name(&self) -> &'static str;

    /// Human-readable description of what this detector finds
    fn description(&self) -> &'static str;

    /// Run detection over one unit.
    ///
    /// Detection is infallible: code the detector does not understand
    /// yields no finding for that construct.
    fn detect(&self, ctx: &DetectionContext) -> Vec<Finding>;

    /// Category of issues this detector finds
    fn category(&self) -> &'static str {
        "ml"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, Location, PatternType, Severity};
    use crate::parsers::python::parse_source;
    use std::path::Path;

    struct CountingDetector;

    impl Detector for CountingDetector {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn description(&self) -> &'static str {
            "Emits one finding per event"
        }

        fn detect(&self, ctx: &DetectionContext) -> Vec<Finding> {
            ctx.log
                .events()
                .iter()
                .map(|event| {
                    Finding::new(
                        self.name(),
                        PatternType::HardcodedThreshold,
                        Severity::Info,
                        Confidence::CERTAIN,
                        event.location(),
                        "event",
                    )
                })
                .collect()
        }
    }

    #[test]
    fn test_default_category_and_context() {
        let unit = parse_source("x = f(1)\n", Path::new("a.py")).unwrap();
        let log = crate::extract::extract(&unit, &Default::default());
        let tracker = LineageTracker::ingest(&log);
        let ctx = DetectionContext::new(&unit, &log, &tracker);

        let detector = CountingDetector;
        assert_eq!(detector.category(), "ml");
        let findings = detector.detect(&ctx);
        assert_eq!(findings.len(), log.len());
        assert!(findings.iter().all(|f| f.location >= Location::new(1, 0)));
    }
}
