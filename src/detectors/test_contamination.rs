//! Test-Set-Contamination Detector
//!
//! Four independent checks over one unit:
//! - preprocessing output that reaches a split call (fit before split)
//! - split outputs with no train/test overlap check anywhere
//! - an overlap check that is present, surfaced as contamination evidence
//! - negative temporal shifts and centered rolling windows (future leakage)

use crate::config::{AnalyzerConfig, LeakageConfig, TemporalConfig};
use crate::detectors::base::{DetectionContext, Detector};
use crate::detectors::flow::{trace_to_sinks, SinkKind};
use crate::extract::{CallCategory, Event, EventKind, KeywordArg};
use crate::lineage::{LineageTracker, SplitSide};
use crate::models::{Confidence, Finding, PatternType, Severity};
use std::collections::BTreeSet;
use tracing::{debug, info};

pub struct TestSetContaminationDetector {
    leakage: LeakageConfig,
    temporal: TemporalConfig,
}

impl TestSetContaminationDetector {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            leakage: config.leakage.clone(),
            temporal: config.temporal.clone(),
        }
    }

    fn preprocessing_before_split(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        let sources = ctx.log.events().iter().filter(|e| {
            e.kind == EventKind::Assignment
                && matches!(e.category, Some(CallCategory::Preprocess(m)) if m.produces_data())
        });

        for source in sources {
            for target in &source.targets {
                let paths = trace_to_sinks(
                    ctx.tracker,
                    source,
                    target,
                    self.leakage.max_chain_hops,
                    true,
                );
                for path in paths {
                    if path.kind != SinkKind::Split || !ctx.tracker.precedes(source, path.sink) {
                        continue;
                    }
                    let confidence = Confidence::saturating(self.leakage.chain_confidence(path.hops));
                    let via = if path.hops == 1 {
                        String::new()
                    } else {
                        format!(" through '{}' ({} hops)", path.variable, path.hops)
                    };
                    findings.push(
                        Finding::new(
                            self.name(),
                            PatternType::PreprocessingBeforeSplit,
                            Severity::High,
                            confidence,
                            source.location(),
                            format!(
                                "'{}' from {}() reaches {}() at line {}{}",
                                target,
                                source.callee,
                                path.sink.callee,
                                path.sink.location().line,
                                via
                            ),
                        )
                        .with_explanation(
                            "The preprocessing step is fitted on the full dataset before it is \
                             split, so statistics computed from test rows leak into training and \
                             the evaluation score is optimistic.",
                        )
                        .with_fix(
                            "Split first, then fit on the training portion only:\n\
                             ```python\n\
                             X_train, X_test, y_train, y_test = train_test_split(X, y)\n\
                             X_train = scaler.fit_transform(X_train)\n\
                             X_test = scaler.transform(X_test)\n\
                             ```",
                        )
                        .with_variables([target.clone(), path.variable.clone()]),
                    );
                }
            }
        }
        findings
    }

    fn duplicate_checks(&self, ctx: &DetectionContext) -> Vec<Finding> {
        if ctx.tracker.split_variables().is_empty() {
            return Vec::new();
        }

        let mut findings = Vec::new();
        for check in ctx.log.calls().filter(|e| e.category == Some(CallCategory::SetIntersection)) {
            let Some(names) = both_sides(ctx.tracker, check) else {
                debug!(
                    "Intersection at line {} does not reach both split sides",
                    check.location().line
                );
                continue;
            };
            let listed = names.iter().cloned().collect::<Vec<_>>().join(", ");
            findings.push(
                Finding::new(
                    self.name(),
                    PatternType::DuplicateContamination,
                    Severity::Medium,
                    Confidence::fixed(0.7),
                    check.location(),
                    format!("Train/test overlap check on {listed}"),
                )
                .with_explanation(
                    "An explicit intersection between train and test data suggests duplicated \
                     samples were suspected or found. Rows present on both sides inflate the \
                     evaluation score.",
                )
                .with_fix(
                    "Deduplicate before splitting, or split by group:\n\
                     ```python\n\
                     df = df.drop_duplicates()\n\
                     X_train, X_test = train_test_split(df, test_size=0.2)\n\
                     ```",
                )
                .with_variables(names),
            );
        }

        if findings.is_empty() {
            let first_split = ctx
                .log
                .calls()
                .filter(|e| e.category == Some(CallCategory::Split))
                .min_by_key(|e| (e.location(), e.id));
            if let Some(split) = first_split {
                let split_names: Vec<String> = ctx
                    .tracker
                    .split_variables()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                findings.push(
                    Finding::new(
                        self.name(),
                        PatternType::MissingDuplicateCheck,
                        Severity::Low,
                        Confidence::fixed(0.4),
                        split.location(),
                        format!("No duplicate check between split outputs of {}()", split.callee),
                    )
                    .with_explanation(
                        "Nothing in this file verifies that training and test samples are \
                         disjoint. Duplicated rows end up on both sides of the split.",
                    )
                    .with_fix(
                        "Check the overlap explicitly:\n\
                         ```python\n\
                         overlap = set(X_train.index).intersection(X_test.index)\n\
                         assert not overlap\n\
                         ```",
                    )
                    .with_variables(split_names),
                );
            }
        }
        findings
    }

    fn future_leakage(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = Vec::new();

        for shift in ctx.log.calls().filter(|e| e.category == Some(CallCategory::TemporalShift)) {
            let Some(offset) = shift_offset(shift) else {
                continue;
            };
            if offset >= 0 {
                continue;
            }
            let magnitude = offset.unsigned_abs();
            let severity = self.temporal.severity_for(magnitude);
            let confidence = Confidence::saturating(0.55 + 0.1 * magnitude as f64);
            let subject = shift.receiver.clone().unwrap_or_else(|| shift.callee.clone());
            findings.push(
                Finding::new(
                    self.name(),
                    PatternType::FutureLeakage,
                    severity,
                    confidence,
                    shift.location(),
                    format!("shift({offset}) on '{subject}' reads {magnitude} period(s) ahead"),
                )
                .with_explanation(
                    "A negative shift pulls values from future rows into the current one. \
                     Features built this way are unavailable at prediction time.",
                )
                .with_fix(
                    "Shift with a positive offset to build lagged features:\n\
                     ```python\n\
                     df['lag_1'] = df['value'].shift(1)\n\
                     ```",
                )
                .with_variables([subject]),
            );
        }

        for rolling in ctx.log.calls().filter(|e| e.category == Some(CallCategory::RollingWindow)) {
            let centered = rolling
                .keyword("center")
                .and_then(KeywordArg::literal)
                .is_some_and(|lit| lit.is_true());
            if !centered {
                continue;
            }
            let subject = rolling.receiver.clone().unwrap_or_else(|| rolling.callee.clone());
            findings.push(
                Finding::new(
                    self.name(),
                    PatternType::FutureLeakage,
                    Severity::Medium,
                    Confidence::fixed(0.7),
                    rolling.location(),
                    format!("Centered rolling window on '{subject}' includes future rows"),
                )
                .with_explanation(
                    "With center=True each window spans rows after the current one, \
                     so the aggregate sees the future.",
                )
                .with_fix("Use a trailing window: `df['v'].rolling(window=7).mean()`")
                .with_variables([subject]),
            );
        }
        findings
    }
}

/// Offset of a `shift(...)` call from its first positional literal or `periods=`
fn shift_offset(shift: &Event) -> Option<i64> {
    shift
        .literals
        .first()
        .and_then(|lit| lit.as_i64())
        .or_else(|| {
            shift
                .keyword("periods")
                .and_then(KeywordArg::literal)
                .and_then(|lit| lit.as_i64())
        })
}

/// Split outputs reachable from an intersection, when both sides are present
fn both_sides(tracker: &LineageTracker, check: &Event) -> Option<BTreeSet<String>> {
    let scope = check.scope.as_deref();
    let mut reached = BTreeSet::new();
    let mut sides = BTreeSet::new();

    let names = check.receiver.iter().chain(&check.references);
    for name in names {
        for ancestor in tracker.ancestors(scope, name, check.location()) {
            let side = tracker
                .split_side(scope, &ancestor)
                .or_else(|| tracker.split_side(None, &ancestor));
            if let Some(side) = side {
                sides.insert(matches!(side, SplitSide::Train));
                reached.insert(ancestor);
            }
        }
    }
    (sides.len() == 2).then_some(reached)
}

impl Detector for TestSetContaminationDetector {
    fn name(&self) -> &'static str {
        "test-set-contamination"
    }

    fn description(&self) -> &'static str {
        "Detects preprocessing before split, train/test overlap and future leakage"
    }

    fn detect(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = self.preprocessing_before_split(ctx);
        findings.extend(self.duplicate_checks(ctx));
        findings.extend(self.future_leakage(ctx));

        info!("TestSetContaminationDetector found {} findings", findings.len());
        findings
    }
}
