//! Hardcoded-Threshold Detector
//!
//! Numeric literals used as comparison operands or constructor keyword
//! arguments, either inline or through a lowercase binding. Values bound to
//! UPPERCASE names, read from configuration, or derived from math-library
//! constants are considered documented.

use crate::config::{AnalyzerConfig, ThresholdConfig};
use crate::detectors::base::{DetectionContext, Detector};
use crate::extract::{ArgValue, Event, EventId, EventKind, Literal, ValueKind};
use crate::lineage::LineageTracker;
use crate::models::{Confidence, Finding, Location, PatternType, Severity};
use regex::Regex;
use rustc_hash::FxHashSet;
use std::sync::OnceLock;
use tracing::{debug, info};

static NAMED_CONSTANT: OnceLock<Regex> = OnceLock::new();

fn named_constant() -> &'static Regex {
    NAMED_CONSTANT.get_or_init(|| Regex::new(r"^_*[A-Z][A-Z0-9_]*$").expect("valid regex"))
}

/// `MAX_DEPTH`, `self.THRESHOLD`, `_LIMIT`
fn is_named_constant(name: &str) -> bool {
    named_constant().is_match(name.rsplit('.').next().unwrap_or(name))
}

/// What an identifier operand turns out to be bound to
enum Binding<'a> {
    Literal { def: &'a Event, literal: &'a Literal },
    NamedConstant,
    Configured,
    Computed,
    Unresolved,
}

pub struct HardcodedThresholdDetector {
    thresholds: ThresholdConfig,
}

impl HardcodedThresholdDetector {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
        }
    }

    fn resolve<'a>(
        &self,
        tracker: &LineageTracker<'a>,
        scope: Option<&str>,
        name: &str,
        at: Location,
    ) -> Binding<'a> {
        if is_named_constant(name) {
            return Binding::NamedConstant;
        }
        let Some(def) = tracker.reaching_definition(scope, name, at) else {
            return Binding::Unresolved;
        };
        if def.value == Some(ValueKind::Literal) {
            return match def.literals.first() {
                Some(literal) if literal.is_numeric() => Binding::Literal { def, literal },
                _ => Binding::Computed,
            };
        }
        if self.is_configured(def) {
            return Binding::Configured;
        }
        Binding::Computed
    }

    /// `config.get(...)`, `args.lr`, `os.environ[...]`
    fn is_configured(&self, def: &Event) -> bool {
        def.receiver.iter().chain(&def.references).any(|name| {
            self.thresholds.config_roots.iter().any(|root| {
                name == root
                    || name
                        .strip_prefix(root.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
        })
    }

    fn reportable(&self, literal: &Literal) -> bool {
        literal
            .as_f64()
            .is_some_and(|value| !self.thresholds.is_idiomatic(value))
    }

    fn is_high_precision(&self, literal: &Literal) -> bool {
        literal.significant_digits() > self.thresholds.significant_digits
    }

    fn confidence(&self, literal: &Literal, direct: bool) -> Confidence {
        let base = if direct { 0.6 } else { 0.5 };
        let boost = if self.is_high_precision(literal) { 0.25 } else { 0.0 };
        Confidence::saturating(base + boost)
    }

    fn is_constructor(&self, call: &Event) -> bool {
        let class = call.method();
        call.kind == EventKind::Call
            && class.chars().next().is_some_and(char::is_uppercase)
            && !self
                .thresholds
                .config_roots
                .iter()
                .any(|root| root.eq_ignore_ascii_case(class))
    }

    fn is_math_constant(&self, event: &Event) -> bool {
        event.kind == EventKind::AttributeAccess
            && self
                .thresholds
                .math_constants
                .iter()
                .any(|constant| constant == event.method())
    }

    fn finding(
        &self,
        severity: Severity,
        literal: &Literal,
        direct: bool,
        location: Location,
        message: String,
    ) -> Finding {
        let precision = if self.is_high_precision(literal) {
            format!(
                " It has {} significant digits, which suggests a tuned value.",
                literal.significant_digits()
            )
        } else {
            String::new()
        };
        Finding::new(
            self.name(),
            PatternType::HardcodedThreshold,
            severity,
            self.confidence(literal, direct),
            location,
            message,
        )
        .with_explanation(format!(
            "The literal {} carries no name explaining where it came from or when it may \
             change.{}",
            literal.raw, precision
        ))
        .with_fix(
            "Name the value or read it from configuration:\n\
             ```python\n\
             DECISION_THRESHOLD = 0.73  # chosen on validation set, see experiment log\n\
             if score > DECISION_THRESHOLD:\n\
             ```",
        )
    }
}

impl Detector for HardcodedThresholdDetector {
    fn name(&self) -> &'static str {
        "hardcoded-threshold"
    }

    fn description(&self) -> &'static str {
        "Detects unexplained numeric thresholds and hyperparameters"
    }

    fn detect(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut reported: FxHashSet<EventId> = FxHashSet::default();
        let math_names: FxHashSet<&str> = ctx
            .log
            .events()
            .iter()
            .filter(|e| self.is_math_constant(e))
            .map(|e| e.callee.as_str())
            .collect();

        // ─── Comparison operands ────────────────────────────────────────────
        for cmp in ctx.log.events().iter().filter(|e| e.kind == EventKind::Comparison) {
            for literal in cmp.literals.iter().filter(|lit| self.reportable(lit)) {
                findings.push(self.finding(
                    Severity::Medium,
                    literal,
                    true,
                    literal.location,
                    format!("Hardcoded threshold {} in '{}' comparison", literal.raw, cmp.callee),
                ));
            }
            for name in &cmp.arguments {
                if math_names.contains(name.as_str()) {
                    debug!("Skipping math constant {} at line {}", name, cmp.location().line);
                    continue;
                }
                let scope = cmp.scope.as_deref();
                if let Binding::Literal { def, literal } =
                    self.resolve(ctx.tracker, scope, name, cmp.location())
                {
                    if self.reportable(literal) && reported.insert(def.id) {
                        findings.push(
                            self.finding(
                                Severity::Medium,
                                literal,
                                false,
                                def.location(),
                                format!(
                                    "'{}' = {} is used as a threshold at line {}",
                                    name,
                                    literal.raw,
                                    cmp.location().line
                                ),
                            )
                            .with_variables([name.clone()]),
                        );
                    }
                }
            }
        }

        // ─── Constructor keyword arguments ──────────────────────────────────
        for call in ctx.log.calls().filter(|e| self.is_constructor(e)) {
            let class = call.method();
            for keyword in &call.keywords {
                if self.thresholds.ignored_keywords.contains(&keyword.name) {
                    continue;
                }
                match &keyword.value {
                    ArgValue::Literal(literal) if self.reportable(literal) => {
                        let severity = if self.is_high_precision(literal) {
                            Severity::Medium
                        } else {
                            Severity::Low
                        };
                        findings.push(
                            self.finding(
                                severity,
                                literal,
                                true,
                                literal.location,
                                format!("{}({}={}) is hardcoded", class, keyword.name, literal.raw),
                            )
                            .with_variables([keyword.name.clone()]),
                        );
                    }
                    ArgValue::Identifier(name) => {
                        let binding =
                            self.resolve(ctx.tracker, call.scope.as_deref(), name, call.location());
                        match binding {
                            Binding::Literal { def, literal }
                                if self.reportable(literal) && reported.insert(def.id) =>
                            {
                                let severity = if self.is_high_precision(literal) {
                                    Severity::Medium
                                } else {
                                    Severity::Low
                                };
                                findings.push(
                                    self.finding(
                                        severity,
                                        literal,
                                        false,
                                        def.location(),
                                        format!(
                                            "'{}' = {} feeds {}({}=...) at line {}",
                                            name,
                                            literal.raw,
                                            class,
                                            keyword.name,
                                            call.location().line
                                        ),
                                    )
                                    .with_variables([name.clone(), keyword.name.clone()]),
                                );
                            }
                            Binding::NamedConstant | Binding::Configured => {
                                debug!("{}={} is documented", keyword.name, name);
                            }
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
        }

        // ─── High-precision bindings never used at a site ───────────────────
        for binding in ctx.log.events().iter().filter(|e| {
            e.kind == EventKind::Assignment && e.value == Some(ValueKind::Literal)
        }) {
            let (Some(name), Some(literal)) = (binding.target(), binding.literals.first()) else {
                continue;
            };
            if is_named_constant(name)
                || reported.contains(&binding.id)
                || !self.reportable(literal)
                || !self.is_high_precision(literal)
            {
                continue;
            }
            findings.push(
                Finding::new(
                    self.name(),
                    PatternType::HardcodedThreshold,
                    Severity::Low,
                    self.confidence(literal, false),
                    binding.location(),
                    format!("High-precision literal {} bound to '{}'", literal.raw, name),
                )
                .with_explanation(format!(
                    "{} significant digits point to a tuned value; a lowercase name does not \
                     say where it came from.",
                    literal.significant_digits()
                ))
                .with_fix(format!(
                    "Promote it to a documented constant: `{} = {}`",
                    name.to_ascii_uppercase(),
                    literal.raw
                ))
                .with_variables([name.to_string()]),
            );
        }

        info!("HardcodedThresholdDetector found {} findings", findings.len());
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::run_detector;

    fn detect(source: &str) -> Vec<Finding> {
        run_detector(&HardcodedThresholdDetector::new(&AnalyzerConfig::default()), source)
    }

    #[test]
    fn test_named_constant_pattern() {
        assert!(is_named_constant("DEFAULT_N_ESTIMATORS"));
        assert!(is_named_constant("self.THRESHOLD"));
        assert!(is_named_constant("_LIMIT2"));
        assert!(!is_named_constant("threshold"));
        assert!(!is_named_constant("MaxDepth"));
    }

    #[test]
    fn test_constructor_keyword_literals() {
        let findings = detect(
            r#"
model1 = RandomForestClassifier(
    n_estimators=147,
    max_depth=23,
    random_state=42,
)
model2 = SVC(C=0.7382947, probability=True)
"#,
        );
        assert_eq!(findings.len(), 3);
        let estimators = findings.iter().find(|f| f.message.contains("147")).unwrap();
        assert_eq!(estimators.severity, Severity::Low);
        assert_eq!(estimators.location.line, 3);
        assert!((estimators.confidence.value() - 0.6).abs() < 1e-9);

        let c = findings.iter().find(|f| f.message.contains("0.7382947")).unwrap();
        assert_eq!(c.severity, Severity::Medium);
        assert!((c.confidence.value() - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_named_constant_is_not_flagged() {
        let findings = detect(
            r#"
DEFAULT_N_ESTIMATORS = 147
model = RandomForestClassifier(n_estimators=DEFAULT_N_ESTIMATORS)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_comparison_thresholds() {
        let findings = detect(
            r#"
threshold = 0.73625
y_pred = (y_proba >= threshold).astype(int)
if y_proba.max() > 0.9847:
    confidence = "high"
if y_proba.max() > threshold:
    pass
"#,
        );
        assert_eq!(findings.len(), 2);
        let binding = findings.iter().find(|f| f.location.line == 2).unwrap();
        assert_eq!(binding.severity, Severity::Medium);
        assert!((binding.confidence.value() - 0.75).abs() < 1e-9);
        let inline = findings.iter().find(|f| f.location.line == 4).unwrap();
        assert_eq!(inline.severity, Severity::Medium);
        assert!((inline.confidence.value() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_idiomatic_and_math_values_are_excluded() {
        let findings = detect(
            r#"
import math
if len(items) > 0:
    pass
if ratio == 0.5 or count >= 100:
    pass
if angle > 2 * math.pi:
    pass
if angle < math.tau - 100:
    pass
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_math_constant_does_not_hide_other_literals() {
        let findings = detect(
            r#"
import math
if score > 0.7382947 * math.pi:
    pass
if angle > 2 * math.pi + 0.25:
    pass
"#,
        );
        let raws: Vec<(u32, Severity)> = findings
            .iter()
            .map(|f| (f.location.line, f.severity))
            .collect();
        assert_eq!(raws, vec![(3, Severity::Medium), (5, Severity::Medium)]);
        assert!(findings[0].message.contains("0.7382947"));
        assert!(findings[1].message.contains("0.25"));
        assert!(findings.iter().all(|f| !f.message.contains("math.")));
    }

    #[test]
    fn test_configuration_sources_are_clean() {
        let findings = detect(
            r#"
import config
LEARNING_RATE = config.get('learning_rate', 0.001)
limit = config.training.limit
if score > limit:
    pass
model = GradientBoostingClassifier(learning_rate=LEARNING_RATE, max_depth=cfg.depth)
settings = Config(alpha=0.37)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_unused_high_precision_binding() {
        let findings = detect(
            r#"
learning_rate = 0.00734829
batch_size = 847
timeout = 3847.25
"#,
        );
        let lines: Vec<u32> = findings.iter().map(|f| f.location.line).collect();
        assert_eq!(lines, vec![2, 4]);
        assert!(findings.iter().all(|f| f.severity == Severity::Low));
    }
}
