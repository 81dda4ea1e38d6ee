//! Data-Leakage Detector
//!
//! Any statistic-fitting step (scaler, imputer, selector, encoder) whose
//! output, or whose fitted input, reaches a point where the data is divided
//! into train and test. That point may be a split function, a
//! cross-validation helper, or two slices of the same array.

use crate::config::{AnalyzerConfig, LeakageConfig};
use crate::detectors::base::{DetectionContext, Detector};
use crate::detectors::flow::{is_bare_call, trace_to_sinks, LeakPath, SinkKind};
use crate::extract::{CallCategory, Event, EventKind, PreprocessMethod};
use crate::models::{Confidence, Finding, PatternType, Severity};
use tracing::info;

pub struct DataLeakageDetector {
    leakage: LeakageConfig,
}

impl DataLeakageDetector {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            leakage: config.leakage.clone(),
        }
    }

    fn finding(&self, source: &Event, fitted: &str, path: &LeakPath, hops: u32) -> Finding {
        let confidence = Confidence::saturating(self.leakage.chain_confidence(hops));
        let sink = match path.kind {
            SinkKind::Split => format!("split by {}()", path.sink.callee),
            SinkKind::CrossValidation => format!("cross-validated by {}()", path.sink.callee),
            SinkKind::ManualSlice => "sliced into train and test".to_string(),
        };
        let message = format!(
            "{}() on '{}' is fitted before the data is {} at line {}",
            source.callee,
            fitted,
            sink,
            path.sink.location().line
        );

        let fix = match path.kind {
            SinkKind::CrossValidation => {
                "Put the preprocessing inside the cross-validated estimator:\n\
                 ```python\n\
                 pipe = make_pipeline(StandardScaler(), model)\n\
                 scores = cross_val_score(pipe, X, y, cv=5)\n\
                 ```"
            }
            _ => {
                "Fit on the training rows only, then transform both sides:\n\
                 ```python\n\
                 X_train, X_test = X[:n], X[n:]\n\
                 imputer.fit(X_train)\n\
                 X_train, X_test = imputer.transform(X_train), imputer.transform(X_test)\n\
                 ```"
            }
        };

        Finding::new(
            self.name(),
            PatternType::DataLeakage,
            Severity::High,
            confidence,
            source.location(),
            message,
        )
        .with_explanation(
            "Means, variances, vocabularies or selected features computed over all rows \
             include the evaluation rows. The model is then scored on data it has \
             indirectly seen.",
        )
        .with_fix(fix)
        .with_variables([fitted.to_string(), path.variable.clone()])
    }
}

impl Detector for DataLeakageDetector {
    fn name(&self) -> &'static str {
        "data-leakage"
    }

    fn description(&self) -> &'static str {
        "Detects statistic-fitting preprocessing applied before train/test separation"
    }

    fn detect(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        let max_hops = self.leakage.max_chain_hops;

        // `X_scaled = scaler.fit_transform(X)` and later divided
        let outputs = ctx.log.events().iter().filter(|e| {
            e.kind == EventKind::Assignment
                && matches!(e.category, Some(CallCategory::Preprocess(m)) if m.produces_data())
        });
        for source in outputs {
            for target in &source.targets {
                for path in trace_to_sinks(ctx.tracker, source, target, max_hops, true) {
                    findings.push(self.finding(source, target, &path, path.hops));
                }
            }
        }

        // `scaler.fit(X)` as a statement, then `X` itself is divided
        let bare_fits = ctx.log.calls().filter(|e| {
            e.category == Some(CallCategory::Preprocess(PreprocessMethod::Fit))
                && is_bare_call(ctx.tracker, e)
        });
        for fit in bare_fits {
            let Some(fitted) = fit.arguments.first() else {
                continue;
            };
            for path in trace_to_sinks(ctx.tracker, fit, fitted, max_hops, false) {
                // The estimator, not the data, carries the statistics
                findings.push(self.finding(fit, fitted, &path, path.hops + 1));
            }
        }

        info!("DataLeakageDetector found {} findings", findings.len());
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::run_detector;

    fn detect(source: &str) -> Vec<Finding> {
        run_detector(&DataLeakageDetector::new(&AnalyzerConfig::default()), source)
    }

    #[test]
    fn test_fit_transform_before_split() {
        let findings = detect(
            r#"
scaler = StandardScaler()
X_scaled = scaler.fit_transform(X)
X_train, X_test, y_train, y_test = train_test_split(X_scaled, y)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].confidence.value() >= 0.9);
        assert_eq!(findings[0].pattern_type, PatternType::DataLeakage);
        assert_eq!(findings[0].detector, "data-leakage");
    }

    #[test]
    fn test_imputer_then_selector_chain() {
        let findings = detect(
            r#"
imputer = SimpleImputer(strategy='mean')
X_imputed = imputer.fit_transform(X)
selector = SelectKBest(k=10)
X_selected = selector.fit_transform(X_imputed, y)
X_train, X_test, y_train, y_test = train_test_split(X_selected, y)
"#,
        );
        // One finding per fitted step; the earlier one sits further from the split
        assert_eq!(findings.len(), 2);
        let imputed = findings.iter().find(|f| f.location.line == 3).unwrap();
        let selected = findings.iter().find(|f| f.location.line == 5).unwrap();
        assert!(imputed.confidence < selected.confidence);
    }

    #[test]
    fn test_manual_slice_split() {
        let findings = detect(
            r#"
X_scaled = MinMaxScaler().fit_transform(X)
X_train = X_scaled[:800]
X_test = X_scaled[800:]
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("sliced"));
    }

    #[test]
    fn test_tuple_slice_split() {
        let findings = detect(
            r#"
X_scaled = StandardScaler().fit_transform(X)
X_train, X_test = X_scaled[:800], X_scaled[800:]
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].location.line, 2);
        assert!(findings[0].message.contains("sliced"));
    }

    #[test]
    fn test_cross_validation_on_preprocessed_data() {
        let findings = detect(
            r#"
X_scaled = StandardScaler().fit_transform(X)
scores = cross_val_score(model, X_scaled, y, cv=5)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("cross-validated"));
        assert!(findings[0].suggested_fix.as_deref().unwrap().contains("pipeline"));
    }

    #[test]
    fn test_bare_fit_before_split() {
        let findings = detect(
            r#"
scaler = StandardScaler()
scaler.fit(X)
X_train, X_test = train_test_split(X)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.line, 3);
        assert!((findings[0].confidence.value() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_fit_on_train_only_is_clean() {
        let findings = detect(
            r#"
X_train, X_test, y_train, y_test = train_test_split(X, y)
scaler = StandardScaler()
scaler.fit(X_train)
X_train = scaler.transform(X_train)
X_test = scaler.transform(X_test)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_function_scopes_do_not_mix() {
        let findings = detect(
            r#"
def prepare(X):
    X_scaled = StandardScaler().fit_transform(X)
    return X_scaled

def evaluate(X_scaled, y):
    return train_test_split(X_scaled, y)
"#,
        );
        assert!(findings.is_empty());
    }
}
