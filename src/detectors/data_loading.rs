//! Inefficient-Data-Loading Detector
//!
//! Flags:
//! - `for i in range(len(df))` with `df.iloc[i]`-style row access (High)
//! - iteration over `iterrows()` / `itertuples()` (Medium)
//! - loaders called without `chunksize` when the unit never chunks that loader (Medium)
//! - loaders called without dtype or column selection (Low)

use crate::config::{AnalyzerConfig, DataLoadingConfig};
use crate::detectors::base::{DetectionContext, Detector};
use crate::extract::{CallCategory, Event, EventKind, LoopScope, ROW_ACCESSORS};
use crate::models::{Confidence, Finding, PatternType, Severity};
use rustc_hash::FxHashSet;
use tracing::{debug, info};

pub struct InefficientDataLoadingDetector {
    loading: DataLoadingConfig,
}

impl InefficientDataLoadingDetector {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            loading: config.data_loading.clone(),
        }
    }

    fn is_row_access(event: &Event, frame: &str, scope: &LoopScope) -> bool {
        event.kind == EventKind::AttributeAccess
            && ROW_ACCESSORS.contains(&event.method())
            && event.receiver.as_deref() == Some(frame)
            && scope
                .targets
                .iter()
                .any(|t| event.arguments.contains(t) || event.references.contains(t))
    }

    fn index_iteration(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        for scope in ctx.log.loops() {
            let Some(frame) = scope.index_over.as_deref() else {
                continue;
            };
            let Some(access) = ctx
                .log
                .in_loop(scope.id)
                .find(|e| Self::is_row_access(e, frame, scope))
            else {
                debug!("range(len({})) loop at line {} has no row access", frame, scope.span.start.line);
                continue;
            };
            findings.push(
                Finding::new(
                    self.name(),
                    PatternType::RowWiseIteration,
                    Severity::High,
                    Confidence::fixed(0.85),
                    scope.span.start,
                    format!(
                        "Loop indexes '{}' row by row via {} over range(len({}))",
                        frame,
                        access.callee,
                        frame
                    ),
                )
                .with_explanation(
                    "Each positional row lookup builds a new Series, so the loop runs orders of \
                     magnitude slower than a vectorized column operation.",
                )
                .with_fix(
                    "Operate on whole columns:\n\
                     ```python\n\
                     df['total'] = df['price'] * df['quantity']\n\
                     ```",
                )
                .with_variables([frame.to_string()]),
            );
        }

        let iterables: Vec<_> = ctx.log.loops().iter().filter_map(|l| l.iterable).collect();
        for call in ctx.log.calls().filter(|e| e.category == Some(CallCategory::RowIteration)) {
            if !iterables.iter().any(|span| span.contains(&call.span)) {
                continue;
            }
            findings.push(
                Finding::new(
                    self.name(),
                    PatternType::RowWiseIteration,
                    Severity::Medium,
                    Confidence::fixed(0.75),
                    call.location(),
                    format!("Row-wise iteration with {}()", call.callee),
                )
                .with_explanation(
                    "Python-level iteration over rows gives up the columnar execution that makes \
                     DataFrame operations fast.",
                )
                .with_fix(
                    "Use vectorized operations or `df.apply(func, axis=1)` as a last resort:\n\
                     ```python\n\
                     df['ratio'] = df['a'] / df['b']\n\
                     ```",
                )
                .with_variables(call.receiver.clone()),
            );
        }
        findings
    }

    fn is_chunked(&self, call: &Event) -> bool {
        call.has_any_keyword(&self.loading.chunk_params)
    }

    fn unchunked_loads(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let loads: Vec<&Event> = ctx
            .log
            .calls()
            .filter(|e| e.category == Some(CallCategory::TabularLoad))
            .collect();
        let chunked_families: FxHashSet<&str> = loads
            .iter()
            .filter(|e| self.is_chunked(e))
            .map(|e| e.method())
            .collect();

        let mut findings = Vec::new();
        for &call in &loads {
            let family = call.method();
            if !self.loading.chunkable_loaders.iter().any(|l| l == family)
                || self.is_chunked(call)
                || chunked_families.contains(family)
            {
                continue;
            }
            findings.push(
                Finding::new(
                    self.name(),
                    PatternType::UnchunkedLoad,
                    Severity::Medium,
                    Confidence::fixed(0.6),
                    call.location(),
                    format!("{}() loads the whole file into memory at once", call.callee),
                )
                .with_explanation(
                    "Without chunking the full table must fit in memory, which fails or swaps \
                     once the input grows.",
                )
                .with_fix(format!(
                    "Stream the file in chunks:\n\
                     ```python\n\
                     for chunk in {}(path, chunksize=10_000):\n    process(chunk)\n\
                     ```",
                    call.callee
                )),
            );
        }
        findings
    }

    fn missing_selection(&self, ctx: &DetectionContext) -> Vec<Finding> {
        ctx.log
            .calls()
            .filter(|e| e.category == Some(CallCategory::TabularLoad))
            .filter(|e| !self.is_chunked(e) && !e.has_any_keyword(&self.loading.selection_params))
            .map(|call| {
                Finding::new(
                    self.name(),
                    PatternType::MissingDtype,
                    Severity::Low,
                    Confidence::fixed(0.5),
                    call.location(),
                    format!("{}() without dtype or column selection", call.callee),
                )
                .with_explanation(
                    "Type inference defaults to 64-bit numbers and object strings, and every \
                     column is read even when only a few are used.",
                )
                .with_fix(
                    "Declare what you need:\n\
                     ```python\n\
                     df = pd.read_csv(path, usecols=['id', 'price'], dtype={'price': 'float32'})\n\
                     ```",
                )
            })
            .collect()
    }
}

impl Detector for InefficientDataLoadingDetector {
    fn name(&self) -> &'static str {
        "inefficient-data-loading"
    }

    fn description(&self) -> &'static str {
        "Detects row-wise DataFrame loops and unbounded tabular loads"
    }

    fn detect(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = self.index_iteration(ctx);
        findings.extend(self.unchunked_loads(ctx));
        findings.extend(self.missing_selection(ctx));

        info!("InefficientDataLoadingDetector found {} findings", findings.len());
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::run_detector;

    fn detect(source: &str) -> Vec<Finding> {
        run_detector(&InefficientDataLoadingDetector::new(&AnalyzerConfig::default()), source)
    }

    fn of(findings: &[Finding], pattern: PatternType) -> Vec<&Finding> {
        findings.iter().filter(|f| f.pattern_type == pattern).collect()
    }

    #[test]
    fn test_range_len_with_iloc() {
        let findings = detect(
            r#"
def slow_processing(df):
    results = []
    for i in range(len(df)):
        row = df.iloc[i]
        value = df.loc[i, 'price'] * 2
        results.append(row['value'] * 2)
    return results
"#,
        );
        let rows = of(&findings, PatternType::RowWiseIteration);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].severity, Severity::High);
        assert_eq!(rows[0].location.line, 4);
    }

    #[test]
    fn test_range_len_without_row_access_is_clean() {
        let findings = detect(
            r#"
for i in range(len(df)):
    print(i)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_iterrows_loop() {
        let findings = detect(
            r#"
for idx, row in df.iterrows():
    total += row['a']
rows = list(df.itertuples())
"#,
        );
        let rows = of(&findings, PatternType::RowWiseIteration);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].severity, Severity::Medium);
        assert_eq!(rows[0].location.line, 2);
    }

    #[test]
    fn test_chunked_load_in_loop_is_clean() {
        let findings = detect(
            r#"
for chunk in pd.read_csv("f.csv", chunksize=10000):
    process(chunk)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_unchunked_load() {
        let findings = detect("df = pd.read_csv('large_file.csv')\n");
        assert_eq!(of(&findings, PatternType::UnchunkedLoad).len(), 1);
        assert_eq!(of(&findings, PatternType::MissingDtype).len(), 1);
        let medium = findings.iter().filter(|f| f.severity == Severity::Medium).count();
        assert_eq!(medium, 1);
    }

    #[test]
    fn test_chunking_elsewhere_covers_the_family() {
        let findings = detect(
            r#"
small = pd.read_csv('lookup.csv', usecols=['id'])
for chunk in pd.read_csv('events.csv', chunksize=5000):
    handle(chunk)
"#,
        );
        assert!(of(&findings, PatternType::UnchunkedLoad).is_empty());
        assert!(of(&findings, PatternType::MissingDtype).is_empty());
    }

    #[test]
    fn test_parquet_is_not_chunkable() {
        let findings = detect("df = pd.read_parquet('x.parquet', columns=['a'])\n");
        assert!(findings.is_empty());
    }
}
