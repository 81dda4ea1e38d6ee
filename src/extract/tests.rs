use super::*;
use crate::config::AnalyzerConfig;
use crate::parsers::python::parse_source;
use std::path::Path;

fn log_for(source: &str) -> EventLog {
    let unit = parse_source(source, Path::new("pipeline.py")).unwrap();
    extract(&unit, &AnalyzerConfig::default())
}

fn assignment_to<'a>(log: &'a EventLog, name: &str) -> &'a Event {
    log.events()
        .iter()
        .find(|e| e.kind == EventKind::Assignment && e.defines(name))
        .unwrap_or_else(|| panic!("no assignment to {name}"))
}

fn call_named<'a>(log: &'a EventLog, method: &str) -> &'a Event {
    log.calls()
        .find(|e| e.method() == method)
        .unwrap_or_else(|| panic!("no call to {method}"))
}

#[test]
fn test_empty_unit_has_no_events() {
    let log = log_for("");
    assert!(log.is_empty());
    assert!(log.loops().is_empty());
}

#[test]
fn test_preprocessing_and_split_are_tagged() {
    let log = log_for(
        r#"
from sklearn.preprocessing import StandardScaler
from sklearn.model_selection import train_test_split

scaler = StandardScaler()
X_scaled = scaler.fit_transform(X)
X_train, X_test, y_train, y_test = train_test_split(X_scaled, y, test_size=0.2)
"#,
    );

    let scaled = assignment_to(&log, "X_scaled");
    assert_eq!(
        scaled.category,
        Some(CallCategory::Preprocess(PreprocessMethod::FitTransform))
    );
    assert_eq!(scaled.callee, "scaler.fit_transform");
    assert_eq!(scaled.location().line, 6);

    let split = assignment_to(&log, "X_train");
    assert_eq!(split.category, Some(CallCategory::Split));
    assert_eq!(split.targets, vec!["X_train", "X_test", "y_train", "y_test"]);

    let call = call_named(&log, "train_test_split");
    assert_eq!(call.category, Some(CallCategory::Split));
    assert_eq!(call.arguments, vec!["X_scaled", "y"]);
    let test_size = call.keyword("test_size").and_then(KeywordArg::literal).unwrap();
    assert_eq!(test_size.as_f64(), Some(0.2));

    // Untracked receivers never match a preprocessing method
    let log = log_for("model.fit(X, y)\npreds = model.transform(X)\n");
    assert!(log.events().iter().all(|e| e.category.is_none()));
}

#[test]
fn test_inline_constructor_and_method_chain() {
    let log = log_for("X_s = StandardScaler().fit_transform(X).astype('float32')\n");
    let scaled = assignment_to(&log, "X_s");
    assert_eq!(
        scaled.category,
        Some(CallCategory::Preprocess(PreprocessMethod::FitTransform))
    );
    assert_eq!(scaled.callee, "StandardScaler.fit_transform");
}

#[test]
fn test_class_qualified_split_in_for_header() {
    let log = log_for(
        r#"
tscv = TimeSeriesSplit(n_splits=5)
for train_idx, test_idx in tscv.split(X):
    pass
parts = line.split(",")
"#,
    );

    let split = assignment_to(&log, "train_idx");
    assert_eq!(split.category, Some(CallCategory::Split));
    assert_eq!(split.targets, vec!["train_idx", "test_idx"]);

    let string_split = assignment_to(&log, "parts");
    assert_eq!(string_split.category, None);
}

#[test]
fn test_shift_records_offset() {
    let log = log_for(
        r#"
df['target'] = df['value'].shift(-1)
lagged = df['value'].shift(periods=-3)
"#,
    );

    let mutation = log
        .events()
        .iter()
        .find(|e| e.kind == EventKind::Assignment && e.mutates == vec!["df"])
        .unwrap();
    assert!(mutation.targets.is_empty());
    assert_eq!(mutation.category, Some(CallCategory::TemporalShift));

    let shifts: Vec<_> = log.with_category(CallCategory::TemporalShift)
        .filter(|e| e.kind == EventKind::Call)
        .collect();
    assert_eq!(shifts.len(), 2);
    assert_eq!(shifts[0].callee, "df.shift");
    assert_eq!(shifts[0].receiver.as_deref(), Some("df"));
    assert_eq!(shifts[0].literals[0].as_i64(), Some(-1));
    assert_eq!(shifts[0].literals[0].raw, "-1");
    let periods = shifts[1].keyword("periods").and_then(KeywordArg::literal).unwrap();
    assert_eq!(periods.as_i64(), Some(-3));
}

#[test]
fn test_loops_and_membership() {
    let log = log_for(
        r#"
for epoch in range(10):
    for batch in loader:
        x = batch.cuda()
    torch.cuda.empty_cache()
"#,
    );

    assert_eq!(log.loops().len(), 2);
    assert_eq!(log.loops()[0].parent, None);
    assert_eq!(log.loops()[1].parent, Some(0));
    assert_eq!(log.loops()[0].targets, vec!["epoch"]);

    let transfer = call_named(&log, "cuda");
    assert_eq!(transfer.category, Some(CallCategory::DeviceTransfer));
    assert_eq!(transfer.loops, vec![0, 1]);

    let clear = call_named(&log, "empty_cache");
    assert_eq!(clear.category, Some(CallCategory::CacheClear));
    assert_eq!(clear.receiver.as_deref(), Some("torch.cuda"));
    assert_eq!(clear.loops, vec![0]);

    // The iterable is outside the loop body
    assert!(call_named(&log, "range").loops.is_empty());
    assert_eq!(log.in_loop(1).count(), 2);
}

#[test]
fn test_row_access_inside_range_len_loop() {
    let log = log_for(
        r#"
for i in range(len(df)):
    row = df.iloc[i]
    df.loc[i, 'processed'] = row['value'] * 2
"#,
    );

    assert_eq!(log.loops()[0].index_over.as_deref(), Some("df"));

    let accesses: Vec<_> = log
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::AttributeAccess)
        .collect();
    assert_eq!(accesses.len(), 2);
    assert_eq!(accesses[0].callee, "df.iloc");
    assert_eq!(accesses[0].receiver.as_deref(), Some("df"));
    assert_eq!(accesses[0].arguments, vec!["i"]);
    assert_eq!(accesses[1].callee, "df.loc");
    assert!(accesses.iter().all(|e| e.in_loop(0)));
}

#[test]
fn test_comparisons_and_math_constants() {
    let log = log_for(
        r#"
import math
if y_proba.max() > 0.9847:
    pass
if angle > 2 * math.pi:
    pass
"#,
    );

    let comparisons: Vec<_> = log
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::Comparison)
        .collect();
    assert_eq!(comparisons.len(), 2);
    assert_eq!(comparisons[0].callee, ">");
    assert_eq!(comparisons[0].literals[0].as_f64(), Some(0.9847));
    assert_eq!(comparisons[1].arguments, vec!["angle"]);
    assert_eq!(comparisons[1].literals[0].as_i64(), Some(2));

    let pi = log
        .events()
        .iter()
        .find(|e| e.kind == EventKind::AttributeAccess)
        .unwrap();
    assert_eq!(pi.callee, "math.pi");
    assert!(comparisons[1].span.contains(&pi.span));
}

#[test]
fn test_numpy_alias_is_a_math_root() {
    let log = log_for("import numpy as np\nlimit = np.e\n");
    assert!(log
        .events()
        .iter()
        .any(|e| e.kind == EventKind::AttributeAccess && e.callee == "np.e"));
}

#[test]
fn test_scopes_are_qualified() {
    let log = log_for(
        r#"
X = 1

def train():
    X = load()

class Trainer:
    def fit(self):
        self.model = build()
"#,
    );

    let scopes: Vec<_> = log
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::Assignment)
        .map(|e| e.scope.clone())
        .collect();
    assert_eq!(
        scopes,
        vec![None, Some("train".to_string()), Some("Trainer.fit".to_string())]
    );
    assert_eq!(assignment_to(&log, "self.model").value, Some(ValueKind::Call));
}

#[test]
fn test_literals_and_augmented_assignment() {
    let log = log_for(
        r#"
threshold = -0.5
big = 1_000
total_loss += loss
"#,
    );

    let threshold = assignment_to(&log, "threshold");
    assert_eq!(threshold.value, Some(ValueKind::Literal));
    assert_eq!(threshold.literals[0].raw, "-0.5");
    assert_eq!(threshold.literals[0].value, LiteralValue::Float(-0.5));
    assert_eq!(assignment_to(&log, "big").literals[0].value, LiteralValue::Int(1000));

    let accumulate = log.events().iter().find(|e| e.is_augmented()).unwrap();
    assert_eq!(accumulate.callee, "+=");
    assert_eq!(accumulate.mutates, vec!["total_loss"]);
    assert_eq!(accumulate.arguments, vec!["loss"]);
    assert!(accumulate.targets.is_empty());
}

#[test]
fn test_slice_assignment_shape() {
    let log = log_for("X_train = X_scaled[:800]\nfirst = X_scaled[0]\n");
    assert_eq!(assignment_to(&log, "X_train").value, Some(ValueKind::Slice));
    assert_eq!(assignment_to(&log, "first").value, Some(ValueKind::Subscript));

    let log = log_for("a, b = X[:n], X[n:]\nc, d = X[:n], Y[n:]\ne, f = (X[:2], X[2:])\n");
    assert_eq!(assignment_to(&log, "a").value, Some(ValueKind::SliceSplit));
    assert_eq!(assignment_to(&log, "c").value, Some(ValueKind::Expression));
    assert_eq!(assignment_to(&log, "e").value, Some(ValueKind::SliceSplit));
}

#[test]
fn test_malformed_source_does_not_panic() {
    let log = log_for("x = (\nfor in :\n  scaler.fit_transform(\n");
    // Whatever was recoverable is extracted; nothing fails
    assert!(log.len() < 100);
}

#[test]
fn test_deeply_nested_expression_on_small_stack() {
    let terms: Vec<String> = (0..3000).map(|i| format!("a{i}")).collect();
    let source = format!(
        "x = 1 + {}\nfor i in range(3):\n    if x > 0.7382947:\n        pass\n",
        terms.join(" + ")
    );
    let log = std::thread::Builder::new()
        .stack_size(1024 * 1024)
        .spawn(move || log_for(&source))
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(assignment_to(&log, "x").references.len(), 3000);
    let cmp = log
        .events()
        .iter()
        .find(|e| e.kind == EventKind::Comparison)
        .unwrap();
    assert_eq!(cmp.loops, vec![0]);
    assert_eq!(log.loops().len(), 1);
}

#[test]
fn test_extraction_is_deterministic() {
    let source = "a = f(x)\nb = g(a)\nif b > 0.37:\n    c = a\n";
    assert_eq!(log_for(source), log_for(source));
}
