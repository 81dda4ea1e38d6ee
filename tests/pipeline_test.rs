//! End-to-end pipeline tests
//!
//! Drives Python snippets through parsing, extraction, lineage tracking and
//! the full default detector set via the public API.

use mlguard::parsers::python::{parse, parse_source};
use mlguard::{
    analyze, load_config, AnalysisUnit, AnalyzerConfig, DetectorEngine, Finding, PatternType,
    Severity,
};
use std::path::Path;

fn unit(source: &str) -> AnalysisUnit {
    parse_source(source, Path::new("pipeline.py")).unwrap()
}

fn run(source: &str) -> Vec<Finding> {
    analyze(&unit(source), &AnalyzerConfig::default()).unwrap()
}

fn from<'a>(findings: &'a [Finding], detector: &str) -> Vec<&'a Finding> {
    findings.iter().filter(|f| f.detector == detector).collect()
}

fn high_or_worse<'a>(findings: &'a [Finding], detector: &str) -> Vec<&'a Finding> {
    from(findings, detector)
        .into_iter()
        .filter(|f| f.severity >= Severity::High)
        .collect()
}

const LEAKY: &str = r#"
from sklearn.preprocessing import StandardScaler
from sklearn.model_selection import train_test_split

scaler = StandardScaler()
X_scaled = scaler.fit_transform(X)
X_train, X_test, y_train, y_test = train_test_split(X_scaled, y, test_size=0.2)
"#;

#[test]
fn test_direct_leak_is_reported_once_by_both_flow_detectors() {
    let findings = run(LEAKY);

    for detector in ["data-leakage", "test-set-contamination"] {
        let high = high_or_worse(&findings, detector);
        assert_eq!(high.len(), 1, "{detector}: {findings:#?}");
        assert_eq!(high[0].severity, Severity::High);
        assert!(high[0].confidence.value() >= 0.9);
        assert_eq!(high[0].location.line, 6);
    }
}

#[test]
fn test_fit_after_split_has_no_high_leakage() {
    let findings = run(
        r#"
X_train, X_test, y_train, y_test = train_test_split(X, y, test_size=0.2)
scaler = StandardScaler()
X_train_scaled = scaler.fit_transform(X_train)
X_test_scaled = scaler.transform(X_test)
model.fit(X_train_scaled, y_train)
"#,
    );
    assert!(high_or_worse(&findings, "data-leakage").is_empty());
    assert!(high_or_worse(&findings, "test-set-contamination").is_empty());
}

#[test]
fn test_confidence_decreases_with_chain_length() {
    let direct = run(LEAKY);
    let chained = run(
        r#"
scaler = StandardScaler()
X_scaled = scaler.fit_transform(X)
X_ready = X_scaled
X_train, X_test, y_train, y_test = train_test_split(X_ready, y, test_size=0.2)
"#,
    );

    for detector in ["data-leakage", "test-set-contamination"] {
        let one_hop = high_or_worse(&direct, detector)[0].confidence;
        let two_hops = high_or_worse(&chained, detector)[0].confidence;
        assert!(two_hops < one_hop, "{detector}: {two_hops} !< {one_hop}");
    }
}

#[test]
fn test_future_leakage_severity_is_monotone_in_offset() {
    let severity_of = |offset: i64| {
        let findings = run(&format!("df['target'] = df['price'].shift({offset})\n"));
        let leaks: Vec<_> = findings
            .iter()
            .filter(|f| f.pattern_type == PatternType::FutureLeakage)
            .collect();
        assert_eq!(leaks.len(), 1);
        (leaks[0].severity, leaks[0].confidence)
    };

    let (one, one_conf) = severity_of(-1);
    let (five, five_conf) = severity_of(-5);
    let (ten, _) = severity_of(-10);
    assert_eq!(one, Severity::Medium);
    assert_eq!(five, Severity::High);
    assert!(one <= five && five <= ten);
    assert!(one_conf < five_conf);

    let lagged = run("df['lag'] = df['price'].shift(1)\n");
    assert!(lagged.iter().all(|f| f.pattern_type != PatternType::FutureLeakage));
}

#[test]
fn test_each_negative_shift_is_reported() {
    let findings = run(
        r#"
df['next_day'] = df['close'].shift(-1)
df['next_week'] = df['close'].shift(periods=-7)
df['smooth'] = df['close'].rolling(window=5, center=True).mean()
"#,
    );
    let lines: Vec<u32> = findings
        .iter()
        .filter(|f| f.pattern_type == PatternType::FutureLeakage)
        .map(|f| f.location.line)
        .collect();
    assert_eq!(lines, vec![2, 3, 4]);
}

#[test]
fn test_analysis_is_deterministic() {
    let source = r#"
import torch
import pandas as pd

THRESHOLD = 0.5
df = pd.read_csv('train.csv')
X_scaled = MinMaxScaler().fit_transform(df)
X_train, X_test = train_test_split(X_scaled)
losses = []
for epoch in range(10):
    for batch in loader:
        batch = batch.cuda()
        loss = criterion(model(batch), batch.y)
        loss.backward()
        optimizer.step()
        losses.append(loss)
        if loss.item() < 0.0137:
            break
"#;
    let first = run(source);
    let second = run(source);
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_findings_are_grouped_by_detector_then_sorted() {
    let findings = run(
        r#"
df = pd.read_csv('a.csv')
model = RandomForestClassifier(n_estimators=147)
X_scaled = StandardScaler().fit_transform(df)
X_train, X_test = train_test_split(X_scaled)
"#,
    );
    let order = [
        "test-set-contamination",
        "data-leakage",
        "gpu-memory-leak",
        "hardcoded-threshold",
        "inefficient-data-loading",
    ];
    let ranks: Vec<usize> = findings
        .iter()
        .map(|f| order.iter().position(|d| *d == f.detector).unwrap())
        .collect();
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    for detector in order {
        let lines: Vec<u32> = from(&findings, detector).iter().map(|f| f.location.line).collect();
        assert!(lines.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn test_n_estimators_literal_versus_named_constant() {
    let literal = run("model = RandomForestClassifier(n_estimators=147)\n");
    let flagged = from(&literal, "hardcoded-threshold");
    assert_eq!(flagged.len(), 1);
    assert!(flagged[0].message.contains("n_estimators=147"));

    let named = run(
        r#"
DEFAULT_N_ESTIMATORS = 147
model = RandomForestClassifier(n_estimators=DEFAULT_N_ESTIMATORS)
"#,
    );
    assert!(from(&named, "hardcoded-threshold").is_empty());
}

#[test]
fn test_chunked_read_in_loop_versus_plain_read() {
    let chunked = run(
        r#"
for chunk in pd.read_csv("f.csv", chunksize=10000):
    process(chunk)
"#,
    );
    assert!(from(&chunked, "inefficient-data-loading").is_empty());

    let plain = run("df = pd.read_csv(\"f.csv\")\n");
    let medium: Vec<_> = from(&plain, "inefficient-data-loading")
        .into_iter()
        .filter(|f| f.severity == Severity::Medium)
        .collect();
    assert_eq!(medium.len(), 1);
    assert_eq!(medium[0].pattern_type, PatternType::UnchunkedLoad);
}

#[test]
fn test_empty_units_produce_no_findings() {
    for source in ["", "# just a comment\n", "\"\"\"Docstring only.\"\"\"\n", "def f():\n    pass\n"] {
        assert!(run(source).is_empty(), "{source:?}");
    }
}

#[test]
fn test_unparseable_constructs_degrade_gracefully() {
    let findings = run(
        r#"
a = b = StandardScaler().fit_transform(X)
(x, y) =
train_test_split(a)
"#,
    );
    assert!(findings.iter().all(|f| f.confidence.value() <= 1.0));
}

#[test]
fn test_training_loop_fixture() {
    let findings = run(
        r#"
import torch

def train(model, loader, criterion, optimizer):
    losses = []
    for epoch in range(100):
        for batch in loader:
            inputs = batch.x.to('cuda')
            outputs = model(inputs)
            loss = criterion(outputs, batch.y)
            loss.backward()
            optimizer.step()
            losses.append(loss)
    return losses
"#,
    );
    let gpu = from(&findings, "gpu-memory-leak");
    let patterns: Vec<PatternType> = gpu.iter().map(|f| f.pattern_type).collect();
    assert!(patterns.contains(&PatternType::GpuTensorAccumulation));
    assert!(patterns.contains(&PatternType::MissingCacheClear));
    assert!(patterns.contains(&PatternType::MissingGradientReset));
    assert!(gpu
        .iter()
        .filter(|f| f.pattern_type != PatternType::MissingCacheClear)
        .all(|f| f.severity == Severity::High));
}

#[test]
fn test_config_file_disables_detector() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("mlguard.toml");
    std::fs::write(
        &config_path,
        r#"
[detectors.inefficient-data-loading]
enabled = false

[thresholds]
literal_allowlist = [147.0]
"#,
    )
    .unwrap();
    let source_path = dir.path().join("train.py");
    std::fs::write(
        &source_path,
        "df = pd.read_csv('f.csv')\nmodel = RandomForestClassifier(n_estimators=147)\n",
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    let engine = DetectorEngine::new(config).unwrap();
    assert_eq!(engine.detector_count(), 4);

    let unit = parse(&source_path).unwrap();
    let findings = engine.analyze(&unit);
    assert!(findings.is_empty(), "{findings:#?}");
}

#[test]
fn test_invalid_config_fails_before_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("bad.toml");
    std::fs::write(&config_path, "[leakage]\nchain_decay = -0.2\n").unwrap();
    assert!(load_config(&config_path).is_err());

    let mut config = AnalyzerConfig::default();
    config.thresholds.significant_digits = 0;
    assert!(analyze(&unit("x = 1\n"), &config).is_err());
}

#[test]
fn test_batch_matches_sequential_analysis() {
    let engine = DetectorEngine::new(AnalyzerConfig::default()).unwrap();
    let sources = [LEAKY, "df = pd.read_csv('f.csv')\n", "", "if score > 0.8731:\n    pass\n"];
    let units: Vec<AnalysisUnit> = sources
        .iter()
        .enumerate()
        .map(|(i, s)| parse_source(s, Path::new(&format!("unit_{i}.py"))).unwrap())
        .collect();

    let reports = engine.analyze_batch(&units).unwrap();
    assert_eq!(reports.len(), units.len());
    for (report, unit) in reports.iter().zip(&units) {
        assert_eq!(report.path, unit.path());
        assert_eq!(report.findings, engine.analyze(unit));
        assert_eq!(report.summary.total, report.findings.len());
    }
    assert!(reports[2].findings.is_empty());
}

#[test]
fn test_finding_ids_are_stable_per_file() {
    let a = engine_findings("model = SVC(C=0.7382947)\n", "a.py");
    let b = engine_findings("model = SVC(C=0.7382947)\n", "b.py");
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].id.len(), 16);
    assert_ne!(a[0].id, b[0].id);
    assert_eq!(a[0].id, engine_findings("model = SVC(C=0.7382947)\n", "a.py")[0].id);
}

fn engine_findings(source: &str, path: &str) -> Vec<Finding> {
    let unit = parse_source(source, Path::new(path)).unwrap();
    analyze(&unit, &AnalyzerConfig::default()).unwrap()
}
