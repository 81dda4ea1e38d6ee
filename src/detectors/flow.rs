//! Forward flow from a fitted value to the point where data is split
//!
//! Shared by the contamination and data-leakage detectors. Starting from a
//! definition, follow every assignment that consumes the value (breadth
//! first, so the first time a sink is reached is also its shortest chain)
//! until a split call, a cross-validation helper, or a manual slice split.

use crate::extract::{CallCategory, Event, EventId, EventKind, ValueKind};
use crate::lineage::LineageTracker;
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// A configured split function (`train_test_split`, `kf.split`)
    Split,
    /// `cross_val_score` and friends, which split internally
    CrossValidation,
    /// Two or more slices of the same value into distinct names
    ManualSlice,
}

/// A chain from a source definition to a sink
#[derive(Debug, Clone)]
pub struct LeakPath<'a> {
    pub sink: &'a Event,
    pub kind: SinkKind,
    /// Name the sink consumed
    pub variable: String,
    /// 1 when the sink reads the source value directly
    pub hops: u32,
}

/// Trace `name` as defined by `source` to every reachable sink.
///
/// With `follow_assignments` off only sinks reading the value directly are
/// reported.
pub fn trace_to_sinks<'a>(
    tracker: &LineageTracker<'a>,
    source: &Event,
    name: &str,
    max_hops: u32,
    follow_assignments: bool,
) -> Vec<LeakPath<'a>> {
    let mut queue: VecDeque<(String, &Event, u32)> = VecDeque::new();
    queue.push_back((name.to_string(), source, 1));
    let mut visited: FxHashSet<(String, EventId)> = FxHashSet::default();
    let mut paths: BTreeMap<EventId, LeakPath<'a>> = BTreeMap::new();

    while let Some((variable, def, hops)) = queue.pop_front() {
        if hops > max_hops || !visited.insert((variable.clone(), def.id)) {
            continue;
        }

        let consumers = tracker.flows_from(def, &variable);
        let mut slices: Vec<&'a Event> = Vec::new();

        for consumer in consumers {
            match (consumer.kind, consumer.category) {
                (EventKind::Call, Some(CallCategory::Split)) if consumer.reads(&variable) => {
                    record(&mut paths, consumer, SinkKind::Split, &variable, hops);
                }
                (EventKind::Call, Some(CallCategory::CrossValidation))
                    if consumer.reads(&variable) =>
                {
                    record(&mut paths, consumer, SinkKind::CrossValidation, &variable, hops);
                }
                // Split outputs end the chain; the split call itself is the sink
                (EventKind::Assignment, Some(CallCategory::Split)) => {}
                (EventKind::Assignment, _) if consumer.value == Some(ValueKind::Slice) => {
                    slices.push(consumer);
                }
                // `a, b = X[:n], X[n:]` splits in one statement
                (EventKind::Assignment, _)
                    if consumer.value == Some(ValueKind::SliceSplit)
                        && consumer.targets.len() >= 2 =>
                {
                    record(&mut paths, consumer, SinkKind::ManualSlice, &variable, hops);
                }
                (EventKind::Assignment, _) if follow_assignments => {
                    for next in consumer.targets.iter().chain(&consumer.mutates) {
                        queue.push_back((next.clone(), consumer, hops + 1));
                    }
                }
                _ => {}
            }
        }

        if let Some(first) = bifurcation(&slices) {
            record(&mut paths, first, SinkKind::ManualSlice, &variable, hops);
        }
    }

    paths.into_values().collect()
}

fn record<'a>(
    paths: &mut BTreeMap<EventId, LeakPath<'a>>,
    sink: &'a Event,
    kind: SinkKind,
    variable: &str,
    hops: u32,
) {
    paths.entry(sink.id).or_insert_with(|| LeakPath {
        sink,
        kind,
        variable: variable.to_string(),
        hops,
    });
}

/// The first of several slice assignments that bind distinct names
fn bifurcation<'a>(slices: &[&'a Event]) -> Option<&'a Event> {
    let mut names: FxHashSet<&str> = FxHashSet::default();
    for slice in slices {
        names.extend(slice.targets.iter().map(String::as_str));
    }
    if slices.len() < 2 || names.len() < 2 {
        return None;
    }
    slices.iter().copied().min_by_key(|e| (e.location(), e.id))
}

/// Whether `call` stands alone as a statement rather than feeding an assignment
pub fn is_bare_call(tracker: &LineageTracker, call: &Event) -> bool {
    tracker.log().enclosing_assignment(call).is_none()
}
