//! Variable lineage and chronology
//!
//! A [`LineageTracker`] borrows one unit's [`EventLog`] and indexes it in a
//! single forward pass: who defined each variable, which provenance tags it
//! carries, and which events read it. Detectors share it read-only, so no
//! detector re-derives data flow or ordering on its own.
//!
//! Records are keyed by (enclosing function, name). Queries about names the
//! log never mentions return empty results rather than errors.

use crate::extract::{CallCategory, Event, EventId, EventKind, EventLog};
use crate::models::Location;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;


/// Which category of operation produced a variable's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProvenanceTag {
    SplitOutput,
    PreprocessingOutput,
    ModelOutput,
    Unknown,
}

/// Side of a split a variable came from. Split outputs alternate
/// train/test in unpacking order (`X_train, X_test, y_train, y_test`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitSide {
    Train,
    Test,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableRecord {
    pub name: String,
    pub scope: Option<String>,
    /// Assignments and in-place mutations, in source order
    pub events: Vec<EventId>,
    pub tags: BTreeSet<ProvenanceTag>,
    pub split_side: Option<SplitSide>,
}

impl VariableRecord {
    fn new(name: &str, scope: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            scope: scope.map(str::to_string),
            events: Vec::new(),
            tags: BTreeSet::new(),
            split_side: None,
        }
    }

    pub fn has_tag(&self, tag: ProvenanceTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Either side of an ordering query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor<'s> {
    Event(EventId),
    Identifier(&'s str),
}

impl From<EventId> for Anchor<'_> {
    fn from(id: EventId) -> Self {
        Anchor::Event(id)
    }
}

impl<'s> From<&'s str> for Anchor<'s> {
    fn from(name: &'s str) -> Self {
        Anchor::Identifier(name)
    }
}

impl<'s> From<&'s Event> for Anchor<'s> {
    fn from(event: &'s Event) -> Self {
        Anchor::Event(event.id)
    }
}

type ScopedName = (Option<String>, String);

fn key(scope: Option<&str>, name: &str) -> ScopedName {
    (scope.map(str::to_string), name.to_string())
}

pub struct LineageTracker<'a> {
    log: &'a EventLog,
    records: FxHashMap<ScopedName, VariableRecord>,
    consumers: FxHashMap<ScopedName, Vec<EventId>>,
    chronology: Vec<EventId>,
}

impl<'a> LineageTracker<'a> {
    /// Index `log` in one forward pass
    pub fn ingest(log: &'a EventLog) -> Self {
        let mut tracker = Self {
            log,
            records: FxHashMap::default(),
            consumers: FxHashMap::default(),
            chronology: (0..log.len()).collect(),
        };

        for event in log.events() {
            if event.kind == EventKind::Assignment {
                tracker.record_assignment(event);
            }
            tracker.record_reads(event);
        }

        let events = log.events();
        tracker
            .chronology
            .sort_by_key(|&id| (events[id].location(), id));
        tracker
    }

    fn record_assignment(&mut self, event: &Event) {
        let tag = match event.category {
            Some(CallCategory::Split) => ProvenanceTag::SplitOutput,
            Some(CallCategory::Preprocess(method)) if method.produces_data() => {
                ProvenanceTag::PreprocessingOutput
            }
            Some(CallCategory::ModelInference) => ProvenanceTag::ModelOutput,
            _ => ProvenanceTag::Unknown,
        };
        let scope = event.scope.as_deref();

        for (index, target) in event.targets.iter().enumerate() {
            let record = self
                .records
                .entry(key(scope, target))
                .or_insert_with(|| VariableRecord::new(target, scope));
            record.events.push(event.id);
            record.tags.insert(tag);
            if tag == ProvenanceTag::SplitOutput {
                record.split_side = Some(if index % 2 == 0 {
                    SplitSide::Train
                } else {
                    SplitSide::Test
                });
            }
        }

        for target in &event.mutates {
            let record = self
                .records
                .entry(key(scope, target))
                .or_insert_with(|| VariableRecord::new(target, scope));
            record.events.push(event.id);
            if tag != ProvenanceTag::Unknown {
                record.tags.insert(tag);
            }
        }
    }

    fn record_reads(&mut self, event: &Event) {
        let scope = event.scope.as_deref();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let names = event
            .receiver
            .iter()
            .chain(&event.arguments)
            .chain(&event.references);
        for name in names {
            if seen.insert(name.as_str()) {
                self.consumers
                    .entry(key(scope, name))
                    .or_default()
                    .push(event.id);
            }
        }
    }

    pub fn log(&self) -> &'a EventLog {
        self.log
    }

    pub fn event(&self, id: EventId) -> Option<&'a Event> {
        self.log.get(id)
    }

    pub fn record(&self, scope: Option<&str>, name: &str) -> Option<&VariableRecord> {
        self.records.get(&key(scope, name))
    }

    /// Every record carrying `tag`, ordered by scope then name
    pub fn tagged(&self, tag: ProvenanceTag) -> Vec<&VariableRecord> {
        let mut records: Vec<_> = self
            .records
            .values()
            .filter(|record| record.has_tag(tag))
            .collect();
        records.sort_by(|a, b| (&a.scope, &a.name).cmp(&(&b.scope, &b.name)));
        records
    }

    /// Names of all variables produced by a split call
    pub fn split_variables(&self) -> BTreeSet<&str> {
        self.records
            .values()
            .filter(|record| record.has_tag(ProvenanceTag::SplitOutput))
            .map(|record| record.name.as_str())
            .collect()
    }

    pub fn split_side(&self, scope: Option<&str>, name: &str) -> Option<SplitSide> {
        self.record(scope, name).and_then(|record| record.split_side)
    }

    /// All events ordered by source location
    pub fn chronological_operations(&self) -> Vec<&'a Event> {
        let events = self.log.events();
        self.chronology.iter().map(|&id| &events[id]).collect()
    }

    /// Events that produced or consumed `name` in any scope, chronologically.
    /// Unknown names yield an empty lineage.
    pub fn lineage(&self, name: &str) -> Vec<&'a Event> {
        let mut ids: BTreeSet<EventId> = BTreeSet::new();
        for ((_, record_name), record) in &self.records {
            if record_name == name {
                ids.extend(record.events.iter().copied());
            }
        }
        for ((_, consumer_name), consumers) in &self.consumers {
            if consumer_name == name {
                ids.extend(consumers.iter().copied());
            }
        }
        self.sorted(ids)
    }

    /// Pure source-order comparison. Identifiers anchor at their first
    /// definition (or first use when never assigned); unknown anchors never precede.
    pub fn precedes<'s>(&self, a: impl Into<Anchor<'s>>, b: impl Into<Anchor<'s>>) -> bool {
        match (self.anchor_location(a.into()), self.anchor_location(b.into())) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    pub fn anchor_location(&self, anchor: Anchor<'_>) -> Option<Location> {
        match anchor {
            Anchor::Event(id) => self.log.get(id).map(Event::location),
            Anchor::Identifier(name) => {
                let first_def = self
                    .records
                    .values()
                    .filter(|record| record.name == name)
                    .filter_map(|record| record.events.first())
                    .filter_map(|&id| self.log.get(id))
                    .map(Event::location)
                    .min();
                first_def.or_else(|| {
                    self.consumers
                        .iter()
                        .filter(|((_, consumer), _)| consumer == name)
                        .filter_map(|(_, ids)| ids.first())
                        .filter_map(|&id| self.log.get(id))
                        .map(Event::location)
                        .min()
                })
            }
        }
    }

    /// Assignments that bind `name` in `scope`, in source order
    pub fn definitions(&self, scope: Option<&str>, name: &str) -> Vec<&'a Event> {
        let Some(record) = self.record(scope, name) else {
            return Vec::new();
        };
        record
            .events
            .iter()
            .filter_map(|&id| self.log.get(id))
            .filter(|event| event.defines(name))
            .collect()
    }

    /// The last assignment to `name` completed before `at`. Function scopes
    /// fall back to module-level definitions.
    pub fn reaching_definition(
        &self,
        scope: Option<&str>,
        name: &str,
        at: Location,
    ) -> Option<&'a Event> {
        let local = self
            .definitions(scope, name)
            .into_iter()
            .filter(|def| def.span.end <= at)
            .max_by_key(|def| (def.location(), def.id));
        match (local, scope) {
            (Some(def), _) => Some(def),
            (None, Some(_)) => self.reaching_definition(None, name, at),
            (None, None) => None,
        }
    }

    /// Events reading `name` after `def` completes and before the next
    /// assignment that rebinds it. The rebinding assignment itself is
    /// included since its right-hand side still sees the old value.
    pub fn flows_from(&self, def: &Event, name: &str) -> Vec<&'a Event> {
        let scope = def.scope.as_deref();
        let next_kill = self
            .definitions(scope, name)
            .into_iter()
            .filter(|other| other.location() > def.location())
            .map(|other| other.span.end)
            .min();

        let Some(consumers) = self.consumers.get(&key(scope, name)) else {
            return Vec::new();
        };
        let ids: BTreeSet<EventId> = consumers
            .iter()
            .copied()
            .filter(|&id| id != def.id)
            .filter(|&id| {
                self.log.get(id).is_some_and(|event| {
                    event.location() >= def.span.end
                        && next_kill.map_or(true, |kill| event.location() < kill)
                })
            })
            .collect();
        self.sorted(ids)
    }

    /// Names that `name` (as seen at `at`) was derived from, including
    /// itself. Derivation stops at split outputs.
    pub fn ancestors(&self, scope: Option<&str>, name: &str, at: Location) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![(name.to_string(), at)];
        while let Some((current, at)) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(def) = self.reaching_definition(scope, &current, at) else {
                continue;
            };
            if def.category == Some(CallCategory::Split) {
                continue;
            }
            for upstream in def.references.iter().chain(&def.arguments) {
                if !seen.contains(upstream) {
                    stack.push((upstream.clone(), def.location()));
                }
            }
        }
        seen
    }

    fn sorted(&self, ids: BTreeSet<EventId>) -> Vec<&'a Event> {
        let mut events: Vec<&'a Event> = ids.into_iter().filter_map(|id| self.log.get(id)).collect();
        events.sort_by_key(|event| (event.location(), event.id));
        events
    }
}
