//! Event model produced by the extractor
//!
//! An [`EventLog`] is owned by one analysis call. Events are immutable once
//! pushed and are addressed by their index ([`EventId`]).

use crate::models::{Location, Span};
use serde::{Deserialize, Serialize};

pub type EventId = usize;
pub type LoopId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Assignment,
    Call,
    AttributeAccess,
    Comparison,
}

/// Which statistic-fitting method a preprocessing call invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessMethod {
    Fit,
    FitTransform,
    Transform,
}

impl PreprocessMethod {
    /// Whether the call returns transformed data (as opposed to the fitted estimator)
    pub fn produces_data(self) -> bool {
        matches!(self, PreprocessMethod::FitTransform | PreprocessMethod::Transform)
    }
}

/// Category tag attached to a call by the extractor.
///
/// Split and preprocessing tags come from the dedicated config sets; every
/// other tag comes from the `call_categories` name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCategory {
    Split,
    CrossValidation,
    Preprocess(PreprocessMethod),
    TemporalShift,
    RollingWindow,
    SetIntersection,
    TabularLoad,
    DeviceTransfer,
    CacheClear,
    GradientReset,
    Backward,
    OptimizerStep,
    Detach,
    ContainerAppend,
    RowIteration,
    ModelInference,
}

/// Shape of an assignment's right-hand side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Literal,
    Call,
    Attribute,
    Subscript,
    Slice,
    /// Tuple of two or more slices of one value (`a, b = X[:n], X[n:]`)
    SliceSplit,
    Identifier,
    Collection,
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    /// Source text, including a leading sign for negated numbers
    pub raw: String,
    pub value: LiteralValue,
    pub location: Location,
}

impl Literal {
    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            LiteralValue::Int(i) => Some(i as f64),
            LiteralValue::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.value {
            LiteralValue::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    pub fn is_true(&self) -> bool {
        self.value == LiteralValue::Bool(true)
    }

    /// Count of significant digits in the written form.
    ///
    /// Leading and trailing zeros are ignored, exponents are dropped:
    /// `0.7382947` has 7, `1e-8` has 1, `1000` has 1.
    pub fn significant_digits(&self) -> u32 {
        if !self.is_numeric() {
            return 0;
        }
        let text = self.raw.trim_start_matches(['-', '+']).to_ascii_lowercase();
        if text.starts_with("0x") || text.starts_with("0o") || text.starts_with("0b") {
            return 1;
        }
        let mantissa = text.split('e').next().unwrap_or_default();
        let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.trim_matches('0').len() as u32
    }
}

/// Classified keyword-argument value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Literal(Literal),
    Identifier(String),
    Expression(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordArg {
    pub name: String,
    pub value: ArgValue,
}

impl KeywordArg {
    pub fn literal(&self) -> Option<&Literal> {
        match &self.value {
            ArgValue::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

/// One ML-relevant operation at a source location.
///
/// `callee` holds the dotted callee text for calls, the accessed attribute
/// path for attribute accesses, the comparison operator for comparisons, and
/// for assignments either the callee of the right-hand call or the
/// assignment operator (`=`, `+=`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    pub span: Span,
    pub callee: String,
    /// Root identifier of the receiver for method calls and attribute accesses
    pub receiver: Option<String>,
    pub category: Option<CallCategory>,
    /// Names bound by an assignment, in unpacking order
    pub targets: Vec<String>,
    /// Objects mutated in place (`df['c'] = ...`, `x += ...`)
    pub mutates: Vec<String>,
    /// Plain-identifier operands or positional arguments, in order
    pub arguments: Vec<String>,
    /// Every identifier read by the event
    pub references: Vec<String>,
    pub keywords: Vec<KeywordArg>,
    pub literals: Vec<Literal>,
    /// Right-hand side shape, assignments only
    pub value: Option<ValueKind>,
    /// Qualified name of the enclosing function, `None` at module level
    pub scope: Option<String>,
    /// Enclosing loops, outermost first
    pub loops: Vec<LoopId>,
}

impl Event {
    pub fn location(&self) -> Location {
        self.span.start
    }

    /// Single assignment target, if exactly one name is bound
    pub fn target(&self) -> Option<&str> {
        match self.targets.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Last dotted segment of the callee (`pd.read_csv` -> `read_csv`)
    pub fn method(&self) -> &str {
        self.callee.rsplit('.').next().unwrap_or(&self.callee)
    }

    pub fn keyword(&self, name: &str) -> Option<&KeywordArg> {
        self.keywords.iter().find(|k| k.name == name)
    }

    pub fn has_any_keyword(&self, names: &[String]) -> bool {
        self.keywords.iter().any(|k| names.contains(&k.name))
    }

    /// Whether the event reads `name` (as receiver, argument or nested reference)
    pub fn reads(&self, name: &str) -> bool {
        self.receiver.as_deref() == Some(name)
            || self.arguments.iter().any(|a| a == name)
            || self.references.iter().any(|r| r == name)
    }

    pub fn defines(&self, name: &str) -> bool {
        self.targets.iter().any(|t| t == name)
    }

    pub fn in_loop(&self, id: LoopId) -> bool {
        self.loops.contains(&id)
    }

    pub fn is(&self, kind: EventKind, category: CallCategory) -> bool {
        self.kind == kind && self.category == Some(category)
    }

    pub fn is_augmented(&self) -> bool {
        self.kind == EventKind::Assignment && self.callee.ends_with('=') && self.callee != "="
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    For,
    While,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopScope {
    pub id: LoopId,
    pub kind: LoopKind,
    pub span: Span,
    pub parent: Option<LoopId>,
    pub targets: Vec<String>,
    /// Span of the iterable expression (`df.iterrows()`, `pd.read_csv(...)`)
    pub iterable: Option<Span>,
    /// `x` when the loop iterates `range(len(x))`
    pub index_over: Option<String>,
    pub scope: Option<String>,
}

/// Ordered events plus loop structure for one analysis unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    events: Vec<Event>,
    loops: Vec<LoopScope>,
}

impl EventLog {
    pub(crate) fn from_parts(events: Vec<Event>, loops: Vec<LoopScope>) -> Self {
        Self { events, loops }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn loops(&self) -> &[LoopScope] {
        &self.loops
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(id)
    }

    pub fn loop_scope(&self, id: LoopId) -> Option<&LoopScope> {
        self.loops.get(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn with_category(&self, category: CallCategory) -> impl Iterator<Item = &Event> {
        self.events
            .iter()
            .filter(move |e| e.category == Some(category))
    }

    pub fn calls(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.kind == EventKind::Call)
    }

    /// Events located inside the body of loop `id` (nested loops included)
    pub fn in_loop(&self, id: LoopId) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.in_loop(id))
    }

    /// The assignment whose right-hand side contains `event`, if any
    pub fn enclosing_assignment(&self, event: &Event) -> Option<&Event> {
        self.events.iter().find(|e| {
            e.kind == EventKind::Assignment && e.id != event.id && e.span.contains(&event.span)
        })
    }
}
