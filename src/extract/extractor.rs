//! Single-pass event extraction over a Python syntax tree
//!
//! The walk is pre-order in source order. Unrecognized or oddly shaped
//! constructs are skipped; extraction never fails.

use super::event::{
    ArgValue, CallCategory, Event, EventId, EventKind, EventLog, KeywordArg, Literal,
    LiteralValue, LoopId, LoopKind, LoopScope, ValueKind,
};
use crate::config::AnalyzerConfig;
use crate::models::Span;
use crate::parsers::python::node_span;
use crate::parsers::AnalysisUnit;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use tree_sitter::Node;

/// Attribute accessors that index individual rows of a dataframe
pub const ROW_ACCESSORS: &[&str] = &["iloc", "loc", "at", "iat"];

/// Extract the ordered event log for one unit
pub fn extract(unit: &AnalysisUnit, config: &AnalyzerConfig) -> EventLog {
    EventExtractor::new(config).extract(unit)
}

pub struct EventExtractor<'c> {
    config: &'c AnalyzerConfig,
}

impl<'c> EventExtractor<'c> {
    pub fn new(config: &'c AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, unit: &AnalysisUnit) -> EventLog {
        let mut walker = Walker::new(self.config, unit);
        walker.walk(unit.root_node());
        debug!(
            "Extracted {} events and {} loops from {}",
            walker.events.len(),
            walker.loops.len(),
            unit.path().display()
        );
        EventLog::from_parts(walker.events, walker.loops)
    }
}

/// Pending work for the tree walk; loop and scope markers are replayed in
/// the same order a recursive descent would enter and leave them
enum Step<'t> {
    Visit(Node<'t>),
    /// Loop with `id`, `parent` and `scope` filled in when entered
    EnterLoop(LoopScope),
    ExitLoop,
    EnterScope(String),
    ExitScope,
}

/// Queue the named children of `node` so they pop in source order
fn push_children<'t>(node: Node<'t>, stack: &mut Vec<Step<'t>>) {
    for i in (0..node.child_count()).rev() {
        if let Some(child) = node.child(i) {
            if child.is_named() {
                stack.push(Step::Visit(child));
            }
        }
    }
}

struct Walker<'a> {
    config: &'a AnalyzerConfig,
    source: &'a [u8],
    math_roots: FxHashSet<String>,
    events: Vec<Event>,
    loops: Vec<LoopScope>,
    loop_stack: Vec<LoopId>,
    /// Enclosing loop stacks saved while inside a nested definition
    outer_loops: Vec<Vec<LoopId>>,
    scope_stack: Vec<String>,
    /// Variable (or dotted attribute) -> class it was constructed from
    instances: FxHashMap<String, String>,
}

impl<'a> Walker<'a> {
    fn new(config: &'a AnalyzerConfig, unit: &'a AnalysisUnit) -> Self {
        let modules = &config.thresholds.math_modules;
        let mut math_roots: FxHashSet<String> = modules.iter().cloned().collect();
        for (bound, module) in unit.module_aliases() {
            let is_math = modules.iter().any(|m| {
                module == m.as_str()
                    || module
                        .strip_prefix(m.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            });
            if is_math {
                math_roots.insert(bound.to_string());
            }
        }

        Self {
            config,
            source: unit.source().as_bytes(),
            math_roots,
            events: Vec::new(),
            loops: Vec::new(),
            loop_stack: Vec::new(),
            outer_loops: Vec::new(),
            scope_stack: Vec::new(),
            instances: FxHashMap::default(),
        }
    }

    // ─── Traversal ──────────────────────────────────────────────────────────

    /// Pre-order walk driven by an explicit work stack, so nesting depth
    /// is bounded by memory rather than the thread stack
    fn walk(&mut self, root: Node) {
        let mut stack = vec![Step::Visit(root)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(node) => self.visit(node, &mut stack),
                Step::EnterLoop(mut scope) => {
                    scope.id = self.loops.len();
                    scope.parent = self.loop_stack.last().copied();
                    scope.scope = self.scope();
                    self.loop_stack.push(scope.id);
                    self.loops.push(scope);
                }
                Step::ExitLoop => {
                    self.loop_stack.pop();
                }
                Step::EnterScope(name) => {
                    self.scope_stack.push(name);
                    // Loops do not extend into nested definitions
                    self.outer_loops.push(std::mem::take(&mut self.loop_stack));
                }
                Step::ExitScope => {
                    self.loop_stack = self.outer_loops.pop().unwrap_or_default();
                    self.scope_stack.pop();
                }
            }
        }
    }

    fn visit<'t>(&mut self, node: Node<'t>, stack: &mut Vec<Step<'t>>) {
        match node.kind() {
            "comment" => {}
            "function_definition" | "class_definition" => self.visit_definition(node, stack),
            "for_statement" => self.visit_for(node, stack),
            "while_statement" => self.visit_while(node, stack),
            kind => {
                match kind {
                    "assignment" => self.on_assignment(node),
                    "augmented_assignment" => self.on_augmented_assignment(node),
                    "call" => self.on_call(node),
                    "comparison_operator" => self.on_comparison(node),
                    "attribute" => self.on_attribute(node),
                    "subscript" => self.on_subscript(node),
                    _ => {}
                }
                push_children(node, stack);
            }
        }
    }

    fn visit_definition<'t>(&mut self, node: Node<'t>, stack: &mut Vec<Step<'t>>) {
        let (Some(name), Some(body)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("body"),
        ) else {
            return;
        };
        stack.push(Step::ExitScope);
        stack.push(Step::Visit(body));
        stack.push(Step::EnterScope(self.text(name).to_string()));
    }

    fn visit_for<'t>(&mut self, node: Node<'t>, stack: &mut Vec<Step<'t>>) {
        let (Some(left), Some(right), Some(body)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
            node.child_by_field_name("body"),
        ) else {
            debug!("Skipping malformed for statement at line {}", node.start_position().row + 1);
            push_children(node, stack);
            return;
        };

        let targets = self.bound_names(left).0;

        // `for train_idx, test_idx in kf.split(X)` binds split outputs
        if right.kind() == "call" {
            if let Some(category @ CallCategory::Split) = self.call_category(right) {
                let span = Span::new(node_span(left).start, node_span(right).end);
                let mut event = self.new_event(EventKind::Assignment, span, self.callee(right));
                event.category = Some(category);
                event.receiver = self.call_receiver(right);
                event.targets = targets.clone();
                event.arguments = self.positional_names(right);
                event.references = self.names(right);
                event.value = Some(ValueKind::Call);
                self.push(event);
            }
        }

        let scope = LoopScope {
            id: 0,
            kind: LoopKind::For,
            span: node_span(node),
            parent: None,
            targets,
            iterable: Some(node_span(right)),
            index_over: self.range_len_target(right),
            scope: None,
        };

        if let Some(alternative) = node.child_by_field_name("alternative") {
            stack.push(Step::Visit(alternative));
        }
        stack.push(Step::ExitLoop);
        stack.push(Step::Visit(body));
        stack.push(Step::EnterLoop(scope));
        // The iterable is evaluated once, outside the loop body
        stack.push(Step::Visit(right));
    }

    fn visit_while<'t>(&mut self, node: Node<'t>, stack: &mut Vec<Step<'t>>) {
        let scope = LoopScope {
            id: 0,
            kind: LoopKind::While,
            span: node_span(node),
            parent: None,
            targets: Vec::new(),
            iterable: None,
            index_over: None,
            scope: None,
        };

        if let Some(alternative) = node.child_by_field_name("alternative") {
            stack.push(Step::Visit(alternative));
        }
        stack.push(Step::ExitLoop);
        if let Some(body) = node.child_by_field_name("body") {
            stack.push(Step::Visit(body));
        }
        if let Some(condition) = node.child_by_field_name("condition") {
            stack.push(Step::Visit(condition));
        }
        stack.push(Step::EnterLoop(scope));
    }

    // ─── Event construction ─────────────────────────────────────────────────

    fn on_assignment(&mut self, node: Node) {
        // Annotations without a value (`x: int`) bind nothing
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        if right.kind() == "assignment" {
            debug!(
                "Skipping chained assignment at line {}",
                node.start_position().row + 1
            );
            return;
        }

        let (targets, mutates) = self.bound_names(left);
        if targets.is_empty() && mutates.is_empty() {
            return;
        }

        let value = self.value_kind(right);
        let mut event = self.new_event(EventKind::Assignment, node_span(node), "=".to_string());
        event.value = Some(value);
        event.references = self.names(right);

        if right.kind() == "call" {
            let (call, category) = self.primary_call(right);
            event.callee = self.callee(call);
            event.category = category;
            event.receiver = self.call_receiver(call);
            event.arguments = self.positional_names(call);
            event.keywords = self.keyword_args(call);
        } else {
            event.arguments = event.references.clone();
        }
        if value == ValueKind::Literal {
            event.literals.extend(self.literal(right));
        }

        self.track_instances(&targets, right);
        event.targets = targets;
        event.mutates = mutates;
        self.push(event);
    }

    fn on_augmented_assignment(&mut self, node: Node) {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        let operator = node
            .child_by_field_name("operator")
            .map(|op| self.text(op).to_string())
            .unwrap_or_else(|| "+=".to_string());

        let (bound, mut mutates) = self.bound_names(left);
        // `x += y` updates x in place rather than rebinding it
        mutates.extend(bound);
        if mutates.is_empty() {
            return;
        }

        let mut event = self.new_event(EventKind::Assignment, node_span(node), operator);
        event.mutates = mutates;
        event.value = Some(self.value_kind(right));
        event.references = self.names(right);
        event.arguments = self.dotted_name(right).into_iter().collect();
        event.literals.extend(self.literal(right));
        self.push(event);
    }

    fn on_call(&mut self, node: Node) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        if self.method_name(function).is_none() {
            return;
        }

        let mut event = self.new_event(EventKind::Call, node_span(node), self.callee(node));
        event.category = self.call_category(node);
        event.receiver = self.call_receiver(node);
        event.arguments = self.positional_names(node);
        event.keywords = self.keyword_args(node);
        event.literals = self.positional_literals(node);
        if let Some(args) = node.child_by_field_name("arguments") {
            event.references = self.names(args);
        }
        // `set(a.index).intersection(...)` also reads `a`
        if let Some(object) = function
            .child_by_field_name("object")
            .filter(|object| self.dotted_name(*object).is_none())
        {
            for name in self.names(object) {
                if !event.references.contains(&name) {
                    event.references.push(name);
                }
            }
        }
        self.push(event);
    }

    fn on_comparison(&mut self, node: Node) {
        let mut operator = String::new();
        let mut operands = Vec::new();
        let count = node.child_count();
        for i in 0..count {
            let Some(child) = node.child(i) else { continue };
            if !child.is_named() {
                if operator.is_empty() {
                    operator = child.kind().to_string();
                }
            } else if child.kind() != "comment" {
                operands.push(child);
            }
        }

        let mut event = self.new_event(EventKind::Comparison, node_span(node), operator);
        for operand in operands {
            if let Some(name) = self.dotted_name(operand) {
                event.arguments.push(name);
            } else {
                self.numeric_literals(operand, &mut event.literals);
            }
        }
        event.references = self.names(node);
        self.push(event);
    }

    /// Math constants such as `math.pi` or `np.e`
    fn on_attribute(&mut self, node: Node) {
        let (Some(object), Some(attribute)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("attribute"),
        ) else {
            return;
        };
        let Some(root) = self.dotted_name(object) else {
            return;
        };
        let attr = self.text(attribute);
        if !self.math_roots.contains(&root)
            || !self.config.thresholds.math_constants.iter().any(|c| c == attr)
        {
            return;
        }

        let mut event = self.new_event(
            EventKind::AttributeAccess,
            node_span(node),
            format!("{root}.{attr}"),
        );
        event.references = vec![root.clone()];
        event.receiver = Some(root);
        self.push(event);
    }

    /// Row access such as `df.iloc[i]` or `df.loc[i, 'col']`
    fn on_subscript(&mut self, node: Node) {
        let Some(value) = node.child_by_field_name("value") else {
            return;
        };
        if value.kind() != "attribute" {
            return;
        }
        let (Some(object), Some(attribute)) = (
            value.child_by_field_name("object"),
            value.child_by_field_name("attribute"),
        ) else {
            return;
        };
        let accessor = self.text(attribute);
        if !ROW_ACCESSORS.contains(&accessor) {
            return;
        }
        let Some(receiver) = self.dotted_name(object).or_else(|| self.root_identifier(object))
        else {
            return;
        };

        let mut event = self.new_event(
            EventKind::AttributeAccess,
            node_span(node),
            format!("{receiver}.{accessor}"),
        );
        let mut cursor = node.walk();
        for index in node.children_by_field_name("subscript", &mut cursor) {
            if let Some(name) = self.dotted_name(index) {
                event.arguments.push(name);
            }
            for name in self.names(index) {
                if !event.references.contains(&name) {
                    event.references.push(name);
                }
            }
        }
        event.receiver = Some(receiver);
        self.push(event);
    }

    fn new_event(&self, kind: EventKind, span: Span, callee: String) -> Event {
        Event {
            id: self.events.len(),
            kind,
            span,
            callee,
            receiver: None,
            category: None,
            targets: Vec::new(),
            mutates: Vec::new(),
            arguments: Vec::new(),
            references: Vec::new(),
            keywords: Vec::new(),
            literals: Vec::new(),
            value: None,
            scope: self.scope(),
            loops: self.loop_stack.clone(),
        }
    }

    fn push(&mut self, event: Event) -> EventId {
        let id = event.id;
        self.events.push(event);
        id
    }

    fn scope(&self) -> Option<String> {
        if self.scope_stack.is_empty() {
            None
        } else {
            Some(self.scope_stack.join("."))
        }
    }

    // ─── Call classification ────────────────────────────────────────────────

    /// Tag a call from the split set, the preprocessing set, or the name table
    fn call_category(&self, call: Node) -> Option<CallCategory> {
        let function = call.child_by_field_name("function")?;
        let method = self.method_name(function)?;
        let class = match function.kind() {
            "attribute" => function
                .child_by_field_name("object")
                .and_then(|object| self.class_of(object)),
            _ => None,
        };

        let is_split = self.config.split_functions.iter().any(|entry| {
            match entry.rsplit_once('.') {
                Some((owner, name)) => {
                    name == method
                        && class.as_deref() == Some(owner.rsplit('.').next().unwrap_or(owner))
                }
                None => entry == method,
            }
        });
        if is_split {
            return Some(CallCategory::Split);
        }

        if let Some(kind) = self.config.preprocessing.methods.get(method) {
            let preprocessing_class = class
                .as_ref()
                .is_some_and(|c| self.config.preprocessing.classes.contains(c));
            if preprocessing_class {
                return Some(CallCategory::Preprocess(*kind));
            }
        }

        self.config.call_categories.get(method).copied()
    }

    /// The first tagged call along a method chain (`scaler.fit_transform(X).astype(f)`),
    /// or the outermost call when nothing in the chain is tagged
    fn primary_call<'t>(&self, call: Node<'t>) -> (Node<'t>, Option<CallCategory>) {
        let mut current = call;
        loop {
            if let Some(category) = self.call_category(current) {
                return (current, Some(category));
            }
            let inner = current
                .child_by_field_name("function")
                .filter(|f| f.kind() == "attribute")
                .and_then(|f| f.child_by_field_name("object"))
                .filter(|object| object.kind() == "call");
            match inner {
                Some(next) => current = next,
                None => return (call, None),
            }
        }
    }

    /// Class an expression is an instance of, when known
    fn class_of(&self, object: Node) -> Option<String> {
        if object.kind() == "call" {
            return self.constructor_class(object);
        }
        let name = self.dotted_name(object)?;
        self.instances.get(&name).cloned()
    }

    /// `Foo(...)`, `module.Foo(...)`, or a method chain rooted at one
    fn constructor_class(&self, call: Node) -> Option<String> {
        let mut current = call;
        loop {
            let function = current.child_by_field_name("function")?;
            if function.kind() == "attribute" {
                if let Some(object) = function
                    .child_by_field_name("object")
                    .filter(|object| object.kind() == "call")
                {
                    current = object;
                    continue;
                }
            }
            let name = self.method_name(function)?;
            return name
                .chars()
                .next()
                .is_some_and(char::is_uppercase)
                .then(|| name.to_string());
        }
    }

    fn track_instances(&mut self, targets: &[String], right: Node) {
        let class = if right.kind() == "call" {
            self.constructor_class(right)
        } else {
            None
        };
        match (targets, class) {
            ([target], Some(class)) => {
                self.instances.insert(target.clone(), class);
            }
            _ => {
                for target in targets {
                    self.instances.remove(target);
                }
            }
        }
    }

    /// `x` for `range(len(x))` and `range(0, len(x))`
    fn range_len_target(&self, iterable: Node) -> Option<String> {
        if iterable.kind() != "call" {
            return None;
        }
        let function = iterable.child_by_field_name("function")?;
        if self.text(function) != "range" {
            return None;
        }
        let args = iterable.child_by_field_name("arguments")?;
        let mut cursor = args.walk();
        let found = args.named_children(&mut cursor).find_map(|arg| {
            if arg.kind() != "call" {
                return None;
            }
            let inner = arg.child_by_field_name("function")?;
            if self.text(inner) != "len" {
                return None;
            }
            let inner_args = arg.child_by_field_name("arguments")?;
            let first = inner_args.named_child(0)?;
            self.dotted_name(first)
        });
        found
    }

    // ─── Node helpers ───────────────────────────────────────────────────────

    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }

    /// `a`, `a.b`, `a.b.c` for identifier/attribute chains; `None` otherwise
    fn dotted_name(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.text(node).to_string()),
            "attribute" => {
                let object = self.dotted_name(node.child_by_field_name("object")?)?;
                let attribute = node.child_by_field_name("attribute")?;
                Some(format!("{}.{}", object, self.text(attribute)))
            }
            _ => None,
        }
    }

    fn root_identifier(&self, node: Node) -> Option<String> {
        let mut current = node;
        loop {
            let next = match current.kind() {
                "identifier" => return Some(self.text(current).to_string()),
                "attribute" => current.child_by_field_name("object"),
                "subscript" => current.child_by_field_name("value"),
                "call" => current.child_by_field_name("function"),
                "parenthesized_expression" => current.named_child(0),
                _ => None,
            };
            current = next?;
        }
    }

    /// Last segment of a callee expression
    fn method_name(&self, function: Node) -> Option<&'a str> {
        match function.kind() {
            "identifier" => Some(self.text(function)),
            "attribute" => function
                .child_by_field_name("attribute")
                .map(|attr| self.text(attr)),
            _ => None,
        }
    }

    /// Receiver of a method call: the dotted object when it is a plain name,
    /// else the root identifier of the object expression
    fn call_receiver(&self, call: Node) -> Option<String> {
        let function = call.child_by_field_name("function")?;
        if function.kind() != "attribute" {
            return None;
        }
        let object = function.child_by_field_name("object")?;
        self.dotted_name(object)
            .or_else(|| self.root_identifier(object))
    }

    /// Dotted callee text with subscripts and nested calls collapsed
    /// (`df['v'].shift` -> `df.shift`)
    fn callee(&self, call: Node) -> String {
        let Some(function) = call.child_by_field_name("function") else {
            return String::new();
        };
        if let Some(dotted) = self.dotted_name(function) {
            return dotted;
        }
        let method = self.method_name(function).unwrap_or_default();
        match self.call_receiver(call) {
            Some(receiver) => format!("{receiver}.{method}"),
            None => method.to_string(),
        }
    }

    fn positional_names(&self, call: Node) -> Vec<String> {
        let Some(args) = call.child_by_field_name("arguments") else {
            return Vec::new();
        };
        let mut cursor = args.walk();
        let names = args
            .named_children(&mut cursor)
            .filter(|arg| arg.kind() != "keyword_argument" && arg.kind() != "comment")
            .filter_map(|arg| self.dotted_name(arg))
            .collect();
        names
    }

    fn positional_literals(&self, call: Node) -> Vec<Literal> {
        let Some(args) = call.child_by_field_name("arguments") else {
            return Vec::new();
        };
        let mut cursor = args.walk();
        let literals = args
            .named_children(&mut cursor)
            .filter(|arg| arg.kind() != "keyword_argument")
            .filter_map(|arg| self.literal(arg))
            .collect();
        literals
    }

    fn keyword_args(&self, call: Node) -> Vec<KeywordArg> {
        let Some(args) = call.child_by_field_name("arguments") else {
            return Vec::new();
        };
        let mut keywords = Vec::new();
        let mut cursor = args.walk();
        for arg in args.named_children(&mut cursor) {
            if arg.kind() != "keyword_argument" {
                continue;
            }
            let (Some(name), Some(value)) = (
                arg.child_by_field_name("name"),
                arg.child_by_field_name("value"),
            ) else {
                continue;
            };
            let value = if let Some(literal) = self.literal(value) {
                ArgValue::Literal(literal)
            } else if let Some(dotted) = self.dotted_name(value) {
                ArgValue::Identifier(dotted)
            } else {
                ArgValue::Expression(self.text(value).to_string())
            };
            keywords.push(KeywordArg {
                name: self.text(name).to_string(),
                value,
            });
        }
        keywords
    }

    /// Names bound by an assignment target, split into rebinding targets and
    /// in-place mutations (`df['c'] = ...` mutates `df`)
    fn bound_names(&self, left: Node) -> (Vec<String>, Vec<String>) {
        let mut targets = Vec::new();
        let mut mutates = Vec::new();
        self.collect_bound(left, &mut targets, &mut mutates);
        (targets, mutates)
    }

    fn collect_bound(&self, node: Node, targets: &mut Vec<String>, mutates: &mut Vec<String>) {
        match node.kind() {
            "identifier" | "attribute" => {
                if let Some(name) = self.dotted_name(node) {
                    targets.push(name);
                }
            }
            "subscript" => {
                let Some(mut value) = node.child_by_field_name("value") else {
                    return;
                };
                // `df.loc[i, 'c'] = v` mutates `df`, not `df.loc`
                if value.kind() == "attribute" {
                    let accessor = value
                        .child_by_field_name("attribute")
                        .map(|attr| self.text(attr));
                    if accessor.is_some_and(|a| ROW_ACCESSORS.contains(&a)) {
                        if let Some(object) = value.child_by_field_name("object") {
                            value = object;
                        }
                    }
                }
                if let Some(name) = self
                    .dotted_name(value)
                    .or_else(|| self.root_identifier(value))
                {
                    mutates.push(name);
                }
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "parenthesized_expression" => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.collect_bound(child, targets, mutates);
                }
            }
            "list_splat_pattern" => {
                if let Some(inner) = node.named_child(0) {
                    self.collect_bound(inner, targets, mutates);
                }
            }
            _ => {}
        }
    }

    /// Every name read inside `node`, in first-seen order. Attribute chains
    /// contribute each dotted prefix (`self.X.shape` -> `self`, `self.X`, ...).
    fn names(&self, node: Node) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_names(node, &mut out);
        out
    }

    fn collect_names(&self, node: Node, out: &mut Vec<String>) {
        let add = |name: String, out: &mut Vec<String>| {
            if !out.contains(&name) {
                out.push(name);
            }
        };
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "identifier" => add(self.text(node).to_string(), out),
                "attribute" => {
                    if let Some(dotted) = self.dotted_name(node) {
                        let mut prefix = String::new();
                        for segment in dotted.split('.') {
                            if !prefix.is_empty() {
                                prefix.push('.');
                            }
                            prefix.push_str(segment);
                            add(prefix.clone(), out);
                        }
                    } else if let Some(object) = node.child_by_field_name("object") {
                        stack.push(object);
                    }
                }
                "keyword_argument" => {
                    if let Some(value) = node.child_by_field_name("value") {
                        stack.push(value);
                    }
                }
                "comment" | "string" | "concatenated_string" | "lambda" => {}
                _ => {
                    let mut cursor = node.walk();
                    let children: Vec<Node> = node.named_children(&mut cursor).collect();
                    stack.extend(children.into_iter().rev());
                }
            }
        }
    }

    fn value_kind(&self, node: Node) -> ValueKind {
        match node.kind() {
            "integer" | "float" | "string" | "concatenated_string" | "true" | "false" | "none" => {
                ValueKind::Literal
            }
            "unary_operator" | "parenthesized_expression" => {
                if self.literal(node).is_some() {
                    ValueKind::Literal
                } else {
                    ValueKind::Expression
                }
            }
            "call" => ValueKind::Call,
            "attribute" => ValueKind::Attribute,
            "identifier" => ValueKind::Identifier,
            "subscript" => {
                let mut cursor = node.walk();
                let sliced = node
                    .children_by_field_name("subscript", &mut cursor)
                    .any(|s| s.kind() == "slice");
                if sliced {
                    ValueKind::Slice
                } else {
                    ValueKind::Subscript
                }
            }
            "expression_list" | "tuple" if self.is_slice_split(node) => ValueKind::SliceSplit,
            "list" | "tuple" | "dictionary" | "set" | "list_comprehension"
            | "dictionary_comprehension" | "set_comprehension" | "generator_expression" => {
                ValueKind::Collection
            }
            _ => ValueKind::Expression,
        }
    }

    /// Whether every element of a tuple is a slice of the same value
    fn is_slice_split(&self, node: Node) -> bool {
        let mut cursor = node.walk();
        let mut roots = Vec::new();
        for element in node.named_children(&mut cursor) {
            if self.value_kind(element) != ValueKind::Slice {
                return false;
            }
            match element.child_by_field_name("value") {
                Some(value) => roots.push(self.text(value)),
                None => return false,
            }
        }
        roots.len() >= 2 && roots.iter().all(|r| *r == roots[0])
    }

    /// Literal value of a node, seeing through unary signs and parentheses
    fn literal(&self, node: Node) -> Option<Literal> {
        let location = node_span(node).start;
        let raw = self.text(node);
        let value = match node.kind() {
            "integer" => parse_int(raw)?,
            "float" => parse_float(raw)?,
            "true" => LiteralValue::Bool(true),
            "false" => LiteralValue::Bool(false),
            "none" => LiteralValue::None,
            "string" => LiteralValue::Str(raw.trim_matches(['"', '\'']).to_string()),
            "parenthesized_expression" => {
                let mut inner = self.literal(node.named_child(0)?)?;
                inner.location = location;
                return Some(inner);
            }
            "unary_operator" => {
                let operator = node.child_by_field_name("operator")?;
                let argument = self.literal(node.child_by_field_name("argument")?)?;
                let negate = match operator.kind() {
                    "-" => true,
                    "+" => false,
                    _ => return None,
                };
                let value = match (argument.value, negate) {
                    (LiteralValue::Int(i), true) => LiteralValue::Int(i.checked_neg()?),
                    (LiteralValue::Float(f), true) => LiteralValue::Float(-f),
                    (v @ (LiteralValue::Int(_) | LiteralValue::Float(_)), false) => v,
                    _ => return None,
                };
                return Some(Literal {
                    raw: format!("{}{}", operator.kind(), argument.raw),
                    value,
                    location,
                });
            }
            _ => return None,
        };
        Some(Literal {
            raw: raw.to_string(),
            value,
            location,
        })
    }

    /// Numeric literals in a comparison operand, looking through arithmetic
    fn numeric_literals(&self, node: Node, out: &mut Vec<Literal>) {
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            if let Some(literal) = self.literal(node) {
                if literal.is_numeric() {
                    out.push(literal);
                }
                continue;
            }
            if matches!(node.kind(), "binary_operator" | "parenthesized_expression" | "unary_operator") {
                let mut cursor = node.walk();
                let children: Vec<Node> = node.named_children(&mut cursor).collect();
                stack.extend(children.into_iter().rev());
            }
        }
    }
}

fn parse_int(raw: &str) -> Option<LiteralValue> {
    let text = raw.replace('_', "").to_ascii_lowercase();
    if text.ends_with('j') {
        return None;
    }
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = text.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = text.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        text.parse::<i64>().ok()
    };
    match parsed {
        Some(i) => Some(LiteralValue::Int(i)),
        None => text.parse::<f64>().ok().map(LiteralValue::Float),
    }
}

fn parse_float(raw: &str) -> Option<LiteralValue> {
    let text = raw.replace('_', "");
    if text.ends_with(['j', 'J']) {
        return None;
    }
    text.parse::<f64>().ok().map(LiteralValue::Float)
}
