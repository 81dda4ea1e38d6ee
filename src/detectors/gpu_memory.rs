//! GPU-Memory-Leak Detector
//!
//! Presence/absence patterns over the event log; no tensor types needed.

use crate::config::{AnalyzerConfig, GpuConfig};
use crate::detectors::base::{DetectionContext, Detector};
use crate::extract::{CallCategory, Event, EventKind, LoopId};
use crate::models::{Confidence, Finding, Location, PatternType, Severity};
use tracing::{debug, info};

pub struct GpuMemoryLeakDetector {
    gpu: GpuConfig,
}

/// Whether the last dotted segment of `name` contains one of `markers`
fn is_marked(name: &str, markers: &[String]) -> bool {
    let last = name.rsplit('.').next().unwrap_or(name).to_ascii_lowercase();
    markers.iter().any(|marker| last.contains(marker.as_str()))
}

impl GpuMemoryLeakDetector {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            gpu: config.gpu.clone(),
        }
    }

    fn is_loss_like(&self, name: &str, def: Option<&Event>) -> bool {
        let markers = &self.gpu.loss_markers;
        is_marked(name, markers)
            || def.is_some_and(|d| {
                is_marked(&d.callee, markers) || d.references.iter().any(|r| is_marked(r, markers))
            })
    }

    /// Loss tensors appended to a list or summed into a running total
    fn accumulation(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        let sites = ctx.log.events().iter().filter(|e| {
            e.is(EventKind::Call, CallCategory::ContainerAppend) || e.is_augmented()
        });

        for site in sites {
            let scope = site.scope.as_deref();
            for name in &site.arguments {
                let def = ctx.tracker.reaching_definition(scope, name, site.location());
                if !self.is_loss_like(name, def) {
                    continue;
                }
                if def.is_some_and(|d| d.category == Some(CallCategory::Detach)) {
                    continue;
                }
                let since = def.map(Event::location).unwrap_or_default();
                let detached = ctx.log.calls().any(|call| {
                    call.category == Some(CallCategory::Detach)
                        && call.receiver.as_deref() == Some(name.as_str())
                        && call.location() > since
                        && call.location() < site.location()
                });
                if detached {
                    debug!("'{}' is detached before line {}", name, site.location().line);
                    continue;
                }

                let confidence = if def.is_some() { 0.85 } else { 0.6 };
                let how = if site.is_augmented() {
                    format!("summed with '{}'", site.callee)
                } else {
                    format!("stored via {}()", site.callee)
                };
                findings.push(
                    Finding::new(
                        self.name(),
                        PatternType::GpuTensorAccumulation,
                        Severity::High,
                        Confidence::saturating(confidence),
                        site.location(),
                        format!("Loss tensor '{name}' {how} without detach()"),
                    )
                    .with_explanation(
                        "The accumulated tensor keeps its autograd graph alive, so every \
                         iteration's activations stay on the GPU until the container is freed.",
                    )
                    .with_fix(
                        "Store a detached Python number instead:\n\
                         ```python\n\
                         losses.append(loss.item())\n\
                         total_loss += loss.detach()\n\
                         ```",
                    )
                    .with_variables([name.clone()]),
                );
            }
        }
        findings
    }

    /// Outermost loops that move tensors to the device and never clear the cache
    fn cache_clearing(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        for scope in ctx.log.loops().iter().filter(|l| l.parent.is_none()) {
            let transfers: Vec<&Event> = ctx
                .log
                .in_loop(scope.id)
                .filter(|e| e.category == Some(CallCategory::DeviceTransfer))
                .collect();
            if transfers.is_empty() {
                continue;
            }
            let clears = ctx
                .log
                .in_loop(scope.id)
                .any(|e| e.category == Some(CallCategory::CacheClear));
            if clears {
                continue;
            }

            let mut moved: Vec<String> = transfers
                .iter()
                .filter_map(|e| e.receiver.clone())
                .collect();
            moved.dedup();
            findings.push(
                Finding::new(
                    self.name(),
                    PatternType::MissingCacheClear,
                    Severity::Medium,
                    Confidence::fixed(0.6),
                    scope.span.start,
                    format!(
                        "Loop moves tensors to the GPU {} time(s) without torch.cuda.empty_cache()",
                        transfers.len()
                    ),
                )
                .with_explanation(
                    "Cached allocator blocks from earlier iterations are never returned, so \
                     long-running loops fragment GPU memory and can run out of it.",
                )
                .with_fix(
                    "Release references and clear the cache at the end of each iteration:\n\
                     ```python\n\
                     del model, data\n\
                     torch.cuda.empty_cache()\n\
                     ```",
                )
                .with_variables(moved),
            );
        }
        findings
    }

    fn is_optimizer_step(&self, event: &Event) -> bool {
        event.category == Some(CallCategory::OptimizerStep)
            && event
                .receiver
                .as_deref()
                .is_some_and(|r| is_marked(r, &self.gpu.optimizer_markers))
    }

    /// Loops running backward() and step() with no usable gradient reset
    fn gradient_reset(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        let innermost = |e: &Event, id: LoopId| e.loops.last() == Some(&id);

        for scope in ctx.log.loops() {
            let Some(backward) = ctx
                .log
                .in_loop(scope.id)
                .filter(|e| innermost(e, scope.id) && e.category == Some(CallCategory::Backward))
                .min_by_key(|e| e.location())
            else {
                continue;
            };
            let steps: Vec<Location> = ctx
                .log
                .in_loop(scope.id)
                .filter(|e| innermost(e, scope.id) && self.is_optimizer_step(e))
                .map(Event::location)
                .collect();
            if steps.is_empty() {
                continue;
            }
            let resets: Vec<Location> = ctx
                .log
                .in_loop(scope.id)
                .filter(|e| e.category == Some(CallCategory::GradientReset))
                .map(Event::location)
                .collect();

            let finding = if resets.is_empty() {
                Finding::new(
                    self.name(),
                    PatternType::MissingGradientReset,
                    Severity::High,
                    Confidence::fixed(0.8),
                    backward.location(),
                    "backward() and step() run in a loop without zero_grad()",
                )
                .with_explanation(
                    "Gradients add up across iterations, so every step applies the sum of all \
                     previous gradients and the graph history grows with it.",
                )
            } else {
                let next_step = steps.iter().copied().filter(|s| *s > backward.location()).min();
                let between = next_step.is_some_and(|step| {
                    resets
                        .iter()
                        .all(|reset| *reset > backward.location() && *reset < step)
                });
                if !between {
                    continue;
                }
                Finding::new(
                    self.name(),
                    PatternType::MissingGradientReset,
                    Severity::High,
                    Confidence::fixed(0.9),
                    backward.location(),
                    "zero_grad() runs between backward() and step()",
                )
                .with_explanation(
                    "Resetting after backward() discards the freshly computed gradients, \
                     so step() updates with zeros.",
                )
            };

            findings.push(finding.with_fix(
                "Reset before the backward pass:\n\
                 ```python\n\
                 optimizer.zero_grad()\n\
                 loss.backward()\n\
                 optimizer.step()\n\
                 ```",
            ));
        }
        findings
    }
}

impl Detector for GpuMemoryLeakDetector {
    fn name(&self) -> &'static str {
        "gpu-memory-leak"
    }

    fn description(&self) -> &'static str {
        "Detects tensor accumulation, missing cache clearing and missing gradient resets"
    }

    fn detect(&self, ctx: &DetectionContext) -> Vec<Finding> {
        let mut findings = self.accumulation(ctx);
        findings.extend(self.cache_clearing(ctx));
        findings.extend(self.gradient_reset(ctx));

        info!("GpuMemoryLeakDetector found {} findings", findings.len());
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::run_detector;

    fn detect(source: &str) -> Vec<Finding> {
        run_detector(&GpuMemoryLeakDetector::new(&AnalyzerConfig::default()), source)
    }

    #[test]
    fn test_loss_appended_without_detach() {
        let findings = detect(
            r#"
criterion = nn.MSELoss()
losses = []
for i in range(50):
    output = model(torch.randn(100, 10))
    loss = criterion(output, target)
    losses.append(loss)
    loss.backward()
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].pattern_type, PatternType::GpuTensorAccumulation);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].location.line, 7);
        assert!((findings[0].confidence.value() - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_detached_values_are_clean() {
        let findings = detect(
            r#"
for i in range(50):
    loss = criterion(output, target)
    losses.append(loss.detach().item())
    total_loss += loss.item()
    value = loss.item()
    history.append(value)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_running_total_of_loss() {
        let findings = detect(
            r#"
total_loss = 0
for batch in loader:
    loss = criterion(model(batch), batch.y)
    total_loss += loss
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("summed"));
    }

    #[test]
    fn test_unknown_loss_definition_scores_lower() {
        let findings = detect("def log(batch_loss):\n    history.append(batch_loss)\n");
        assert_eq!(findings.len(), 1);
        assert!((findings[0].confidence.value() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_missing_cache_clear_per_outer_loop() {
        let findings = detect(
            r#"
def train_multiple_models():
    for model_idx in range(10):
        model = torch.nn.Linear(1000, 1000).cuda()
        data = torch.randn(1000, 1000).cuda()
        for epoch in range(100):
            output = model(data)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].pattern_type, PatternType::MissingCacheClear);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].location.line, 3);

        let cleared = detect(
            r#"
for model_idx in range(10):
    data = batch.to(device)
    torch.cuda.empty_cache()
"#,
        );
        assert!(cleared.is_empty());
    }

    #[test]
    fn test_missing_zero_grad() {
        let findings = detect(
            r#"
for epoch in range(100):
    for batch in dataloader:
        output = model(batch.x)
        loss = criterion(output, batch.y)
        loss.backward()
        optimizer.step()
"#,
        );
        let resets: Vec<_> = findings
            .iter()
            .filter(|f| f.pattern_type == PatternType::MissingGradientReset)
            .collect();
        assert_eq!(resets.len(), 1);
        assert_eq!(resets[0].location.line, 6);
    }

    #[test]
    fn test_zero_grad_placement() {
        let proper = detect(
            r#"
for batch in dataloader:
    optimizer.zero_grad()
    loss = criterion(model(batch.x), batch.y)
    loss.backward()
    optimizer.step()
    scheduler.step()
"#,
        );
        assert!(proper.is_empty());

        let misplaced = detect(
            r#"
for batch in dataloader:
    loss = criterion(model(batch.x), batch.y)
    loss.backward()
    optimizer.zero_grad()
    optimizer.step()
"#,
        );
        assert_eq!(misplaced.len(), 1);
        assert!(misplaced[0].message.contains("between"));
    }
}
