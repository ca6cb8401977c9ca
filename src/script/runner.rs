//! Case runner
//!
//! Runs a batch of scripts ("cases") against one device. Each case gets a
//! fresh interpreter built from the same keyword registry, so imports and
//! variables never leak from one case into the next. A case that fails to
//! load is reported and skipped; the batch always runs to the end.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::context::KeywordContext;
use super::events::{StatusEvent, StatusKind, StatusListener};
use super::interpreter::{ExecutionReport, Interpreter};
use super::registry::KeywordRegistry;

/// One script to run
#[derive(Debug, Clone, Serialize)]
pub struct Case {
    pub id: u64,
    pub name: String,
    pub script: String,
}

impl Case {
    pub fn new(id: u64, name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            script: script.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    /// Script could not be loaded; nothing ran
    ParseFailed { line: usize, message: String },
    Executed(ExecutionReport),
}

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub case_id: u64,
    pub name: String,
    pub outcome: CaseOutcome,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        matches!(&self.outcome, CaseOutcome::Executed(report) if report.is_success())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestReport {
    pub cases: Vec<CaseResult>,
}

impl TestReport {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

pub struct CaseRunner {
    registry: KeywordRegistry,
    listener: Option<Arc<dyn StatusListener>>,
}

impl CaseRunner {
    pub fn new(registry: KeywordRegistry) -> Self {
        Self {
            registry,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn StatusListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Run every case in order.
    ///
    /// Emits `TEST_START` first and `TEST_END` last. A case that fails to
    /// load is reported as `CASE_START`, `ERROR`, `CASE_END`.
    pub async fn run(&self, cases: &[Case], ctx: &KeywordContext) -> TestReport {
        let mut report = TestReport::default();
        self.emit(StatusEvent::new(StatusKind::TestStart, ctx.device_id(), 0));
        info!(
            "[case-runner] running {} case(s) on {}",
            cases.len(),
            ctx.device_id()
        );

        for case in cases {
            let outcome = self.run_case(case, ctx).await;
            report.cases.push(CaseResult {
                case_id: case.id,
                name: case.name.clone(),
                outcome,
            });
        }

        self.emit(StatusEvent::new(StatusKind::TestEnd, ctx.device_id(), 0));
        info!(
            "[case-runner] done on {}: {} passed, {} failed",
            ctx.device_id(),
            report.passed(),
            report.failed()
        );
        report
    }

    /// Run on a worker task.
    pub fn spawn(self, cases: Vec<Case>, ctx: KeywordContext) -> JoinHandle<TestReport> {
        tokio::spawn(async move { self.run(&cases, &ctx).await })
    }

    async fn run_case(&self, case: &Case, ctx: &KeywordContext) -> CaseOutcome {
        let mut interp = Interpreter::with_registry(self.registry.clone());
        interp.set_case_id(case.id);

        if let Err(e) = interp.parse(&case.script) {
            warn!("[case-runner] case {} ({}) failed to load: {}", case.id, case.name, e);
            let device_id = ctx.device_id();
            self.emit(StatusEvent::new(StatusKind::CaseStart, device_id, case.id));
            self.emit(
                StatusEvent::new(StatusKind::Error, device_id, case.id)
                    .at_line(e.line())
                    .with_message(e.to_string()),
            );
            self.emit(StatusEvent::new(StatusKind::CaseEnd, device_id, case.id));
            return CaseOutcome::ParseFailed {
                line: e.line(),
                message: e.to_string(),
            };
        }

        CaseOutcome::Executed(interp.execute(ctx, self.listener.clone()).await)
    }

    fn emit(&self, event: StatusEvent) {
        if let Some(listener) = &self.listener {
            listener.update(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteObject;
    use crate::script::events::EventLog;
    use crate::script::error::KeywordError;

    fn registry() -> KeywordRegistry {
        let mut registry = KeywordRegistry::new();
        registry.register_fn("echo", |_, mut args| Ok(args.pop().unwrap_or_default()));
        registry.register_fn("boom", |_, _| Err(KeywordError::failed("boom")));
        registry
    }

    #[tokio::test]
    async fn test_batch_continues_after_bad_case() {
        let log = EventLog::new();
        let runner = CaseRunner::new(registry()).with_listener(Arc::new(log.clone()));
        let cases = vec![
            Case::new(1, "good", "echo hi as x\ncheck hi $x"),
            Case::new(2, "unloadable", "echo \"oops"),
            Case::new(3, "failing", "boom\necho after"),
        ];

        let report = runner.run(&cases, &KeywordContext::detached("dev")).await;

        assert_eq!(report.cases.len(), 3);
        assert!(report.cases[0].passed());
        assert_eq!(
            report.cases[1].outcome,
            CaseOutcome::ParseFailed {
                line: 1,
                message: "line 1: missing closing quote".into()
            }
        );
        match &report.cases[2].outcome {
            CaseOutcome::Executed(exec) => {
                assert_eq!(exec.lines_executed, 2);
                assert_eq!(exec.failures.len(), 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 2);

        let kinds = log.kinds();
        assert_eq!(kinds.first(), Some(&StatusKind::TestStart));
        assert_eq!(kinds.last(), Some(&StatusKind::TestEnd));

        let errors = log.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].case_id, 2);
        assert_eq!(errors[1].case_id, 3);
        assert_eq!(errors[1].line_number, 1);
    }

    #[tokio::test]
    async fn test_cases_are_isolated() {
        let runner = CaseRunner::new(registry());
        let cases = vec![
            Case::new(1, "binds", "echo hi as x"),
            // $x belongs to case 1 only.
            Case::new(2, "reads", "check hi $x"),
        ];
        let report = runner.run(&cases, &KeywordContext::detached("dev")).await;
        assert!(report.cases[0].passed());
        assert!(matches!(
            report.cases[1].outcome,
            CaseOutcome::ParseFailed { line: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_shared_context_spans_cases() {
        let mut registry = registry();
        registry.register_fn("remember", |ctx, mut args| {
            ctx.set_var("last", args.pop().unwrap_or_default());
            Ok(RemoteObject::Null)
        });
        registry.register_fn("recall", |ctx, _| Ok(ctx.get_var("last").unwrap_or_default()));

        let runner = CaseRunner::new(registry);
        let cases = vec![
            Case::new(1, "store", "remember token"),
            Case::new(2, "load", "recall as t\ncheck token $t"),
        ];
        let report = runner
            .spawn(cases, KeywordContext::detached("dev"))
            .await
            .unwrap();
        assert!(report.is_success());
    }
}
