//! Keyword script interpreter
//!
//! Loading and running are separate steps:
//!
//! 1. [`Interpreter::parse`] tokenizes every line, resolves names and
//!    processes `import`. The first problem aborts the load with a
//!    [`ParseError`] naming the line.
//! 2. [`Interpreter::execute`] runs the loaded lines in order against a
//!    [`KeywordContext`]. A failing line is reported as an `ERROR` event and
//!    execution continues with the next line.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::KeywordContext;
use super::error::{KeywordError, ParseError};
use super::events::{StatusEvent, StatusKind, StatusListener};
use super::line::KeywordLine;
use super::parser::tokenize;
use super::registry::{Keyword, KeywordLibrary, KeywordRegistry, IMPORT};
use super::variables::VariableStore;
use crate::remote::RemoteObject;

/// One failed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFailure {
    pub line_number: usize,
    pub message: String,
}

/// Outcome of one [`Interpreter::execute`] pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub lines_executed: usize,
    pub failures: Vec<LineFailure>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
pub struct Interpreter {
    registry: KeywordRegistry,
    variables: VariableStore,
    lines: Vec<KeywordLine>,
    line_count: usize,
    case_id: u64,
    listener: Option<Arc<dyn StatusListener>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a prepared registry (libraries, user keywords).
    pub fn with_registry(registry: KeywordRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &KeywordRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut KeywordRegistry {
        &mut self.registry
    }

    pub fn register(&mut self, name: impl Into<String>, keyword: impl Keyword + 'static) {
        self.registry.register(name, keyword);
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&KeywordContext, Vec<RemoteObject>) -> Result<RemoteObject, KeywordError>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register_fn(name, f);
    }

    pub fn add_library(&mut self, library: impl KeywordLibrary + 'static) {
        self.registry.add_library(library);
    }

    pub fn set_case_id(&mut self, case_id: u64) {
        self.case_id = case_id;
    }

    pub fn case_id(&self) -> u64 {
        self.case_id
    }

    pub fn lines(&self) -> &[KeywordLine] {
        &self.lines
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Load a script.
    ///
    /// Line numbers continue from any previously loaded text, so a script
    /// may be fed in several pieces. On error nothing from `text` is kept:
    /// lines, declared variables, imports and numbering are as before the call.
    pub fn parse(&mut self, text: &str) -> Result<&[KeywordLine], ParseError> {
        let loaded = self.lines.len();
        let line_count = self.line_count;
        let variables = self.variables.clone();
        let registry = self.registry.clone();

        for line in text.lines() {
            let line_number = self.line_count + 1;
            if let Err(e) = self.parse_line(line, line_number) {
                self.lines.truncate(loaded);
                self.line_count = line_count;
                self.variables = variables;
                self.registry = registry;
                return Err(e);
            }
        }
        Ok(&self.lines)
    }

    /// Load one line. Blank lines consume their number and yield `None`.
    pub fn parse_line(
        &mut self,
        line: &str,
        line_number: usize,
    ) -> Result<Option<KeywordLine>, ParseError> {
        self.line_count = self.line_count.max(line_number);

        let raw = line.trim_end_matches('\r');
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let kw_line = tokenize(raw, line_number)?;
        if !kw_line.is_comment() {
            self.resolve_names(&kw_line)?;
        }

        debug!(
            "[interpreter] parsed line {}: {:?}",
            line_number,
            kw_line.items()
        );
        self.lines.push(kw_line.clone());
        Ok(Some(kw_line))
    }

    fn resolve_names(&mut self, kw_line: &KeywordLine) -> Result<(), ParseError> {
        let line = kw_line.line_number();

        if let Some(name) = kw_line
            .referenced_vars()
            .find(|name| !self.variables.is_declared(name))
        {
            return Err(ParseError::UndefinedVariable {
                line,
                name: name.to_string(),
            });
        }

        let keyword = kw_line.keyword().unwrap_or_default();
        if keyword == IMPORT {
            let [library] = kw_line.args() else {
                return Err(ParseError::MalformedImport {
                    line,
                    got: kw_line.args().len(),
                });
            };
            let count = self
                .registry
                .import(library)
                .ok_or_else(|| ParseError::UnknownLibrary {
                    line,
                    name: library.clone(),
                })?;
            info!("[interpreter] imported {} ({} keywords)", library, count);
        } else if !self.registry.contains(keyword) && !self.variables.is_declared(keyword) {
            return Err(ParseError::UnknownKeyword {
                line,
                name: keyword.to_string(),
            });
        }

        if let Some(var) = kw_line.output_var() {
            self.variables.declare(var);
        }
        Ok(())
    }

    /// Run every loaded line in order.
    ///
    /// Emits `CASE_START`, then `KW_LINE_START`/`KW_LINE_END` around each
    /// line (with `ERROR` in between on failure), then `CASE_END`.
    pub async fn execute(
        &mut self,
        ctx: &KeywordContext,
        listener: Option<Arc<dyn StatusListener>>,
    ) -> ExecutionReport {
        self.listener = listener;
        let mut report = ExecutionReport::default();

        self.emit(self.event(ctx, StatusKind::CaseStart));
        info!(
            "[interpreter] case {} started on {} ({} lines)",
            self.case_id,
            ctx.device_id(),
            self.lines.len()
        );

        for index in 0..self.lines.len() {
            let line = self.lines[index].clone();
            let line_number = line.line_number();

            self.emit(self.event(ctx, StatusKind::LineStart).at_line(line_number));

            if let Err(e) = self.execute_line(&line, ctx).await {
                warn!(
                    "[interpreter] case {} line {} failed: {}",
                    self.case_id, line_number, e
                );
                let message = e.to_string();
                self.emit(
                    self.event(ctx, StatusKind::Error)
                        .at_line(line_number)
                        .with_message(message.clone()),
                );
                report.failures.push(LineFailure {
                    line_number,
                    message,
                });
            }

            self.emit(self.event(ctx, StatusKind::LineEnd).at_line(line_number));
            report.lines_executed += 1;
        }

        self.emit(self.event(ctx, StatusKind::CaseEnd));
        info!(
            "[interpreter] case {} finished: {} lines, {} failed",
            self.case_id,
            report.lines_executed,
            report.failures.len()
        );
        report
    }

    /// Run on a worker task. The interpreter is handed back with the report.
    pub fn spawn(
        mut self,
        ctx: KeywordContext,
        listener: Option<Arc<dyn StatusListener>>,
    ) -> JoinHandle<(Self, ExecutionReport)> {
        tokio::spawn(async move {
            let report = self.execute(&ctx, listener).await;
            (self, report)
        })
    }

    async fn execute_line(
        &mut self,
        line: &KeywordLine,
        ctx: &KeywordContext,
    ) -> Result<(), KeywordError> {
        let keyword = match line.keyword() {
            Some(keyword) if !line.is_comment() && keyword != IMPORT => keyword,
            _ => return Ok(()),
        };

        let args = line
            .args()
            .iter()
            .map(|token| self.variables.resolve(token))
            .collect::<Result<Vec<_>, _>>()?;

        let func = self
            .registry
            .get(keyword)
            .ok_or_else(|| KeywordError::NotCallable(keyword.to_string()))?;
        let result = AssertUnwindSafe(func.invoke(ctx, args))
            .catch_unwind()
            .await
            .map_err(|payload| KeywordError::Panicked {
                keyword: keyword.to_string(),
                message: panic_message(&*payload),
            })??;

        if let Some(var) = line.output_var() {
            self.variables.set(var, result);
        }
        Ok(())
    }

    /// Forget loaded lines, variables, non-built-in keywords and the
    /// listener.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.variables.clear();
        self.registry.reset();
        self.line_count = 0;
        self.listener = None;
    }

    fn event(&self, ctx: &KeywordContext, kind: StatusKind) -> StatusEvent {
        StatusEvent::new(kind, ctx.device_id(), self.case_id)
    }

    fn emit(&self, event: StatusEvent) {
        if let Some(listener) = &self.listener {
            listener.update(event);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("registry", &self.registry)
            .field("lines", &self.lines.len())
            .field("variables", &self.variables.len())
            .field("case_id", &self.case_id)
            .finish()
    }
}
