//! Keyword scripts
//!
//! A script is plain text, one keyword call per line:
//!
//! ```text
//! import reflection
//! # comments start with '#'
//! click_id "com.app:id/login" as button
//! check Login $button.text
//! ```
//!
//! Tokens are space separated, double quotes group a token with spaces,
//! `as <name>` binds the result and `$name` / `$name.attr` read it back.

mod context;
mod error;
mod events;
mod interpreter;
mod line;
mod parser;
mod registry;
mod runner;
mod variables;

pub use context::KeywordContext;
pub use error::{KeywordError, ParseError};
pub use events::{EventLog, StatusEvent, StatusKind, StatusListener};
pub use interpreter::{ExecutionReport, Interpreter, LineFailure};
pub use line::{Arg, KeywordLine};
pub use parser::{tokenize, AS};
pub use registry::{FnKeyword, Keyword, KeywordLibrary, KeywordRegistry, CHECK, IMPORT};
pub use runner::{Case, CaseOutcome, CaseResult, CaseRunner, TestReport};
pub use variables::VariableStore;
