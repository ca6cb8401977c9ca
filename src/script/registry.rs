//! Keyword registry
//!
//! Maps keyword names to implementations. Two names are always present:
//! `import`, which the interpreter handles while parsing, and `check`.
//! Keyword libraries are catalogued up front and only become visible to a
//! script once it imports them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::KeywordContext;
use super::error::KeywordError;
use crate::remote::RemoteObject;

/// Built-in that loads a keyword library at parse time.
pub const IMPORT: &str = "import";
/// Built-in equality assertion.
pub const CHECK: &str = "check";

/// A callable keyword.
#[async_trait]
pub trait Keyword: Send + Sync {
    async fn invoke(
        &self,
        ctx: &KeywordContext,
        args: Vec<RemoteObject>,
    ) -> Result<RemoteObject, KeywordError>;
}

/// Keyword backed by a plain function.
pub struct FnKeyword<F>(F);

impl<F> FnKeyword<F>
where
    F: Fn(&KeywordContext, Vec<RemoteObject>) -> Result<RemoteObject, KeywordError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Keyword for FnKeyword<F>
where
    F: Fn(&KeywordContext, Vec<RemoteObject>) -> Result<RemoteObject, KeywordError> + Send + Sync,
{
    async fn invoke(
        &self,
        ctx: &KeywordContext,
        args: Vec<RemoteObject>,
    ) -> Result<RemoteObject, KeywordError> {
        (self.0)(ctx, args)
    }
}

/// A named bundle of keywords, loaded with `import <name>`.
pub trait KeywordLibrary: Send + Sync {
    fn name(&self) -> &str;
    fn keywords(&self) -> Vec<(String, Arc<dyn Keyword>)>;
}

struct Import;

#[async_trait]
impl Keyword for Import {
    async fn invoke(
        &self,
        _ctx: &KeywordContext,
        _args: Vec<RemoteObject>,
    ) -> Result<RemoteObject, KeywordError> {
        Ok(RemoteObject::Null)
    }
}

/// `check <expected> <actual>`: passes when the values are equal or print
/// the same, so a literal `5` matches an integer result of 5.
struct Check;

#[async_trait]
impl Keyword for Check {
    async fn invoke(
        &self,
        _ctx: &KeywordContext,
        args: Vec<RemoteObject>,
    ) -> Result<RemoteObject, KeywordError> {
        KeywordError::check_exact(CHECK, 2, args.len())?;
        let (expected, actual) = (&args[0], &args[1]);
        if expected == actual || expected.to_string() == actual.to_string() {
            return Ok(RemoteObject::Bool(true));
        }
        Err(KeywordError::CheckFailed {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct KeywordRegistry {
    keywords: HashMap<String, Arc<dyn Keyword>>,
    libraries: HashMap<String, Arc<dyn KeywordLibrary>>,
}

impl KeywordRegistry {
    /// Registry holding only the built-ins
    pub fn new() -> Self {
        let mut registry = Self {
            keywords: HashMap::new(),
            libraries: HashMap::new(),
        };
        registry.install_builtins();
        registry
    }

    fn install_builtins(&mut self) {
        self.keywords.insert(IMPORT.to_string(), Arc::new(Import));
        self.keywords.insert(CHECK.to_string(), Arc::new(Check));
    }

    /// Register a keyword, replacing any existing one with the same name.
    pub fn register(&mut self, name: impl Into<String>, keyword: impl Keyword + 'static) {
        self.keywords.insert(name.into(), Arc::new(keyword));
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&KeywordContext, Vec<RemoteObject>) -> Result<RemoteObject, KeywordError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, FnKeyword::new(f));
    }

    /// Make a library available to `import`.
    pub fn add_library(&mut self, library: impl KeywordLibrary + 'static) {
        let library: Arc<dyn KeywordLibrary> = Arc::new(library);
        self.libraries.insert(library.name().to_string(), library);
    }

    /// Load a library's keywords. Returns how many were added, or `None`
    /// when no library has that name.
    pub fn import(&mut self, name: &str) -> Option<usize> {
        let library = self.libraries.get(name)?.clone();
        let keywords = library.keywords();
        let count = keywords.len();
        self.keywords.extend(keywords);
        Some(count)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Keyword>> {
        self.keywords.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keywords.contains_key(name)
    }

    pub fn has_library(&self, name: &str) -> bool {
        self.libraries.contains_key(name)
    }

    /// Registered keyword names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.keywords.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Drop every keyword except the built-ins. The library catalog stays.
    pub fn reset(&mut self) {
        self.keywords.clear();
        self.install_builtins();
    }
}

impl Default for KeywordRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeywordRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut libraries: Vec<&str> = self.libraries.keys().map(String::as_str).collect();
        libraries.sort_unstable();
        f.debug_struct("KeywordRegistry")
            .field("keywords", &self.names())
            .field("libraries", &libraries)
            .finish()
    }
}
