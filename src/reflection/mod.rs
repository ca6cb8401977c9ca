//! Reflection bridge
//!
//! [`Reflection`] issues reflection calls on a device session;
//! [`ReflectionLibrary`] exposes them to scripts.

mod library;
mod proxy;

pub use library::{ReflectionLibrary, LIBRARY_NAME};
pub use proxy::{Reflection, CALL, CALL_STATIC, DELETE, NEW, SET_FIELD};
