//! Remote Object Model
//!
//! Typed representation of what crosses the wire to the reflection agent:
//! primitives, class references and live-object handles, plus the tagged
//! string encoding used for call arguments.

mod args;
mod object;

pub use args::{
    decode_arg, encode_arg, encode_args, ArgError, CLASS_TAG, FLOAT_TAG, INT_TAG, OBJECT_TAG,
    STRING_TAG,
};
pub use object::{format_float, ObjectRef, RemoteObject, CLASS_NAME_KEY, HASH_KEY};
