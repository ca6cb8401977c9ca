//! Type-tagged call arguments
//!
//! Every reflection argument travels as a string: a two-character tag
//! followed by the payload.
//!
//! | Tag  | Variant       | Payload                   |
//! |------|---------------|---------------------------|
//! | `01` | string        | raw characters            |
//! | `02` | integer       | decimal digits            |
//! | `03` | class ref     | fully-qualified name      |
//! | `04` | object ref    | `<hash>:<class name>`     |
//! | `05` | float-tagged  | decimal representation    |

use thiserror::Error;

use super::object::{format_float, ObjectRef, RemoteObject};

pub const STRING_TAG: &str = "01";
pub const INT_TAG: &str = "02";
pub const CLASS_TAG: &str = "03";
pub const OBJECT_TAG: &str = "04";
pub const FLOAT_TAG: &str = "05";

/// Tag width in bytes.
const TAG_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgError {
    #[error("Can't make remote call arg from {0} value")]
    Unsupported(&'static str),

    #[error("Argument too short to carry a type tag: {0:?}")]
    MissingTag(String),

    #[error("Unknown argument tag {tag:?} in {arg:?}")]
    UnknownTag { tag: String, arg: String },

    #[error("Invalid {kind} payload: {payload:?}")]
    InvalidPayload { kind: &'static str, payload: String },
}

/// Encode one call argument with its type tag.
pub fn encode_arg(arg: &RemoteObject) -> Result<String, ArgError> {
    match arg {
        RemoteObject::Str(s) => Ok(format!("{}{}", STRING_TAG, s)),
        RemoteObject::Int(i) => Ok(format!("{}{}", INT_TAG, i)),
        RemoteObject::Class(name) => Ok(format!("{}{}", CLASS_TAG, name)),
        RemoteObject::Object(obj) => Ok(format!("{}{}:{}", OBJECT_TAG, obj.hash, obj.class_name)),
        RemoteObject::Float(v) => Ok(format!("{}{}", FLOAT_TAG, format_float(*v))),
        other => Err(ArgError::Unsupported(other.kind())),
    }
}

/// Encode an ordered argument list, preserving call-signature order.
pub fn encode_args(args: &[RemoteObject]) -> Result<Vec<String>, ArgError> {
    args.iter().map(encode_arg).collect()
}

/// Decode a tagged argument. This is the agent's side of the contract;
/// the host uses it in tests and diagnostics.
pub fn decode_arg(arg: &str) -> Result<RemoteObject, ArgError> {
    if arg.len() < TAG_LEN || !arg.is_char_boundary(TAG_LEN) {
        return Err(ArgError::MissingTag(arg.to_string()));
    }
    let (tag, payload) = arg.split_at(TAG_LEN);
    match tag {
        STRING_TAG => Ok(RemoteObject::Str(payload.to_string())),
        INT_TAG => payload
            .parse::<i64>()
            .map(RemoteObject::Int)
            .map_err(|_| invalid("integer", payload)),
        CLASS_TAG => Ok(RemoteObject::Class(payload.to_string())),
        OBJECT_TAG => {
            let (hash, class_name) = payload
                .split_once(':')
                .ok_or_else(|| invalid("object", payload))?;
            let hash = hash.parse::<i64>().map_err(|_| invalid("object", payload))?;
            Ok(RemoteObject::Object(ObjectRef::new(hash, class_name)))
        }
        FLOAT_TAG => payload
            .parse::<f64>()
            .map(RemoteObject::Float)
            .map_err(|_| invalid("float", payload)),
        _ => Err(ArgError::UnknownTag {
            tag: tag.to_string(),
            arg: arg.to_string(),
        }),
    }
}

fn invalid(kind: &'static str, payload: &str) -> ArgError {
    ArgError::InvalidPayload {
        kind,
        payload: payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_encoding() {
        let view = RemoteObject::object(42, "android.view.View");
        assert_eq!(encode_arg(&view).unwrap(), "0442:android.view.View");
    }

    #[test]
    fn test_tag_per_variant() {
        assert_eq!(encode_arg(&RemoteObject::str("hi there")).unwrap(), "01hi there");
        assert_eq!(encode_arg(&RemoteObject::Int(-12)).unwrap(), "02-12");
        assert_eq!(
            encode_arg(&RemoteObject::class("com.robotium.solo.Solo")).unwrap(),
            "03com.robotium.solo.Solo"
        );
        assert_eq!(encode_arg(&RemoteObject::Float(3.0)).unwrap(), "053.0");
    }

    #[test]
    fn test_unsupported_variants_rejected() {
        assert_eq!(
            encode_arg(&RemoteObject::Null),
            Err(ArgError::Unsupported("null"))
        );
        assert!(encode_arg(&RemoteObject::Bool(true)).is_err());
    }

    #[test]
    fn test_order_preserved() {
        let args = vec![
            RemoteObject::object(1, "a.B"),
            RemoteObject::str("clickOnView"),
            RemoteObject::Int(3),
        ];
        assert_eq!(
            encode_args(&args).unwrap(),
            vec!["041:a.B", "01clickOnView", "023"]
        );
    }

    #[test]
    fn test_decode_object_with_colon_in_class() {
        // Only the first colon separates the handle.
        let decoded = decode_arg("049:Outer:Inner").unwrap();
        assert_eq!(decoded, RemoteObject::object(9, "Outer:Inner"));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_arg("0"), Err(ArgError::MissingTag(_))));
        assert!(matches!(decode_arg("99x"), Err(ArgError::UnknownTag { .. })));
        assert!(matches!(decode_arg("02abc"), Err(ArgError::InvalidPayload { .. })));
        assert!(matches!(decode_arg("04nocolon"), Err(ArgError::InvalidPayload { .. })));
    }
}
