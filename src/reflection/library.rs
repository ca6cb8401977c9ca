//! `reflection` keyword library
//!
//! ```text
//! import reflection
//! new android.content.Intent as intent
//! call $intent setAction android.intent.action.VIEW
//! int 500 as ms
//! call_static android.os.SystemClock sleep $ms
//! ```
//!
//! Script tokens arrive as strings, so `class`, `int` and `float` convert a
//! literal into the tagged value a remote signature expects. `cast` rebinds
//! a handle's declared class.

use std::sync::Arc;

use async_trait::async_trait;

use super::proxy::{self, Reflection};
use crate::remote::RemoteObject;
use crate::script::{FnKeyword, Keyword, KeywordContext, KeywordError, KeywordLibrary};

/// Name used with `import`.
pub const LIBRARY_NAME: &str = "reflection";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Call,
    CallStatic,
    New,
    Delete,
    SetField,
}

impl Op {
    const ALL: [Op; 5] = [Op::Call, Op::CallStatic, Op::New, Op::Delete, Op::SetField];

    fn keyword(&self) -> &'static str {
        match self {
            Op::Call => proxy::CALL,
            Op::CallStatic => proxy::CALL_STATIC,
            Op::New => proxy::NEW,
            Op::Delete => proxy::DELETE,
            Op::SetField => "set_field",
        }
    }

    fn check_arity(&self, got: usize) -> Result<(), KeywordError> {
        let keyword = self.keyword();
        match self {
            Op::Call | Op::CallStatic => KeywordError::check_min(keyword, 2, got),
            Op::New => KeywordError::check_min(keyword, 1, got),
            Op::Delete => KeywordError::check_exact(keyword, 1, got),
            Op::SetField => KeywordError::check_exact(keyword, 3, got),
        }
    }
}

struct ReflectionKeyword(Op);

#[async_trait]
impl Keyword for ReflectionKeyword {
    async fn invoke(
        &self,
        ctx: &KeywordContext,
        args: Vec<RemoteObject>,
    ) -> Result<RemoteObject, KeywordError> {
        let op = self.0;
        let keyword = op.keyword();
        op.check_arity(args.len())?;

        let session = ctx.session()?;
        let reflection = Reflection::new(session);
        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or_default();

        let result = match op {
            Op::Call => {
                let instance = next();
                let method = name_arg(keyword, next())?;
                let rest: Vec<RemoteObject> = args.collect();
                reflection.call(&instance, &method, &rest).await?
            }
            Op::CallStatic => {
                let class_name = class_arg(keyword, next())?;
                let method = name_arg(keyword, next())?;
                let rest: Vec<RemoteObject> = args.collect();
                reflection.call_static(&class_name, &method, &rest).await?
            }
            Op::New => {
                let class_name = class_arg(keyword, next())?;
                let rest: Vec<RemoteObject> = args.collect();
                reflection.new_instance(&class_name, &rest).await?
            }
            Op::Delete => reflection.delete(&next()).await?,
            Op::SetField => {
                let target = next();
                let field = name_arg(keyword, next())?;
                reflection.set_field(&target, &field, &next()).await?
            }
        };
        Ok(result)
    }
}

/// Method or field name
fn name_arg(keyword: &str, value: RemoteObject) -> Result<String, KeywordError> {
    match value {
        RemoteObject::Str(name) if !name.is_empty() => Ok(name),
        other => Err(KeywordError::invalid(
            keyword,
            format!("expected a member name, got {} {}", other.kind(), other),
        )),
    }
}

/// Class reference; a plain string is taken as the class name.
fn class_arg(keyword: &str, value: RemoteObject) -> Result<String, KeywordError> {
    match value {
        RemoteObject::Class(name) | RemoteObject::Str(name) if !name.is_empty() => Ok(name),
        other => Err(KeywordError::invalid(
            keyword,
            format!("expected a class name, got {} {}", other.kind(), other),
        )),
    }
}

fn single(keyword: &str, args: Vec<RemoteObject>) -> Result<RemoteObject, KeywordError> {
    KeywordError::check_exact(keyword, 1, args.len())?;
    Ok(args.into_iter().next().unwrap_or_default())
}

fn to_class(_: &KeywordContext, args: Vec<RemoteObject>) -> Result<RemoteObject, KeywordError> {
    let value = single("class", args)?;
    class_arg("class", value).map(RemoteObject::Class)
}

fn to_int(_: &KeywordContext, args: Vec<RemoteObject>) -> Result<RemoteObject, KeywordError> {
    match single("int", args)? {
        RemoteObject::Int(i) => Ok(RemoteObject::Int(i)),
        RemoteObject::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(RemoteObject::Int)
            .map_err(|_| KeywordError::invalid("int", format!("{:?} is not an integer", s))),
        other => Err(KeywordError::invalid(
            "int",
            format!("cannot convert {} to int", other.kind()),
        )),
    }
}

fn to_float(_: &KeywordContext, args: Vec<RemoteObject>) -> Result<RemoteObject, KeywordError> {
    match single("float", args)? {
        RemoteObject::Float(f) => Ok(RemoteObject::Float(f)),
        RemoteObject::Int(i) => Ok(RemoteObject::Float(i as f64)),
        RemoteObject::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(RemoteObject::Float)
            .map_err(|_| KeywordError::invalid("float", format!("{:?} is not a number", s))),
        other => Err(KeywordError::invalid(
            "float",
            format!("cannot convert {} to float", other.kind()),
        )),
    }
}

/// `cast <object> <class>`
fn cast(_: &KeywordContext, args: Vec<RemoteObject>) -> Result<RemoteObject, KeywordError> {
    KeywordError::check_exact("cast", 2, args.len())?;
    let mut args = args.into_iter();
    let target = args.next().unwrap_or_default();
    let class_name = class_arg("cast", args.next().unwrap_or_default())?;
    match target {
        RemoteObject::Object(obj) => Ok(RemoteObject::Object(obj.with_class_name(class_name))),
        other => Err(KeywordError::invalid(
            "cast",
            format!("expected an object handle, got {}", other.kind()),
        )),
    }
}

/// Reflection keywords, loaded with `import reflection`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReflectionLibrary;

impl KeywordLibrary for ReflectionLibrary {
    fn name(&self) -> &str {
        LIBRARY_NAME
    }

    fn keywords(&self) -> Vec<(String, Arc<dyn Keyword>)> {
        let mut keywords: Vec<(String, Arc<dyn Keyword>)> = Op::ALL
            .iter()
            .map(|op| {
                let keyword: Arc<dyn Keyword> = Arc::new(ReflectionKeyword(*op));
                (op.keyword().to_string(), keyword)
            })
            .collect();
        keywords.push(("class".into(), Arc::new(FnKeyword::new(to_class))));
        keywords.push(("int".into(), Arc::new(FnKeyword::new(to_int))));
        keywords.push(("float".into(), Arc::new(FnKeyword::new(to_float))));
        keywords.push(("cast".into(), Arc::new(FnKeyword::new(cast))));
        keywords
    }
}
