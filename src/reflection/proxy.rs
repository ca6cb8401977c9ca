//! Reflection calls over a device session
//!
//! Every reflection call is a version-2 RPC whose arguments, method and
//! field names included, are type-tagged strings. The agent answers with at
//! most one result value, which is rehydrated into a [`RemoteObject`].

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::remote::{encode_args, RemoteObject};
use crate::rpc::{CallOptions, DeviceSession, RpcError};

/// Invoke a method on an instance.
pub const CALL: &str = "call";
/// Invoke a static method on a class.
pub const CALL_STATIC: &str = "call_static";
/// Construct an instance.
pub const NEW: &str = "new";
/// Release an instance held by the agent.
pub const DELETE: &str = "delete";
/// Assign a field.
pub const SET_FIELD: &str = "set";

/// Reflection view of one device session.
#[derive(Debug, Clone, Copy)]
pub struct Reflection<'a> {
    session: &'a DeviceSession,
    timeout: Duration,
}

impl<'a> Reflection<'a> {
    pub fn new(session: &'a DeviceSession) -> Self {
        Self {
            session,
            timeout: session.default_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `instance.method(args...)`
    pub async fn call(
        &self,
        instance: &RemoteObject,
        method: &str,
        args: &[RemoteObject],
    ) -> Result<RemoteObject, RpcError> {
        let mut call_args = Vec::with_capacity(args.len() + 2);
        call_args.push(instance.clone());
        call_args.push(RemoteObject::str(method));
        call_args.extend_from_slice(args);
        self.invoke(CALL, &call_args).await
    }

    /// `class.method(args...)`
    pub async fn call_static(
        &self,
        class_name: &str,
        method: &str,
        args: &[RemoteObject],
    ) -> Result<RemoteObject, RpcError> {
        let mut call_args = Vec::with_capacity(args.len() + 2);
        call_args.push(RemoteObject::class(class_name));
        call_args.push(RemoteObject::str(method));
        call_args.extend_from_slice(args);
        self.invoke(CALL_STATIC, &call_args).await
    }

    /// `new class(args...)`
    pub async fn new_instance(
        &self,
        class_name: &str,
        args: &[RemoteObject],
    ) -> Result<RemoteObject, RpcError> {
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(RemoteObject::class(class_name));
        call_args.extend_from_slice(args);
        self.invoke(NEW, &call_args).await
    }

    pub async fn delete(&self, instance: &RemoteObject) -> Result<RemoteObject, RpcError> {
        self.invoke(DELETE, std::slice::from_ref(instance)).await
    }

    /// `target.field = value`
    pub async fn set_field(
        &self,
        target: &RemoteObject,
        field: &str,
        value: &RemoteObject,
    ) -> Result<RemoteObject, RpcError> {
        let call_args = [target.clone(), RemoteObject::str(field), value.clone()];
        self.invoke(SET_FIELD, &call_args).await
    }

    /// Send one reflection call. An empty result list yields `Null`.
    pub async fn invoke(&self, name: &str, args: &[RemoteObject]) -> Result<RemoteObject, RpcError> {
        let tagged: Vec<Value> = encode_args(args)?.into_iter().map(Value::String).collect();
        debug!(
            "[reflection] {} {} {:?}",
            self.session.device_id(),
            name,
            tagged
        );

        let options = CallOptions::reflection().with_timeout(self.timeout);
        let response = self.session.call_with(name, tagged, options).await?;
        Ok(response
            .args
            .into_iter()
            .next()
            .map(RemoteObject::from_json)
            .unwrap_or_default())
    }
}
