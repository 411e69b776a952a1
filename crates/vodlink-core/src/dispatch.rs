//! Method call routing
//!
//! Decodes inbound `{method, arguments}` calls, runs them against the
//! registry and encodes a reply. Per-session calls name the session with
//! `sessionId` or with the `textureId` returned by `create`.

use crate::{
    Error, PlaybackConfig, PlaybackSession, Result, SessionId, SessionRegistry, SourceSpec,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// One inbound command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Outcome of a method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Reply {
    Success {
        #[serde(skip_serializing_if = "Value::is_null", default)]
        result: Value,
    },
    Error {
        code: String,
        message: String,
    },
    NotImplemented,
}

impl Reply {
    fn ok() -> Self {
        Reply::Success { result: Value::Null }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success { .. })
    }
}

impl From<Error> for Reply {
    fn from(err: Error) -> Self {
        Reply::Error {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Routes method calls to the registry and its sessions
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handle one call; failures are reported in the reply, never raised
    pub fn handle(&self, call: &MethodCall) -> Reply {
        debug!(method = %call.method, "Dispatching");

        match self.route(&call.method, &call.arguments) {
            None => {
                debug!(method = %call.method, "Method not implemented");
                Reply::NotImplemented
            }
            Some(Ok(Value::Null)) => Reply::ok(),
            Some(Ok(result)) => Reply::Success { result },
            Some(Err(e)) if e.is_session_scoped() => {
                debug!(method = %call.method, error = %e, "Method failed for session");
                e.into()
            }
            Some(Err(e)) => {
                warn!(method = %call.method, error = %e, "Method failed");
                e.into()
            }
        }
    }

    fn route(&self, method: &str, args: &Value) -> Option<Result<Value>> {
        let outcome = match method {
            "init" => {
                self.registry.dispose_all();
                Ok(())
            }
            "create" => return Some(self.create(args)),
            "play" => self.session(args).and_then(|s| s.play()),
            "pause" => self.session(args).and_then(|s| s.pause()),
            "seekTo" => int_arg(args, "location")
                .and_then(|location| self.session(args)?.seek_to(location)),
            "setRate" => float_arg(args, "rate")
                .and_then(|rate| self.session(args)?.set_rate(rate as f32)),
            "setBitrateIndex" => int_arg(args, "index")
                .and_then(|i| {
                    i32::try_from(i)
                        .map_err(|_| Error::InvalidArgument(format!("index {i} out of range")))
                })
                .and_then(|index| self.session(args)?.set_bitrate_index(index)),
            "dispose" => self
                .session(args)
                .and_then(|s| self.registry.dispose(s.id())),
            _ => return None,
        };
        Some(outcome.map(|_| Value::Null))
    }

    fn create(&self, args: &Value) -> Result<Value> {
        let config = PlaybackConfig::from_args(args)?;
        let source = SourceSpec::from_args(args)?;
        let id = self.registry.create(config, source)?;
        let session = self.registry.lookup(id)?;
        Ok(json!({
            "textureId": session.surface_id(),
            "sessionId": id,
        }))
    }

    fn session(&self, args: &Value) -> Result<Arc<PlaybackSession>> {
        if let Some(id) = args.get("sessionId").and_then(Value::as_i64) {
            return self.registry.lookup(SessionId(id));
        }
        if let Some(texture) = args.get("textureId").and_then(Value::as_i64) {
            return self.registry.lookup_surface(texture);
        }
        Err(Error::InvalidArgument(
            "textureId or sessionId is required".to_string(),
        ))
    }
}

fn int_arg(args: &Value, key: &str) -> Result<i64> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::InvalidArgument(format!("{key} must be an integer")))
}

fn float_arg(args: &Value, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::InvalidArgument(format!("{key} must be a number")))
}
