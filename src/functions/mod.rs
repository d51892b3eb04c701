// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Function invocation.
//!
//! A [`FunctionHandler`] is anything that can turn an [`InvocationEvent`]
//! into a JSON result. The [`FunctionRegistry`] maps names and routes to
//! handlers, and the [`FunctionInvoker`] runs them on their own task with a
//! timeout.

mod event;
mod invoker;
mod process;
mod registry;
pub mod schedule;


use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use event::{EventMetadata, EventParts, InvocationEvent, generate_request_id, is_text_content_type};
pub use invoker::FunctionInvoker;
pub use process::ProcessFunction;
pub use registry::{FunctionEntry, FunctionKind, FunctionRegistry, FunctionRoute, RouteKind};

/// Why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationErrorKind {
    Timeout,
    RuntimeError,
    SyntaxError,
}

impl fmt::Display for InvocationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RuntimeError => "runtime-error",
            Self::SyntaxError => "syntax-error",
        };
        f.write_str(s)
    }
}

/// A failed invocation, with whatever output the function produced.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error_type}: {message}")]
pub struct InvocationError {
    pub kind: InvocationErrorKind,
    pub error_type: String,
    pub message: String,
    pub stack_trace: Vec<String>,
    pub stdout: String,
    pub stderr: String,
}

impl InvocationError {
    pub fn new(kind: InvocationErrorKind, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            error_type: error_type.into(),
            message: message.into(),
            stack_trace: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::new(
            InvocationErrorKind::Timeout,
            "TimeoutError",
            format!("Task timed out after {:.2} seconds", timeout.as_secs_f64()),
        )
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(InvocationErrorKind::RuntimeError, "Error", message)
    }

    /// Neither a result nor an error came back.
    pub fn crashed() -> Self {
        Self::runtime("Function invocation failed without producing a result")
    }

    /// Build from a result object carrying `errorType`/`errorMessage`/`stackTrace`.
    pub fn from_error_object(value: &Value) -> Self {
        let error_type = value
            .get("errorType")
            .and_then(Value::as_str)
            .unwrap_or("Error")
            .to_string();
        let message = match value.get("errorMessage") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let stack_trace = value
            .get("stackTrace")
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .map(|l| l.as_str().map(str::to_string).unwrap_or_else(|| l.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let kind = if error_type == "SyntaxError" {
            InvocationErrorKind::SyntaxError
        } else {
            InvocationErrorKind::RuntimeError
        };

        Self {
            stack_trace,
            ..Self::new(kind, error_type, message)
        }
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }
}

/// Either a JSON result object or a structured error.
pub type InvocationResult = Result<Value, InvocationError>;

/// Per-invocation context handed to a handler alongside the event.
#[derive(Debug, Clone, Default)]
pub struct FunctionContext {
    pub function_name: String,
    pub request_id: String,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl FunctionContext {
    pub fn new(function_name: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            request_id: request_id.into(),
            ..Default::default()
        }
    }
}

/// An invocable function.
#[async_trait]
pub trait FunctionHandler: fmt::Debug + Send + Sync {
    async fn invoke(&self, event: InvocationEvent, ctx: FunctionContext) -> InvocationResult;

    /// Short label used in logs.
    fn runtime(&self) -> &str {
        "custom"
    }
}

type BoxedHandlerFn = dyn Fn(InvocationEvent, FunctionContext) -> BoxFuture<'static, InvocationResult> + Send + Sync;

/// A handler backed by an async closure running inside the server process.
#[derive(Clone)]
pub struct InProcessFunction {
    func: Arc<BoxedHandlerFn>,
}

impl InProcessFunction {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(InvocationEvent, FunctionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InvocationResult> + Send + 'static,
    {
        Self {
            func: Arc::new(move |event, ctx| Box::pin(func(event, ctx))),
        }
    }
}

impl fmt::Debug for InProcessFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessFunction").finish_non_exhaustive()
    }
}

#[async_trait]
impl FunctionHandler for InProcessFunction {
    async fn invoke(&self, event: InvocationEvent, ctx: FunctionContext) -> InvocationResult {
        (self.func)(event, ctx).await
    }

    fn runtime(&self) -> &str {
        "in-process"
    }
}
