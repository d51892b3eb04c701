// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Functions that run as a child process per invocation.
//!
//! The event is written to the child's stdin as one JSON document. The last
//! non-empty line on stdout is the result; anything printed before it is
//! treated as function logs.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{FunctionContext, FunctionHandler, InvocationError, InvocationEvent, InvocationResult};

#[derive(Debug, Clone)]
pub struct ProcessFunction {
    entry: PathBuf,
    interpreter: Option<String>,
}

impl ProcessFunction {
    /// Run `entry`, picking an interpreter from its extension.
    pub fn new(entry: impl Into<PathBuf>) -> Self {
        let entry = entry.into();
        let interpreter = interpreter_for(&entry).map(str::to_string);
        Self { entry, interpreter }
    }

    fn command(&self, ctx: &FunctionContext) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.entry);
                cmd
            }
            None => Command::new(&self.entry),
        };

        if let Some(dir) = self.entry.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        cmd.envs(&ctx.env)
            .env("SITEDEV_FUNCTION_NAME", &ctx.function_name)
            .env("SITEDEV_REQUEST_ID", &ctx.request_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Interpreter for a known script extension, `None` for executables.
pub(crate) fn interpreter_for(entry: &Path) -> Option<&'static str> {
    match entry.extension().and_then(|e| e.to_str()) {
        Some("js" | "mjs" | "cjs") => Some("node"),
        Some("py") => Some("python3"),
        Some("sh") => Some("sh"),
        _ => None,
    }
}

#[async_trait]
impl FunctionHandler for ProcessFunction {
    async fn invoke(&self, event: InvocationEvent, ctx: FunctionContext) -> InvocationResult {
        let payload = serde_json::to_vec(&event)
            .map_err(|e| InvocationError::runtime(format!("Failed to serialize event: {e}")))?;

        let mut child = self.command(&ctx).spawn().map_err(|e| {
            InvocationError::runtime(format!(
                "Failed to start function '{}' ({}): {}",
                ctx.function_name,
                self.entry.display(),
                e
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                // A child that exits without reading stdin closes the pipe.
                if let Err(e) = stdin.write_all(&payload).await {
                    log::debug!("Function stdin closed early: {}", e);
                }
                let _ = stdin.shutdown().await;
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| InvocationError::runtime(format!("Failed to wait for function: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let mut lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
        let last = lines.pop();
        for line in &lines {
            log::info!("[{}] {}", ctx.function_name, line);
        }
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            log::warn!("[{}] {}", ctx.function_name, line);
        }

        let parsed = last.and_then(|l| serde_json::from_str::<Value>(l.trim()).ok());

        if let Some(value) = &parsed {
            if value.get("errorMessage").is_some() {
                return Err(InvocationError::from_error_object(value).with_output(stdout, stderr));
            }
        }

        if !output.status.success() {
            let mut err = InvocationError::runtime(format!(
                "Function process exited with {}",
                output.status
            ));
            err.stack_trace = stderr.lines().map(str::to_string).collect();
            return Err(err.with_output(stdout, stderr));
        }

        match (last, parsed) {
            (_, Some(value)) => Ok(value),
            (None, None) => Err(InvocationError::crashed().with_output(stdout, stderr)),
            (Some(_), None) => Err(InvocationError::runtime(
                "Function did not print a JSON result on its last line of output",
            )
            .with_output(stdout, stderr)),
        }
    }

    fn runtime(&self) -> &str {
        self.interpreter.as_deref().unwrap_or("executable")
    }
}
