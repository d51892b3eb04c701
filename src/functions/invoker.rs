// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{
    FunctionContext, FunctionEntry, FunctionRegistry, InvocationError, InvocationEvent,
    InvocationResult,
};

/// Runs functions from a registry, each on its own task under a timeout.
#[derive(Debug, Clone)]
pub struct FunctionInvoker {
    registry: Arc<FunctionRegistry>,
    env: Arc<BTreeMap<String, String>>,
}

impl FunctionInvoker {
    pub fn new(registry: Arc<FunctionRegistry>, env: BTreeMap<String, String>) -> Self {
        Self {
            registry,
            env: Arc::new(env),
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Invoke `name` and wait at most `timeout` for its result.
    ///
    /// On expiry the task is aborted; any result it produces later is dropped.
    pub async fn invoke(&self, name: &str, event: InvocationEvent, timeout: Duration) -> InvocationResult {
        let Some(entry) = self.registry.get(name) else {
            return Err(InvocationError::runtime(format!("Function '{name}' not found")));
        };

        let ctx = self.context(entry, &event, timeout);
        let handler = Arc::clone(&entry.handler);
        let started = Instant::now();

        let mut task = tokio::spawn(async move { handler.invoke(event, ctx).await });

        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                log::error!("Function '{}' panicked: {}", name, join_err);
                Err(InvocationError::runtime(format!("Function panicked: {join_err}")))
            }
            Err(_) => {
                task.abort();
                Err(InvocationError::timeout(timeout))
            }
        };

        match &result {
            Ok(_) => log::debug!("Function '{}' completed in {:?}", name, started.elapsed()),
            Err(e) => log::warn!("Function '{}' failed ({}): {}", name, e.kind, e),
        }
        result
    }

    /// Invoke using the entry's configured timeout.
    pub async fn invoke_entry(&self, entry: &FunctionEntry, event: InvocationEvent) -> InvocationResult {
        self.invoke(&entry.name, event, entry.timeout).await
    }

    /// Start a background invocation and return without waiting.
    pub fn spawn_background(&self, entry: &FunctionEntry, event: InvocationEvent) {
        let invoker = self.clone();
        let name = entry.name.clone();
        let timeout = entry.timeout;
        tokio::spawn(async move {
            match invoker.invoke(&name, event, timeout).await {
                Ok(_) => log::info!("Background function '{}' completed", name),
                Err(e) => log::error!("Background function '{}' failed: {}", name, e),
            }
        });
    }

    fn context(&self, entry: &FunctionEntry, event: &InvocationEvent, timeout: Duration) -> FunctionContext {
        FunctionContext {
            function_name: entry.name.clone(),
            request_id: event.request_id().unwrap_or_default().to_string(),
            env: (*self.env).clone(),
            timeout,
        }
    }
}
