//! Test tooling: logging capture and a scripted callback invoker.

use std::collections::VecDeque;

use async_trait::async_trait;
use hashbrown::HashMap;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::engine::CallbackInvoker;
use crate::prelude::*;

/// Start up logging for test mode. Safe to call from every test; only the
/// first call installs the subscriber.
pub fn test_init() {
    let filter = EnvFilter::from_default_env().add_directive(LevelFilter::TRACE.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A [`CallbackInvoker`] that replays queued responses per callback context
/// and records every call it receives. Missing scripts resolve to an invoker
/// error, so a test that under-scripts fails visibly instead of hanging.
#[derive(Default)]
pub struct ScriptedInvoker {
    responses: Mutex<HashMap<String, VecDeque<Result<CallbackResponse, CallbackError>>>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        ScriptedInvoker::default()
    }

    /// Queue the next response for a callback context.
    pub fn enqueue(&self, context: &str, response: Result<CallbackResponse, CallbackError>) {
        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        responses
            .entry(context.to_string())
            .or_default()
            .push_back(response);
    }

    /// The contexts invoked so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}

#[async_trait]
impl CallbackInvoker for ScriptedInvoker {
    async fn invoke(&self, request: CallbackRequest) -> Result<CallbackResponse, CallbackError> {
        self.log
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(request.context.clone());
        let next = {
            let mut responses = self
                .responses
                .lock()
                .unwrap_or_else(|poison| poison.into_inner());
            responses
                .get_mut(&request.context)
                .and_then(|queue| queue.pop_front())
        };
        next.unwrap_or_else(|| {
            Err(CallbackError::Invoker(format!(
                "no scripted response for context {}",
                request.context
            )))
        })
    }
}
