//! Tool Dispatcher
//!
//! Reacts to `response.function_call_arguments.done` events: decodes the
//! arguments, resolves the tool in the [`ToolRegistry`], runs the handler as
//! its own task and sends the result back through the control channel under
//! the same `call_id`.
//!
//! Calls are independent. A slow handler never holds up the next inbound
//! message, and a failing handler still produces a result frame.

use crate::{
    channel::ControlSender,
    protocol::{ClientEvent, FunctionCallArgumentsDone, ServerEvent},
    registry::{ToolArgs, ToolHandler, ToolOutput, ToolRegistry},
};
use futures::FutureExt;
use serde_json::Value;
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

/// What happened to an inbound event handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Not a tool call.
    Ignored,
    /// The arguments were not a JSON object; no result will be sent.
    Abandoned,
    /// No tool with that name is registered; no result will be sent.
    Unresolved,
    /// The handler is running and will resolve the call when it finishes.
    Executing,
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    sender: ControlSender,
    in_flight: JoinSet<()>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, sender: ControlSender) -> Self {
        Self {
            registry,
            sender,
            in_flight: JoinSet::new(),
        }
    }

    /// Handles one inbound event. Must be called from within a Tokio runtime.
    pub fn handle(&mut self, event: &ServerEvent) -> Dispatch {
        match event {
            ServerEvent::FunctionCallArgumentsDone(call) => self.dispatch(call),
            _ => Dispatch::Ignored,
        }
    }

    pub fn dispatch(&mut self, call: &FunctionCallArgumentsDone) -> Dispatch {
        while self.in_flight.try_join_next().is_some() {}

        let args = match serde_json::from_str::<ToolArgs>(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(call_id = %call.call_id, tool = %call.name, error = %e, "Abandoning tool call with unparseable arguments");
                return Dispatch::Abandoned;
            }
        };

        let Some(handler) = self.registry.resolve(&call.name) else {
            warn!(call_id = %call.call_id, tool = %call.name, "No local handler for requested tool");
            return Dispatch::Unresolved;
        };

        info!(call_id = %call.call_id, tool = %call.name, arguments = %call.arguments, "Calling local tool");
        let sender = self.sender.clone();
        let call_id = call.call_id.clone();
        let span = info_span!("tool_call", call_id = %call.call_id, tool = %call.name);
        self.in_flight.spawn(
            async move {
                let output = run_handler(handler, args).await;
                let text = Value::Object(output).to_string();
                debug!(output = %text, "Tool call resolved");
                if let Err(e) = sender.send(ClientEvent::function_call_output(call_id, text)) {
                    warn!(error = %e, "Could not deliver tool result");
                }
            }
            .instrument(span),
        );
        Dispatch::Executing
    }

    /// Number of calls whose handlers have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Waits for every in-flight call to resolve.
    pub async fn drain(&mut self) {
        while self.in_flight.join_next().await.is_some() {}
    }
}

async fn run_handler(handler: Arc<dyn ToolHandler>, args: ToolArgs) -> ToolOutput {
    match AssertUnwindSafe(handler.call(args)).catch_unwind().await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(error = %format!("{:#}", e), "Tool handler failed");
            failure_output(format!("{:#}", e))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(error = %message, "Tool handler panicked");
            failure_output(message)
        }
    }
}

/// The result reported for a handler that failed.
pub fn failure_output(message: impl Into<String>) -> ToolOutput {
    let mut output = ToolOutput::new();
    output.insert("success".into(), Value::Bool(false));
    output.insert("error".into(), Value::String(message.into()));
    output
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool handler panicked".to_string()
    }
}
