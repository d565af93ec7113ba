//! Tool Registry
//!
//! The static catalogue of capabilities this device exposes to the remote
//! agent. Each entry pairs the [`ToolDefinition`] advertised during the
//! handshake with the [`ToolHandler`] that serves it, so whatever the agent
//! is told about is exactly what the dispatcher can resolve.
//!
//! The registry is assembled once at startup through [`ToolRegistryBuilder`]
//! and is read-only afterwards.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::{collections::HashMap, future::Future, marker::PhantomData, sync::Arc};

/// Arguments of a tool call, decoded from the agent's JSON text.
pub type ToolArgs = Map<String, Value>;
/// Structured result of a tool call.
pub type ToolOutput = Map<String, Value>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Function,
}

/// A tool as advertised to the remote agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type", default)]
    pub kind: ToolKind,
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object. Tools without arguments omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDefinition {
    /// A tool that takes no arguments.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ToolKind::Function,
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    /// Attaches an explicit parameter schema.
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Derives the parameter schema from an argument type.
    ///
    /// Field doc comments become property descriptions.
    pub fn with_parameters_for<A: JsonSchema>(self) -> Self {
        self.with_parameters(parameters_for::<A>())
    }
}

/// Builds the agent-facing schema for `A`, dropping the generator's
/// `$schema` and `title` annotations.
pub fn parameters_for<A: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(A)).unwrap_or(Value::Null);
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

/// A local capability the remote agent may invoke.
///
/// Handlers may suspend and may perform side effects. An `Err` is reported to
/// the agent as a failed result, never dropped.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArgs) -> anyhow::Result<ToolOutput>;
}

/// Adapts an async closure over the raw argument map.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ToolOutput>> + Send,
{
    async fn call(&self, args: ToolArgs) -> anyhow::Result<ToolOutput> {
        (self.0)(args).await
    }
}

/// Wraps an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ToolOutput>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Adapts an async closure over a typed argument struct.
pub struct TypedHandler<A, F> {
    f: F,
    _args: PhantomData<fn(A)>,
}

#[async_trait]
impl<A, F, Fut> ToolHandler for TypedHandler<A, F>
where
    A: DeserializeOwned + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ToolOutput>> + Send,
{
    async fn call(&self, args: ToolArgs) -> anyhow::Result<ToolOutput> {
        let args: A = serde_json::from_value(Value::Object(args))
            .map_err(|e| anyhow::anyhow!("invalid arguments: {}", e))?;
        (self.f)(args).await
    }
}

/// Wraps an async closure taking a deserialized argument struct.
pub fn typed<A, F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    A: DeserializeOwned + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ToolOutput>> + Send + 'static,
{
    Arc::new(TypedHandler {
        f,
        _args: PhantomData,
    })
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is registered more than once")]
    DuplicateTool(String),
    #[error("tool name must not be empty")]
    EmptyName,
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// The frozen tool catalogue.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Looks up the handler for `name`.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i].handler))
    }

    /// Every definition, in registration order.
    pub fn all_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.definition.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistryBuilder {
    pub fn register(
        mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<Self, RegistryError> {
        if definition.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.index.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateTool(definition.name));
        }
        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            handler,
        });
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: self.tools,
            index: self.index,
        }
    }
}
