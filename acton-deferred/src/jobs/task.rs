//! Task descriptors and the static task registry.
//!
//! A job never stores a function pointer. It stores a [`TaskDescriptor`]: the
//! registered name of a task plus its positional and keyword arguments. The
//! executor context resolves the name through a [`TaskRegistry`] built at
//! startup, so both the request process and the executor process agree on what
//! a name means without any reflection.

use super::{JobError, JobResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Serializable description of the work a job performs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Registered task name.
    pub task: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl TaskDescriptor {
    /// Describe a call to the task registered under `task` with no arguments.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Borrow the arguments for typed access.
    #[must_use]
    pub const fn arguments(&self) -> TaskArgs<'_> {
        TaskArgs { descriptor: self }
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.task)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
            first = false;
        }
        for (name, value) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        write!(f, ")")
    }
}

/// Typed view over a descriptor's arguments.
#[derive(Debug, Clone, Copy)]
pub struct TaskArgs<'a> {
    descriptor: &'a TaskDescriptor,
}

impl<'a> TaskArgs<'a> {
    /// Raw positional arguments.
    #[must_use]
    pub fn positional(&self) -> &'a [Value] {
        &self.descriptor.args
    }

    /// Raw keyword arguments.
    #[must_use]
    pub fn keywords(&self) -> &'a Map<String, Value> {
        &self.descriptor.kwargs
    }

    /// Deserialize the positional argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidArguments`] if the argument is missing or
    /// cannot be deserialized into `T`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> JobResult<T> {
        let value = self.descriptor.args.get(index).ok_or_else(|| {
            JobError::InvalidArguments(format!(
                "{} expects a positional argument at index {index}",
                self.descriptor.task
            ))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            JobError::InvalidArguments(format!(
                "{} argument {index}: {e}",
                self.descriptor.task
            ))
        })
    }

    /// Deserialize the keyword argument `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidArguments`] if the argument is present but
    /// cannot be deserialized into `T`.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> JobResult<Option<T>> {
        self.descriptor
            .kwargs
            .get(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    JobError::InvalidArguments(format!(
                        "{} keyword argument {name}: {e}",
                        self.descriptor.task
                    ))
                })
            })
            .transpose()
    }
}

/// A unit of work the executor can run by name.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Name under which the task is registered.
    fn name(&self) -> &'static str;

    /// Execute the task.
    ///
    /// # Errors
    ///
    /// Returns an error if the task fails. The runner records the failure as
    /// the job's result so that waiting pages still resolve.
    async fn execute(&self, args: TaskArgs<'_>) -> JobResult<Value>;
}

/// Adapter turning an async closure into a [`Task`].
///
/// The closure receives an owned copy of the descriptor.
pub struct FnTask<F> {
    name: &'static str,
    func: F,
}

impl<F> FnTask<F> {
    /// Wrap `func` as the task called `name`.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult<Value>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, args: TaskArgs<'_>) -> JobResult<Value> {
        (self.func)(args.descriptor.clone()).await
    }
}

/// Static registration map from task name to implementation.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<&'static str, Arc<dyn Task>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in tasks (`add`, `sleep`) registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(super::builtin::Add);
        registry.register(super::builtin::Sleep);
        registry
    }

    /// Register a task under its own name, replacing any previous registration.
    pub fn register<T: Task>(&mut self, task: T) -> &mut Self {
        let name = task.name();
        if self.tasks.insert(name, Arc::new(task)).is_some() {
            tracing::warn!(task = name, "task registration replaced");
        }
        self
    }

    /// Look up a task by name.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::UnknownTask`] if nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> JobResult<Arc<dyn Task>> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| JobError::UnknownTask(name.to_string()))
    }

    /// Whether a task is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered task names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tasks.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_builder() {
        let descriptor = TaskDescriptor::new("sleep").arg(1).kwarg("seconds", 5);
        assert_eq!(descriptor.task, "sleep");
        assert_eq!(descriptor.args, vec![json!(1)]);
        assert_eq!(descriptor.kwargs.get("seconds"), Some(&json!(5)));
    }

    #[test]
    fn test_descriptor_display() {
        let descriptor = TaskDescriptor::new("add").arg(2).arg(3);
        assert_eq!(descriptor.to_string(), "add(2, 3)");
    }

    #[test]
    fn test_typed_arguments() {
        let descriptor = TaskDescriptor::new("greet")
            .arg("hello")
            .kwarg("times", 3);
        let args = descriptor.arguments();

        assert_eq!(args.arg::<String>(0).unwrap(), "hello");
        assert_eq!(args.kwarg::<u32>("times").unwrap(), Some(3));
        assert_eq!(args.kwarg::<u32>("missing").unwrap(), None);
    }

    #[test]
    fn test_missing_argument_is_invalid() {
        let descriptor = TaskDescriptor::new("add");
        let err = descriptor.arguments().arg::<i64>(0).unwrap_err();
        assert!(matches!(err, JobError::InvalidArguments(_)));
    }

    #[test]
    fn test_mistyped_argument_is_invalid() {
        let descriptor = TaskDescriptor::new("add").arg("two");
        let err = descriptor.arguments().arg::<i64>(0).unwrap_err();
        assert!(matches!(err, JobError::InvalidArguments(_)));
    }

    #[test]
    fn test_descriptor_serde() {
        let descriptor = TaskDescriptor::new("add").arg(2).arg(3);
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json, json!({"task": "add", "args": [2, 3], "kwargs": {}}));

        let parsed: TaskDescriptor = serde_json::from_value(json!({"task": "add"})).unwrap();
        assert!(parsed.args.is_empty());
    }

    #[tokio::test]
    async fn test_registry_resolves_registered_task() {
        let mut registry = TaskRegistry::new();
        registry.register(FnTask::new("echo", |descriptor: TaskDescriptor| async move {
            Ok(Value::Array(descriptor.args))
        }));

        let task = registry.resolve("echo").unwrap();
        let descriptor = TaskDescriptor::new("echo").arg("hi");
        let result = task.execute(descriptor.arguments()).await.unwrap();
        assert_eq!(result, json!(["hi"]));
    }

    #[test]
    fn test_registry_unknown_task() {
        let registry = TaskRegistry::new();
        let err = registry.resolve("missing").err().unwrap();
        assert!(matches!(err, JobError::UnknownTask(name) if name == "missing"));
    }

    #[test]
    fn test_registry_builtins() {
        let registry = TaskRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["add", "sleep"]);
        assert!(registry.contains("add"));
    }
}
