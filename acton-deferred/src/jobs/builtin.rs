//! Tasks registered by [`TaskRegistry::with_builtins`](super::TaskRegistry::with_builtins).

use super::{JobError, JobResult, Task, TaskArgs};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Sums its numeric positional arguments.
///
/// Integers stay integers; any float argument makes the result a float.
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

#[async_trait]
impl Task for Add {
    fn name(&self) -> &'static str {
        "add"
    }

    async fn execute(&self, args: TaskArgs<'_>) -> JobResult<Value> {
        let values = args.positional();
        if values.iter().all(Value::is_i64) {
            let sum = values
                .iter()
                .filter_map(Value::as_i64)
                .try_fold(0_i64, i64::checked_add)
                .ok_or_else(|| JobError::ExecutionFailed("integer overflow".to_string()))?;
            return Ok(json!(sum));
        }

        let mut sum = 0.0_f64;
        for (index, value) in values.iter().enumerate() {
            let n = value.as_f64().ok_or_else(|| {
                JobError::InvalidArguments(format!("add argument {index} is not a number"))
            })?;
            sum += n;
        }
        Ok(json!(sum))
    }
}

/// Long-running demo task: sleeps for `seconds`, logging progress each second.
///
/// Takes `seconds` as the first positional argument or as a keyword argument
/// and returns a short completion message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sleep;

#[async_trait]
impl Task for Sleep {
    fn name(&self) -> &'static str {
        "sleep"
    }

    async fn execute(&self, args: TaskArgs<'_>) -> JobResult<Value> {
        let seconds: u64 = match args.kwarg("seconds")? {
            Some(seconds) => seconds,
            None => args.arg(0)?,
        };

        for elapsed in 0..seconds {
            debug!(elapsed, total = seconds, "sleep task in progress");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        info!(seconds, "sleep task complete");
        Ok(json!(format!("slept for {seconds} seconds")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::TaskDescriptor;

    #[tokio::test]
    async fn test_add_integers() {
        let descriptor = TaskDescriptor::new("add").arg(2).arg(3);
        let result = Add.execute(descriptor.arguments()).await.unwrap();
        assert_eq!(result, json!(5));
    }

    #[tokio::test]
    async fn test_add_floats() {
        let descriptor = TaskDescriptor::new("add").arg(1.5).arg(2);
        let result = Add.execute(descriptor.arguments()).await.unwrap();
        assert_eq!(result, json!(3.5));
    }

    #[tokio::test]
    async fn test_add_rejects_non_numbers() {
        let descriptor = TaskDescriptor::new("add").arg(1).arg("two");
        let err = Add.execute(descriptor.arguments()).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidArguments(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_reports_duration() {
        let descriptor = TaskDescriptor::new("sleep").kwarg("seconds", 3);
        let result = Sleep.execute(descriptor.arguments()).await.unwrap();
        assert_eq!(result, json!("slept for 3 seconds"));
    }

    #[tokio::test]
    async fn test_sleep_requires_seconds() {
        let descriptor = TaskDescriptor::new("sleep");
        let err = Sleep.execute(descriptor.arguments()).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidArguments(_)));
    }
}
