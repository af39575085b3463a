//! Integration tests for resumable routers
//!
//! Drives a three-step router across separate "requests" with an executor
//! that the test completes by hand.

use acton_deferred::bridge::JobRunner;
use acton_deferred::config::DeferredConfig;
use acton_deferred::jobs::{TaskDescriptor, TaskRegistry, WorkerManager};
use acton_deferred::notify::NoopNotifier;
use acton_deferred::resolution::{Resolution, TerminalPolicy};
use acton_deferred::router::{Outcome, Route, Router, RouterError, RouterResult, StepArgs, StepContext};
use acton_deferred::store::{MemoryStore, RouterStore};
use acton_deferred::testing::RecordingBridge;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Step {
    Greet,
    Compute,
    Report,
}

/// Greets, hands `add(2, 3)` to a worker, then reports.
#[derive(Clone, Default)]
struct Report {
    greet_runs: Arc<AtomicUsize>,
    payload_override: Option<TaskDescriptor>,
}

impl Report {
    fn payload(&self) -> TaskDescriptor {
        self.payload_override
            .clone()
            .unwrap_or_else(|| TaskDescriptor::new("add").arg(2).arg(3))
    }
}

#[async_trait]
impl Route for Report {
    type Step = Step;
    type Output = String;

    fn initial(&self) -> (Step, StepArgs) {
        (Step::Greet, StepArgs::new().with_arg("hello world"))
    }

    fn is_bookmark(&self, step: Step) -> bool {
        matches!(step, Step::Compute | Step::Report)
    }

    async fn call(
        &self,
        step: Step,
        args: StepArgs,
        cx: &mut StepContext,
    ) -> RouterResult<Outcome<Step, String>> {
        match step {
            Step::Greet => {
                self.greet_runs.fetch_add(1, Ordering::SeqCst);
                let greeting: String = args.arg(0)?;
                Ok(Outcome::Next(
                    Step::Compute,
                    StepArgs::new().with_kwarg("greeting", greeting),
                ))
            }
            Step::Compute => {
                let worker = cx.worker("report-sum", self.payload()).await?;
                Ok(Outcome::run_worker(
                    worker,
                    Step::Report,
                    StepArgs::new().with_arg("hello star"),
                ))
            }
            Step::Report => {
                let message: String = args.arg(0)?;
                Ok(Outcome::Done(message))
            }
        }
    }
}

struct Env {
    store: MemoryStore,
    bridge: RecordingBridge,
    manager: WorkerManager,
    runner: JobRunner,
}

fn env() -> Env {
    let store = MemoryStore::new();
    let bridge = RecordingBridge::new();
    let manager = WorkerManager::new(Arc::new(store.clone()), Arc::new(bridge.clone()));
    let runner = JobRunner::new(
        Arc::new(store.clone()),
        Arc::new(TaskRegistry::with_builtins()),
        Arc::new(NoopNotifier),
    );
    Env {
        store,
        bridge,
        manager,
        runner,
    }
}

/// Load the router fresh, as a new request would.
async fn request(env: &Env, route: Report) -> RouterResult<Router<Report>> {
    Router::load_or_create(route, "report", Arc::new(env.store.clone()), env.manager.clone()).await
}

#[tokio::test]
async fn test_three_step_router_across_requests() {
    let env = env();
    let route = Report::default();

    // Request 1: Greet runs, Compute delegates and parks
    let mut router = request(&env, route.clone()).await.unwrap();
    let first = router.advance(Some("/router")).await.unwrap();
    let placeholder = first.placeholder().expect("first request waits on the worker");
    assert_eq!(placeholder.callback_target.as_deref(), Some("/router"));
    assert_eq!(router.current_step(), Step::Compute);

    // Request 2: still running, nothing resubmitted
    let mut router = request(&env, route.clone()).await.unwrap();
    assert!(router.advance(Some("/router")).await.unwrap().is_pending());
    assert_eq!(env.bridge.submission_count(), 1);

    // Executor runs add(2, 3)
    let reports = env.bridge.run_pending(&env.runner).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_complete());

    // Request 3: continues into Report
    let mut router = request(&env, route.clone()).await.unwrap();
    let done = router.advance(Some("/router")).await.unwrap();
    assert_eq!(done, Resolution::Completed("hello star".to_string()));
    assert_eq!(router.current_step(), Step::Report);

    // Greet ran exactly once across all requests
    assert_eq!(route.greet_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retained_router_reruns_terminal_step() {
    let env = env();
    let route = Report::default();

    let mut router = request(&env, route.clone()).await.unwrap();
    router.advance(None).await.unwrap();
    env.bridge.run_pending(&env.runner).await.unwrap();
    router.advance(None).await.unwrap();

    let mut router = request(&env, route.clone()).await.unwrap();
    let again = router.advance(None).await.unwrap();
    assert_eq!(again, Resolution::Completed("hello star".to_string()));
    assert_eq!(env.bridge.submission_count(), 1);
}

#[tokio::test]
async fn test_reset_policy_starts_over() {
    let env = env();
    let route = Report::default();

    let mut router = request(&env, route.clone())
        .await
        .unwrap()
        .with_terminal_policy(TerminalPolicy::Reset);
    router.advance(None).await.unwrap();
    env.bridge.run_pending(&env.runner).await.unwrap();
    assert!(router.advance(None).await.unwrap().is_completed());
    assert_eq!(router.current_step(), Step::Greet);

    // The delegated job was reset too, so the next cycle submits again
    let mut router = request(&env, route.clone())
        .await
        .unwrap()
        .with_terminal_policy(TerminalPolicy::Reset);
    assert!(router.advance(None).await.unwrap().is_pending());
    assert_eq!(env.bridge.submission_count(), 2);
    assert_eq!(route.greet_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_changed_payload_while_queued_is_stale_resume() {
    let env = env();

    let mut router = request(&env, Report::default()).await.unwrap();
    assert!(router.advance(None).await.unwrap().is_pending());

    let changed = Report {
        payload_override: Some(TaskDescriptor::new("add").arg(4).arg(4)),
        ..Report::default()
    };
    let mut router = request(&env, changed).await.unwrap();
    let err = router.advance(None).await.unwrap_err();
    assert!(matches!(err, RouterError::StaleResume(_)));
}

#[tokio::test]
async fn test_unknown_stored_step_is_stale_resume() {
    let env = env();
    let router = request(&env, Report::default()).await.unwrap();

    let mut stored = router.record().encode().unwrap();
    stored.current_step = json!("Retired");
    env.store.save(&stored).await.unwrap();

    let err = request(&env, Report::default()).await.unwrap_err();
    assert!(matches!(err, RouterError::StaleResume(_)));
}

#[tokio::test]
async fn test_manual_reset_returns_to_initial_step() {
    let env = env();
    let mut router = request(&env, Report::default()).await.unwrap();
    router.advance(None).await.unwrap();
    assert_eq!(router.current_step(), Step::Compute);

    router.reset().await.unwrap();

    let router = request(&env, Report::default()).await.unwrap();
    assert_eq!(router.current_step(), Step::Greet);
    assert!(router.record().awaiting.is_none());
}

#[tokio::test]
async fn test_terminal_policy_from_environment_reaches_router() {
    let mut loaded = None;
    figment::Jail::expect_with(|jail| {
        jail.set_env("ACTON_DEFERRED_ROUTER__TERMINAL_POLICY", "reset");
        loaded = Some(DeferredConfig::load().map_err(|e| e.to_string())?);
        Ok(())
    });
    let config = loaded.unwrap();
    assert_eq!(config.router.terminal_policy, TerminalPolicy::Reset);

    let env = env();
    let route = Report::default();
    let mut router = request(&env, route.clone())
        .await
        .unwrap()
        .with_settings(&config.router);
    assert_eq!(router.terminal_policy(), TerminalPolicy::Reset);

    router.advance(None).await.unwrap();
    env.bridge.run_pending(&env.runner).await.unwrap();
    assert!(router.advance(None).await.unwrap().is_completed());
    assert_eq!(router.current_step(), Step::Greet);
}

#[tokio::test]
async fn test_default_settings_retain_terminal_step() {
    let env = env();
    let router = request(&env, Report::default())
        .await
        .unwrap()
        .with_settings(&DeferredConfig::default().router);
    assert_eq!(router.terminal_policy(), TerminalPolicy::Retain);
}
