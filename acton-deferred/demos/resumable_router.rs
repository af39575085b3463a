//! Deferred jobs and resumable routers in a small axum app
//!
//! Pages:
//! - `/` runs `sleep(seconds=5)` and shows its result
//! - `/reset` resets that job and goes back to `/`
//! - `/callback` runs a job that finishes on `/callback_route`
//! - `/router` walks a three-step router that waits on a job, with the
//!   configured `router.terminal_policy`
//! - `/router-reset` is the same router, starting over after each completion
//!
//! Run with:
//! ```bash
//! cargo run --example resumable_router
//! ```

use acton_deferred::bridge::{JobRunner, LocalExecutor};
use acton_deferred::config::{DeferredConfig, RouterSettings};
use acton_deferred::error::DeferredError;
use acton_deferred::handlers;
use acton_deferred::jobs::{TaskDescriptor, TaskRegistry, WorkerManager};
use acton_deferred::notify::BroadcastNotifier;
use acton_deferred::observability::{self, ObservabilityConfig};
use acton_deferred::resolution::{Resolution, TerminalPolicy};
use acton_deferred::router::{Outcome, Route, Router, RouterResult, StepArgs, StepContext};
use acton_deferred::store::{MemoryStore, RouterStore};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_htmx::HxRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    manager: WorkerManager,
    routers: Arc<dyn RouterStore>,
    router_settings: RouterSettings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init(&ObservabilityConfig::new("resumable-router-demo"))?;
    let config = DeferredConfig::load()?;

    let store = MemoryStore::new();
    let runner = JobRunner::new(
        Arc::new(store.clone()),
        Arc::new(TaskRegistry::with_builtins()),
        Arc::new(BroadcastNotifier::default()),
    );
    let executor = Arc::new(LocalExecutor::from_config(runner, &config.queue));
    let manager = WorkerManager::from_config(&config, Arc::new(store.clone()), executor.clone());

    let state = AppState {
        manager: manager.clone(),
        routers: Arc::new(store),
        router_settings: config.router.clone(),
    };

    let app = axum::Router::new()
        .route("/", get(index))
        .route("/reset", get(reset))
        .route("/callback", get(callback))
        .route("/callback_route", get(callback_route))
        .route("/router", get(router))
        .route("/router-reset", get(router_reset))
        .with_state(state)
        .merge(handlers::status_routes(manager));

    info!("Starting deferred demo on http://127.0.0.1:3000");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    axum::serve(listener, app).await?;

    executor.shutdown().await;
    Ok(())
}

fn sleep_task() -> TaskDescriptor {
    TaskDescriptor::new("sleep").kwarg("seconds", 5)
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html><head><title>{title}</title>\
         <script src=\"https://unpkg.com/htmx.org@2.0.4\"></script></head>\
         <body><h1>{title}</h1>{body}</body></html>"
    ))
}

/// Full page for normal requests, bare fragment for HTMX requests.
fn respond(is_htmx: bool, title: &str, resolution: Resolution<String>) -> Result<Response, DeferredError> {
    if is_htmx {
        return Ok(resolution.into_response());
    }
    let body = match resolution {
        Resolution::Pending(placeholder) => placeholder.render_html()?,
        Resolution::Advanced(html) | Resolution::Completed(html) => html,
    };
    Ok(page(title, &body).into_response())
}

async fn index(
    State(state): State<AppState>,
    HxRequest(is_htmx): HxRequest,
) -> Result<Response, DeferredError> {
    let mut worker = state.manager.worker("index", sleep_task()).await?;
    let resolution = worker.resolve(Some("/"), TerminalPolicy::Retain).await?;
    respond(
        is_htmx,
        "Deferred job",
        resolution.map(|result| format!("<p>Job said: {result}</p><a href=\"/reset\">Run again</a>")),
    )
}

async fn reset(State(state): State<AppState>) -> Result<Redirect, DeferredError> {
    if let Some(mut worker) = state.manager.find_worker("index").await? {
        worker.reset().await?;
    }
    Ok(Redirect::to("/"))
}

async fn callback(
    State(state): State<AppState>,
    HxRequest(is_htmx): HxRequest,
) -> Result<Response, DeferredError> {
    let mut worker = state.manager.worker("callback", sleep_task()).await?;
    if worker.is_finished() {
        worker.reset().await?;
    }
    worker.enqueue(Some("/callback_route".to_string())).await?;
    let placeholder = worker.invoke(Some("/callback")).await?;
    respond(is_htmx, "Callback", Resolution::Pending(placeholder))
}

async fn callback_route(State(state): State<AppState>) -> Result<Html<String>, DeferredError> {
    let body = match state.manager.find_worker("callback").await? {
        Some(worker) if worker.is_finished() => {
            let result = worker.result().cloned().unwrap_or_default();
            format!("<p>Landed here after the job finished: {result}</p>")
        }
        _ => "<p>Nothing has finished yet. <a href=\"/callback\">Start</a></p>".to_string(),
    };
    Ok(page("Callback route", &body))
}

async fn router(
    State(state): State<AppState>,
    HxRequest(is_htmx): HxRequest,
) -> Result<Response, DeferredError> {
    let settings = state.router_settings.clone();
    drive(state, is_htmx, "demo-router", "/router", &settings).await
}

async fn router_reset(
    State(state): State<AppState>,
    HxRequest(is_htmx): HxRequest,
) -> Result<Response, DeferredError> {
    let settings = RouterSettings {
        terminal_policy: TerminalPolicy::Reset,
    };
    drive(state, is_htmx, "demo-router-reset", "/router-reset", &settings).await
}

async fn drive(
    state: AppState,
    is_htmx: bool,
    key: &str,
    location: &str,
    settings: &RouterSettings,
) -> Result<Response, DeferredError> {
    let mut router = Router::load_or_create(Greeting, key, state.routers, state.manager)
        .await?
        .with_settings(settings);
    let resolution = router.advance(Some(location)).await?;
    respond(is_htmx, "Router", resolution)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum GreetingStep {
    Hello,
    Compute,
    Report,
}

/// Says hello, waits on a slow job, then reports.
struct Greeting;

#[async_trait]
impl Route for Greeting {
    type Step = GreetingStep;
    type Output = String;

    fn initial(&self) -> (GreetingStep, StepArgs) {
        (GreetingStep::Hello, StepArgs::new().with_arg("hello world"))
    }

    fn is_bookmark(&self, step: GreetingStep) -> bool {
        matches!(step, GreetingStep::Compute | GreetingStep::Report)
    }

    async fn call(
        &self,
        step: GreetingStep,
        args: StepArgs,
        cx: &mut StepContext,
    ) -> RouterResult<Outcome<GreetingStep, String>> {
        match step {
            GreetingStep::Hello => {
                let greeting: String = args.arg(0)?;
                info!(%greeting, "router started");
                Ok(Outcome::Next(
                    GreetingStep::Compute,
                    StepArgs::new().with_arg("hello moon"),
                ))
            }
            GreetingStep::Compute => {
                let key = format!("{}-sleep", cx.current_location().unwrap_or("router"));
                let worker = cx.worker(&key, sleep_task()).await?;
                Ok(Outcome::run_worker(
                    worker,
                    GreetingStep::Report,
                    StepArgs::new().with_arg("hello star"),
                ))
            }
            GreetingStep::Report => {
                let message: String = args.arg(0)?;
                Ok(Outcome::Done(format!("<p>{message}</p>")))
            }
        }
    }
}
