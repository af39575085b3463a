//! Placeholder responses shown while a job runs.

use super::{JobId, JobRecord, JobResult, JobStatus, TrackingId};
use crate::notify::topic_for;
use askama::Template;
use serde::{Deserialize, Serialize};

/// Default status-check route.
pub const DEFAULT_STATUS_ENDPOINT: &str = "/_check_job_status";

/// How placeholders point clients back at the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderSettings {
    /// Route serving [`check_job_status`](crate::handlers::check_job_status).
    pub status_endpoint: String,
    /// Client poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Optional loading image shown in the placeholder.
    pub loading_img_src: Option<String>,
}

impl Default for PlaceholderSettings {
    fn default() -> Self {
        Self {
            status_endpoint: DEFAULT_STATUS_ENDPOINT.to_string(),
            poll_interval_ms: 1_000,
            loading_img_src: None,
        }
    }
}

/// What a caller gets back while a job is queued.
///
/// Carries everything a client needs to wait for the job: the job id, the
/// tracking id to poll, the notification topic to subscribe to, and where to
/// navigate once the job finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    /// Job record id.
    pub job_id: JobId,
    /// Tracking id of the current submission.
    pub tracking_id: Option<TrackingId>,
    /// Job status when the placeholder was built.
    pub status: JobStatus,
    /// Notification topic for `job_started` and `job_finished`.
    pub topic: String,
    /// Where to resume once the job finishes.
    pub callback_target: Option<String>,
    /// Status-check route.
    pub status_endpoint: String,
    /// Client poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Optional loading image.
    pub loading_img_src: Option<String>,
}

#[derive(Template)]
#[template(
    source = r#"<div id="deferred-{{ job_id }}" class="deferred-placeholder" data-job-id="{{ job_id }}" data-job-status="{{ status }}" data-topic="{{ topic }}" data-callback="{{ callback }}" data-status-url="{{ status_url }}" data-poll-interval="{{ poll_interval_ms }}">
{% if !loading_img_src.is_empty() %}<img src="{{ loading_img_src }}" alt="Loading">
{% endif %}<p class="deferred-message">Working on it...</p>
{% if !status_url.is_empty() %}<script>
(function () {
  var el = document.getElementById("deferred-{{ job_id }}");
  var timer = setInterval(function () {
    fetch(el.dataset.statusUrl)
      .then(function (response) { return response.json(); })
      .then(function (body) {
        if (body.job_finished) {
          clearInterval(timer);
          window.location.replace(el.dataset.callback || window.location.href);
        }
      });
  }, Number(el.dataset.pollInterval));
})();
</script>
{% endif %}</div>"#,
    ext = "html"
)]
struct PlaceholderTemplate<'a> {
    job_id: String,
    status: &'a str,
    topic: &'a str,
    callback: &'a str,
    status_url: String,
    poll_interval_ms: u64,
    loading_img_src: &'a str,
}

impl Placeholder {
    /// Build a placeholder for `record`.
    ///
    /// The record's stored callback wins; otherwise the caller's current
    /// location is used.
    #[must_use]
    pub fn from_record(
        record: &JobRecord,
        current_location: Option<&str>,
        settings: &PlaceholderSettings,
    ) -> Self {
        Self {
            job_id: record.id,
            tracking_id: record.external_job_id.clone(),
            status: record.status,
            topic: topic_for(record.id),
            callback_target: record
                .callback_target
                .clone()
                .or_else(|| current_location.map(ToString::to_string)),
            status_endpoint: settings.status_endpoint.clone(),
            poll_interval_ms: settings.poll_interval_ms,
            loading_img_src: settings.loading_img_src.clone(),
        }
    }

    /// URL that reports whether the current submission is done.
    #[must_use]
    pub fn status_url(&self) -> Option<String> {
        self.tracking_id
            .as_ref()
            .map(|tracking| format!("{}?job_id={tracking}", self.status_endpoint))
    }

    /// Render the HTML loading fragment.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Template`](super::JobError::Template) if rendering fails.
    pub fn render_html(&self) -> JobResult<String> {
        let template = PlaceholderTemplate {
            job_id: self.job_id.to_string(),
            status: self.status.name(),
            topic: &self.topic,
            callback: self.callback_target.as_deref().unwrap_or_default(),
            status_url: self.status_url().unwrap_or_default(),
            poll_interval_ms: self.poll_interval_ms,
            loading_img_src: self.loading_img_src.as_deref().unwrap_or_default(),
        };
        Ok(template.render()?)
    }
}
