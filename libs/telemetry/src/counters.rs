use metrics::counter;

pub const WEBHOOK_COUNTER: &str = "vab_webhook_requests_total";
pub const RENDER_ISSUE_COUNTER: &str = "vab_render_issues_total";
pub const DELIVERY_FAILURE_COUNTER: &str = "vab_delivery_failures_total";
pub const LINK_COUNTER: &str = "vab_account_links_total";
pub const REMOTE_ERROR_COUNTER: &str = "vab_remote_errors_total";
pub const OAUTH_ERROR_COUNTER: &str = "vab_oauth_errors_total";

/// Outcome label of an inbound webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Accepted,
    Forbidden,
    Malformed,
    Failed,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Accepted => "accepted",
            WebhookOutcome::Forbidden => "forbidden",
            WebhookOutcome::Malformed => "malformed",
            WebhookOutcome::Failed => "failed",
        }
    }
}

pub fn record_webhook(outcome: WebhookOutcome) {
    counter!(WEBHOOK_COUNTER, "outcome" => outcome.as_str()).increment(1);
}

pub fn record_render_issue(ui_type: &str, issue: &'static str) {
    counter!(
        RENDER_ISSUE_COUNTER,
        "ui_type" => ui_type.to_string(),
        "issue" => issue
    )
    .increment(1);
}

pub fn record_delivery_failure(kind: &'static str) {
    counter!(DELIVERY_FAILURE_COUNTER, "kind" => kind).increment(1);
}

pub fn record_link(outcome: &'static str) {
    counter!(LINK_COUNTER, "outcome" => outcome).increment(1);
}

/// Failed call to the remote agent. `status` is set when the agent answered with an error.
pub fn record_remote_error(kind: &'static str, endpoint: &'static str, status: Option<u16>) {
    match status {
        Some(status) => counter!(
            REMOTE_ERROR_COUNTER,
            "kind" => kind,
            "endpoint" => endpoint,
            "status" => status.to_string()
        )
        .increment(1),
        None => counter!(REMOTE_ERROR_COUNTER, "kind" => kind, "endpoint" => endpoint).increment(1),
    }
}

pub fn record_oauth_error(kind: &'static str, grant: &'static str) {
    counter!(OAUTH_ERROR_COUNTER, "kind" => kind, "grant" => grant).increment(1);
}
