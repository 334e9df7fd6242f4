//! Client-side request metrics
//!
//! - `clm_client_requests_total` (counter): labels `method`, `status`
//!   (`0` for transport failures)
//! - `clm_client_request_duration_seconds` (histogram): label `status`
//! - `clm_client_session_refresh_total` (counter): label `outcome`
//!
//! No recorder is installed here; embedders that want these exported
//! install their own. Without one the macros are no-ops.

/// Record a completed request with status code and HTTP method labels.
pub fn record_request(method: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("clm_client_requests_total", "method" => method.to_string(), "status" => status_str.clone())
        .increment(1);
    metrics::histogram!("clm_client_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Outcome of a session refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// Another request already rotated the token.
    Shared,
    Rejected,
    Failed,
    NoRefreshToken,
}

impl RefreshOutcome {
    pub fn label(self) -> &'static str {
        match self {
            RefreshOutcome::Refreshed => "refreshed",
            RefreshOutcome::Shared => "shared",
            RefreshOutcome::Rejected => "rejected",
            RefreshOutcome::Failed => "failed",
            RefreshOutcome::NoRefreshToken => "no_refresh_token",
        }
    }
}

pub fn record_refresh(outcome: RefreshOutcome) {
    metrics::counter!("clm_client_session_refresh_total", "outcome" => outcome.label())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("GET", 200, 0.05);
        record_request("POST", 0, 1.5);
        record_refresh(RefreshOutcome::Rejected);
    }

    #[test]
    fn refresh_outcome_labels_are_distinct() {
        let labels = [
            RefreshOutcome::Refreshed,
            RefreshOutcome::Shared,
            RefreshOutcome::Rejected,
            RefreshOutcome::Failed,
            RefreshOutcome::NoRefreshToken,
        ]
        .map(RefreshOutcome::label);
        let mut unique = labels.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), labels.len());
    }
}
