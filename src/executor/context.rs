//! Request-scoped identifiers carried through a fan-out.

use serde::Serialize;
use uuid::Uuid;

/// Identifiers propagated to every adapter call and attached to results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionContext {
    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Never serialized or copied into results.
    #[serde(skip)]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// A context with a fresh UUID v4 request id.
    pub fn new() -> Self {
        Self::with_request_id(Uuid::new_v4().to_string())
    }

    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: None,
            api_key: None,
            trace_id: None,
            session_id: None,
            correlation_id: None,
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Compact prefix for log lines, e.g. `[req=ab12cd34 user=alice]`.
    pub fn log_prefix(&self) -> String {
        let short: String = self.request_id.chars().take(8).collect();
        let mut parts = vec![format!("req={short}")];
        if let Some(user) = &self.user_id {
            parts.push(format!("user={user}"));
        }
        if let Some(trace) = &self.trace_id {
            parts.push(format!("trace={trace}"));
        }
        if let Some(session) = &self.session_id {
            parts.push(format!("session={session}"));
        }
        format!("[{}]", parts.join(" "))
    }
}
