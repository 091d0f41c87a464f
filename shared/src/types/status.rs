//! Unified calculation status record

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CalcMetadata;

/// Machine-readable error codes carried by `CalcError`
pub mod error_codes {
    pub const ECONOMY_ANALYSIS_FAILED: &str = "ECONOMY_ANALYSIS_FAILED";
    pub const HOUSEHOLD_CALC_FAILED: &str = "HOUSEHOLD_CALC_FAILED";
    pub const POLL_FAILED: &str = "POLL_FAILED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const START_FAILED: &str = "START_FAILED";
}

/// Fatal calculation failure as seen by every subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            retryable,
        }
    }

    pub fn retryable(code: &str, message: impl Into<String>) -> Self {
        Self::new(code, message, true)
    }
}

/// Progress details of an in-flight calculation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InFlight {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining_ms: Option<u64>,
}

impl InFlight {
    pub fn new(progress: f64, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_queue_position(mut self, queue_position: Option<u32>) -> Self {
        self.queue_position = queue_position;
        self
    }

    pub fn with_estimated_time_remaining_ms(mut self, remaining: Option<u64>) -> Self {
        self.estimated_time_remaining_ms = remaining;
        self
    }
}

/// Lifecycle state, tagged by `status` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalcState {
    Initializing,
    Pending(InFlight),
    Computing(InFlight),
    Complete { result: Value },
    Error { error: CalcError },
}

/// Discriminant of `CalcState` without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Initializing,
    Pending,
    Computing,
    Complete,
    Error,
}

/// Latest known status of one calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcStatus {
    #[serde(flatten)]
    pub state: CalcState,
    pub metadata: CalcMetadata,
}

impl CalcStatus {
    pub fn initializing(metadata: CalcMetadata) -> Self {
        Self {
            state: CalcState::Initializing,
            metadata,
        }
    }

    pub fn pending(metadata: CalcMetadata, detail: InFlight) -> Self {
        Self {
            state: CalcState::Pending(detail),
            metadata,
        }
    }

    pub fn computing(metadata: CalcMetadata, detail: InFlight) -> Self {
        Self {
            state: CalcState::Computing(detail),
            metadata,
        }
    }

    pub fn complete(metadata: CalcMetadata, result: Value) -> Self {
        Self {
            state: CalcState::Complete { result },
            metadata,
        }
    }

    pub fn error(metadata: CalcMetadata, error: CalcError) -> Self {
        Self {
            state: CalcState::Error { error },
            metadata,
        }
    }

    pub fn kind(&self) -> StatusKind {
        match self.state {
            CalcState::Initializing => StatusKind::Initializing,
            CalcState::Pending(_) => StatusKind::Pending,
            CalcState::Computing(_) => StatusKind::Computing,
            CalcState::Complete { .. } => StatusKind::Complete,
            CalcState::Error { .. } => StatusKind::Error,
        }
    }

    /// Pending or computing
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, CalcState::Pending(_) | CalcState::Computing(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, CalcState::Complete { .. } | CalcState::Error { .. })
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, CalcState::Complete { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.state, CalcState::Error { .. })
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        match &self.state {
            CalcState::Pending(detail) | CalcState::Computing(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn progress(&self) -> Option<f64> {
        self.in_flight().and_then(|detail| detail.progress)
    }

    pub fn message(&self) -> Option<&str> {
        self.in_flight().and_then(|detail| detail.message.as_deref())
    }

    pub fn queue_position(&self) -> Option<u32> {
        self.in_flight().and_then(|detail| detail.queue_position)
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.state {
            CalcState::Complete { result } => Some(result),
            _ => None,
        }
    }

    pub fn calc_error(&self) -> Option<&CalcError> {
        match &self.state {
            CalcState::Error { error } => Some(error),
            _ => None,
        }
    }
}
