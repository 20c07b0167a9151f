use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of one call attempt.
///
/// `queued → calling → in_call → {completed | no_answer | declined | failed}`.
/// Terminal states other than `completed` are retryable via operator reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Queued,
    Calling,
    InCall,
    Completed,
    NoAnswer,
    Declined,
    Failed,
}

impl CallStatus {
    /// No further automatic transition happens from these states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::NoAnswer | CallStatus::Declined | CallStatus::Failed
        )
    }

    /// A launch has been attempted — `call_id` must be set exactly for these.
    pub fn is_launched(self) -> bool {
        self != CallStatus::Queued
    }

    /// Counts against the parallelism cap.
    pub fn is_in_flight(self) -> bool {
        matches!(self, CallStatus::Calling | CallStatus::InCall)
    }
}

/// Candidate fields forwarded into the call payload. Opaque to the state
/// machine beyond phone validation and prompt assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub phone: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One candidate's call-attempt record within a campaign queue.
///
/// Invariants maintained by the driver and poller:
/// - `call_id.is_some()` iff `status.is_launched()`
/// - `ended_at.is_some()` iff `status.is_terminal()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub candidate: Candidate,
    pub status: CallStatus,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Launch/validation failure message, surfaced to the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueEntry {
    pub fn new(candidate: Candidate) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate,
            status: CallStatus::Queued,
            call_id: None,
            started_at: None,
            ended_at: None,
            last_error: None,
        }
    }

    /// Operator retry: a terminal entry goes back to `queued` with all
    /// attempt state cleared, making it eligible for the next driver tick.
    pub fn reset_for_retry(&mut self) {
        self.status = CallStatus::Queued;
        self.call_id = None;
        self.started_at = None;
        self.ended_at = None;
        self.last_error = None;
    }
}

/// A single speaker turn in a call transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

/// A finished interview moved out of the active queue, with whatever
/// artifacts the provider returned (all best-effort).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedInterview {
    pub id: Uuid,
    pub candidate: Candidate,
    pub call_id: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub transcript: Vec<TranscriptTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
}

/// Per-job campaign configuration supplied when the campaign is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSpec {
    pub company: String,
    pub job_title: String,
    #[serde(default)]
    pub questions: Vec<String>,
}
