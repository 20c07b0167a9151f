//! Campaign Driver and Status Poller — the tasks that move entries through
//! the call state machine.
//!
//! The driver pulls queued entries into flight under the parallelism cap and
//! re-checks on a fixed cadence; each launched call gets its own poller task
//! that watches provider status until a terminal state. Every task observes
//! the campaign's shutdown channel and exits at its next suspension point
//! when the campaign is stopped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::campaign::classify::classify;
use crate::campaign::manager::Campaign;
use crate::campaign::models::{CallStatus, Candidate, CompletedInterview, QueueEntry, TranscriptTurn};
use crate::campaign::phone::normalize_phone;
use crate::campaign::prompt::{build_first_message, build_system_prompt};
use crate::voice::{CallArtifacts, LaunchRequest, VoiceProvider};

/// Delay before the first status poll after a launch is accepted.
pub const FIRST_POLL_DELAY: Duration = Duration::from_secs(5);
/// Poll cadence while a call is in a non-terminal state.
pub const POLL_INTERVAL: Duration = Duration::from_secs(8);
/// Longer backoff after a transient poll failure.
pub const POLL_RETRY_DELAY: Duration = Duration::from_secs(10);
/// Driver inter-batch delay.
pub const BATCH_DELAY: Duration = Duration::from_secs(5);

/// Starts the driver task for a campaign if one is not already running.
/// Safe to call from anywhere work arrives: enqueue, retry, campaign open,
/// and every poller terminal transition.
pub fn ensure_driver(campaign: &Arc<Campaign>, voice: &Arc<dyn VoiceProvider>) {
    if campaign.is_cancelled() || !campaign.claim_driver() {
        return;
    }
    let campaign = campaign.clone();
    let voice = voice.clone();
    tokio::spawn(async move {
        drive(campaign, voice).await;
    });
}

/// Resumes polling for an entry rehydrated mid-call (provider id known,
/// outcome not yet observed).
pub fn resume_polling(
    campaign: &Arc<Campaign>,
    voice: &Arc<dyn VoiceProvider>,
    entry_id: Uuid,
    call_id: String,
) {
    let campaign = campaign.clone();
    let voice = voice.clone();
    tokio::spawn(async move {
        poll_until_terminal(campaign, voice, entry_id, call_id).await;
    });
}

async fn drive(campaign: Arc<Campaign>, voice: Arc<dyn VoiceProvider>) {
    debug!("Driver started for job {}", campaign.job_id);
    let mut shutdown = campaign.shutdown_rx();

    loop {
        if *shutdown.borrow() {
            break;
        }
        if campaign.queued_count() == 0 {
            debug!("Driver idle for job {}: queue drained", campaign.job_id);
            break;
        }

        // The cap applies globally: capacity is whatever in-flight calls
        // (from this tick or earlier ones) have not used up.
        let capacity = campaign
            .max_parallel_calls
            .saturating_sub(campaign.in_flight_count());
        for (entry_id, candidate) in campaign.claim_for_launch(capacity) {
            let campaign = campaign.clone();
            let voice = voice.clone();
            tokio::spawn(async move {
                launch_and_poll(campaign, voice, entry_id, candidate).await;
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(BATCH_DELAY) => {}
            _ = shutdown.changed() => break,
        }
    }

    campaign.release_driver();
    // Close the wake race: work may have arrived between the empty check
    // and the flag clearing above.
    if !campaign.is_cancelled() && campaign.queued_count() > 0 {
        ensure_driver(&campaign, &voice);
    }
}

/// Launches one claimed entry and follows it to a terminal state. Failures
/// here are entry-local by design: nothing propagates to sibling launches.
async fn launch_and_poll(
    campaign: Arc<Campaign>,
    voice: Arc<dyn VoiceProvider>,
    entry_id: Uuid,
    candidate: Candidate,
) {
    // Validation failure consumes no provider call slot and leaves call_id
    // unset: this attempt never reached the network.
    let phone = match normalize_phone(&candidate.phone) {
        Ok(phone) => phone,
        Err(reason) => {
            warn!("Not calling {}: {reason}", candidate.name);
            patch_entry(&campaign, entry_id, move |entry| {
                entry.status = CallStatus::Failed;
                entry.ended_at = Some(Utc::now());
                entry.last_error = Some(reason);
            });
            return;
        }
    };

    let request = LaunchRequest {
        phone_number: phone,
        assistant_id: campaign.assistant_id.clone(),
        first_message: build_first_message(&campaign.spec, &candidate),
        system_message: build_system_prompt(&campaign.spec, &candidate),
    };

    let call_id = match voice.launch_call(&request).await {
        Ok(launched) => launched.id,
        Err(e) => {
            warn!("Launch rejected for {}: {e}", candidate.name);
            let message = e.to_string();
            patch_entry(&campaign, entry_id, move |entry| {
                entry.status = CallStatus::Failed;
                entry.ended_at = Some(Utc::now());
                entry.last_error = Some(message);
            });
            return;
        }
    };

    info!("Call {call_id} launched for {}", candidate.name);
    {
        let call_id = call_id.clone();
        patch_entry(&campaign, entry_id, move |entry| {
            entry.call_id = Some(call_id);
            entry.status = CallStatus::InCall;
        });
    }

    let mut shutdown = campaign.shutdown_rx();
    tokio::select! {
        _ = tokio::time::sleep(FIRST_POLL_DELAY) => {}
        _ = shutdown.changed() => return,
    }

    poll_until_terminal(campaign, voice, entry_id, call_id).await;
}

/// Polls provider status for one in-flight call until terminal, then hands
/// off: completed calls collect artifacts and move to the conducted
/// collection, other outcomes stay in the queue for manual retry.
async fn poll_until_terminal(
    campaign: Arc<Campaign>,
    voice: Arc<dyn VoiceProvider>,
    entry_id: Uuid,
    call_id: String,
) {
    let mut shutdown = campaign.shutdown_rx();

    loop {
        if *shutdown.borrow() {
            return;
        }

        let delay = match voice.call_status(&call_id).await {
            // Polling failure is not call failure: retry with a longer
            // backoff, entry status unchanged.
            Err(e) => {
                warn!("Status poll for call {call_id} failed, will retry: {e}");
                POLL_RETRY_DELAY
            }
            Ok(report) => match classify(&report.status) {
                // Unrecognized provider status: fail closed, keep polling.
                None => POLL_INTERVAL,
                Some(CallStatus::Completed) => {
                    finalize_completed(&campaign, &voice, entry_id, &call_id, report.duration)
                        .await;
                    ensure_driver(&campaign, &voice);
                    return;
                }
                Some(status) if status.is_terminal() => {
                    info!("Call {call_id} ended without interview: {status:?}");
                    patch_entry(&campaign, entry_id, move |entry| {
                        entry.status = status;
                        entry.ended_at = Some(Utc::now());
                    });
                    ensure_driver(&campaign, &voice);
                    return;
                }
                Some(status) => {
                    patch_entry(&campaign, entry_id, move |entry| {
                        entry.status = status;
                    });
                    POLL_INTERVAL
                }
            },
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// Artifact fetch is best-effort: a failure is logged and the interview is
/// recorded without transcript or summary, still `completed`.
async fn finalize_completed(
    campaign: &Arc<Campaign>,
    voice: &Arc<dyn VoiceProvider>,
    entry_id: Uuid,
    call_id: &str,
    duration_secs: Option<f64>,
) {
    let artifacts = match voice.call_artifacts(call_id).await {
        Ok(artifacts) => artifacts,
        Err(e) => {
            warn!("Artifact fetch for call {call_id} failed: {e}");
            CallArtifacts::default()
        }
    };

    let Some(entry) = campaign.get_entry(entry_id) else {
        warn!("Entry {entry_id} vanished before completion hand-off");
        return;
    };

    info!(
        "Interview completed for {} (call {call_id})",
        entry.candidate.name
    );
    let interview = build_interview(entry, call_id, duration_secs, artifacts);
    if let Err(e) = campaign.complete(entry_id, interview) {
        error!("Failed to persist completed interview: {e}");
    }
}

fn build_interview(
    entry: QueueEntry,
    call_id: &str,
    duration_secs: Option<f64>,
    artifacts: CallArtifacts,
) -> CompletedInterview {
    CompletedInterview {
        id: entry.id,
        candidate: entry.candidate,
        call_id: call_id.to_string(),
        started_at: entry.started_at,
        ended_at: Utc::now(),
        duration_secs,
        transcript: artifacts
            .transcript
            .into_iter()
            .map(|turn| TranscriptTurn {
                role: turn.role,
                message: turn.message,
                time: turn.time,
            })
            .collect(),
        summary: artifacts.summary,
        recording_url: artifacts.recording_url,
    }
}

fn patch_entry(campaign: &Campaign, entry_id: Uuid, patch: impl FnOnce(&mut QueueEntry)) {
    match campaign.patch(entry_id, patch) {
        Ok(true) => {}
        Ok(false) => warn!("Entry {entry_id} no longer exists; dropping update"),
        Err(e) => error!("Failed to persist queue snapshot: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::manager::CampaignManager;
    use crate::campaign::models::CampaignSpec;
    use crate::campaign::store::SnapshotStore;
    use crate::voice::{CallStatusReport, LaunchedCall, VoiceError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted provider: each phone number reports a test-controlled status
    /// on every poll, so scenarios can hold calls in flight and then finish
    /// them on demand.
    #[derive(Default)]
    struct FakeVoice {
        launches: Mutex<Vec<LaunchRequest>>,
        call_phones: Mutex<HashMap<String, String>>,
        statuses: Mutex<HashMap<String, String>>,
        reject_launch_for: Mutex<Vec<String>>,
        fail_artifacts: AtomicBool,
        artifact_fetches: AtomicUsize,
        next_id: AtomicUsize,
    }

    impl FakeVoice {
        fn set_status(&self, phone: &str, status: &str) {
            self.statuses
                .lock()
                .unwrap()
                .insert(phone.to_string(), status.to_string());
        }

        fn reject_launches_for(&self, phone: &str) {
            self.reject_launch_for
                .lock()
                .unwrap()
                .push(phone.to_string());
        }

        fn launch_count(&self) -> usize {
            self.launches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VoiceProvider for FakeVoice {
        async fn launch_call(&self, request: &LaunchRequest) -> Result<LaunchedCall, VoiceError> {
            if self
                .reject_launch_for
                .lock()
                .unwrap()
                .contains(&request.phone_number)
            {
                return Err(VoiceError::Api {
                    status: 400,
                    message: "assistant quota exceeded".to_string(),
                });
            }
            self.launches.lock().unwrap().push(request.clone());
            let id = format!("call-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.call_phones
                .lock()
                .unwrap()
                .insert(id.clone(), request.phone_number.clone());
            Ok(LaunchedCall { id })
        }

        async fn call_status(&self, call_id: &str) -> Result<CallStatusReport, VoiceError> {
            let phone = self
                .call_phones
                .lock()
                .unwrap()
                .get(call_id)
                .cloned()
                .ok_or(VoiceError::Api {
                    status: 404,
                    message: "unknown call".to_string(),
                })?;
            let status = self
                .statuses
                .lock()
                .unwrap()
                .get(&phone)
                .cloned()
                .unwrap_or_else(|| "in-progress".to_string());
            Ok(CallStatusReport {
                status,
                phone_number: Some(phone),
                duration: Some(245.0),
            })
        }

        async fn call_artifacts(&self, _call_id: &str) -> Result<CallArtifacts, VoiceError> {
            self.artifact_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_artifacts.load(Ordering::SeqCst) {
                return Err(VoiceError::Api {
                    status: 500,
                    message: "artifact store unavailable".to_string(),
                });
            }
            Ok(CallArtifacts {
                transcript: vec![crate::voice::ArtifactTurn {
                    role: "assistant".to_string(),
                    message: "Thanks for your time.".to_string(),
                    time: Some(1.0),
                }],
                summary: Some("Candidate answered all questions.".to_string()),
                recording_url: Some("https://recordings.example/abc".to_string()),
                structured_outputs: None,
            })
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        campaign: Arc<Campaign>,
        voice: Arc<FakeVoice>,
        provider: Arc<dyn VoiceProvider>,
    }

    fn harness(max_parallel_calls: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        let manager = CampaignManager::new(store, "asst_test".to_string(), max_parallel_calls);
        let (campaign, _) = manager
            .open(
                Uuid::new_v4(),
                CampaignSpec {
                    company: "Initech".to_string(),
                    job_title: "Engineer".to_string(),
                    questions: vec![],
                },
            )
            .unwrap();
        let voice = Arc::new(FakeVoice::default());
        let provider: Arc<dyn VoiceProvider> = voice.clone();
        Harness {
            _dir: dir,
            campaign,
            voice,
            provider,
        }
    }

    fn candidate(name: &str, phone: &str) -> Candidate {
        Candidate {
            name: name.to_string(),
            phone: phone.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            score: None,
            experience: None,
            education: None,
            notes: None,
        }
    }

    /// Advances paused time until the condition holds, asserting the
    /// parallelism cap at every sample point along the way.
    async fn settle(h: &Harness, what: &str, condition: impl Fn() -> bool) {
        for _ in 0..300 {
            assert!(
                h.campaign.in_flight_count() <= h.campaign.max_parallel_calls,
                "parallelism cap exceeded"
            );
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("condition never settled: {what}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_under_cap_launches_in_one_tick() {
        let h = harness(5);
        h.voice.set_status("+14155550100", "completed");
        h.voice.set_status("+14155550101", "completed");
        h.voice.set_status("+14155550102", "completed");
        h.campaign
            .enqueue(vec![
                candidate("A", "4155550100"),
                candidate("B", "4155550101"),
                candidate("C", "4155550102"),
            ])
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "all three interviews conducted", || {
            h.campaign.conducted().len() == 3
        })
        .await;

        assert_eq!(h.voice.launch_count(), 3);
        assert_eq!(h.campaign.queued_count(), 0);
        assert!(h.campaign.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_holds_and_freed_capacity_is_reused() {
        let h = harness(5);
        let phones: Vec<String> = (0..7).map(|i| format!("415555020{i}")).collect();
        h.campaign
            .enqueue(
                phones
                    .iter()
                    .enumerate()
                    .map(|(i, p)| candidate(&format!("C{i}"), p))
                    .collect(),
            )
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "first five calls launched", || h.voice.launch_count() == 5).await;
        assert_eq!(h.campaign.queued_count(), 2);
        assert_eq!(h.campaign.in_flight_count(), 5);

        // Finishing one call frees a slot; the driver fills it.
        h.voice.set_status("+14155550200", "completed");
        settle(&h, "sixth call launched", || h.voice.launch_count() >= 6).await;

        for phone in &phones {
            h.voice.set_status(&format!("+1{phone}"), "completed");
        }
        settle(&h, "all seven conducted", || h.campaign.conducted().len() == 7).await;
        assert_eq!(h.voice.launch_count(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_phone_fails_without_network_call() {
        let h = harness(5);
        h.campaign
            .enqueue(vec![candidate("Bad", "notaphone")])
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "entry marked failed", || {
            h.campaign.entries()[0].status == CallStatus::Failed
        })
        .await;

        let entry = &h.campaign.entries()[0];
        assert!(entry.call_id.is_none());
        assert!(entry.ended_at.is_some());
        assert!(entry.last_error.is_some());
        assert_eq!(h.voice.launch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_maps_to_no_answer_without_artifact_fetch() {
        let h = harness(5);
        h.voice.set_status("+14155550100", "busy");
        h.campaign
            .enqueue(vec![candidate("A", "4155550100")])
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "entry marked no_answer", || {
            h.campaign.entries()[0].status == CallStatus::NoAnswer
        })
        .await;

        let entry = &h.campaign.entries()[0];
        assert!(entry.ended_at.is_some());
        assert!(entry.call_id.is_some());
        assert_eq!(h.voice.artifact_fetches.load(Ordering::SeqCst), 0);
        // Stays in the queue, retryable.
        assert_eq!(h.campaign.entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_call_collects_artifacts() {
        let h = harness(5);
        h.voice.set_status("+14155550100", "completed");
        h.campaign
            .enqueue(vec![candidate("A", "4155550100")])
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "interview conducted", || h.campaign.conducted().len() == 1).await;

        let interview = &h.campaign.conducted()[0];
        assert_eq!(interview.transcript.len(), 1);
        assert_eq!(
            interview.summary.as_deref(),
            Some("Candidate answered all questions.")
        );
        assert_eq!(interview.duration_secs, Some(245.0));
        assert_eq!(h.voice.artifact_fetches.load(Ordering::SeqCst), 1);
        assert!(h.campaign.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_artifact_failure_keeps_completed_outcome() {
        let h = harness(5);
        h.voice.fail_artifacts.store(true, Ordering::SeqCst);
        h.voice.set_status("+14155550100", "completed");
        h.campaign
            .enqueue(vec![candidate("A", "4155550100")])
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "interview conducted despite artifact failure", || {
            h.campaign.conducted().len() == 1
        })
        .await;

        let interview = &h.campaign.conducted()[0];
        assert!(interview.transcript.is_empty());
        assert!(interview.summary.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_rejection_is_entry_local() {
        let h = harness(5);
        h.voice.reject_launches_for("+14155550100");
        h.voice.set_status("+14155550101", "completed");
        h.campaign
            .enqueue(vec![
                candidate("Rejected", "4155550100"),
                candidate("Fine", "4155550101"),
            ])
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "good candidate conducted", || {
            h.campaign.conducted().len() == 1
        })
        .await;

        let entries = h.campaign.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, CallStatus::Failed);
        assert!(entries[0].last_error.as_deref().unwrap().contains("quota"));
        assert!(entries[0].call_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_redials_after_no_answer() {
        let h = harness(5);
        h.voice.set_status("+14155550100", "busy");
        h.campaign
            .enqueue(vec![candidate("A", "4155550100")])
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "first attempt ends no_answer", || {
            h.campaign.entries()[0].status == CallStatus::NoAnswer
        })
        .await;
        assert_eq!(h.voice.launch_count(), 1);

        h.voice.set_status("+14155550100", "completed");
        let entry_id = h.campaign.entries()[0].id;
        assert!(h.campaign.retry(entry_id).unwrap());
        ensure_driver(&h.campaign, &h.provider);

        settle(&h, "retry conducted", || h.campaign.conducted().len() == 1).await;
        assert_eq!(h.voice.launch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_driver_and_pollers() {
        let h = harness(5);
        h.campaign
            .enqueue(vec![candidate("A", "4155550100")])
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "call launched", || h.voice.launch_count() == 1).await;

        h.campaign.cancel();
        h.voice.set_status("+14155550100", "completed");
        tokio::time::sleep(Duration::from_secs(60)).await;

        // The poller was torn down before observing completion.
        assert!(h.campaign.conducted().is_empty());
        assert_eq!(h.campaign.entries()[0].status, CallStatus::InCall);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_driver_is_reentrant() {
        let h = harness(5);
        h.voice.set_status("+14155550100", "completed");
        h.campaign
            .enqueue(vec![candidate("A", "4155550100")])
            .unwrap();

        // A second invocation while the first driver runs must not start a
        // second loop (and so must not double-launch).
        ensure_driver(&h.campaign, &h.provider);
        ensure_driver(&h.campaign, &h.provider);
        ensure_driver(&h.campaign, &h.provider);

        settle(&h, "single interview conducted", || {
            h.campaign.conducted().len() == 1
        })
        .await;
        assert_eq!(h.voice.launch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_failure_keeps_status() {
        let h = harness(5);
        h.campaign
            .enqueue(vec![candidate("A", "4155550100")])
            .unwrap();

        ensure_driver(&h.campaign, &h.provider);
        settle(&h, "call id recorded", || {
            h.campaign.entries()[0].call_id.is_some()
        })
        .await;

        // Forget the call id mapping: every poll now errors.
        let call_id = h.campaign.entries()[0].call_id.clone().unwrap();
        h.voice.call_phones.lock().unwrap().remove(&call_id);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.campaign.entries()[0].status, CallStatus::InCall);
        assert!(h.campaign.entries()[0].ended_at.is_none());

        // Restore the mapping; the poller is still alive and finishes.
        h.voice
            .call_phones
            .lock()
            .unwrap()
            .insert(call_id, "+14155550100".to_string());
        h.voice.set_status("+14155550100", "completed");
        settle(&h, "recovered poll conducts interview", || {
            h.campaign.conducted().len() == 1
        })
        .await;
    }
}
