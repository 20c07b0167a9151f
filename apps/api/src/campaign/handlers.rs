use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::campaign::driver::{ensure_driver, resume_polling};
use crate::campaign::manager::StatusCounts;
use crate::campaign::models::{CampaignSpec, Candidate, CompletedInterview, QueueEntry};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenCampaignRequest {
    pub company: String,
    pub job_title: String,
    #[serde(default)]
    pub questions: Vec<String>,
}

#[derive(Serialize)]
pub struct CampaignResponse {
    pub job_id: Uuid,
    pub company: String,
    pub job_title: String,
    pub entries: Vec<QueueEntry>,
    pub counts: StatusCounts,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub candidates: Vec<Candidate>,
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    pub added: usize,
    pub skipped: usize,
}

/// POST /api/v1/jobs/:job_id/campaign
///
/// Opens (or re-opens) the campaign for a job, rehydrating any persisted
/// queue and resuming pollers for calls that were mid-flight.
pub async fn handle_open_campaign(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<OpenCampaignRequest>,
) -> Result<Json<CampaignResponse>, AppError> {
    let spec = CampaignSpec {
        company: req.company,
        job_title: req.job_title,
        questions: req.questions,
    };
    let (campaign, resumable) = state.campaigns.open(job_id, spec)?;

    for (entry_id, call_id) in resumable {
        resume_polling(&campaign, &state.voice, entry_id, call_id);
    }
    if campaign.queued_count() > 0 {
        ensure_driver(&campaign, &state.voice);
    }

    Ok(Json(campaign_response(&campaign)))
}

/// GET /api/v1/jobs/:job_id/campaign
pub async fn handle_get_campaign(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, AppError> {
    let campaign = lookup(&state, job_id)?;
    Ok(Json(campaign_response(&campaign)))
}

/// POST /api/v1/jobs/:job_id/campaign/candidates
///
/// Enqueues candidates (deduplicating against pending entries) and kicks
/// the driver.
pub async fn handle_enqueue(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, AppError> {
    if req.candidates.is_empty() {
        return Err(AppError::Validation("no candidates supplied".to_string()));
    }
    let campaign = lookup(&state, job_id)?;
    let (added, skipped) = campaign.enqueue(req.candidates)?;
    if added > 0 {
        ensure_driver(&campaign, &state.voice);
    }
    Ok(Json(EnqueueResponse { added, skipped }))
}

/// POST /api/v1/jobs/:job_id/campaign/entries/:entry_id/retry
pub async fn handle_retry_entry(
    State(state): State<AppState>,
    Path((job_id, entry_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let campaign = lookup(&state, job_id)?;
    match campaign.get_entry(entry_id) {
        None => return Err(AppError::NotFound(format!("Entry {entry_id} not found"))),
        Some(entry) if !entry.status.is_terminal() => {
            return Err(AppError::Conflict(format!(
                "Entry {entry_id} is not in a terminal state"
            )));
        }
        Some(_) => {}
    }
    campaign.retry(entry_id)?;
    ensure_driver(&campaign, &state.voice);
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/jobs/:job_id/campaign/entries/:entry_id
pub async fn handle_remove_entry(
    State(state): State<AppState>,
    Path((job_id, entry_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let campaign = lookup(&state, job_id)?;
    if !campaign.remove(entry_id)? {
        return Err(AppError::NotFound(format!("Entry {entry_id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/jobs/:job_id/campaign/interviews
pub async fn handle_list_interviews(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Vec<CompletedInterview>>, AppError> {
    let campaign = lookup(&state, job_id)?;
    Ok(Json(campaign.conducted()))
}

/// DELETE /api/v1/jobs/:job_id/campaign
///
/// Stops the campaign: driver and pollers are cancelled at their next
/// suspension point. Snapshots stay on disk for a later re-open.
pub async fn handle_stop_campaign(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.campaigns.stop(job_id) {
        return Err(AppError::NotFound(format!(
            "No open campaign for job {job_id}"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

fn lookup(
    state: &AppState,
    job_id: Uuid,
) -> Result<std::sync::Arc<crate::campaign::manager::Campaign>, AppError> {
    state
        .campaigns
        .get(job_id)
        .ok_or_else(|| AppError::NotFound(format!("No open campaign for job {job_id}")))
}

fn campaign_response(campaign: &crate::campaign::manager::Campaign) -> CampaignResponse {
    CampaignResponse {
        job_id: campaign.job_id,
        company: campaign.spec.company.clone(),
        job_title: campaign.spec.job_title.clone(),
        entries: campaign.entries(),
        counts: campaign.counts(),
    }
}
