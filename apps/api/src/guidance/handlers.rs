//! Axum route handlers for the Guidance API.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::guidance::service::GuidanceResult;
use crate::guidance::store::BundleStoreStatus;
use crate::state::AppState;

/// Shorter input is rejected before any bundle is created.
pub const MIN_RESUME_CHARS: usize = 50;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceRequest {
    #[serde(default)]
    pub resume_text: String,
    pub assessment_data: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceResponse {
    pub success: bool,
    pub data: GuidanceResult,
    pub analyzed_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/career/guidance
///
/// Anonymizes the resume, runs one provider call through a short-lived bundle
/// and returns the structured guidance.
pub async fn handle_guidance(
    State(state): State<AppState>,
    Json(request): Json<GuidanceRequest>,
) -> Result<Json<GuidanceResponse>, AppError> {
    let resume_text = request.resume_text.trim();
    if resume_text.chars().count() < MIN_RESUME_CHARS {
        return Err(AppError::Validation(format!(
            "resumeText is required (min {MIN_RESUME_CHARS} characters)"
        )));
    }

    let data = state
        .guidance
        .run(resume_text, request.assessment_data.as_ref())
        .await?;

    Ok(Json(GuidanceResponse {
        success: true,
        data,
        analyzed_at: Utc::now(),
    }))
}

/// GET /api/v1/career/bundles/status
///
/// Population of the bundle store. Timestamps only, never payloads.
pub async fn handle_bundle_status(State(state): State<AppState>) -> Json<BundleStoreStatus> {
    Json(state.bundles.status())
}
