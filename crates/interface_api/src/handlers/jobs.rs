//! Manual runs of the scheduled billing jobs

use axum::{extract::State, Extension, Json};
use tracing::info;

use core_kernel::Actor;

use crate::auth::require_job_runner;
use crate::dto::bookings::JobRunResponse;
use crate::scheduler::Job;
use crate::{error::ApiError, AppState};

async fn run(state: &AppState, actor: &Actor, job: Job) -> Result<Json<JobRunResponse>, ApiError> {
    require_job_runner(actor).map_err(|e| ApiError::Forbidden(e.to_string()))?;
    let today = state.billing.today();
    let affected = job.run(&state.billing, today).await?;
    info!(job = job.name(), %today, affected, user = ?actor.user_id, "Job run on request");
    Ok(Json(JobRunResponse {
        job: job.name(),
        run_date: today,
        affected,
    }))
}

/// Runs recurring invoice generation for today
pub async fn generate_monthly(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<JobRunResponse>, ApiError> {
    run(&state, &actor, Job::GenerateMonthly).await
}

/// Runs the overdue sweep for today
pub async fn mark_overdue(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<JobRunResponse>, ApiError> {
    run(&state, &actor, Job::MarkOverdue).await
}
