//! Subscription DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::PlanId;
use domain_subscription::{ChangePlanRequest, FeatureKey, Limit, LimitKey, PlanSelector};

/// Identifies the target plan by slug or id; the slug wins when both are set
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePlanBody {
    #[validate(length(min = 1, max = 64))]
    pub plan: Option<String>,
    pub plan_id: Option<Uuid>,
    #[validate(length(min = 1, max = 16))]
    pub interval: Option<String>,
}

impl ChangePlanBody {
    pub fn selector(&self) -> Option<PlanSelector> {
        match (&self.plan, self.plan_id) {
            (Some(slug), _) => Some(PlanSelector::Slug(slug.clone())),
            (None, Some(id)) => Some(PlanSelector::Id(PlanId::from_uuid(id))),
            (None, None) => None,
        }
    }

    pub fn into_request(self) -> Option<ChangePlanRequest> {
        let plan = self.selector()?;
        Some(ChangePlanRequest {
            plan,
            interval: self.interval,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub plan: String,
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_interval() -> String {
    "1m".to_string()
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub used: u64,
}

#[derive(Debug, Serialize)]
pub struct FeatureCheckResponse {
    pub key: FeatureKey,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct LimitCheckResponse {
    pub key: LimitKey,
    pub limit: Limit,
    pub used: u64,
    pub allowed: bool,
}
