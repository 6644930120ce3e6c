//! Invoice settings DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::BuildingId;
use domain_billing::{
    BillingPeriod, GenerateOn, GenerateType, InvoiceSettings, MonthlyCycle, ResolvedSettings,
    SettingsSource, SettingsUpdate, WeeklyCycle,
};

#[derive(Debug, Deserialize)]
pub struct CurrentSettingsQuery {
    pub building_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertSettingsRequest {
    pub building_id: Option<Uuid>,
    pub generate_type: GenerateType,
    pub period: BillingPeriod,
    pub generate_on: GenerateOn,
    pub monthly_cycle: MonthlyCycle,
    #[validate(range(min = 1, max = 31, message = "Day must be between 1 and 31."))]
    pub monthly_custom_day: Option<u32>,
    pub weekly_cycle: WeeklyCycle,
    #[validate(range(min = 1, max = 7, message = "Weekday must be between 1 and 7."))]
    pub weekly_custom_weekday: Option<u32>,
}

impl From<UpsertSettingsRequest> for SettingsUpdate {
    fn from(req: UpsertSettingsRequest) -> Self {
        Self {
            building_id: req.building_id.map(BuildingId::from_uuid),
            generate_type: req.generate_type,
            period: req.period,
            generate_on: req.generate_on,
            monthly_cycle: req.monthly_cycle,
            monthly_custom_day: req.monthly_custom_day,
            weekly_cycle: req.weekly_cycle,
            weekly_custom_weekday: req.weekly_custom_weekday,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub settings: InvoiceSettings,
    pub source: SettingsSource,
    /// False when the built-in default is shown without a stored row
    pub persisted: bool,
}

impl From<ResolvedSettings> for SettingsResponse {
    fn from(resolved: ResolvedSettings) -> Self {
        let persisted = resolved.is_persisted();
        Self {
            settings: resolved.settings,
            source: resolved.source,
            persisted,
        }
    }
}

impl From<InvoiceSettings> for SettingsResponse {
    fn from(settings: InvoiceSettings) -> Self {
        let source = if settings.building_id.is_some() {
            SettingsSource::Building
        } else {
            SettingsSource::Global
        };
        Self {
            settings,
            source,
            persisted: true,
        }
    }
}
