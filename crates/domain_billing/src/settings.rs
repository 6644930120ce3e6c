//! Invoice generation settings
//!
//! Settings are stored per owner, optionally scoped to a building. A row
//! without a building is the owner's global default. When neither exists the
//! built-in default applies: automatic monthly invoices on the check-in
//! anchored cycle, generated at the start of each window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BuildingId, InvoiceSettingsId, OwnerId};

use crate::error::BillingError;

core_kernel::string_enum! {
    /// Whether invoices are created by the engine or by hand
    pub enum GenerateType {
        Manual => "manual",
        Automatic => "automatic",
    }
}

core_kernel::string_enum! {
    /// Billing period length
    pub enum BillingPeriod {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
    }
}

core_kernel::string_enum! {
    /// Which edge of the billing window triggers generation
    pub enum GenerateOn {
        Start => "start",
        End => "end",
    }
}

core_kernel::string_enum! {
    /// How monthly windows are aligned
    pub enum MonthlyCycle {
        CalendarMonth => "calendar_month",
        CheckinDate => "checkin_date",
        CustomDay => "custom_day",
    }
}

core_kernel::string_enum! {
    /// How weekly windows are aligned
    pub enum WeeklyCycle {
        CalendarWeek => "calendar_week",
        CheckinDate => "checkin_date",
        CustomDay => "custom_day",
    }
}

/// Invoice settings for an owner, optionally scoped to a building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSettings {
    pub id: InvoiceSettingsId,
    pub owner_id: OwnerId,
    /// `None` for the owner's global default
    pub building_id: Option<BuildingId>,
    pub generate_type: GenerateType,
    pub period: BillingPeriod,
    pub generate_on: GenerateOn,
    pub monthly_cycle: MonthlyCycle,
    /// Day of month (1..=31) for custom-day monthly cycles
    pub monthly_custom_day: Option<u32>,
    pub weekly_cycle: WeeklyCycle,
    /// Weekday (Monday = 0) for custom-day weekly cycles
    pub weekly_custom_weekday: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceSettings {
    /// The built-in default for `(owner, building)`; not persisted
    pub fn default_for(owner_id: OwnerId, building_id: Option<BuildingId>) -> Self {
        let now = Utc::now();
        Self {
            id: InvoiceSettingsId::new_v7(),
            owner_id,
            building_id,
            generate_type: GenerateType::Automatic,
            period: BillingPeriod::Monthly,
            generate_on: GenerateOn::Start,
            monthly_cycle: MonthlyCycle::CheckinDate,
            monthly_custom_day: None,
            weekly_cycle: WeeklyCycle::CalendarWeek,
            weekly_custom_weekday: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true when the engine should create monthly invoices itself
    pub fn is_automatic_monthly(&self) -> bool {
        self.generate_type == GenerateType::Automatic && self.period == BillingPeriod::Monthly
    }

    /// Validates the custom-day fields and clears the ones that do not apply
    ///
    /// # Errors
    ///
    /// Returns a validation error naming `monthly_custom_day` or
    /// `weekly_custom_weekday` when a custom-day cycle lacks its value or the
    /// value is out of range.
    pub fn validate(&mut self) -> Result<(), BillingError> {
        if self.monthly_cycle == MonthlyCycle::CustomDay {
            match self.monthly_custom_day {
                None => {
                    return Err(BillingError::validation(
                        "monthly_custom_day",
                        "Required when monthly cycle is custom day.",
                    ))
                }
                Some(day) if !(1..=31).contains(&day) => {
                    return Err(BillingError::validation(
                        "monthly_custom_day",
                        "Must be between 1 and 31.",
                    ))
                }
                Some(_) => {}
            }
        } else {
            self.monthly_custom_day = None;
        }

        if self.weekly_cycle == WeeklyCycle::CustomDay {
            match self.weekly_custom_weekday {
                None => {
                    return Err(BillingError::validation(
                        "weekly_custom_weekday",
                        "Required when weekly cycle is custom day.",
                    ))
                }
                Some(day) if day > 6 => {
                    return Err(BillingError::validation(
                        "weekly_custom_weekday",
                        "Must be between 0 (Monday) and 6 (Sunday).",
                    ))
                }
                Some(_) => {}
            }
        } else {
            self.weekly_custom_weekday = None;
        }

        Ok(())
    }
}

/// Caller-editable settings fields; the owner comes from the acting user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub building_id: Option<BuildingId>,
    pub generate_type: GenerateType,
    pub period: BillingPeriod,
    pub generate_on: GenerateOn,
    pub monthly_cycle: MonthlyCycle,
    pub monthly_custom_day: Option<u32>,
    pub weekly_cycle: WeeklyCycle,
    pub weekly_custom_weekday: Option<u32>,
}

impl SettingsUpdate {
    /// Builds validated settings for `owner`
    pub fn into_settings(self, owner_id: OwnerId) -> Result<InvoiceSettings, BillingError> {
        let mut settings = InvoiceSettings {
            generate_type: self.generate_type,
            period: self.period,
            generate_on: self.generate_on,
            monthly_cycle: self.monthly_cycle,
            monthly_custom_day: self.monthly_custom_day,
            weekly_cycle: self.weekly_cycle,
            weekly_custom_weekday: self.weekly_custom_weekday,
            ..InvoiceSettings::default_for(owner_id, self.building_id)
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Where resolved settings came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsSource {
    /// Building-specific row
    Building,
    /// Owner's global row
    Global,
    /// Built-in default, not stored
    Default,
}

/// Settings together with their origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSettings {
    pub settings: InvoiceSettings,
    pub source: SettingsSource,
}

impl ResolvedSettings {
    /// Returns true when the settings exist in the store
    pub fn is_persisted(&self) -> bool {
        self.source != SettingsSource::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> InvoiceSettings {
        InvoiceSettings::default_for(OwnerId::new(), None)
    }

    #[test]
    fn test_default_is_automatic_monthly_checkin() {
        let s = settings();
        assert!(s.is_automatic_monthly());
        assert_eq!(s.generate_on, GenerateOn::Start);
        assert_eq!(s.monthly_cycle, MonthlyCycle::CheckinDate);
        assert_eq!(s.weekly_cycle, WeeklyCycle::CalendarWeek);
    }

    #[test]
    fn test_custom_day_required() {
        let mut s = settings();
        s.monthly_cycle = MonthlyCycle::CustomDay;
        let err = s.validate().unwrap_err();
        assert_eq!(err.field(), Some("monthly_custom_day"));

        s.monthly_custom_day = Some(32);
        assert!(s.validate().is_err());

        s.monthly_custom_day = Some(31);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_inapplicable_custom_values_are_cleared() {
        let mut s = settings();
        s.monthly_custom_day = Some(10);
        s.weekly_custom_weekday = Some(3);
        s.validate().unwrap();
        assert_eq!(s.monthly_custom_day, None);
        assert_eq!(s.weekly_custom_weekday, None);
    }

    #[test]
    fn test_weekday_range() {
        let mut s = settings();
        s.weekly_cycle = WeeklyCycle::CustomDay;
        s.weekly_custom_weekday = Some(7);
        assert_eq!(s.validate().unwrap_err().field(), Some("weekly_custom_weekday"));
        s.weekly_custom_weekday = Some(0);
        assert!(s.validate().is_ok());
    }
}
