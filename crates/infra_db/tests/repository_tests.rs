//! PostgreSQL integration tests for the billing and subscription adapters
//!
//! Every test starts its own container, so they are ignored unless run
//! with `cargo test -p infra_db -- --ignored`.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;

use core_kernel::{Actor, BuildingId, AdapterHealth, InvoiceId, Money, PortError};
use domain_billing::{
    BillingError, BillingService, BookingStatus, FirstInvoiceOutcome, InvoiceStatus, InvoiceStore,
    NewInvoice, PaymentDraft, SettingsSource, TriggerOutcome,
};
use domain_subscription::{
    ChangePlanRequest, LimitKey, PlanSelector, SubscriptionError, SubscriptionGate,
};
use infra_db::{PostgresBillingStore, PostgresSubscriptionStore};
use test_utils::{db_test, ActorFixtures, BookingBuilder, IdFixtures, SettingsBuilder, TestDatabase};

// ============================================================================
// Helpers
// ============================================================================

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn billing(db: &TestDatabase) -> (Arc<PostgresBillingStore>, BillingService) {
    let store = Arc::new(PostgresBillingStore::new(db.pool().clone()));
    let service = BillingService::with_store(store.clone()).with_timezone("Asia/Kolkata".parse().unwrap());
    (store, service)
}

fn gate(db: &TestDatabase) -> SubscriptionGate {
    let store = Arc::new(PostgresSubscriptionStore::new(db.pool().clone()));
    SubscriptionGate::new(store).with_timezone("Asia/Kolkata".parse().unwrap())
}

// ============================================================================
// Billing store
// ============================================================================

mod billing_store {
    use super::*;

    db_test!(test_booking_confirmation_creates_first_invoice, |db| {
        let (_, service) = billing(&db);
        let booking = BookingBuilder::new().build();
        db.seed_booking(&booking).await.unwrap();

        let outcome = service
            .handle_booking_transition(
                &BookingBuilder::new().with_id(booking.id).transition_from(BookingStatus::Pending),
                &Actor::system(),
                date(2025, 1, 31),
            )
            .await;
        let invoice = match outcome {
            TriggerOutcome::FirstInvoice(FirstInvoiceOutcome::Created { invoice }) => *invoice,
            other => panic!("expected a created invoice, got {:?}", other),
        };

        assert_eq!(invoice.cycle_month, date(2025, 1, 1));
        assert_eq!(invoice.total_amount, Money::inr(dec!(15500)));
        assert_eq!(invoice.due_date, date(2025, 2, 28));

        let detail = service.get_invoice(invoice.id).await.unwrap();
        assert_eq!(detail.expenses.len(), 2);
    });

    db_test!(test_unique_cycle_month_is_enforced_by_the_table, |db| {
        let (store, service) = billing(&db);
        let booking = BookingBuilder::new().build();
        db.seed_booking(&booking).await.unwrap();

        let new = NewInvoice::new(booking.id, date(2025, 2, 1), date(2025, 2, 5), Money::inr(dec!(10500)))
            .with_cycle_month(date(2025, 2, 1));
        let first = service
            .create_invoice(new.clone(), &ActorFixtures::admin(), date(2025, 2, 1))
            .await
            .unwrap();

        // The service check catches the common case
        let err = service
            .create_invoice(new, &ActorFixtures::admin(), date(2025, 2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation { ref field, .. } if field == "cycle_month"));

        // A racing insert that skipped the check hits the unique index
        let mut racing = first.clone();
        racing.id = InvoiceId::new_v7();
        let err = store.insert_invoice(racing, Vec::new()).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict { .. }));
    });

    db_test!(test_payments_settle_and_reopen_invoice, |db| {
        let (_, service) = billing(&db);
        let booking = BookingBuilder::new().build();
        db.seed_booking(&booking).await.unwrap();

        let invoice = service
            .create_invoice(
                NewInvoice::new(booking.id, date(2025, 2, 1), date(2025, 2, 5), Money::inr(dec!(10500)))
                    .with_cycle_month(date(2025, 2, 1))
                    .with_status(InvoiceStatus::Open),
                &ActorFixtures::admin(),
                date(2025, 2, 1),
            )
            .await
            .unwrap();

        let partial = service
            .record_payment(
                PaymentDraft::new(Money::inr(dec!(4000))).for_invoice(invoice.id),
                &ActorFixtures::admin(),
            )
            .await
            .unwrap();
        assert_eq!(partial.invoices[0].status, InvoiceStatus::Partial);
        assert_eq!(partial.invoices[0].balance_due, Money::inr(dec!(6500)));

        let rest = service
            .record_payment(
                PaymentDraft::new(Money::inr(dec!(6500))).for_invoice(invoice.id),
                &ActorFixtures::admin(),
            )
            .await
            .unwrap();
        assert_eq!(rest.invoices[0].status, InvoiceStatus::Paid);
        assert!(rest.invoices[0].balance_due.is_zero());

        let payment = rest.payment.unwrap();
        let reverted = service
            .delete_payment(payment.id, &ActorFixtures::admin())
            .await
            .unwrap();
        assert!(reverted.payment.is_none());
        assert_eq!(reverted.invoices[0].status, InvoiceStatus::Partial);
        assert_eq!(reverted.invoices[0].balance_due, Money::inr(dec!(6500)));
    });

    db_test!(test_cancellation_voids_current_and_future_months, |db| {
        let (_, service) = billing(&db);
        let booking = BookingBuilder::new().build();
        db.seed_booking(&booking).await.unwrap();

        for (month, status) in [
            (date(2025, 1, 1), InvoiceStatus::Paid),
            (date(2025, 2, 1), InvoiceStatus::Open),
            (date(2025, 3, 1), InvoiceStatus::Draft),
        ] {
            let new = NewInvoice::new(booking.id, month, month, Money::inr(dec!(10500)))
                .with_cycle_month(month);
            let invoice = service
                .create_invoice(new, &ActorFixtures::admin(), month)
                .await
                .unwrap();
            if status == InvoiceStatus::Paid {
                service.open_invoice(invoice.id, &ActorFixtures::admin()).await.unwrap();
                service
                    .record_payment(
                        PaymentDraft::new(Money::inr(dec!(10500))).for_invoice(invoice.id),
                        &ActorFixtures::admin(),
                    )
                    .await
                    .unwrap();
            } else if status == InvoiceStatus::Open {
                service.open_invoice(invoice.id, &ActorFixtures::admin()).await.unwrap();
            }
        }

        let canceled = BookingBuilder::new()
            .with_id(booking.id)
            .with_status(BookingStatus::Canceled)
            .transition_from(BookingStatus::Confirmed);
        let outcome = service
            .handle_booking_transition(&canceled, &Actor::system(), date(2025, 2, 10))
            .await;
        assert_eq!(outcome, TriggerOutcome::Voided { count: 2 });

        let statuses: Vec<_> = service
            .list_invoices(booking.id)
            .await
            .unwrap()
            .into_iter()
            .map(|inv| (inv.cycle_month, inv.status))
            .collect();
        assert!(statuses.contains(&(date(2025, 1, 1), InvoiceStatus::Paid)));
        assert!(statuses.contains(&(date(2025, 2, 1), InvoiceStatus::Void)));
        assert!(statuses.contains(&(date(2025, 3, 1), InvoiceStatus::Void)));
    });

    db_test!(test_overdue_sweep_only_touches_unpaid_past_due, |db| {
        let (_, service) = billing(&db);
        let booking = BookingBuilder::new().build();
        db.seed_booking(&booking).await.unwrap();

        let past = service
            .create_invoice(
                NewInvoice::new(booking.id, date(2025, 2, 1), date(2025, 2, 5), Money::inr(dec!(10500)))
                    .with_cycle_month(date(2025, 2, 1))
                    .with_status(InvoiceStatus::Open),
                &ActorFixtures::admin(),
                date(2025, 2, 1),
            )
            .await
            .unwrap();
        let future = service
            .create_invoice(
                NewInvoice::new(booking.id, date(2025, 3, 1), date(2025, 3, 5), Money::inr(dec!(10500)))
                    .with_cycle_month(date(2025, 3, 1))
                    .with_status(InvoiceStatus::Open),
                &ActorFixtures::admin(),
                date(2025, 3, 1),
            )
            .await
            .unwrap();

        assert_eq!(service.mark_overdue_invoices(date(2025, 2, 6)).await.unwrap(), 1);
        assert_eq!(service.mark_overdue_invoices(date(2025, 2, 6)).await.unwrap(), 0);

        let past = service.get_invoice(past.id).await.unwrap().invoice;
        let future = service.get_invoice(future.id).await.unwrap().invoice;
        assert_eq!(past.status, InvoiceStatus::Overdue);
        assert_eq!(future.status, InvoiceStatus::Open);
    });

    db_test!(test_settings_upsert_and_building_override, |db| {
        let (_, service) = billing(&db);
        let admin = ActorFixtures::admin();

        let global = service
            .upsert_settings(&admin, SettingsBuilder::new().on_custom_day(15).build())
            .await
            .unwrap();
        let updated = service
            .upsert_settings(&admin, SettingsBuilder::new().on_custom_day(20).build())
            .await
            .unwrap();
        assert_eq!(global.id, updated.id);
        assert_eq!(updated.monthly_custom_day, Some(20));

        let building = IdFixtures::building();
        service
            .upsert_settings(&admin, SettingsBuilder::new().for_building(building).manual().build())
            .await
            .unwrap();

        let resolved = service.current_settings(&admin, Some(building)).await.unwrap();
        assert_eq!(resolved.source, SettingsSource::Building);

        let other = service
            .current_settings(&admin, Some(BuildingId::new_v7()))
            .await
            .unwrap();
        assert_eq!(other.source, SettingsSource::Global);
        assert_eq!(other.settings.monthly_custom_day, Some(20));
    });

    db_test!(test_readiness_probe_reports_healthy, |db| {
        use core_kernel::HealthCheckable;

        let (store, _) = billing(&db);
        let result = store.health_check().await;
        assert_eq!(result.status, AdapterHealth::Healthy);
    });
}

// ============================================================================
// Subscription store
// ============================================================================

mod subscription_store {
    use super::*;

    db_test!(test_first_lookup_provisions_one_free_month, |db| {
        let gate = gate(&db);
        let admin = ActorFixtures::admin();

        let first = gate.current_subscription(&admin, Utc::now()).await.unwrap();
        assert_eq!(first.plan.slug, "basic");
        assert!(first.subscription.meta.free_month);
        assert!(first.subscription.is_current);

        let again = gate.current_subscription(&admin, Utc::now()).await.unwrap();
        assert_eq!(again.subscription.id, first.subscription.id);
    });

    db_test!(test_building_limit_counts_active_buildings, |db| {
        let gate = gate(&db);
        let admin = ActorFixtures::admin();
        gate.current_subscription(&admin, Utc::now()).await.unwrap();

        db.insert_building(BuildingId::new_v7(), IdFixtures::owner(), true)
            .await
            .unwrap();
        let err = gate
            .ensure_limit_not_exceeded(&admin, LimitKey::MaxBuildings, 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::LimitReached { .. }));
    });

    db_test!(test_plan_change_rechecks_buildings_under_lock, |db| {
        let gate = gate(&db);
        let admin = ActorFixtures::admin();
        gate.current_subscription(&admin, Utc::now()).await.unwrap();

        let extra = BuildingId::new_v7();
        db.insert_building(BuildingId::new_v7(), IdFixtures::owner(), true)
            .await
            .unwrap();
        db.insert_building(extra, IdFixtures::owner(), true).await.unwrap();
        // Inactive buildings are not counted
        db.insert_building(BuildingId::new_v7(), IdFixtures::owner(), false)
            .await
            .unwrap();

        let request = || ChangePlanRequest {
            plan: PlanSelector::Slug("basic".into()),
            interval: Some("1m".into()),
        };

        let err = gate.change_plan(&admin, request(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::PlanLimitExceeded { used: 2, limit: 1 }));

        sqlx::query("UPDATE buildings SET is_active = FALSE WHERE id = $1")
            .bind(uuid::Uuid::from(extra))
            .execute(db.pool())
            .await
            .unwrap();

        let changed = gate.change_plan(&admin, request(), Utc::now()).await.unwrap();
        assert_eq!(changed.plan_id, IdFixtures::basic_plan());
        assert!(!changed.meta.free_month);
    });

    db_test!(test_staff_resolve_to_their_owner, |db| {
        let gate = gate(&db);
        let owner_view = gate
            .current_subscription(&ActorFixtures::admin(), Utc::now())
            .await
            .unwrap();
        let staff_view = gate
            .current_subscription(&ActorFixtures::staff(), Utc::now())
            .await
            .unwrap();
        assert_eq!(staff_view.subscription.id, owner_view.subscription.id);
    });
}
