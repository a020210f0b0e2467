//! Integration tests for the five-trigger Pipeline and the WorkerService.

use chrono::{Duration, TimeZone, Utc, Weekday};
use locus_core::{
    AccountEntry, AppError, Cadence, LocusConfig, Pipeline, SilentReporter, SilentWorkerReporter,
    Trigger, TriggerScheduler, WorkerConfig, WorkerService,
};
use tokio_util::sync::CancellationToken;

use crate::integration::common::{
    Behavior, MockApi, MockScheduler, MockStore, account, day, fast_config,
};

type TestPipeline = Pipeline<MockStore, MockApi, MockScheduler>;

fn bakeries_config() -> LocusConfig {
    LocusConfig {
        retention_weeks: 2,
        accounts: vec![AccountEntry {
            name: "bakeries".to_string(),
            status_filter: None,
            region_filter: None,
        }],
    }
}

/// A configured pipeline over one account with six locations.
async fn configured(behavior: Behavior) -> (TestPipeline, MockStore, MockApi, MockScheduler) {
    let store = MockStore::new();
    let api = MockApi::new(behavior).with_account(account(1, "Bakeries"), 6);
    let scheduler = MockScheduler::new();
    let pipeline =
        Pipeline::with_config(store.clone(), api.clone(), scheduler.clone(), fast_config());

    pipeline.refresh_accounts().await.unwrap();
    pipeline.configure(&bakeries_config()).await.unwrap();
    (pipeline, store, api, scheduler)
}

#[tokio::test]
async fn test_configure_resolves_account_names() {
    let (_, store, _, _) = configured(Behavior::Succeed).await;

    let configs = store.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].account_name, "Bakeries");
    assert_eq!(configs[0].account_group, "accounts/1");
    assert_eq!(store.retention(), Some(2));
}

#[tokio::test]
async fn test_configure_unknown_account_writes_nothing() {
    let store = MockStore::new();
    let api = MockApi::new(Behavior::Succeed).with_account(account(1, "Bakeries"), 6);
    let pipeline = Pipeline::new(store.clone(), api, MockScheduler::new());
    pipeline.refresh_accounts().await.unwrap();

    let mut config = bakeries_config();
    config.accounts.push(AccountEntry {
        name: "Florists".to_string(),
        status_filter: None,
        region_filter: None,
    });
    let err = pipeline.configure(&config).await.unwrap_err();

    assert!(matches!(err, AppError::ConfigError(_)));
    assert!(store.configs().is_empty());
    assert_eq!(store.retention(), None);
}

/// `start` lists, covers both windows, then hands over to the weekly tick.
#[tokio::test]
async fn test_start_completes_yearly_download() {
    let (pipeline, store, _, scheduler) = configured(Behavior::Succeed).await;
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 14, 20, 0).unwrap();

    let result = pipeline
        .start(now, &CancellationToken::new(), &SilentReporter)
        .await
        .unwrap()
        .unwrap();

    assert!(result.is_done());
    assert_eq!(store.insights().len(), 12);
    assert!(
        store
            .stored_markers()
            .iter()
            .all(|m| m.as_deref() == Some("d-2024-03-08"))
    );

    assert_eq!(scheduler.names(), vec!["steady-state-weekly"]);
    let weekly = scheduler.get(Trigger::SteadyStateWeekly).unwrap();
    assert_eq!(
        weekly.cadence,
        Cadence::Weekly {
            weekday: Weekday::Thu,
            hour: 13
        }
    );
    assert_eq!(
        weekly.next_run_at,
        Utc.with_ymd_and_hms(2024, 3, 21, 13, 0, 0).unwrap()
    );
}

/// The weekly tick relists, adds the newest week and drops the oldest.
#[tokio::test]
async fn test_steady_state_weekly_rolls_retention() {
    let (pipeline, store, _, scheduler) = configured(Behavior::Succeed).await;
    let cancel = CancellationToken::new();
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 14, 20, 0).unwrap();
    pipeline.start(now, &cancel, &SilentReporter).await.unwrap();

    let result = pipeline
        .run_trigger(
            Trigger::SteadyStateWeekly,
            now + Duration::days(7),
            &cancel,
            &SilentReporter,
        )
        .await
        .unwrap()
        .unwrap();

    assert!(result.is_done());
    assert_eq!(store.location_count(), 6);
    let mut weeks: Vec<_> = store.insights().iter().map(|r| r.start_week).collect();
    weeks.sort();
    weeks.dedup();
    assert_eq!(weeks, vec![day(2024, 3, 1), day(2024, 3, 8)]);
    assert_eq!(store.insights().len(), 12);
    assert_eq!(scheduler.names(), vec!["steady-state-weekly"]);
}

/// A failed listing leaves the locations retry armed; the retry finishes the
/// whole yearly download.
#[tokio::test]
async fn test_locations_retry_resumes_after_failure() {
    let (pipeline, store, api, scheduler) = configured(Behavior::Succeed).await;
    let cancel = CancellationToken::new();
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 14, 20, 0).unwrap();
    api.set_listing_fails(true);

    let err = pipeline
        .start(now, &cancel, &SilentReporter)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NetworkError(_)));
    assert_eq!(scheduler.names(), vec!["yearly-locations-retry"]);
    assert_eq!(
        scheduler
            .get(Trigger::YearlyLocationsRetry)
            .unwrap()
            .next_run_at,
        now + Duration::hours(1)
    );

    api.set_listing_fails(false);
    let result = pipeline
        .run_trigger(
            Trigger::YearlyLocationsRetry,
            now + Duration::hours(1),
            &cancel,
            &SilentReporter,
        )
        .await
        .unwrap()
        .unwrap();

    assert!(result.is_done());
    assert_eq!(store.insights().len(), 12);
    assert_eq!(scheduler.names(), vec!["steady-state-weekly"]);
}

/// An insights slice that stops short leaves only the insights retry armed.
#[tokio::test]
async fn test_insights_retry_resumes_after_errors() {
    let (pipeline, store, api, scheduler) = configured(Behavior::AlwaysError).await;
    let cancel = CancellationToken::new();
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 14, 20, 0).unwrap();

    let first = pipeline
        .start(now, &cancel, &SilentReporter)
        .await
        .unwrap()
        .unwrap();
    assert!(!first.is_done());
    assert!(store.insights().is_empty());
    assert_eq!(scheduler.names(), vec!["yearly-insights-retry"]);

    api.set_behavior(Behavior::Succeed);
    let second = pipeline
        .run_trigger(
            Trigger::YearlyInsightsRetry,
            now + Duration::hours(1),
            &cancel,
            &SilentReporter,
        )
        .await
        .unwrap()
        .unwrap();

    assert!(second.is_done());
    assert_eq!(store.insights().len(), 12);
    assert_eq!(scheduler.names(), vec!["steady-state-weekly"]);
}

#[tokio::test]
async fn test_reset_and_restart_replaces_everything() {
    let (pipeline, store, _, _) = configured(Behavior::Succeed).await;
    let cancel = CancellationToken::new();
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 14, 20, 0).unwrap();
    pipeline.start(now, &cancel, &SilentReporter).await.unwrap();

    let result = pipeline
        .reset_and_restart(now, &cancel, &SilentReporter)
        .await
        .unwrap()
        .unwrap();

    assert!(result.is_done());
    assert_eq!(store.location_count(), 6);
    assert_eq!(store.insights().len(), 12);
}

#[tokio::test]
async fn test_start_without_configuration_waits() {
    let store = MockStore::new();
    let scheduler = MockScheduler::new();
    let pipeline = Pipeline::new(store.clone(), MockApi::new(Behavior::Succeed), scheduler.clone());

    let result = pipeline
        .start(Utc::now(), &CancellationToken::new(), &SilentReporter)
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(scheduler.names(), vec!["yearly-locations-retry"]);
}

// =============================================================================
// Worker
// =============================================================================

/// A failing handler is audited and its trigger stays armed for the next hour.
#[tokio::test]
async fn test_worker_records_failure_and_keeps_trigger() {
    let (pipeline, store, api, scheduler) = configured(Behavior::Succeed).await;
    api.set_listing_fails(true);
    scheduler
        .arm(
            Trigger::YearlyLocationsRetry,
            Cadence::Hourly,
            Utc::now() - Duration::minutes(5),
        )
        .await
        .unwrap();
    let worker = WorkerService::new(pipeline, WorkerConfig::default());
    let cancel = CancellationToken::new();

    let ran = worker
        .run_next_due(&cancel, &SilentWorkerReporter, &SilentReporter)
        .await
        .unwrap();

    assert_eq!(ran, Some(Trigger::YearlyLocationsRetry));
    assert!(
        store
            .log_messages()
            .iter()
            .any(|m| m.starts_with("yearly-locations-retry failed"))
    );
    let armed = scheduler.get(Trigger::YearlyLocationsRetry).unwrap();
    assert!(armed.last_run_at.is_some());
    assert!(armed.next_run_at > Utc::now());

    let idle = worker
        .run_next_due(&cancel, &SilentWorkerReporter, &SilentReporter)
        .await
        .unwrap();
    assert_eq!(idle, None);
}

#[tokio::test]
async fn test_worker_stops_when_cancelled() {
    let (pipeline, _, _, _) = configured(Behavior::Succeed).await;
    let worker = WorkerService::new(
        pipeline,
        WorkerConfig::default().with_poll_interval(std::time::Duration::from_millis(10)),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    worker
        .run(cancel, &SilentWorkerReporter, &SilentReporter)
        .await
        .unwrap();
}
