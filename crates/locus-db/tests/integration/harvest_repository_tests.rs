//! Integration tests for HarvestRepository.

use locus_core::marker::Marker;
use locus_core::models::{Account, NewAccountConfig};
use locus_core::schema::Metric;
use locus_core::traits::HarvestStore;
use locus_db::HarvestRepository;

use crate::integration::common::{day, sample_location, sample_record, setup_test_db};

fn account(id: u32, display: &str) -> Account {
    Account {
        name: format!("accounts/{}", id),
        account_name: display.to_string(),
        account_type: Some("LOCATION_GROUP".to_string()),
        role: Some("OWNER".to_string()),
        permission_level: None,
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_replace_accounts_overwrites_listing() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool);

    repo.replace_accounts(&[account(1, "Bakeries"), account(2, "Florists")])
        .await
        .unwrap();
    let inserted = repo.replace_accounts(&[account(3, "Cafes")]).await.unwrap();

    assert_eq!(inserted, 1);
    let accounts = repo.list_accounts().await.unwrap();
    assert_eq!(accounts, vec![account(3, "Cafes")]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_account_configs_positions_and_markers() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool);

    let configs = vec![
        NewAccountConfig {
            account_name: "Bakeries".to_string(),
            account_group: "accounts/1".to_string(),
            status_filter: Some("OPEN".to_string()),
            region_filter: None,
        },
        NewAccountConfig {
            account_name: "Florists".to_string(),
            account_group: "accounts/2".to_string(),
            status_filter: None,
            region_filter: Some("IT".to_string()),
        },
    ];
    assert_eq!(repo.replace_account_configs(&configs).await.unwrap(), 2);

    let listed = repo
        .commit_listing(
            1,
            &[sample_location("accounts/1", 1)],
            &Marker::Caught(day(2024, 3, 8)),
        )
        .await
        .unwrap();
    assert_eq!(listed, 1);

    let stored = repo.list_account_configs().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].position, 1);
    assert_eq!(stored[0].listing_marker, Marker::Caught(day(2024, 3, 8)));
    assert_eq!(stored[1].position, 2);
    assert_eq!(stored[1].listing_marker, Marker::Empty);
    assert_eq!(stored[1].region_filter.as_deref(), Some("IT"));

    assert_eq!(repo.clear_listing_markers().await.unwrap(), 1);
    let cleared = repo.list_account_configs().await.unwrap();
    assert!(cleared.iter().all(|c| c.listing_marker == Marker::Empty));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_retention_weeks_upsert() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool);

    assert_eq!(repo.retention_weeks().await.unwrap(), None);
    repo.set_retention_weeks(52).await.unwrap();
    repo.set_retention_weeks(26).await.unwrap();
    assert_eq!(repo.retention_weeks().await.unwrap(), Some(26));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_location_markers_follow_row_order() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool);

    let new_locations: Vec<_> = (1..=4).map(|i| sample_location("accounts/1", i)).collect();
    assert_eq!(
        repo.commit_listing(1, &new_locations, &Marker::Empty)
            .await
            .unwrap(),
        4
    );

    let locations = repo.list_locations().await.unwrap();
    let names: Vec<_> = locations.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["locations/1", "locations/2", "locations/3", "locations/4"]
    );
    assert!(locations.windows(2).all(|w| w[0].id < w[1].id));

    let ids = [locations[0].id, locations[2].id];
    let updated = repo
        .set_location_markers(&ids, &Marker::Pending(day(2024, 2, 16)))
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let markers: Vec<_> = repo
        .list_locations()
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.marker)
        .collect();
    assert_eq!(
        markers,
        vec![
            Marker::Pending(day(2024, 2, 16)),
            Marker::Empty,
            Marker::Pending(day(2024, 2, 16)),
            Marker::Empty,
        ]
    );

    assert_eq!(repo.clear_location_markers().await.unwrap(), 2);
    assert_eq!(repo.clear_locations().await.unwrap(), 4);
    assert!(repo.list_locations().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insights_append_and_trim_oldest_week() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool.clone());

    let records = vec![
        sample_record("Store 1", day(2024, 2, 23)),
        sample_record("Store 2", day(2024, 2, 23)),
        sample_record("Store 1", day(2024, 3, 1)),
    ];
    assert_eq!(
        repo.commit_batch(&records, &[], &Marker::Empty)
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        repo.oldest_insight_week().await.unwrap(),
        Some(day(2024, 2, 23))
    );

    let phone: Option<i64> = sqlx::query_scalar(
        "SELECT actions_phone FROM insights WHERE start_week = $1 AND location_title = $2",
    )
    .bind(day(2024, 3, 1))
    .bind("Store 1")
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(phone, Some(Metric::ActionsPhone.index() as i64 * 10));

    assert_eq!(
        repo.delete_insights_for_week(day(2024, 2, 23)).await.unwrap(),
        2
    );
    assert_eq!(
        repo.oldest_insight_week().await.unwrap(),
        Some(day(2024, 3, 1))
    );

    assert_eq!(repo.clear_insights().await.unwrap(), 1);
    assert_eq!(repo.oldest_insight_week().await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_commit_batch_writes_rows_and_markers_together() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool);

    let new_locations: Vec<_> = (1..=2).map(|i| sample_location("accounts/1", i)).collect();
    repo.commit_listing(1, &new_locations, &Marker::Empty)
        .await
        .unwrap();
    let ids: Vec<i64> = repo
        .list_locations()
        .await
        .unwrap()
        .iter()
        .map(|l| l.id)
        .collect();

    let records = vec![
        sample_record("Store 1", day(2024, 2, 23)),
        sample_record("Store 2", day(2024, 2, 23)),
    ];
    let inserted = repo
        .commit_batch(&records, &ids, &Marker::Pending(day(2024, 3, 1)))
        .await
        .unwrap();

    assert_eq!(inserted, 2);
    assert!(
        repo.list_locations()
            .await
            .unwrap()
            .iter()
            .all(|l| l.marker == Marker::Pending(day(2024, 3, 1)))
    );
}

/// A failed marker update rolls back the insight rows of the same batch.
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_commit_batch_rolls_back_rows_when_marker_write_fails() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool.clone());

    repo.commit_listing(1, &[sample_location("accounts/1", 1)], &Marker::Empty)
        .await
        .unwrap();
    let id = repo.list_locations().await.unwrap()[0].id;
    sqlx::query(
        "ALTER TABLE locations ADD CONSTRAINT markers_frozen CHECK (insights_marker IS NULL)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = repo
        .commit_batch(
            &[sample_record("Store 1", day(2024, 2, 23))],
            &[id],
            &Marker::Pending(day(2024, 3, 1)),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(repo.stats().await.unwrap().insights, 0);
    assert_eq!(repo.list_locations().await.unwrap()[0].marker, Marker::Empty);
}

/// A failed listing marker update rolls back the listed locations.
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_commit_listing_rolls_back_locations_when_marker_write_fails() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool.clone());

    repo.replace_account_configs(&[NewAccountConfig {
        account_name: "Bakeries".to_string(),
        account_group: "accounts/1".to_string(),
        status_filter: None,
        region_filter: None,
    }])
    .await
    .unwrap();
    sqlx::query(
        "ALTER TABLE account_configs ADD CONSTRAINT listing_frozen CHECK (listing_marker IS NULL)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let new_locations: Vec<_> = (1..=3).map(|i| sample_location("accounts/1", i)).collect();
    let result = repo
        .commit_listing(1, &new_locations, &Marker::Caught(day(2024, 3, 8)))
        .await;

    assert!(result.is_err());
    assert!(repo.list_locations().await.unwrap().is_empty());
    assert_eq!(
        repo.list_account_configs().await.unwrap()[0].listing_marker,
        Marker::Empty
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_audit_log_trim_keeps_newest() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool);

    for i in 0..5 {
        repo.append_log(&format!("entry {}", i)).await.unwrap();
    }

    assert_eq!(repo.trim_log(3).await.unwrap(), 2);
    let logs = repo.recent_logs(10).await.unwrap();
    let messages: Vec<_> = logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(messages, vec!["entry 4", "entry 3", "entry 2"]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stats_counts_caught_locations() {
    let (pool, _container) = setup_test_db().await;
    let repo = HarvestRepository::new(pool);

    repo.replace_accounts(&[account(1, "Bakeries")]).await.unwrap();
    let new_locations: Vec<_> = (1..=3).map(|i| sample_location("accounts/1", i)).collect();
    repo.commit_listing(1, &new_locations, &Marker::Empty)
        .await
        .unwrap();
    let first = repo.list_locations().await.unwrap()[0].id;
    repo.set_location_markers(&[first], &Marker::Caught(day(2024, 3, 8)))
        .await
        .unwrap();
    repo.append_log("started").await.unwrap();

    let stats = repo.stats().await.unwrap();
    assert_eq!(stats.accounts, 1);
    assert_eq!(stats.account_configs, 0);
    assert_eq!(stats.locations, 3);
    assert_eq!(stats.caught_locations, 1);
    assert_eq!(stats.insights, 0);
    assert_eq!(stats.log_entries, 1);
}
