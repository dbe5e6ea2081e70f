mod common;

use std::env;

use zipscore_api::db::Database;
use zipscore_api::db_storage::ZipDataStorage;
use zipscore_api::store::MetricStore;

/// Integration smoke test for the Postgres ZIP store.
/// Marked ignored because it replaces the whole zip_data table; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn replace_and_query_zip_data_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    db.ensure_schema().await?;
    let storage = ZipDataStorage::new(db.pool.clone());

    let records = common::sample_records();
    let inserted = storage
        .replace_all(&records)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(inserted, records.len() as u64);

    let ma = storage
        .get_state_data("MA")
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let zips: Vec<&str> = ma.iter().map(|r| r.zip_code.as_str()).collect();
    assert_eq!(zips, vec!["02134", "02135", "02130", "01001"]);
    assert!(ma.iter().all(|r| r.price_to_rent.is_some()));

    let missing = storage
        .get_zip_info("99999")
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(missing.is_none());

    let all = storage
        .get_zip_data()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(all.len(), records.len());
    Ok(())
}
