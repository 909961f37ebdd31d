use chrono::{DateTime, TimeZone, Utc};
use groundstation::codec::{TelemetryPayload, TelemetryReading};
use groundstation::store::*;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn reading(secs: i64, temperature: f32, battery: f32) -> TelemetryReading {
    TelemetryReading::new(
        at(secs),
        TelemetryPayload {
            temperature,
            battery,
            altitude: 500.0,
            signal: -50.0,
        },
    )
}

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    // Inserted out of timestamp order on purpose
    for r in [
        reading(300, 25.0, 80.0),
        reading(100, 20.0, 90.0),
        reading(500, 36.0, 70.0),
        reading(200, 30.0, 30.0),
        reading(400, 22.0, 60.0),
    ] {
        store.insert(&r).await.unwrap();
    }
    store
}

fn seconds(readings: &[TelemetryReading]) -> Vec<i64> {
    readings.iter().map(|r| r.timestamp().timestamp()).collect()
}

#[test]
fn test_time_range_rejects_inverted_bounds() {
    assert!(matches!(
        TimeRange::new(at(10), at(5)),
        Err(StoreError::InvalidRange { .. })
    ));

    let range = TimeRange::new(at(5), at(10)).unwrap();
    assert!(range.contains(at(5)));
    assert!(range.contains(at(10)));
    assert!(!range.contains(at(11)));
}

#[tokio::test]
async fn test_query_is_inclusive_and_ascending() {
    let store = seeded_store().await;
    let range = TimeRange::new(at(200), at(400)).unwrap();

    let readings = store.query(range).await.unwrap();
    assert_eq!(seconds(&readings), vec![200, 300, 400]);
}

#[tokio::test]
async fn test_query_anomalies_only_returns_flagged() {
    let store = seeded_store().await;
    let range = TimeRange::new(at(0), at(1_000)).unwrap();

    let anomalies = store.query_anomalies(range).await.unwrap();
    assert_eq!(seconds(&anomalies), vec![200, 500]);
    assert!(anomalies.iter().all(TelemetryReading::is_anomaly));
}

#[tokio::test]
async fn test_aggregate_over_window() {
    let store = seeded_store().await;
    let range = TimeRange::new(at(100), at(300)).unwrap();

    let stats = store.aggregate(range).await.unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.temperature.min, 20.0);
    assert_eq!(stats.temperature.max, 30.0);
    assert!((stats.temperature.avg - 25.0).abs() < 1e-4);
    assert_eq!(stats.battery.min, 30.0);
    assert_eq!(stats.battery.max, 90.0);
    assert_eq!(stats.altitude.avg, 500.0);
}

#[tokio::test]
async fn test_aggregate_of_empty_window_is_zero() {
    let store = seeded_store().await;
    let range = TimeRange::new(at(10_000), at(20_000)).unwrap();

    assert_eq!(store.aggregate(range).await.unwrap(), AggregatedTelemetry::default());
}

#[tokio::test]
async fn test_latest_and_recent() {
    let store = seeded_store().await;

    let latest = store.latest().await.unwrap().unwrap();
    assert_eq!(latest.timestamp(), at(500));

    let recent = store.recent(3).await.unwrap();
    assert_eq!(seconds(&recent), vec![500, 400, 300]);

    assert_eq!(store.recent(100).await.unwrap().len(), 5);
    assert!(MemoryStore::new().latest().await.unwrap().is_none());
}

#[tokio::test]
async fn test_pagination_newest_first() {
    let store = seeded_store().await;

    let first = store.paginated(PageRequest::new(1, 2), ReadingFilter::default()).await.unwrap();
    assert_eq!(seconds(&first.data), vec![500, 400]);
    assert_eq!(first.total, 5);
    assert_eq!(first.total_pages, 3);

    let last = store.paginated(PageRequest::new(3, 2), ReadingFilter::default()).await.unwrap();
    assert_eq!(seconds(&last.data), vec![100]);
    assert_eq!(last.page, 3);

    let beyond = store.paginated(PageRequest::new(4, 2), ReadingFilter::default()).await.unwrap();
    assert!(beyond.data.is_empty());
    assert_eq!(beyond.total, 5);
}

#[tokio::test]
async fn test_pagination_filters() {
    let store = seeded_store().await;

    let filter = ReadingFilter {
        anomaly: Some(false),
        start: Some(at(150)),
        end: None,
    };
    let page = store.paginated(PageRequest::new(1, 10), filter).await.unwrap();
    assert_eq!(seconds(&page.data), vec![400, 300]);
    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 1);
}

#[tokio::test]
async fn test_pagination_rejects_zero_page_or_limit() {
    let store = seeded_store().await;

    for request in [PageRequest::new(0, 10), PageRequest::new(1, 0)] {
        let result = store.paginated(request, ReadingFilter::default()).await;
        assert!(matches!(result, Err(StoreError::InvalidPage { .. })));
    }
}

#[tokio::test]
async fn test_retention_evicts_oldest_inserted() {
    let store = MemoryStore::with_retention(Some(2));
    for secs in [10, 20, 30] {
        store.insert(&reading(secs, 25.0, 80.0)).await.unwrap();
    }

    assert_eq!(store.len().await, 2);
    let range = TimeRange::new(at(0), at(100)).unwrap();
    assert_eq!(seconds(&store.query(range).await.unwrap()), vec![20, 30]);
}

#[tokio::test]
async fn test_zero_retention_keeps_everything() {
    let store = MemoryStore::with_retention(Some(0));
    for secs in [10, 20, 30] {
        store.insert(&reading(secs, 25.0, 80.0)).await.unwrap();
    }

    assert_eq!(store.len().await, 3);
    assert_eq!(store.latest().await.unwrap().unwrap().timestamp(), at(30));
}
