use chrono::{TimeZone, Utc};
use healthsync_types::{NormalizedRecord, QueryHandleEvent, RECORD_SOURCE};
use pretty_assertions::assert_eq;

#[test]
fn record_source_is_constant() {
    let t = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let record = NormalizedRecord::new("pulse", t, "72.0");
    assert_eq!(record.source, RECORD_SOURCE);
    assert_eq!(record.source, "health");
}

#[test]
fn record_wire_format() {
    let t = Utc.with_ymd_and_hms(2024, 1, 30, 0, 0, 0).unwrap();
    let record = NormalizedRecord::new("steps", t, "120.0");
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "category_name": "steps",
            "source": "health",
            "time": 1706572800,
            "value": "120.0"
        })
    );
}

#[test]
fn record_time_truncates_subsecond() {
    let t = Utc.timestamp_opt(1706572800, 750_000_000).unwrap();
    let record = NormalizedRecord::new("steps", t, "1");
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["time"], 1706572800);
}

#[test]
fn record_array_serializes_in_order() {
    let t = Utc.with_ymd_and_hms(2024, 1, 30, 0, 0, 0).unwrap();
    let records = vec![
        NormalizedRecord::new("a", t, "1"),
        NormalizedRecord::new("b", t, "2"),
    ];
    let json = serde_json::to_value(&records).unwrap();
    assert_eq!(json[0]["category_name"], "a");
    assert_eq!(json[1]["category_name"], "b");
}

#[test]
fn query_handle_event_wire_format() {
    let event = QueryHandleEvent::new("HKQuantityTypeIdentifierStepCount", 4);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "category_name": "HKQuantityTypeIdentifierStepCount",
            "values_count": 4
        })
    );
}
