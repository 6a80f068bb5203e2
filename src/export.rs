use crate::record::{clock_format, SessionRecord};
use crate::scoring::VariantId;
use crate::store::{SessionStore, StoreError};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One participant's results bundled for sharing with a clinician.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub username: String,
    #[serde(with = "clock_format")]
    pub export_date: DateTime<Local>,
    pub tests: Vec<SessionRecord>,
}

/// Gather the latest record of every completed variant, in battery order.
/// Variants the participant has not finished are simply absent.
pub fn export_all(store: &impl SessionStore, username: &str) -> Result<ExportDocument, StoreError> {
    let mut tests = Vec::new();
    for variant in VariantId::ALL {
        if let Some(record) = store.latest(username, variant)? {
            tests.push(record);
        }
    }
    Ok(ExportDocument {
        username: username.to_string(),
        export_date: Local::now(),
        tests,
    })
}

/// Serialize the document in the export interchange shape.
pub fn to_json(doc: &ExportDocument) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Metrics;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn sample(variant: VariantId, total_presses: u64) -> SessionRecord {
        SessionRecord {
            variant,
            username: "ana".to_string(),
            started_at: Local.with_ymd_and_hms(2024, 5, 1, 14, 3, 22).unwrap(),
            total_time_ms: 15_000,
            target_text: None,
            final_text: String::new(),
            metrics: Metrics {
                total_presses,
                correct_presses: total_presses,
                ..Metrics::default()
            },
            events: vec![],
            expected_times: None,
        }
    }

    #[test]
    fn exports_only_finished_variants_in_battery_order() {
        let mut store = MemoryStore::new();
        store.record_session(&sample(VariantId::Rhythm, 9)).unwrap();
        store.record_session(&sample(VariantId::FreeCount, 3)).unwrap();

        let doc = export_all(&store, "ana").unwrap();
        assert_eq!(doc.username, "ana");
        assert_eq!(doc.tests.len(), 2);
        assert_eq!(doc.tests[0].variant, VariantId::FreeCount);
        assert_eq!(doc.tests[1].variant, VariantId::Rhythm);
    }

    #[test]
    fn export_picks_the_latest_repeat() {
        let mut store = MemoryStore::new();
        store.record_session(&sample(VariantId::FreeCount, 3)).unwrap();
        store.record_session(&sample(VariantId::FreeCount, 8)).unwrap();

        let doc = export_all(&store, "ana").unwrap();
        assert_eq!(doc.tests.len(), 1);
        assert_eq!(doc.tests[0].metrics.total_presses, 8);
    }

    #[test]
    fn empty_store_yields_an_empty_document() {
        let store = MemoryStore::new();
        let doc = export_all(&store, "ana").unwrap();
        assert!(doc.tests.is_empty());
    }

    #[test]
    fn document_serializes_with_interchange_field_names() {
        let doc = ExportDocument {
            username: "ana".to_string(),
            export_date: Local.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap(),
            tests: vec![sample(VariantId::FreeCount, 3)],
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["export_date"], "2024-05-02 09:00:00");
        assert_eq!(json["tests"][0]["test_name"], "free_count");
    }
}
