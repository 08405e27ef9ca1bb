use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::client::ProviderError;

/// A catalog snapshot: the provider's currently reservable slots, already
/// parsed into typed records. The core never sees the provider's loose
/// JSON.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub provider_id: String,
    pub date: NaiveDate,
    pub sitting: String,
    pub description: String,
    pub price: Option<f64>,
}

/// Wire shape of the weekly program feed. The portal nests one list of
/// program entries per day of the week.
#[derive(Debug, Deserialize)]
pub(crate) struct ProgramFeed {
    pub payload: Option<FeedPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedPayload {
    #[serde(rename = "selfWeekPrograms", default)]
    pub self_week_programs: Vec<Vec<ProgramEntry>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProgramEntry {
    #[serde(rename = "programId")]
    pub program_id: Option<i64>,
    pub date: Option<String>,
    #[serde(rename = "foodName")]
    pub food_name: Option<String>,
    #[serde(rename = "mealTypeName")]
    pub meal_type_name: Option<String>,
    pub price: Option<f64>,
}

/// Parses one weekly feed into catalog entries. The first program of each
/// day is the sitting on offer; entries with missing fields are skipped
/// with a warning, entries dated before `today` are dropped (their slots
/// then fall out of the catalog and are retired by reconciliation).
/// A feed without a payload is malformed, not empty.
pub(crate) fn parse_feed(
    feed: serde_json::Value,
    today: NaiveDate,
) -> Result<Vec<CatalogEntry>, ProviderError> {
    let feed: ProgramFeed = serde_json::from_value(feed)
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let payload = feed
        .payload
        .ok_or_else(|| ProviderError::Malformed("missing payload".to_string()))?;

    let mut entries = Vec::new();
    for day_programs in payload.self_week_programs {
        let Some(program) = day_programs.into_iter().next() else {
            continue;
        };
        let (Some(program_id), Some(date), Some(food_name)) =
            (program.program_id, program.date.as_deref(), program.food_name)
        else {
            warn!("skipping program entry with missing fields");
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
            warn!(date, program_id, "skipping program entry with unparseable date");
            continue;
        };
        if date < today {
            continue;
        }
        entries.push(CatalogEntry {
            provider_id: program_id.to_string(),
            date,
            sitting: program
                .meal_type_name
                .unwrap_or_else(|| "lunch".to_string()),
            description: food_name,
            price: program.price,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_well_formed_feed() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let feed = json!({
            "payload": {
                "selfWeekPrograms": [
                    [{"programId": 101, "date": "2026-08-01", "foodName": "stew", "price": 12.5}],
                    [{"programId": 102, "date": "2026-08-02", "foodName": "rice", "mealTypeName": "dinner", "price": 9.0}],
                ]
            }
        });

        let entries = parse_feed(feed, today).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].provider_id, "101");
        assert_eq!(entries[0].sitting, "lunch");
        assert_eq!(entries[1].sitting, "dinner");
        assert_eq!(entries[1].price, Some(9.0));
    }

    #[test]
    fn skips_malformed_entries_and_past_dates() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let feed = json!({
            "payload": {
                "selfWeekPrograms": [
                    [],
                    [{"programId": 201, "date": "2026-08-01", "foodName": "old"}],
                    [{"date": "2026-08-04", "foodName": "no id"}],
                    [{"programId": 203, "date": "not-a-date", "foodName": "bad date"}],
                    [{"programId": 204, "date": "2026-08-04", "foodName": "kept"}],
                ]
            }
        });

        let entries = parse_feed(feed, today).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].provider_id, "204");
    }

    #[test]
    fn missing_payload_is_malformed() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let err = parse_feed(json!({"status": "ok"}), today).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
