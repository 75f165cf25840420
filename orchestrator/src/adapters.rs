//! Data access adapters: sanitized arguments in, storage-key-free projections
//! out.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use tracing::warn;

use crate::errors::Result;
use crate::records::{
    Attachment, DateField, DateRange, ExactField, FlightRecord, RecordStore, SearchQuery,
    TextField,
};
use crate::registry::SEARCH_LIMIT_DEFAULT;
use crate::sanitize::SanitizedArgs;
use crate::serialize::decimal_string;
use crate::signer::UrlSigner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    #[serde(serialize_with = "decimal_string")]
    pub file_size: u64,
}

impl From<&Attachment> for AttachmentMeta {
    fn from(attachment: &Attachment) -> Self {
        Self {
            id: attachment.id.clone(),
            file_name: attachment.file_name.clone(),
            file_type: attachment.file_type.clone(),
            file_size: attachment.file_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentLink {
    #[serde(flatten)]
    pub meta: AttachmentMeta,
    pub url: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentListing {
    pub record_id: String,
    pub attachments: Vec<AttachmentLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecordProjection {
    pub id: String,
    pub flight_date: String,
    pub aircraft_registration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pilot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technician: Option<String>,
    pub status: String,
    pub has_defect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defect_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentMeta>>,
}

impl FlightRecordProjection {
    pub fn from_record(record: &FlightRecord, with_attachments: bool) -> Self {
        Self {
            id: record.id.clone(),
            flight_date: timestamp(record.flight_date),
            aircraft_registration: record.aircraft_registration.clone(),
            flight_number: record.flight_number.clone(),
            origin: record.origin.clone(),
            destination: record.destination.clone(),
            pilot: record.pilot.clone(),
            technician: record.technician.clone(),
            status: record.status.clone(),
            has_defect: record.has_defect,
            defect_description: record.defect_description.clone(),
            remarks: record.remarks.clone(),
            created_at: timestamp(record.created_at),
            updated_at: timestamp(record.updated_at),
            attachments: with_attachments
                .then(|| record.attachments.iter().map(AttachmentMeta::from).collect()),
        }
    }
}

pub async fn find_record(
    store: &dyn RecordStore,
    id: &str,
) -> Result<Option<FlightRecordProjection>> {
    let record = store.find_by_id(id).await?;
    Ok(record.map(|record| FlightRecordProjection::from_record(&record, true)))
}

pub async fn record_attachments(
    store: &dyn RecordStore,
    signer: &dyn UrlSigner,
    id: &str,
) -> Result<Option<AttachmentListing>> {
    let Some(record) = store.find_by_id(id).await? else {
        return Ok(None);
    };
    let mut attachments = Vec::with_capacity(record.attachments.len());
    for attachment in &record.attachments {
        let signed = signer.sign(&attachment.storage_key)?;
        attachments.push(AttachmentLink {
            meta: AttachmentMeta::from(attachment),
            url: signed.url,
            expires_at: timestamp(signed.expires_at),
        });
    }
    Ok(Some(AttachmentListing {
        record_id: record.id,
        attachments,
    }))
}

pub async fn recent_records(
    store: &dyn RecordStore,
    limit: usize,
) -> Result<Vec<FlightRecordProjection>> {
    let records = store.list_recent(limit).await?;
    Ok(records
        .iter()
        .take(limit)
        .map(|record| FlightRecordProjection::from_record(record, false))
        .collect())
}

pub async fn search_records(
    store: &dyn RecordStore,
    query: &SearchQuery,
) -> Result<Vec<FlightRecordProjection>> {
    let records = store.search(query).await?;
    Ok(records
        .iter()
        .take(query.limit)
        .map(|record| FlightRecordProjection::from_record(record, false))
        .collect())
}

/// Builds the conjunctive search predicate from whichever filters are present.
pub fn build_search_query(args: &SanitizedArgs) -> SearchQuery {
    let limit = args.int("limit").unwrap_or(SEARCH_LIMIT_DEFAULT).max(1) as usize;
    let mut query = SearchQuery::new(limit);
    for field in ExactField::ALL {
        if let Some(value) = args.str(field.argument()) {
            query.exact.push((field, value.to_string()));
        }
    }
    for field in TextField::ALL {
        if let Some(value) = args.str(field.argument()) {
            query.contains.push((field, value.to_string()));
        }
    }
    query.has_defect = args.bool("hasDefect");
    for (field, from, to) in [
        (DateField::FlightDate, "flightDateFrom", "flightDateTo"),
        (DateField::CreatedAt, "createdFrom", "createdTo"),
        (DateField::UpdatedAt, "updatedFrom", "updatedTo"),
    ] {
        let range = DateRange {
            from: args.str(from).and_then(|raw| date_bound(from, raw, Bound::Start)),
            to: args.str(to).and_then(|raw| date_bound(to, raw, Bound::EndOfDay)),
        };
        if !range.is_open() {
            query.dates.push((field, range));
        }
    }
    query
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Start,
    EndOfDay,
}

fn date_bound(argument: &str, raw: &str, bound: Bound) -> Option<DateTime<Utc>> {
    let parsed = parse_instant(raw, bound);
    if parsed.is_none() {
        warn!(argument, value = raw, "ignoring unparseable date filter");
    }
    parsed
}

fn parse_instant(raw: &str, bound: Bound) -> Option<DateTime<Utc>> {
    let (day, instant) = if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        (day, None)
    } else {
        let instant = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
        (instant.date_naive(), Some(instant))
    };
    match (bound, instant) {
        (Bound::Start, Some(instant)) => Some(instant),
        (Bound::Start, None) => {
            let start = NaiveTime::from_hms_opt(0, 0, 0)?;
            Some(Utc.from_utc_datetime(&day.and_time(start)))
        }
        (Bound::EndOfDay, _) => {
            let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?;
            Some(Utc.from_utc_datetime(&day.and_time(end)))
        }
    }
}

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;
    use crate::registry::{FunctionName, FunctionRegistry};
    use crate::sanitize::sanitize;
    use crate::signer::Sha256UrlSigner;
    use serde_json::json;
    use std::time::Duration;

    fn record(id: &str, day: u32, hour: u32) -> FlightRecord {
        let at = Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap();
        FlightRecord {
            id: id.to_string(),
            flight_date: at,
            aircraft_registration: "VH-XYZ".to_string(),
            flight_number: Some(format!("QF{day}")),
            origin: Some("SYD".to_string()),
            destination: None,
            pilot: None,
            technician: Some("Alex Rivera".to_string()),
            status: "open".to_string(),
            has_defect: day % 2 == 0,
            defect_description: None,
            remarks: Some(format!("routine check {id}")),
            created_at: at,
            updated_at: at,
            attachments: vec![Attachment {
                id: format!("{id}-att"),
                file_name: "techlog.pdf".to_string(),
                file_type: "application/pdf".to_string(),
                file_size: 2048,
                storage_key: format!("records/{id}/techlog.pdf"),
            }],
        }
    }

    fn search_args(raw: &str) -> SanitizedArgs {
        let registry = FunctionRegistry::new();
        sanitize(registry.get(FunctionName::SearchFlightRecords), raw).expect("sanitized")
    }

    #[test]
    fn projection_omits_storage_keys_and_absent_fields() {
        let projection = FlightRecordProjection::from_record(&record("FR-1", 3, 8), true);
        let value = serde_json::to_value(&projection).unwrap();
        assert_eq!(value["attachments"][0]["fileSize"], json!("2048"));
        assert!(value.get("destination").is_none());
        assert!(!value.to_string().contains("records/FR-1"));

        let listing = FlightRecordProjection::from_record(&record("FR-1", 3, 8), false);
        assert!(serde_json::to_value(&listing).unwrap().get("attachments").is_none());
    }

    #[test]
    fn same_day_upper_bound_includes_that_day() {
        let query = build_search_query(&search_args(
            r#"{"flightDateFrom": "2024-06-03", "flightDateTo": "2024-06-03"}"#,
        ));
        assert!(query.matches(&record("late", 3, 23)));
        assert!(query.matches(&record("early", 3, 0)));
        assert!(!query.matches(&record("next", 4, 0)));
    }

    #[test]
    fn rfc3339_upper_bound_is_advanced_to_end_of_day() {
        let query = build_search_query(&search_args(
            r#"{"updatedTo": "2024-06-03T01:00:00Z", "createdFrom": "2024-06-03T05:00:00Z"}"#,
        ));
        assert!(query.matches(&record("a", 3, 22)));
        assert!(!query.matches(&record("b", 3, 4)));
    }

    #[test]
    fn unparseable_dates_impose_no_constraint() {
        let query = build_search_query(&search_args(r#"{"flightDateFrom": "last tuesday"}"#));
        assert!(query.dates.is_empty());
        assert_eq!(query.limit, SEARCH_LIMIT_DEFAULT as usize);
    }

    #[test]
    fn filters_keep_equality_and_containment_apart() {
        let query = build_search_query(&search_args(
            r#"{"flightNumber": "qf3", "technician": "rivera", "hasDefect": false}"#,
        ));
        assert_eq!(query.exact, vec![(ExactField::FlightNumber, "qf3".to_string())]);
        assert_eq!(query.contains, vec![(TextField::Technician, "rivera".to_string())]);
        assert!(query.matches(&record("FR-3", 3, 9)));
        assert!(!query.matches(&record("FR-13", 13, 9)));
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_capped() {
        let store = MemoryRecordStore::new(vec![
            record("FR-1", 1, 8),
            record("FR-3", 3, 8),
            record("FR-2", 2, 8),
        ]);
        let projections = recent_records(&store, 2).await.unwrap();
        let ids: Vec<_> = projections.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["FR-3", "FR-2"]);
    }

    #[tokio::test]
    async fn attachment_listing_resolves_urls_and_handles_missing_records() {
        let store = MemoryRecordStore::new(vec![record("FR-1", 1, 8)]);
        let signer = Sha256UrlSigner::new("https://files.example", "k", Duration::from_secs(60));
        let listing = record_attachments(&store, &signer, "FR-1")
            .await
            .unwrap()
            .expect("record exists");
        assert_eq!(listing.attachments.len(), 1);
        assert!(listing.attachments[0]
            .url
            .starts_with("https://files.example/records/FR-1/techlog.pdf?"));

        assert!(record_attachments(&store, &signer, "missing")
            .await
            .unwrap()
            .is_none());
        assert!(find_record(&store, "missing").await.unwrap().is_none());
    }
}
