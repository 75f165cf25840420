use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator::errors::{OrchestratorError, Result};
use orchestrator::records::{Attachment, FlightRecord, RecordStore, SearchQuery};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

const RECORD_COLUMNS: &str = "id, flight_date, aircraft_registration, flight_number, origin, destination, \
     pilot, technician, status, has_defect, defect_description, remarks, created_at, updated_at";

/// Flight records backed by the `flight_records` and
/// `flight_record_attachments` tables.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attachments_for(&self, record_id: &str) -> Result<Vec<Attachment>> {
        let rows = sqlx::query(
            "SELECT id, file_name, file_type, file_size, storage_key FROM flight_record_attachments \
             WHERE record_id = $1 ORDER BY created_at, id",
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(attachment_from_row).collect()
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<FlightRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM flight_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut record = record_from_row(&row)?;
        record.attachments = self.attachments_for(&record.id).await?;
        Ok(Some(record))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<FlightRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM flight_records ORDER BY flight_date DESC, id ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightRecord>> {
        let mut builder = search_statement(query);
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.iter().map(record_from_row).collect()
    }
}

fn search_statement(query: &SearchQuery) -> QueryBuilder<'_, Postgres> {
    let mut builder =
        QueryBuilder::new(format!("SELECT {RECORD_COLUMNS} FROM flight_records WHERE TRUE"));
    for (field, value) in &query.exact {
        builder
            .push(format!(" AND LOWER({}) = LOWER(", field.column()))
            .push_bind(value.as_str())
            .push(")");
    }
    for (field, value) in &query.contains {
        builder
            .push(format!(" AND {} ILIKE '%' || ", field.column()))
            .push_bind(escape_like(value))
            .push(" || '%'");
    }
    if let Some(has_defect) = query.has_defect {
        builder.push(" AND has_defect = ").push_bind(has_defect);
    }
    for (field, range) in &query.dates {
        if let Some(from) = range.from {
            builder
                .push(format!(" AND {} >= ", field.column()))
                .push_bind(from);
        }
        if let Some(to) = range.to {
            builder
                .push(format!(" AND {} <= ", field.column()))
                .push_bind(to);
        }
    }
    builder
        .push(" ORDER BY flight_date DESC, id ASC LIMIT ")
        .push_bind(query.limit as i64);
    builder
}

/// Treats `%` and `_` in user text literally.
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn record_from_row(row: &PgRow) -> Result<FlightRecord> {
    Ok(FlightRecord {
        id: row.try_get("id").map_err(store_error)?,
        flight_date: row
            .try_get::<DateTime<Utc>, _>("flight_date")
            .map_err(store_error)?,
        aircraft_registration: row.try_get("aircraft_registration").map_err(store_error)?,
        flight_number: row.try_get("flight_number").map_err(store_error)?,
        origin: row.try_get("origin").map_err(store_error)?,
        destination: row.try_get("destination").map_err(store_error)?,
        pilot: row.try_get("pilot").map_err(store_error)?,
        technician: row.try_get("technician").map_err(store_error)?,
        status: row.try_get("status").map_err(store_error)?,
        has_defect: row.try_get("has_defect").map_err(store_error)?,
        defect_description: row.try_get("defect_description").map_err(store_error)?,
        remarks: row.try_get("remarks").map_err(store_error)?,
        created_at: row.try_get("created_at").map_err(store_error)?,
        updated_at: row.try_get("updated_at").map_err(store_error)?,
        attachments: Vec::new(),
    })
}

fn attachment_from_row(row: &PgRow) -> Result<Attachment> {
    let size: i64 = row.try_get("file_size").map_err(store_error)?;
    let file_size = attachment_size(size)?;
    Ok(Attachment {
        id: row.try_get("id").map_err(store_error)?,
        file_name: row.try_get("file_name").map_err(store_error)?,
        file_type: row.try_get("file_type").map_err(store_error)?,
        file_size,
        storage_key: row.try_get("storage_key").map_err(store_error)?,
    })
}

fn attachment_size(size: i64) -> Result<u64> {
    u64::try_from(size)
        .map_err(|_| OrchestratorError::Store(format!("attachment has negative file_size {size}")))
}

fn store_error(err: sqlx::Error) -> OrchestratorError {
    OrchestratorError::Store(err.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub display_name: Option<String>,
}

/// Looks up the authenticated user behind a session.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: i32) -> anyhow::Result<Option<UserProfile>>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, id: i32) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, username, display_name FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| UserProfile {
            id: row.get("id"),
            username: row.get("username"),
            display_name: row.get("display_name"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use orchestrator::records::{DateField, DateRange, ExactField, TextField};

    #[test]
    fn search_statement_binds_every_filter() {
        let mut query = SearchQuery::new(10);
        query
            .exact
            .push((ExactField::AircraftRegistration, "VH-OQA".to_string()));
        query.contains.push((TextField::Remarks, "50%_off".to_string()));
        query.has_defect = Some(true);
        query.dates.push((
            DateField::FlightDate,
            DateRange {
                from: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
                to: None,
            },
        ));
        let builder = search_statement(&query);
        let sql = builder.sql();
        assert!(sql.contains("LOWER(aircraft_registration) = LOWER($1)"));
        assert!(sql.contains("remarks ILIKE '%' || $2 || '%'"));
        assert!(sql.contains("has_defect = $3"));
        assert!(sql.contains("flight_date >= $4"));
        assert!(sql.ends_with("ORDER BY flight_date DESC, id ASC LIMIT $5"));
    }

    #[test]
    fn negative_attachment_size_is_a_store_error() {
        assert_eq!(attachment_size(2048).unwrap(), 2048);
        assert!(matches!(
            attachment_size(-1),
            Err(OrchestratorError::Store(message)) if message.contains("-1")
        ));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }
}
