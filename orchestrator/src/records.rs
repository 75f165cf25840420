use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;

/// A stored file attached to a flight record. `storage_key` never leaves the
/// process except through a signed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightRecord {
    pub id: String,
    pub flight_date: DateTime<Utc>,
    pub aircraft_registration: String,
    pub flight_number: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub pilot: Option<String>,
    pub technician: Option<String>,
    pub status: String,
    pub has_defect: bool,
    pub defect_description: Option<String>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
}

/// Read-only access to the flight-record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<FlightRecord>>;

    /// Newest flight date first, at most `limit` records.
    async fn list_recent(&self, limit: usize) -> Result<Vec<FlightRecord>>;

    /// Records matching every predicate of `query`, newest flight date first.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightRecord>>;
}

/// Identifier-like fields, matched by case-insensitive equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExactField {
    AircraftRegistration,
    FlightNumber,
    Origin,
    Destination,
    Status,
}

impl ExactField {
    pub const ALL: [ExactField; 5] = [
        ExactField::AircraftRegistration,
        ExactField::FlightNumber,
        ExactField::Origin,
        ExactField::Destination,
        ExactField::Status,
    ];

    pub fn argument(self) -> &'static str {
        match self {
            ExactField::AircraftRegistration => "aircraftRegistration",
            ExactField::FlightNumber => "flightNumber",
            ExactField::Origin => "origin",
            ExactField::Destination => "destination",
            ExactField::Status => "status",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            ExactField::AircraftRegistration => "aircraft_registration",
            ExactField::FlightNumber => "flight_number",
            ExactField::Origin => "origin",
            ExactField::Destination => "destination",
            ExactField::Status => "status",
        }
    }

    pub fn value_of(self, record: &FlightRecord) -> Option<&str> {
        match self {
            ExactField::AircraftRegistration => Some(record.aircraft_registration.as_str()),
            ExactField::FlightNumber => record.flight_number.as_deref(),
            ExactField::Origin => record.origin.as_deref(),
            ExactField::Destination => record.destination.as_deref(),
            ExactField::Status => Some(record.status.as_str()),
        }
    }
}

/// Free-text fields, matched by case-insensitive substring containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Pilot,
    Technician,
    DefectDescription,
    Remarks,
}

impl TextField {
    pub const ALL: [TextField; 4] = [
        TextField::Pilot,
        TextField::Technician,
        TextField::DefectDescription,
        TextField::Remarks,
    ];

    pub fn argument(self) -> &'static str {
        match self {
            TextField::Pilot => "pilot",
            TextField::Technician => "technician",
            TextField::DefectDescription => "defectDescription",
            TextField::Remarks => "remarks",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            TextField::Pilot => "pilot",
            TextField::Technician => "technician",
            TextField::DefectDescription => "defect_description",
            TextField::Remarks => "remarks",
        }
    }

    pub fn value_of(self, record: &FlightRecord) -> Option<&str> {
        match self {
            TextField::Pilot => record.pilot.as_deref(),
            TextField::Technician => record.technician.as_deref(),
            TextField::DefectDescription => record.defect_description.as_deref(),
            TextField::Remarks => record.remarks.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    FlightDate,
    CreatedAt,
    UpdatedAt,
}

impl DateField {
    pub fn column(self) -> &'static str {
        match self {
            DateField::FlightDate => "flight_date",
            DateField::CreatedAt => "created_at",
            DateField::UpdatedAt => "updated_at",
        }
    }

    pub fn value_of(self, record: &FlightRecord) -> DateTime<Utc> {
        match self {
            DateField::FlightDate => record.flight_date,
            DateField::CreatedAt => record.created_at,
            DateField::UpdatedAt => record.updated_at,
        }
    }
}

/// Inclusive instant range; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| instant >= from) && self.to.map_or(true, |to| instant <= to)
    }
}

/// Conjunctive predicate over flight records. Empty parts impose no constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub exact: Vec<(ExactField, String)>,
    pub contains: Vec<(TextField, String)>,
    pub has_defect: Option<bool>,
    pub dates: Vec<(DateField, DateRange)>,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            exact: Vec::new(),
            contains: Vec::new(),
            has_defect: None,
            dates: Vec::new(),
            limit,
        }
    }

    pub fn matches(&self, record: &FlightRecord) -> bool {
        let exact = self.exact.iter().all(|(field, expected)| {
            field
                .value_of(record)
                .map_or(false, |actual| actual.to_lowercase() == expected.to_lowercase())
        });
        let contains = self.contains.iter().all(|(field, needle)| {
            field.value_of(record).map_or(false, |haystack| {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            })
        });
        let defect = self
            .has_defect
            .map_or(true, |expected| record.has_defect == expected);
        let dates = self
            .dates
            .iter()
            .all(|(field, range)| range.contains(field.value_of(record)));
        exact && contains && defect && dates
    }
}

/// Newest flight date first, ties broken by id so listings are stable.
pub fn newest_first(left: &FlightRecord, right: &FlightRecord) -> Ordering {
    right
        .flight_date
        .cmp(&left.flight_date)
        .then_with(|| left.id.cmp(&right.id))
}
