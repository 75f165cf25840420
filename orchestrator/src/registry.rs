use std::fmt::{Display, Formatter};

use serde_json::{json, Map, Value};

use crate::sanitize::ArgValue;

pub const RECENT_LIMIT_MIN: i64 = 1;
pub const RECENT_LIMIT_MAX: i64 = 20;
pub const RECENT_LIMIT_DEFAULT: i64 = 5;
pub const SEARCH_LIMIT_MIN: i64 = 1;
pub const SEARCH_LIMIT_MAX: i64 = 100;
pub const SEARCH_LIMIT_DEFAULT: i64 = 20;

/// The closed vocabulary of functions the model may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionName {
    GetFlightRecordById,
    GetFlightRecordAttachments,
    ListRecentFlightRecords,
    SearchFlightRecords,
}

impl FunctionName {
    pub const ALL: [FunctionName; 4] = [
        FunctionName::GetFlightRecordById,
        FunctionName::GetFlightRecordAttachments,
        FunctionName::ListRecentFlightRecords,
        FunctionName::SearchFlightRecords,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "get_flight_record_by_id" => Some(FunctionName::GetFlightRecordById),
            "get_flight_record_attachments" => Some(FunctionName::GetFlightRecordAttachments),
            "list_recent_flight_records" => Some(FunctionName::ListRecentFlightRecords),
            "search_flight_records" => Some(FunctionName::SearchFlightRecords),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FunctionName::GetFlightRecordById => "get_flight_record_by_id",
            FunctionName::GetFlightRecordAttachments => "get_flight_record_attachments",
            FunctionName::ListRecentFlightRecords => "list_recent_flight_records",
            FunctionName::SearchFlightRecords => "search_flight_records",
        }
    }
}

impl Display for FunctionName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer { min: i64, max: i64 },
    Boolean,
}

impl ParamKind {
    fn type_name(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer { .. } => "integer",
            ParamKind::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<ArgValue>,
}

impl ParameterSpec {
    fn required(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
            default: None,
        }
    }

    fn optional(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
            default: None,
        }
    }

    fn limit(min: i64, max: i64, default: i64, description: &'static str) -> Self {
        Self {
            name: "limit",
            description,
            kind: ParamKind::Integer { min, max },
            required: false,
            default: Some(ArgValue::Int(default)),
        }
    }

    fn schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.kind.type_name()));
        schema.insert("description".to_string(), json!(self.description));
        if let ParamKind::Integer { min, max } = self.kind {
            schema.insert("minimum".to_string(), json!(min));
            schema.insert("maximum".to_string(), json!(max));
        }
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.to_json());
        }
        Value::Object(schema)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: FunctionName,
    pub description: &'static str,
    pub parameters: Vec<ParameterSpec>,
}

impl FunctionSpec {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Tool definition in the chat-completions `tools` format.
    pub fn to_tool_definition(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|param| (param.name.to_string(), param.schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
            .collect();
        json!({
            "type": "function",
            "function": {
                "name": self.name.as_str(),
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                },
            },
        })
    }
}

/// Static catalog of callable functions, built once at start-up.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    specs: Vec<FunctionSpec>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let specs = FunctionName::ALL.iter().map(|name| build_spec(*name)).collect();
        Self { specs }
    }

    pub fn list(&self) -> &[FunctionSpec] {
        &self.specs
    }

    pub fn get(&self, name: FunctionName) -> &FunctionSpec {
        // `specs` is built in `FunctionName::ALL` order, which matches declaration order
        &self.specs[name as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<&FunctionSpec> {
        FunctionName::parse(name).map(|name| self.get(name))
    }

    pub fn tool_definitions(&self) -> Vec<Value> {
        self.specs.iter().map(FunctionSpec::to_tool_definition).collect()
    }
}

fn build_spec(name: FunctionName) -> FunctionSpec {
    match name {
        FunctionName::GetFlightRecordById => FunctionSpec {
            name,
            description: "Fetch a single flight record by its identifier, including attachment metadata. Returns null when no record matches.",
            parameters: vec![ParameterSpec::required(
                "id",
                "Flight record identifier",
                ParamKind::String,
            )],
        },
        FunctionName::GetFlightRecordAttachments => FunctionSpec {
            name,
            description: "List the attachments of a flight record together with temporary download URLs.",
            parameters: vec![ParameterSpec::required(
                "id",
                "Flight record identifier",
                ParamKind::String,
            )],
        },
        FunctionName::ListRecentFlightRecords => FunctionSpec {
            name,
            description: "List the most recent flight records, newest flight date first.",
            parameters: vec![ParameterSpec::limit(
                RECENT_LIMIT_MIN,
                RECENT_LIMIT_MAX,
                RECENT_LIMIT_DEFAULT,
                "Number of records to return",
            )],
        },
        FunctionName::SearchFlightRecords => FunctionSpec {
            name,
            description: "Search flight records by any combination of fields. Identifier fields match exactly (case-insensitive), free-text fields match on substrings, and date ranges are inclusive.",
            parameters: vec![
                ParameterSpec::optional(
                    "aircraftRegistration",
                    "Aircraft registration, exact match",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "flightNumber",
                    "Flight number, exact match",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "origin",
                    "Departure station code, exact match",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "destination",
                    "Arrival station code, exact match",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "status",
                    "Record status, exact match",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "pilot",
                    "Pilot name, partial match",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "technician",
                    "Technician name, partial match",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "defectDescription",
                    "Text contained in the defect description",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "remarks",
                    "Text contained in the remarks",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "hasDefect",
                    "Whether a defect was reported",
                    ParamKind::Boolean,
                ),
                ParameterSpec::optional(
                    "flightDateFrom",
                    "Earliest flight date (YYYY-MM-DD), inclusive",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "flightDateTo",
                    "Latest flight date (YYYY-MM-DD), inclusive",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "createdFrom",
                    "Earliest creation date (YYYY-MM-DD), inclusive",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "createdTo",
                    "Latest creation date (YYYY-MM-DD), inclusive",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "updatedFrom",
                    "Earliest update date (YYYY-MM-DD), inclusive",
                    ParamKind::String,
                ),
                ParameterSpec::optional(
                    "updatedTo",
                    "Latest update date (YYYY-MM-DD), inclusive",
                    ParamKind::String,
                ),
                ParameterSpec::limit(
                    SEARCH_LIMIT_MIN,
                    SEARCH_LIMIT_MAX,
                    SEARCH_LIMIT_DEFAULT,
                    "Maximum number of records to return",
                ),
            ],
        },
    }
}
