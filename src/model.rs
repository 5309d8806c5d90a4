use crate::classify::StatusClassifier;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Bridges,
    Vms,
}

/// Everything that differs between the bridge and VM widgets.
#[derive(Debug)]
pub struct VariantProfile {
    pub css_prefix: &'static str,
    pub entity_key: &'static str,
    pub count_key: &'static str,
    pub plural_noun: &'static str,
    pub classifier: StatusClassifier,
    pub absent_placeholder: &'static str,
    pub empty_placeholder: &'static str,
    pub retrieve_failure: &'static str,
    pub parse_failure: &'static str,
    pub default_command: &'static [&'static str],
}

static BRIDGES: VariantProfile = VariantProfile {
    css_prefix: "bridge",
    entity_key: "bridges",
    count_key: "bridge_count",
    plural_noun: "bridges",
    classifier: StatusClassifier::new("up", "down"),
    absent_placeholder: "No bridges found",
    empty_placeholder: "No bridges found on this system",
    retrieve_failure: "Failed to retrieve bridge data",
    parse_failure: "Failed to parse bridge data",
    default_command: &[
        "/usr/bin/python3",
        "/usr/local/bin/bridge_monitor.py",
        "--json",
    ],
};

static VMS: VariantProfile = VariantProfile {
    css_prefix: "vm",
    entity_key: "vms",
    count_key: "vm_count",
    plural_noun: "VMs",
    classifier: StatusClassifier::new("running", "stopped"),
    absent_placeholder: "No Nexus 9000v VMs found",
    empty_placeholder: "No Nexus 9000v VMs are currently running",
    retrieve_failure: "Failed to retrieve VM data",
    parse_failure: "Failed to parse monitoring data",
    default_command: &[
        "/usr/bin/python3",
        "/usr/local/bin/nexus9000v_monitor.py",
        "--json",
    ],
};

impl Variant {
    pub fn profile(self) -> &'static VariantProfile {
        match self {
            Variant::Bridges => &BRIDGES,
            Variant::Vms => &VMS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Bridges => "bridges",
            Variant::Vms => "vms",
        }
    }
}

/// One decoded telemetry response. Entity records stay as raw JSON until the
/// view builder projects them, so a bad record surfaces as a structural error
/// rather than failing the whole decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotEnvelope {
    pub entities: Option<Vec<Value>>,
    pub count: Option<u64>,
    pub timestamp: Option<Value>,
}

impl SnapshotEnvelope {
    pub fn entity_count(&self) -> u64 {
        self.count
            .unwrap_or_else(|| self.entities.as_ref().map_or(0, |e| e.len() as u64))
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("output is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected shape: {0}")]
    Shape(String),
}

pub fn decode_envelope(variant: Variant, raw: &[u8]) -> Result<SnapshotEnvelope, DecodeError> {
    let text = std::str::from_utf8(raw)?;
    let root: Value = serde_json::from_str(text)?;
    let profile = variant.profile();

    let mut obj = match root {
        Value::Null => return Ok(SnapshotEnvelope::default()),
        Value::Object(obj) => obj,
        other => {
            return Err(DecodeError::Shape(format!(
                "expected an object, got {}",
                json_type_name(&other)
            )))
        }
    };

    let entities = match obj.remove(profile.entity_key) {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items),
        Some(other) => {
            return Err(DecodeError::Shape(format!(
                "'{}' must be an array, got {}",
                profile.entity_key,
                json_type_name(&other)
            )))
        }
    };

    Ok(SnapshotEnvelope {
        entities,
        count: obj.get(profile.count_key).and_then(Value::as_u64),
        timestamp: obj.remove("timestamp"),
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructuralError {
    #[error("record #{index} is not an object")]
    NotAnObject { index: usize },
    #[error("record #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },
    #[error("record #{index} is malformed: {detail}")]
    Invalid { index: usize, detail: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeRecord {
    pub name: String,
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interfaces: Vec<String>,
    #[serde(default = "default_stp_state", deserialize_with = "null_as_unknown")]
    pub stp_state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rx_bytes: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tx_bytes: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rx_packets: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tx_packets: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rx_errors: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tx_errors: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rx_dropped: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tx_dropped: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmRecord {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub memory_mb: Option<f64>,
    #[serde(default)]
    pub pid: Option<u64>,
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub network_interfaces: Option<String>,
    #[serde(default, rename = "type")]
    pub vm_type: Option<String>,
}

fn default_stp_state() -> String {
    "unknown".to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_unknown<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_stp_state))
}

/// Decodes one entity record, checking the fields every variant requires.
pub fn parse_record<T: DeserializeOwned>(index: usize, raw: &Value) -> Result<T, StructuralError> {
    let obj: &Map<String, Value> = raw
        .as_object()
        .ok_or(StructuralError::NotAnObject { index })?;
    for field in ["name", "status"] {
        if !obj.get(field).is_some_and(Value::is_string) {
            return Err(StructuralError::MissingField { index, field });
        }
    }
    T::deserialize(raw).map_err(|err| StructuralError::Invalid {
        index,
        detail: err.to_string(),
    })
}
