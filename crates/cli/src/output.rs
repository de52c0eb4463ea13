use anyhow::Result;
use serde::Serialize;

/// Structured output envelope, one JSON document per command.
#[derive(Debug, Serialize)]
pub struct OutputEnvelope<'a, T: Serialize> {
    pub version: &'static str,
    #[serde(rename = "type")]
    pub data_type: &'a str,
    #[serde(rename = "@message")]
    pub message: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    pub data: &'a T,
}

impl<'a, T: Serialize> OutputEnvelope<'a, T> {
    pub fn new(data_type: &'a str, message: impl Into<String>, data: &'a T) -> Self {
        Self {
            version: "0.1",
            data_type,
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }
}

/// Print `data` wrapped in an envelope to stdout.
pub fn emit<T: Serialize>(data_type: &str, message: impl Into<String>, data: &T) -> Result<()> {
    let envelope = OutputEnvelope::new(data_type, message, data);
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

/// Machine-readable failure, printed instead of the envelope when a
/// command fails with a store error.
#[derive(Debug, Serialize)]
pub struct CliDiagnostic {
    pub version: &'static str,
    #[serde(rename = "type")]
    pub data_type: &'static str,
    #[serde(rename = "@level")]
    pub level: &'static str,
    #[serde(rename = "@message")]
    pub message: String,
    pub kind: &'static str,
    pub status: u16,
}

impl CliDiagnostic {
    pub fn from_store(err: &rollcall_store::StoreError) -> Self {
        Self {
            version: "0.1",
            data_type: "diagnostic",
            level: "error",
            message: err.to_string(),
            kind: err.kind(),
            status: err.status_code(),
        }
    }
}
