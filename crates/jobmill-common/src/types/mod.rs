//! Common types used across jobmill

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum::compute_job_hash;
use crate::error::{JobmillError, Result};

/// Lifecycle status of an admitted job
///
/// `pending → running → done | failed`, with `failed` and `running` able to
/// return to `pending` on an explicit retry request. `done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// Every status, in lifecycle order
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether no transition out of this status exists
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = JobmillError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(JobmillError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (input, analysis spec) pairing, identified by its content hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUnit {
    /// Dataset identifier, e.g. a file name under the input root
    pub input_ref: String,
    /// Nested analysis configuration
    pub analysis_spec: Value,
    /// SHA-256 over the canonical encoding of `(input_ref, analysis_spec)`
    pub job_hash: String,
}

impl JobUnit {
    /// Build a job unit and stamp it with its content hash
    ///
    /// Fails with [`JobmillError::MalformedSpec`] when the spec is not an
    /// object, lacks an `analysis_name`, or cannot be canonically encoded.
    pub fn new(input_ref: impl Into<String>, analysis_spec: Value) -> Result<Self> {
        let input_ref = input_ref.into();
        validate_analysis_spec(&analysis_spec)
            .map_err(|reason| JobmillError::malformed_spec(&input_ref, reason))?;

        let job_hash = compute_job_hash(&input_ref, &analysis_spec)
            .map_err(|e| JobmillError::malformed_spec(&input_ref, e.to_string()))?;

        Ok(Self {
            input_ref,
            analysis_spec,
            job_hash,
        })
    }

    /// Re-derive the hash from the payload and compare it with the stamped one
    pub fn verify_hash(&self) -> Result<()> {
        let computed = compute_job_hash(&self.input_ref, &self.analysis_spec)
            .map_err(|e| JobmillError::malformed_spec(&self.input_ref, e.to_string()))?;

        if computed == self.job_hash {
            Ok(())
        } else {
            Err(JobmillError::HashMismatch {
                stored: self.job_hash.clone(),
                computed,
            })
        }
    }

    /// Short human-readable description of the analysis spec
    pub fn spec_summary(&self) -> String {
        spec_summary(&self.analysis_spec)
    }
}

/// Persisted, status-tracked form of an admitted job unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Store-assigned, monotonically increasing; only used as a page cursor
    pub id: i64,
    pub job_hash: String,
    pub job_unit: JobUnit,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check the structural requirements of an analysis spec
pub fn validate_analysis_spec(spec: &Value) -> std::result::Result<(), String> {
    let Some(object) = spec.as_object() else {
        return Err(format!("expected a JSON object, got {}", json_type_name(spec)));
    };

    match object.get("analysis_name") {
        Some(Value::String(name)) if !name.trim().is_empty() => Ok(()),
        Some(_) => Err("analysis_name must be a non-empty string".to_string()),
        None => Err("missing analysis_name".to_string()),
    }
}

/// Summarize a spec as `name@version` (or whatever parts are present)
pub fn spec_summary(spec: &Value) -> String {
    let name = spec.get("analysis_name").and_then(Value::as_str);
    let version = spec.get("analysis_ver").and_then(Value::as_str);

    match (name, version) {
        (Some(name), Some(version)) => format!("{name}@{version}"),
        (Some(name), None) => name.to_string(),
        _ => format!("<{}>", json_type_name(spec)),
    }
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_only_done_is_terminal() {
        assert!(JobStatus::Done.is_terminal());
        assert!(!JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_job_unit_hash_ignores_key_order() {
        let a = JobUnit::new("a.nwb", json!({ "analysis_name": "fit", "args": { "x": 1, "y": 2 } }))
            .unwrap();
        let b = JobUnit::new("a.nwb", json!({ "args": { "y": 2, "x": 1 }, "analysis_name": "fit" }))
            .unwrap();
        assert_eq!(a.job_hash, b.job_hash);
    }

    #[test]
    fn test_job_unit_rejects_non_object_spec() {
        let err = JobUnit::new("a.nwb", json!(["fit"])).unwrap_err();
        match err {
            JobmillError::MalformedSpec { input_ref, reason } => {
                assert_eq!(input_ref, "a.nwb");
                assert!(reason.contains("array"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_job_unit_rejects_missing_name() {
        assert!(JobUnit::new("a.nwb", json!({ "analysis_ver": "1" })).is_err());
        assert!(JobUnit::new("a.nwb", json!({ "analysis_name": "  " })).is_err());
    }

    #[test]
    fn test_verify_hash_detects_tampering() {
        let mut unit = JobUnit::new("a.nwb", json!({ "analysis_name": "fit" })).unwrap();
        assert!(unit.verify_hash().is_ok());

        unit.input_ref = "b.nwb".to_string();
        assert!(matches!(unit.verify_hash(), Err(JobmillError::HashMismatch { .. })));
    }

    #[test]
    fn test_spec_summary() {
        assert_eq!(
            spec_summary(&json!({ "analysis_name": "MLE fitting", "analysis_ver": "0.10.0" })),
            "MLE fitting@0.10.0"
        );
        assert_eq!(spec_summary(&json!({ "analysis_name": "fit" })), "fit");
        assert_eq!(spec_summary(&json!(42)), "<number>");
    }

    #[test]
    fn test_job_unit_serde_shape() {
        let unit = JobUnit::new("a.nwb", json!({ "analysis_name": "fit" })).unwrap();
        let value = serde_json::to_value(&unit).unwrap();
        assert_eq!(value["input_ref"], "a.nwb");
        assert_eq!(value["job_hash"], unit.job_hash.as_str());
        assert_eq!(value["analysis_spec"]["analysis_name"], "fit");
    }
}
