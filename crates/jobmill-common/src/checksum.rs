//! Canonical encoding and content hashing for job units
//!
//! A job's identity is the SHA-256 digest of the canonical JSON encoding of
//! `{"analysis_spec": …, "input_ref": …}`. The encoding sorts object keys at
//! every depth and emits no insignificant whitespace, so two specs that only
//! differ in key order hash identically.
//!
//! Numbers are written by value, not by spelling: an integral float below
//! 2^64 in magnitude is written as an integer and negative zero as `0`. So
//! `1e16`, `1.0e16` and `10000000000000000` hash the same. Stores that
//! normalize numbers (Postgres `jsonb`) then cannot change a job's identity.

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Maximum nesting depth accepted in an analysis spec
pub const MAX_SPEC_DEPTH: usize = 64;

/// 2^64; integral floats below this magnitude are written as integers
const INTEGRAL_FLOAT_LIMIT: f64 = 18_446_744_073_709_551_616.0;

/// Reasons a value cannot be canonically encoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("nesting exceeds {limit} levels")]
    TooDeep { limit: usize },
}

/// Compute the SHA-256 digest of bytes as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Encode a JSON value canonically
pub fn canonical_json(value: &Value) -> Result<String, CanonicalError> {
    let mut out = String::new();
    write_value(value, &mut out, 0)?;
    Ok(out)
}

/// Compute the job hash for an `(input_ref, analysis_spec)` pair
///
/// Equivalent to hashing the canonical encoding of
/// `{"analysis_spec": analysis_spec, "input_ref": input_ref}` without cloning
/// the spec into a temporary object.
pub fn compute_job_hash(input_ref: &str, analysis_spec: &Value) -> Result<String, CanonicalError> {
    let mut out = String::from("{\"analysis_spec\":");
    write_value(analysis_spec, &mut out, 1)?;
    out.push_str(",\"input_ref\":");
    write_string(input_ref, &mut out);
    out.push('}');

    Ok(sha256_hex(out.as_bytes()))
}

fn write_value(value: &Value, out: &mut String, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_SPEC_DEPTH {
        return Err(CanonicalError::TooDeep {
            limit: MAX_SPEC_DEPTH,
        });
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out, depth + 1)?;
            }
            out.push(']');
        },
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out, depth + 1)?;
            }
            out.push('}');
        },
    }

    Ok(())
}

fn write_number(n: &Number, out: &mut String) {
    if n.is_f64() {
        if let Some(v) = n.as_f64() {
            if v == 0.0 {
                out.push('0');
                return;
            }
            if v.fract() == 0.0 && v.abs() < INTEGRAL_FLOAT_LIMIT {
                out.push_str(&(v as i128).to_string());
                return;
            }
        }
    }
    out.push_str(&n.to_string());
}

fn write_string(s: &str, out: &mut String) {
    // Display on a string value is its escaped JSON literal
    out.push_str(&Value::String(s.to_owned()).to_string());
}
