//! Candidate job generation
//!
//! Every input is paired with every analysis spec. Inputs are sorted and
//! de-duplicated first, specs keep catalog order, and iteration is
//! input-major, so the candidate order is stable for a given input set.

use jobmill_common::types::{spec_summary, JobUnit};
use jobmill_common::JobmillError;
use serde_json::Value;
use std::collections::HashSet;

use super::events::{DispatchEvent, EventSink};

/// A candidate excluded because its spec could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub input_ref: String,
    pub spec: String,
    pub reason: String,
}

/// Result of crossing inputs with specs
#[derive(Debug, Clone, Default)]
pub struct Generated {
    pub candidates: Vec<JobUnit>,
    pub rejected: Vec<Rejection>,
    /// Candidates dropped because an earlier one had the same hash
    pub duplicates: usize,
}

/// Build the stamped cross product of `inputs` and `specs`
pub fn generate(inputs: &[String], specs: &[Value], sink: &dyn EventSink) -> Generated {
    let mut inputs: Vec<&String> = inputs.iter().collect();
    inputs.sort();
    inputs.dedup();

    let mut generated = Generated::default();
    let mut seen = HashSet::new();

    for input_ref in &inputs {
        for spec in specs {
            match JobUnit::new(input_ref.as_str(), spec.clone()) {
                Ok(unit) => {
                    if seen.insert(unit.job_hash.clone()) {
                        generated.candidates.push(unit);
                    } else {
                        generated.duplicates += 1;
                        sink.emit(DispatchEvent::DuplicateCandidate {
                            job_hash: unit.job_hash,
                        });
                    }
                },
                Err(err) => {
                    let reason = match err {
                        JobmillError::MalformedSpec { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    let rejection = Rejection {
                        input_ref: input_ref.to_string(),
                        spec: spec_summary(spec),
                        reason,
                    };
                    sink.emit(DispatchEvent::SpecRejected {
                        input_ref: rejection.input_ref.clone(),
                        spec: rejection.spec.clone(),
                        reason: rejection.reason.clone(),
                    });
                    generated.rejected.push(rejection);
                },
            }
        }
    }

    sink.emit(DispatchEvent::CandidatesGenerated {
        inputs: inputs.len(),
        specs: specs.len(),
        candidates: generated.candidates.len(),
    });

    generated
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dispatch::events::MemorySink;
    use serde_json::json;

    fn inputs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cross_product_is_input_major() {
        let specs = vec![json!({"analysis_name": "fit"}), json!({"analysis_name": "sim"})];
        let generated = generate(&inputs(&["b.nwb", "a.nwb"]), &specs, &MemorySink::new());

        let pairs: Vec<(String, String)> = generated
            .candidates
            .iter()
            .map(|u| (u.input_ref.clone(), u.spec_summary()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a.nwb".to_string(), "fit".to_string()),
                ("a.nwb".to_string(), "sim".to_string()),
                ("b.nwb".to_string(), "fit".to_string()),
                ("b.nwb".to_string(), "sim".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_sides_produce_nothing() {
        let sink = MemorySink::new();
        assert!(generate(&[], &[json!({"analysis_name": "fit"})], &sink).candidates.is_empty());
        assert!(generate(&inputs(&["a.nwb"]), &[], &sink).candidates.is_empty());
    }

    #[test]
    fn test_malformed_spec_is_rejected_per_candidate() {
        let specs = vec![
            json!({"analysis_name": "fit", "analysis_ver": "1"}),
            json!({"analysis_ver": "2"}),
            json!(["not", "an", "object"]),
        ];
        let sink = MemorySink::new();
        let generated = generate(&inputs(&["a.nwb", "b.nwb"]), &specs, &sink);

        assert_eq!(generated.candidates.len(), 2);
        assert_eq!(generated.rejected.len(), 4);
        assert_eq!(generated.rejected[0].input_ref, "a.nwb");
        assert_eq!(generated.rejected[0].reason, "missing analysis_name");
        assert_eq!(generated.rejected[1].spec, "<array>");
        assert_eq!(sink.count(|e| matches!(e, DispatchEvent::SpecRejected { .. })), 4);
    }

    #[test]
    fn test_duplicate_inputs_and_specs_collapse() {
        let specs = vec![
            json!({"analysis_name": "fit", "a": 1, "b": 2}),
            json!({"b": 2, "a": 1, "analysis_name": "fit"}),
        ];
        let generated = generate(&inputs(&["a.nwb", "a.nwb"]), &specs, &MemorySink::new());

        assert_eq!(generated.candidates.len(), 1);
        assert_eq!(generated.duplicates, 1);
    }
}
