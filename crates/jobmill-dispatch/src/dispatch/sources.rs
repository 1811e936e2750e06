//! Input datasets and analysis catalogs
//!
//! Both are external collaborators with a single query each. The directory
//! and JSON file implementations cover the command line; the static ones
//! cover embedding and tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};

/// Lists the identifiers of the datasets to analyse
#[async_trait]
pub trait InputLister: Send + Sync {
    async fn list_inputs(&self) -> DispatchResult<Vec<String>>;
}

/// Supplies the analysis specifications to run against every input
#[async_trait]
pub trait AnalysisCatalog: Send + Sync {
    async fn analysis_specs(&self) -> DispatchResult<Vec<Value>>;
}

/// Files in one directory with a given extension, listed by file name
#[derive(Debug, Clone)]
pub struct DirectoryInputs {
    root: PathBuf,
    extension: String,
}

impl DirectoryInputs {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

#[async_trait]
impl InputLister for DirectoryInputs {
    async fn list_inputs(&self) -> DispatchResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            DispatchError::inputs(format!("cannot read {}: {e}", self.root.display()))
        })?;

        let mut inputs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if !self.matches(&path) {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => inputs.push(name),
                Err(name) => debug!(file = ?name, "Skipping input with non UTF-8 name"),
            }
        }

        inputs.sort();
        debug!(root = %self.root.display(), count = inputs.len(), "Listed input files");
        Ok(inputs)
    }
}

/// Fixed list of inputs
#[derive(Debug, Clone, Default)]
pub struct StaticInputs(pub Vec<String>);

impl StaticInputs {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(inputs.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl InputLister for StaticInputs {
    async fn list_inputs(&self) -> DispatchResult<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Catalog stored as a JSON array of analysis specs
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AnalysisCatalog for JsonFileCatalog {
    async fn analysis_specs(&self) -> DispatchResult<Vec<Value>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DispatchError::config(format!("cannot read catalog {}: {e}", self.path.display()))
        })?;

        match serde_json::from_str::<Value>(&raw)? {
            Value::Array(specs) => Ok(specs),
            other => Err(DispatchError::config(format!(
                "catalog {} must be a JSON array, found {}",
                self.path.display(),
                match other {
                    Value::Object(_) => "an object",
                    _ => "a scalar",
                }
            ))),
        }
    }
}

/// Fixed list of analysis specs
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog(pub Vec<Value>);

impl StaticCatalog {
    pub fn new(specs: Vec<Value>) -> Self {
        Self(specs)
    }

    /// Built-in catalog used when no catalog file is configured: MLE fits of
    /// the Q-learning and loss-counting foraging agents
    pub fn builtin() -> Self {
        let fit_kwargs = json!({
            "DE_kwargs": { "polish": true, "seed": 42 },
            "k_fold_cross_validation": 2,
        });

        Self(vec![
            json!({
                "analysis_name": "MLE fitting",
                "analysis_ver": "first version @ 0.10.0",
                "analysis_libs_to_track_ver": ["aind_dynamic_foraging_models"],
                "analysis_args": {
                    "agent_class": "ForagerQLearning",
                    "agent_kwargs": {
                        "number_of_learning_rate": 1,
                        "number_of_forget_rate": 1,
                        "choice_kernel": "one_step",
                        "action_selection": "softmax",
                    },
                    "fit_kwargs": fit_kwargs.clone(),
                },
            }),
            json!({
                "analysis_name": "MLE fitting",
                "analysis_ver": "first version @ 0.10.0",
                "analysis_libs_to_track_ver": ["aind_dynamic_foraging_models"],
                "analysis_args": {
                    "agent_class": "ForagerLossCounting",
                    "agent_kwargs": { "win_stay_lose_switch": true, "choice_kernel": "none" },
                    "fit_kwargs": fit_kwargs,
                },
            }),
        ])
    }
}

#[async_trait]
impl AnalysisCatalog for StaticCatalog {
    async fn analysis_specs(&self) -> DispatchResult<Vec<Value>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_directory_inputs_filters_by_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.nwb"), b"").unwrap();
        std::fs::write(dir.path().join("a.NWB"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested.nwb")).unwrap();

        let inputs = DirectoryInputs::new(dir.path(), ".nwb").list_inputs().await.unwrap();
        assert_eq!(inputs, vec!["a.NWB", "b.nwb"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let lister = DirectoryInputs::new(dir.path().join("absent"), "nwb");
        assert!(matches!(lister.list_inputs().await, Err(DispatchError::Inputs(_))));
    }

    #[tokio::test]
    async fn test_json_catalog_reads_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"[{"analysis_name": "fit"}, {"analysis_name": "sim"}]"#).unwrap();

        let specs = JsonFileCatalog::new(&path).analysis_specs().await.unwrap();
        assert_eq!(specs, vec![json!({"analysis_name": "fit"}), json!({"analysis_name": "sim"})]);
    }

    #[tokio::test]
    async fn test_builtin_catalog_is_valid() {
        let specs = StaticCatalog::builtin().analysis_specs().await.unwrap();
        assert_eq!(specs.len(), 2);
        for spec in &specs {
            assert!(jobmill_common::types::validate_analysis_spec(spec).is_ok());
        }
        assert_ne!(specs[0], specs[1]);
    }

    #[tokio::test]
    async fn test_json_catalog_rejects_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"{"analysis_name": "fit"}"#).unwrap();

        let err = JsonFileCatalog::new(&path).analysis_specs().await.unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }
}
