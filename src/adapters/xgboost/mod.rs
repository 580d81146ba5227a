//! XGBoost adapter: Implementation of `RiskScorer` over a JSON tree dump.
//!
//! The model directory holds three artifacts exported by the training
//! pipeline:
//!
//! - `preprocessing.json`: ordinal encoders, one-hot categories, the selected
//!   feature order and the StandardScaler parameters
//! - `model.json`: `base_score` plus the boosted trees (XGBoost `dump_model`
//!   JSON format)
//! - `manifest.json`: SHA-256 of every artifact
//!
//! # Security
//!
//! - In release builds the manifest is mandatory and must bind both artifacts
//! - Debug builds may opt out with `ManifestPolicy::AllowMissing`
//! - A manifest that is present is always verified

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::ClinicalFeatures;
use crate::ports::{RiskScorer, ScoringError};

const PREPROCESSING_FILE: &str = "preprocessing.json";
const MODEL_FILE: &str = "model.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Whether a missing `manifest.json` is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestPolicy {
    Required,
    /// Debug builds only. Release builds treat this as `Required`.
    AllowMissing,
}

impl ManifestPolicy {
    fn allows_missing(self) -> bool {
        cfg!(debug_assertions) && self == Self::AllowMissing
    }
}

/// StandardScaler parameters for the numeric columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerParams {
    pub columns: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Frozen preprocessing exported alongside the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessing {
    /// Column -> categories in code order (index is the encoded value).
    pub ordinal: BTreeMap<String, Vec<String>>,
    /// Column -> categories that produce a `{column}_{category}` indicator.
    #[serde(default)]
    pub one_hot: BTreeMap<String, Vec<String>>,
    /// Model input columns, in order.
    pub selected_features: Vec<String>,
    pub scaler: ScalerParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDump {
    pub base_score: f64,
    pub trees: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Leaf {
        nodeid: u32,
        leaf: f64,
    },
    Split {
        nodeid: u32,
        split: String,
        split_condition: f64,
        yes: u32,
        no: u32,
        missing: u32,
        children: Vec<TreeNode>,
    },
}

impl TreeNode {
    fn nodeid(&self) -> u32 {
        match self {
            Self::Leaf { nodeid, .. } | Self::Split { nodeid, .. } => *nodeid,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    files: BTreeMap<String, String>,
}

// Tree node with feature names resolved to column indices and child ids
// resolved to arena positions.
#[derive(Debug, Clone, Copy)]
enum CompiledNode {
    Leaf(f32),
    Split {
        feature: usize,
        threshold: f32,
        yes: usize,
        no: usize,
        missing: usize,
    },
}

/// Gradient-boosted tree ensemble with its preprocessing pipeline.
#[derive(Debug)]
pub struct TreeEnsembleScorer {
    preprocessing: Preprocessing,
    trees: Vec<Vec<CompiledNode>>,
    base_margin: f32,
    model_id: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn read_artifact(dir: &Path, name: &str) -> Result<Vec<u8>, ScoringError> {
    let path = dir.join(name);
    fs::read(&path).map_err(|e| ScoringError::ModelNotLoaded(format!("{}: {e}", path.display())))
}

/// Hash the model artifacts in `dir` and write `manifest.json` binding them.
///
/// # Errors
/// Returns `ScoringError::ModelNotLoaded` if an artifact is missing, or an
/// I/O error if the manifest cannot be written.
pub fn write_manifest(dir: &Path) -> Result<std::path::PathBuf, ScoringError> {
    let mut files = BTreeMap::new();
    for rel in [PREPROCESSING_FILE, MODEL_FILE] {
        files.insert(rel.to_string(), sha256_hex(&read_artifact(dir, rel)?));
    }

    let path = dir.join(MANIFEST_FILE);
    fs::write(&path, serde_json::to_vec_pretty(&Manifest { files })?)?;
    tracing::info!("Wrote model manifest to {:?}", path);
    Ok(path)
}

/// Verify every file bound by `manifest.json`.
///
/// Returns `false` when the manifest is absent and the policy allows it.
fn verify_manifest(dir: &Path, policy: ManifestPolicy) -> Result<bool, ScoringError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        if policy.allows_missing() {
            tracing::warn!(
                "Loading unverified model from {:?} (no {MANIFEST_FILE})",
                dir
            );
            return Ok(false);
        }
        tracing::error!("Model manifest not found at {:?}", manifest_path);
        return Err(ScoringError::Integrity(format!("{MANIFEST_FILE} is required")));
    }

    let manifest: Manifest = serde_json::from_slice(&fs::read(&manifest_path)?)?;
    for required in [PREPROCESSING_FILE, MODEL_FILE] {
        if !manifest.files.contains_key(required) {
            return Err(ScoringError::Integrity(format!(
                "{MANIFEST_FILE} must include {required}"
            )));
        }
    }

    for (rel, expected_hex) in &manifest.files {
        let bytes = read_artifact(dir, rel)?;
        let actual_hex = sha256_hex(&bytes);
        if !constant_time_eq_str(&actual_hex, &expected_hex.to_ascii_lowercase()) {
            return Err(ScoringError::Integrity(format!("File hash mismatch for {rel}")));
        }
    }

    Ok(true)
}

fn compile_tree(root: &TreeNode, features: &[String]) -> Result<Vec<CompiledNode>, ScoringError> {
    let mut flat: Vec<&TreeNode> = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        flat.push(node);
        if let TreeNode::Split { children, .. } = node {
            stack.extend(children.iter());
        }
    }

    let positions: HashMap<u32, usize> = flat
        .iter()
        .enumerate()
        .map(|(i, node)| (node.nodeid(), i))
        .collect();
    if positions.len() != flat.len() {
        return Err(ScoringError::InvalidModel("duplicate node ids in tree".into()));
    }

    flat.iter()
        .map(|node| match node {
            TreeNode::Leaf { leaf, .. } => Ok(CompiledNode::Leaf(*leaf as f32)),
            TreeNode::Split {
                nodeid,
                split,
                split_condition,
                yes,
                no,
                missing,
                children,
            } => {
                let feature = features.iter().position(|f| f == split).ok_or_else(|| {
                    ScoringError::InvalidModel(format!("node {nodeid} splits on unknown feature {split}"))
                })?;
                // Branch targets must be direct children, which also rules out cycles.
                let child = |id: u32| {
                    children
                        .iter()
                        .any(|c| c.nodeid() == id)
                        .then(|| positions.get(&id).copied())
                        .flatten()
                        .ok_or_else(|| {
                            ScoringError::InvalidModel(format!(
                                "node {nodeid} references missing child {id}"
                            ))
                        })
                };
                Ok(CompiledNode::Split {
                    feature,
                    threshold: *split_condition as f32,
                    yes: child(*yes)?,
                    no: child(*no)?,
                    missing: child(*missing)?,
                })
            }
        })
        .collect()
}

fn eval_tree(tree: &[CompiledNode], row: &[f64]) -> f32 {
    let mut at = 0;
    loop {
        match tree[at] {
            CompiledNode::Leaf(value) => return value,
            CompiledNode::Split {
                feature,
                threshold,
                yes,
                no,
                missing,
            } => {
                let x = row[feature];
                // XGBoost compares in single precision.
                at = if x.is_nan() {
                    missing
                } else if (x as f32) < threshold {
                    yes
                } else {
                    no
                };
            }
        }
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

impl Preprocessing {
    fn validate(&self) -> Result<(), ScoringError> {
        let n = self.scaler.columns.len();
        if self.scaler.mean.len() != n || self.scaler.scale.len() != n {
            return Err(ScoringError::InvalidModel(
                "scaler parameter lengths do not match scaler columns".into(),
            ));
        }
        if self.selected_features.is_empty() {
            return Err(ScoringError::InvalidModel("no selected features".into()));
        }
        Ok(())
    }

    fn ordinal_code(&self, column: &str, value: &str) -> Result<f64, ScoringError> {
        let classes = self.ordinal.get(column).ok_or_else(|| {
            ScoringError::InvalidModel(format!("no ordinal encoder for {column}"))
        })?;
        classes
            .iter()
            .position(|c| c == value)
            .map(|i| i as f64)
            .ok_or_else(|| ScoringError::InvalidFeatures(format!("unknown {column} category {value}")))
    }

    /// Ordinal encode, one-hot encode, select, then scale.
    ///
    /// Columns absent after encoding are filled with 0.
    ///
    /// # Errors
    /// Returns `ScoringError::InvalidFeatures` for a category the ordinal
    /// encoders were not fitted on.
    pub fn transform(&self, features: &ClinicalFeatures) -> Result<Vec<f64>, ScoringError> {
        let mut columns: HashMap<String, f64> = HashMap::new();
        columns.insert("Age".into(), f64::from(features.age));
        columns.insert("TumorSize".into(), features.tumor_size);
        columns.insert(
            "CancerStage".into(),
            self.ordinal_code("CancerStage", features.cancer_stage.as_str())?,
        );
        columns.insert(
            "Metastasis".into(),
            self.ordinal_code("Metastasis", features.metastasis.as_str())?,
        );

        let categorical = [
            ("TumorType", features.tumor_type.as_str()),
            ("TreatmentType", features.treatment_type.as_str()),
            ("Comorbidities", features.comorbidities.as_str()),
        ];
        for (column, value) in categorical {
            if let Some(categories) = self.one_hot.get(column) {
                for category in categories {
                    let indicator = if category == value { 1.0 } else { 0.0 };
                    columns.insert(format!("{column}_{category}"), indicator);
                }
            } else {
                columns.insert(format!("{column}_{value}"), 1.0);
            }
        }

        let mut row: Vec<f64> = self
            .selected_features
            .iter()
            .map(|name| columns.get(name).copied().unwrap_or(0.0))
            .collect();

        for (i, column) in self.scaler.columns.iter().enumerate() {
            if let Some(pos) = self.selected_features.iter().position(|f| f == column) {
                // StandardScaler leaves zero-variance columns unscaled.
                let scale = if self.scaler.scale[i] == 0.0 {
                    1.0
                } else {
                    self.scaler.scale[i]
                };
                row[pos] = (row[pos] - self.scaler.mean[i]) / scale;
            }
        }

        Ok(row)
    }
}

impl TreeEnsembleScorer {
    /// Load and verify the artifacts in `model_dir`.
    ///
    /// # Errors
    /// Returns `ScoringError::Integrity` if the manifest is missing (when
    /// required) or any hash differs, and `ScoringError::InvalidModel` if
    /// the artifacts are inconsistent.
    pub fn load(model_dir: &Path, policy: ManifestPolicy) -> Result<Self, ScoringError> {
        let verified = verify_manifest(model_dir, policy)?;

        let preprocessing: Preprocessing =
            serde_json::from_slice(&read_artifact(model_dir, PREPROCESSING_FILE)?)?;
        preprocessing.validate()?;

        let model_bytes = read_artifact(model_dir, MODEL_FILE)?;
        let dump: ModelDump = serde_json::from_slice(&model_bytes)?;
        Self::from_parts(preprocessing, &dump, sha256_hex(&model_bytes), verified)
    }

    fn from_parts(
        preprocessing: Preprocessing,
        dump: &ModelDump,
        digest: String,
        verified: bool,
    ) -> Result<Self, ScoringError> {
        if !(dump.base_score > 0.0 && dump.base_score < 1.0) {
            return Err(ScoringError::InvalidModel(format!(
                "base_score {} outside (0, 1)",
                dump.base_score
            )));
        }
        if dump.trees.is_empty() {
            return Err(ScoringError::InvalidModel("model has no trees".into()));
        }

        let trees = dump
            .trees
            .iter()
            .map(|tree| compile_tree(tree, &preprocessing.selected_features))
            .collect::<Result<Vec<_>, _>>()?;
        let base_margin = (dump.base_score / (1.0 - dump.base_score)).ln() as f32;
        let model_id = digest.chars().take(12).collect::<String>();

        tracing::info!(
            "Loaded risk model {} ({} trees, {} features, verified={})",
            model_id,
            trees.len(),
            preprocessing.selected_features.len(),
            verified
        );

        Ok(Self {
            preprocessing,
            trees,
            base_margin,
            model_id,
        })
    }

    /// Raw margin before the logistic link.
    fn margin(&self, row: &[f64]) -> f32 {
        self.trees
            .iter()
            .fold(self.base_margin, |acc, tree| acc + eval_tree(tree, row))
    }
}

impl RiskScorer for TreeEnsembleScorer {
    fn score(&self, features: &ClinicalFeatures) -> Result<f64, ScoringError> {
        let row = self.preprocessing.transform(features)?;
        let probability = sigmoid(f64::from(self.margin(&row)));
        if !probability.is_finite() {
            return Err(ScoringError::InvalidProbability(probability));
        }
        Ok(probability)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
