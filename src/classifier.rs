// Posture Coach — Classifier Adapter
//
// The posture model is trained offline and shipped as a JSON artifact that
// bundles three things:
//   1. `feature_cols`: the column order the model was trained with.  It must
//      equal the fixed layout from `features::feature_columns()`.
//   2. `classes`: the label decoder (encoded index → label string).
//   3. `model`: a random-forest export: per tree, a flat node list of
//      splits (`x[feature] <= threshold` goes left) and leaves holding
//      per-class weights.
//
// Everything that can be wrong with the artifact is checked at load time, so
// a loaded model cannot fail on a well-formed vector.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::{feature_columns, CompleteVector, FEATURE_COUNT};

// ---------------------------------------------------------------------------
// Public interface
// ---------------------------------------------------------------------------

/// Anything that maps a complete feature vector to a posture label.
pub trait Classifier {
    fn classify(&self, vector: &CompleteVector) -> Result<String>;

    /// Every label the classifier can produce (may be empty if unknown).
    fn labels(&self) -> Vec<String>;
}

/// Result of a single classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub label: String,
    pub is_good: bool,
}

impl ClassificationResult {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let is_good = label.contains("good");
        Self { label, is_good }
    }
}

/// Classify and wrap the label.
pub fn classify(classifier: &dyn Classifier, vector: &CompleteVector) -> Result<ClassificationResult> {
    let label = classifier.classify(vector)?;
    Ok(ClassificationResult::new(label))
}

// ---------------------------------------------------------------------------
// Artifact format
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Forest {
    pub trees: Vec<Tree>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelPackage {
    pub feature_cols: Vec<String>,
    pub classes: Vec<String>,
    pub model: Forest,
}

impl ModelPackage {
    /// Load and validate. A missing or corrupt file is a startup failure.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::ModelLoad(format!("{}: {}", path.display(), e)))?;
        let package = Self::from_json(&contents)?;
        log::info!(
            "Model loaded from {}: {} trees, labels: {:?}",
            path.display(),
            package.model.trees.len(),
            package.classes
        );
        Ok(package)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let package: ModelPackage =
            serde_json::from_str(json).map_err(|e| Error::ModelLoad(e.to_string()))?;
        package.validate()?;
        Ok(package)
    }

    fn validate(&self) -> Result<()> {
        let expected = feature_columns();
        if self.feature_cols != expected {
            let first_diff = self
                .feature_cols
                .iter()
                .zip(&expected)
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| self.feature_cols.len().min(expected.len()));
            return Err(Error::ModelMismatch(format!(
                "{} columns, first difference at slot {} (expected {:?})",
                self.feature_cols.len(),
                first_diff,
                expected.get(first_diff)
            )));
        }
        if self.classes.is_empty() {
            return Err(Error::ModelLoad("no classes".into()));
        }
        if self.model.trees.is_empty() {
            return Err(Error::ModelLoad("empty forest".into()));
        }

        for (t, tree) in self.model.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(Error::ModelLoad(format!("tree {} has no nodes", t)));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                let bad = |what: &str| Error::ModelLoad(format!("tree {} node {}: {}", t, i, what));
                match node {
                    Node::Split { feature, left, right, .. } => {
                        if *feature >= FEATURE_COUNT {
                            return Err(bad("feature index out of range"));
                        }
                        // Children must come after their parent so every walk
                        // terminates.
                        for child in [*left, *right] {
                            if child <= i || child >= tree.nodes.len() {
                                return Err(bad("child index out of range"));
                            }
                        }
                    }
                    Node::Leaf { value } => {
                        if value.len() != self.classes.len() {
                            return Err(bad("leaf width does not match class count"));
                        }
                        if !(value.iter().sum::<f64>() > 0.0) || value.iter().any(|v| *v < 0.0) {
                            return Err(bad("leaf weights must be non-negative with a positive sum"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Encoded label: arg-max of the averaged per-tree class distributions.
    /// Ties go to the lowest index.
    pub fn predict(&self, vector: &CompleteVector) -> usize {
        let x = vector.values();
        let mut votes = vec![0.0f64; self.classes.len()];

        for tree in &self.model.trees {
            let mut ix = 0;
            loop {
                match &tree.nodes[ix] {
                    Node::Split { feature, threshold, left, right } => {
                        ix = if x[*feature] <= *threshold { *left } else { *right };
                    }
                    Node::Leaf { value } => {
                        let total: f64 = value.iter().sum();
                        for (v, w) in votes.iter_mut().zip(value) {
                            *v += w / total;
                        }
                        break;
                    }
                }
            }
        }

        let mut best = 0;
        for (i, v) in votes.iter().enumerate() {
            if *v > votes[best] {
                best = i;
            }
        }
        best
    }

    pub fn decode(&self, encoded: usize) -> Option<&str> {
        self.classes.get(encoded).map(String::as_str)
    }
}

impl Classifier for ModelPackage {
    fn classify(&self, vector: &CompleteVector) -> Result<String> {
        let encoded = self.predict(vector);
        let label = self
            .decode(encoded)
            .ok_or_else(|| Error::Classify(format!("no label for class {}", encoded)))?;
        log::debug!("predicted class {} ({})", encoded, label);
        Ok(label.to_string())
    }

    fn labels(&self) -> Vec<String> {
        self.classes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::slot;
    use crate::segment::Segment;

    /// One split on upper-back pitch: forward of 12° is bad.
    fn stump_json() -> String {
        let split = slot(Segment::UpperBack, 0);
        format!(
            r#"{{
                "feature_cols": {cols},
                "classes": ["sitting_bad", "sitting_good"],
                "model": {{ "trees": [ {{ "nodes": [
                    {{ "split": {{ "feature": {split}, "threshold": 12.0, "left": 1, "right": 2 }} }},
                    {{ "leaf": {{ "value": [0.0, 5.0] }} }},
                    {{ "leaf": {{ "value": [4.0, 1.0] }} }}
                ] }} ] }}
            }}"#,
            cols = serde_json::to_string(&feature_columns()).unwrap(),
        )
    }

    fn vector_with(segment: Segment, pitch: f64) -> CompleteVector {
        let mut v = [0.0; FEATURE_COUNT];
        v[slot(segment, 0)] = pitch;
        CompleteVector(v)
    }

    #[test]
    fn classifies_by_threshold() {
        let model = ModelPackage::from_json(&stump_json()).unwrap();
        assert_eq!(model.classify(&vector_with(Segment::UpperBack, 3.0)).unwrap(), "sitting_good");
        assert_eq!(model.classify(&vector_with(Segment::UpperBack, 25.0)).unwrap(), "sitting_bad");
        // Boundary goes left.
        assert_eq!(model.predict(&vector_with(Segment::UpperBack, 12.0)), 1);
    }

    #[test]
    fn forest_averages_normalised_votes() {
        let mut model = ModelPackage::from_json(&stump_json()).unwrap();
        // Two constant trees strongly voting bad outweigh the stump.
        let bad_leaf = Tree { nodes: vec![Node::Leaf { value: vec![9.0, 1.0] }] };
        model.model.trees.push(bad_leaf.clone());
        model.model.trees.push(bad_leaf);
        assert_eq!(model.classify(&vector_with(Segment::UpperBack, 0.0)).unwrap(), "sitting_bad");
    }

    #[test]
    fn ties_go_to_lowest_class() {
        let mut model = ModelPackage::from_json(&stump_json()).unwrap();
        model.model.trees = vec![Tree { nodes: vec![Node::Leaf { value: vec![1.0, 1.0] }] }];
        assert_eq!(model.predict(&vector_with(Segment::LeftThigh, 0.0)), 0);
    }

    #[test]
    fn rejects_reordered_columns() {
        let mut cols = feature_columns();
        cols.swap(2, 4);
        let json = stump_json().replace(
            &serde_json::to_string(&feature_columns()).unwrap(),
            &serde_json::to_string(&cols).unwrap(),
        );
        assert!(matches!(ModelPackage::from_json(&json), Err(Error::ModelMismatch(_))));
    }

    #[test]
    fn rejects_backward_child_pointer() {
        let json = stump_json().replace(r#""left": 1"#, r#""left": 0"#);
        assert!(matches!(ModelPackage::from_json(&json), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn rejects_corrupt_json() {
        assert!(matches!(ModelPackage::from_json("{ not json"), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn missing_file_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModelPackage::load(dir.path().join("model_package.json"));
        assert!(matches!(result, Err(Error::ModelLoad(_))));
    }

    #[test]
    fn good_flag_comes_from_label() {
        assert!(ClassificationResult::new("standing_good").is_good);
        assert!(!ClassificationResult::new("sitting_bad").is_good);
    }
}
