//! Trained tree classifiers and the argmax decision over their probabilities.

use anyhow::{Context, ensure};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::{
    error::{PipelineError, Result},
    model::RainLabel,
};

/// Which trained classifier to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    Forest,
    Tree,
}

impl ModelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Forest => "forest",
            ModelId::Tree => "tree",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelId::Forest => "Random Forest",
            ModelId::Tree => "Decision Tree",
        }
    }

    pub const fn all() -> &'static [ModelId] {
        &[ModelId::Forest, ModelId::Tree]
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ModelId {
    type Error = PipelineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();

        match lower.as_str() {
            "forest" | "random-forest" | "rf" => Ok(ModelId::Forest),
            "tree" | "decision-tree" | "dt" => Ok(ModelId::Tree),
            _ => Err(PipelineError::UnknownModel(value.to_string())),
        }
    }
}

/// A fitted binary classifier over reduced feature rows.
pub trait Classifier: Send + Sync + Debug {
    fn n_features(&self) -> usize;

    /// `[p_no, p_yes]`, summing to one.
    ///
    /// # Panics
    ///
    /// If `row` has fewer than [`n_features`](Classifier::n_features) entries.
    /// [`predict`] checks the width and returns an error instead.
    fn predict_proba(&self, row: ArrayView1<f64>) -> [f64; 2];
}

/// A binary decision tree stored as parallel node arrays.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "TreeParams")]
pub struct DecisionTree {
    n_features: usize,
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    /// Normalised class weights per node.
    proba: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct TreeParams {
    n_features: usize,
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    value: Vec<Vec<f64>>,
}

impl TryFrom<TreeParams> for DecisionTree {
    type Error = anyhow::Error;

    fn try_from(p: TreeParams) -> anyhow::Result<Self> {
        DecisionTree::new(
            p.n_features,
            p.children_left,
            p.children_right,
            p.feature,
            p.threshold,
            p.value,
        )
    }
}

const LEAF: i64 = -1;

impl DecisionTree {
    pub fn new(
        n_features: usize,
        children_left: Vec<i64>,
        children_right: Vec<i64>,
        feature: Vec<i64>,
        threshold: Vec<f64>,
        value: Vec<Vec<f64>>,
    ) -> anyhow::Result<Self> {
        let n_nodes = children_left.len();
        ensure!(n_nodes > 0, "Tree has no nodes");
        ensure!(
            [children_right.len(), feature.len(), threshold.len(), value.len()]
                .iter()
                .all(|len| *len == n_nodes),
            "Tree node arrays must all have {n_nodes} entries"
        );

        let mut proba = Vec::with_capacity(n_nodes);
        for node in 0..n_nodes {
            let (left, right) = (children_left[node], children_right[node]);
            let weights = &value[node];
            ensure!(
                weights.len() == 2,
                "Node {node} has {} class weights, expected 2",
                weights.len()
            );

            if left == LEAF {
                ensure!(right == LEAF, "Node {node} has only one child");
                let total = weights[0] + weights[1];
                ensure!(
                    total > 0.0 && weights.iter().all(|w| *w >= 0.0),
                    "Leaf {node} has no class weight"
                );
                proba.push([weights[0] / total, weights[1] / total]);
                continue;
            }

            for child in [left, right] {
                ensure!(
                    child > node as i64 && (child as usize) < n_nodes,
                    "Node {node} points to invalid child {child}"
                );
            }
            ensure!(
                usize::try_from(feature[node]).is_ok_and(|f| f < n_features),
                "Node {node} splits on invalid feature {}",
                feature[node]
            );
            ensure!(threshold[node].is_finite(), "Node {node} has a non-finite threshold");
            // Only leaves are ever read.
            proba.push([0.0, 0.0]);
        }

        Ok(Self { n_features, children_left, children_right, feature, threshold, proba })
    }

    pub fn n_nodes(&self) -> usize {
        self.children_left.len()
    }

    /// Inputs are compared at `f32` precision, as the trees were fitted on `f32` features.
    fn leaf_for(&self, row: ArrayView1<f64>) -> usize {
        let mut node = 0;
        while self.children_left[node] != LEAF {
            let x = f64::from(row[self.feature[node] as usize] as f32);
            node = if x <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        node
    }
}

impl Classifier for DecisionTree {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, row: ArrayView1<f64>) -> [f64; 2] {
        self.proba[self.leaf_for(row)]
    }
}

/// Mean of the member trees' probabilities.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ForestParams")]
pub struct RandomForest {
    n_features: usize,
    estimators: Vec<DecisionTree>,
}

#[derive(Debug, Deserialize)]
struct ForestParams {
    n_features: usize,
    estimators: Vec<DecisionTree>,
}

impl TryFrom<ForestParams> for RandomForest {
    type Error = anyhow::Error;

    fn try_from(p: ForestParams) -> anyhow::Result<Self> {
        RandomForest::new(p.n_features, p.estimators)
    }
}

impl RandomForest {
    pub fn new(n_features: usize, estimators: Vec<DecisionTree>) -> anyhow::Result<Self> {
        ensure!(!estimators.is_empty(), "Forest has no trees");
        for (i, tree) in estimators.iter().enumerate() {
            ensure!(
                tree.n_features() == n_features,
                "Forest tree {i} expects {} features, forest expects {n_features}",
                tree.n_features()
            );
        }
        Ok(Self { n_features, estimators })
    }

    pub fn n_estimators(&self) -> usize {
        self.estimators.len()
    }
}

impl Classifier for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, row: ArrayView1<f64>) -> [f64; 2] {
        let sum = self.estimators.iter().fold([0.0, 0.0], |acc, tree| {
            let p = tree.predict_proba(row);
            [acc[0] + p[0], acc[1] + p[1]]
        });
        let n = self.estimators.len() as f64;
        [sum[0] / n, sum[1] / n]
    }
}

/// Held-out accuracy recorded for each model at training time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelAccuracy {
    pub forest: f64,
    pub tree: f64,
}

impl ModelAccuracy {
    pub fn new(forest: f64, tree: f64) -> anyhow::Result<Self> {
        for (name, value) in [("forest", forest), ("tree", tree)] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "Accuracy for {name} must be within [0, 1], got {value}"
            );
        }
        Ok(Self { forest, tree })
    }

    pub fn for_model(&self, model: ModelId) -> f64 {
        match model {
            ModelId::Forest => self.forest,
            ModelId::Tree => self.tree,
        }
    }
}

/// Label and class probabilities for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: RainLabel,
    pub probability_no: f64,
    pub probability_yes: f64,
}

impl Prediction {
    /// Argmax over `[p_no, p_yes]`; a tie goes to `No`.
    pub fn from_proba(proba: [f64; 2]) -> Self {
        let total = proba[0] + proba[1];
        let probability_yes = if total > 0.0 { proba[1] / total } else { 0.0 };
        let probability_no = 1.0 - probability_yes;
        let label = if proba[1] > proba[0] { RainLabel::Yes } else { RainLabel::No };
        Self { label, probability_no, probability_yes }
    }
}

/// Run `classifier` over every row of the reduced matrix.
pub fn predict(classifier: &dyn Classifier, reduced: ArrayView2<f64>) -> Result<Vec<Prediction>> {
    if reduced.ncols() != classifier.n_features() {
        return Err(PipelineError::Transform {
            stage: "classifier",
            expected: classifier.n_features(),
            actual: reduced.ncols(),
        });
    }
    Ok(reduced
        .rows()
        .into_iter()
        .map(|row| Prediction::from_proba(classifier.predict_proba(row)))
        .collect())
}

/// Parse a bare JSON accuracy value.
pub(crate) fn parse_accuracy(contents: &str) -> anyhow::Result<f64> {
    serde_json::from_str::<f64>(contents.trim()).context("Accuracy artifact is not a JSON number")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Root splits on feature 0 at 0.5; the right branch splits on feature 1 at 1.0.
    fn tree() -> DecisionTree {
        DecisionTree::new(
            2,
            vec![1, -1, 3, -1, -1],
            vec![2, -1, 4, -1, -1],
            vec![0, -2, 1, -2, -2],
            vec![0.5, -2.0, 1.0, -2.0, -2.0],
            vec![
                vec![120.0, 80.0],
                vec![80.0, 20.0],
                vec![40.0, 60.0],
                vec![30.0, 70.0],
                vec![10.0, 90.0],
            ],
        )
        .unwrap()
    }

    fn stump(threshold: f64, left: [f64; 2], right: [f64; 2]) -> DecisionTree {
        DecisionTree::new(
            2,
            vec![1, -1, -1],
            vec![2, -1, -1],
            vec![0, -2, -2],
            vec![threshold, -2.0, -2.0],
            vec![vec![1.0, 1.0], left.to_vec(), right.to_vec()],
        )
        .unwrap()
    }

    #[test]
    fn model_id_as_str_roundtrip() {
        for id in ModelId::all() {
            let parsed = ModelId::try_from(id.as_str()).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn model_id_accepts_aliases() {
        assert_eq!(ModelId::try_from("Random-Forest").unwrap(), ModelId::Forest);
        assert_eq!(ModelId::try_from("DT").unwrap(), ModelId::Tree);
    }

    #[test]
    fn unknown_model_error() {
        let err = ModelId::try_from("svm").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownModel(ref name) if name == "svm"));
    }

    #[test]
    fn tree_follows_thresholds_to_leaves() {
        let tree = tree();
        assert_eq!(tree.predict_proba(array![0.5, 9.0].view()), [0.8, 0.2]);
        assert_eq!(tree.predict_proba(array![0.6, 1.0].view()), [0.3, 0.7]);
        assert_eq!(tree.predict_proba(array![0.6, 1.1].view()), [0.1, 0.9]);
    }

    #[test]
    fn split_compares_at_f32_precision() {
        let tree = tree();
        // Rounds to exactly 0.5 in f32, so it goes left like the fitted model.
        assert_eq!(tree.predict_proba(array![0.5 + 1e-9, 9.0].view()), [0.8, 0.2]);
        assert_eq!(tree.predict_proba(array![0.5 + 1e-6, 9.0].view()), [0.1, 0.9]);
    }

    #[test]
    #[should_panic]
    fn predict_proba_panics_on_short_row() {
        tree().predict_proba(array![0.6].view());
    }

    #[test]
    fn forest_averages_tree_probabilities() {
        let forest =
            RandomForest::new(2, vec![tree(), stump(0.0, [0.9, 0.1], [0.4, 0.6])]).unwrap();
        let p = forest.predict_proba(array![0.0, 0.0].view());
        assert!((p[0] - 0.85).abs() < 1e-12);
        assert!((p[1] - 0.15).abs() < 1e-12);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let forest =
            RandomForest::new(2, vec![tree(), stump(0.2, [0.3, 0.6], [0.7, 0.2])]).unwrap();
        let rows = array![[0.0, 0.0], [0.3, 2.0], [4.0, -1.0], [4.0, 4.0]];
        for prediction in predict(&forest, rows.view()).unwrap() {
            assert!((prediction.probability_no + prediction.probability_yes - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn label_is_argmax_with_ties_to_no() {
        assert_eq!(Prediction::from_proba([0.2, 0.8]).label, RainLabel::Yes);
        assert_eq!(Prediction::from_proba([0.8, 0.2]).label, RainLabel::No);
        assert_eq!(Prediction::from_proba([0.5, 0.5]).label, RainLabel::No);

        let tied = stump(0.0, [2.0, 2.0], [1.0, 3.0]);
        let out = predict(&tied, array![[-1.0, 0.0]].view()).unwrap();
        assert_eq!(out[0].label, RainLabel::No);
        assert_eq!(out[0].probability_yes, 0.5);
    }

    #[test]
    fn predict_rejects_wrong_width() {
        let err = predict(&tree(), array![[0.0, 0.0, 0.0]].view()).unwrap_err();
        assert!(matches!(err, PipelineError::Transform { stage: "classifier", .. }));
    }

    #[test]
    fn tree_rejects_out_of_range_feature() {
        let err = DecisionTree::new(
            1,
            vec![1, -1, -1],
            vec![2, -1, -1],
            vec![3, -2, -2],
            vec![0.0, -2.0, -2.0],
            vec![vec![1.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid feature"));
    }

    #[test]
    fn tree_rejects_empty_leaf() {
        let err = DecisionTree::new(
            1,
            vec![-1],
            vec![-1],
            vec![-2],
            vec![-2.0],
            vec![vec![0.0, 0.0]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("no class weight"));
    }

    #[test]
    fn tree_deserializes_from_node_arrays() {
        let json = r#"{
            "n_features": 1,
            "children_left": [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature": [0, -2, -2],
            "threshold": [0.0, -2.0, -2.0],
            "value": [[5, 5], [4, 1], [1, 4]]
        }"#;
        let tree: DecisionTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.n_nodes(), 3);
        assert_eq!(tree.predict_proba(array![1.0].view()), [0.2, 0.8]);
    }

    #[test]
    fn accuracy_is_looked_up_per_model() {
        let accuracy = ModelAccuracy::new(0.85, 0.79).unwrap();
        assert_eq!(accuracy.for_model(ModelId::Forest), 0.85);
        assert_eq!(accuracy.for_model(ModelId::Tree), 0.79);
        assert!(ModelAccuracy::new(1.2, 0.5).is_err());
    }

    #[test]
    fn accuracy_artifact_is_a_bare_number() {
        assert_eq!(parse_accuracy("0.8412\n").unwrap(), 0.8412);
        assert!(parse_accuracy("\"high\"").is_err());
    }
}
