//! Loading of the fitted artifacts shared by every prediction.

use anyhow::{Context, Result, ensure};
use serde::de::DeserializeOwned;
use std::{collections::HashMap, fs, path::Path};

use crate::{
    classifier::{Classifier, DecisionTree, ModelAccuracy, ModelId, RandomForest, parse_accuracy},
    encoding::CategoricalEncoder,
    features::FEATURE_COUNT,
    transform::{Pca, PcaParams, ScalerParams, StandardScaler, TransformChain},
};

pub const SCALER_FILE: &str = "scaler.json";
pub const REDUCER_FILE: &str = "pca_transformer.json";
pub const FOREST_FILE: &str = "random_forest_classifier_pca.json";
pub const TREE_FILE: &str = "decision_tree_classifier_pca.json";
pub const ENCODERS_FILE: &str = "label_encoders.json";
pub const FOREST_ACCURACY_FILE: &str = "accuracy_rf.json";
pub const TREE_ACCURACY_FILE: &str = "accuracy_dt.json";

/// Everything the pipeline needs from training. Read-only once built.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    chain: TransformChain,
    forest: RandomForest,
    tree: DecisionTree,
    encoders: CategoricalEncoder,
    accuracy: ModelAccuracy,
}

impl ModelBundle {
    /// Assemble a bundle from parts, checking that their shapes line up.
    pub fn new(
        chain: TransformChain,
        forest: RandomForest,
        tree: DecisionTree,
        encoders: CategoricalEncoder,
        accuracy: ModelAccuracy,
    ) -> Result<Self> {
        ensure!(
            chain.input_width() == FEATURE_COUNT,
            "Scaler expects {} feature columns, the pipeline produces {FEATURE_COUNT}",
            chain.input_width()
        );
        for (id, classifier) in [
            (ModelId::Forest, &forest as &dyn Classifier),
            (ModelId::Tree, &tree as &dyn Classifier),
        ] {
            ensure!(
                classifier.n_features() == chain.output_width(),
                "{} expects {} inputs but the reducer produces {}",
                id.display_name(),
                classifier.n_features(),
                chain.output_width()
            );
        }

        Ok(Self { chain, forest, tree, encoders, accuracy })
    }

    /// Load all artifacts from `dir`. Any missing or malformed file is fatal.
    pub fn load(dir: &Path) -> Result<Self> {
        ensure!(dir.is_dir(), "Model artifact directory not found: {}", dir.display());

        let scaler = StandardScaler::from_params(read_json::<ScalerParams>(dir, SCALER_FILE)?)
            .with_context(|| format!("Invalid scaler in {SCALER_FILE}"))?;
        let reducer = Pca::from_params(read_json::<PcaParams>(dir, REDUCER_FILE)?)
            .with_context(|| format!("Invalid reducer in {REDUCER_FILE}"))?;
        let chain = TransformChain::new(scaler, reducer)?;

        let forest: RandomForest = read_json(dir, FOREST_FILE)?;
        let tree: DecisionTree = read_json(dir, TREE_FILE)?;

        let tables: HashMap<String, Vec<String>> = read_json(dir, ENCODERS_FILE)?;
        let encoders = CategoricalEncoder::from_tables(tables)
            .with_context(|| format!("Invalid encoders in {ENCODERS_FILE}"))?;

        let accuracy = ModelAccuracy::new(
            read_accuracy(dir, FOREST_ACCURACY_FILE)?,
            read_accuracy(dir, TREE_ACCURACY_FILE)?,
        )?;

        let bundle = Self::new(chain, forest, tree, encoders, accuracy)
            .with_context(|| format!("Inconsistent model artifacts in {}", dir.display()))?;

        tracing::info!(
            dir = %dir.display(),
            reduced_width = bundle.chain.output_width(),
            forest_trees = bundle.forest.n_estimators(),
            tree_nodes = bundle.tree.n_nodes(),
            encoders = bundle.encoders.fields().count(),
            "loaded model bundle"
        );

        Ok(bundle)
    }

    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    pub fn encoders(&self) -> &CategoricalEncoder {
        &self.encoders
    }

    pub fn classifier(&self, model: ModelId) -> &dyn Classifier {
        match model {
            ModelId::Forest => &self.forest,
            ModelId::Tree => &self.tree,
        }
    }

    pub fn accuracy(&self) -> &ModelAccuracy {
        &self.accuracy
    }
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let path = dir.join(name);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read model artifact: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse model artifact: {}", path.display()))
}

fn read_accuracy(dir: &Path, name: &str) -> Result<f64> {
    let path = dir.join(name);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read model artifact: {}", path.display()))?;
    parse_accuracy(&contents).with_context(|| format!("Invalid accuracy in {}", path.display()))
}
