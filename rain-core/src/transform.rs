//! Fitted scaling and dimensionality reduction, applied in training order.

use anyhow::{anyhow, ensure};
use ndarray::{Array1, Array2, ArrayView2};
use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Per-feature standardisation with statistics frozen at training time.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScalerParams {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> anyhow::Result<Self> {
        ensure!(
            mean.len() == scale.len(),
            "Scaler mean has {} entries but scale has {}",
            mean.len(),
            scale.len()
        );
        ensure!(
            mean.iter().chain(scale.iter()).all(|v| v.is_finite()),
            "Scaler statistics must be finite"
        );
        // A constant training column has scale 0; it is left unscaled.
        let scale = scale.into_iter().map(|s| if s == 0.0 { 1.0 } else { s }).collect();
        Ok(Self { mean: Array1::from_vec(mean), scale })
    }

    pub(crate) fn from_params(params: ScalerParams) -> anyhow::Result<Self> {
        Self::new(params.mean, params.scale)
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(PipelineError::Transform {
                stage: "scaler",
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        Ok((&x - &self.mean) / &self.scale)
    }
}

/// Linear projection onto principal components.
#[derive(Debug, Clone, PartialEq)]
pub struct Pca {
    mean: Array1<f64>,
    /// One row per component.
    components: Array2<f64>,
    /// Divisor per component when the reducer was fitted with whitening.
    whiten_scale: Option<Array1<f64>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PcaParams {
    mean: Vec<f64>,
    components: Vec<Vec<f64>>,
    #[serde(default)]
    explained_variance: Option<Vec<f64>>,
    #[serde(default)]
    whiten: bool,
}

impl Pca {
    pub fn new(mean: Vec<f64>, components: Vec<Vec<f64>>) -> anyhow::Result<Self> {
        let n_features = mean.len();
        let n_components = components.len();
        ensure!(n_components > 0, "Reducer has no components");
        ensure!(
            components.iter().all(|row| row.len() == n_features),
            "Every reducer component must have {n_features} entries"
        );

        let flat: Vec<f64> = components.into_iter().flatten().collect();
        let components = Array2::from_shape_vec((n_components, n_features), flat)?;
        Ok(Self { mean: Array1::from_vec(mean), components, whiten_scale: None })
    }

    /// Enable whitening with the explained variance of each component.
    pub fn whitened(mut self, explained_variance: Vec<f64>) -> anyhow::Result<Self> {
        ensure!(
            explained_variance.len() == self.n_components(),
            "Reducer whitening needs {} variances, got {}",
            self.n_components(),
            explained_variance.len()
        );
        ensure!(
            explained_variance.iter().all(|v| *v > 0.0),
            "Reducer explained variance must be positive"
        );
        self.whiten_scale = Some(explained_variance.into_iter().map(f64::sqrt).collect());
        Ok(self)
    }

    pub(crate) fn from_params(params: PcaParams) -> anyhow::Result<Self> {
        let pca = Self::new(params.mean, params.components)?;
        if !params.whiten {
            return Ok(pca);
        }
        let variance = params
            .explained_variance
            .ok_or_else(|| anyhow!("Whitened reducer is missing explained_variance"))?;
        pca.whitened(variance)
    }

    pub fn n_features(&self) -> usize {
        self.components.ncols()
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(PipelineError::Transform {
                stage: "reducer",
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        let projected = (&x - &self.mean).dot(&self.components.t());
        Ok(match &self.whiten_scale {
            Some(scale) => projected / scale,
            None => projected,
        })
    }
}

/// Scaler followed by reducer. The reducer was fitted on scaled data.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformChain {
    scaler: StandardScaler,
    reducer: Pca,
}

impl TransformChain {
    pub fn new(scaler: StandardScaler, reducer: Pca) -> anyhow::Result<Self> {
        ensure!(
            scaler.n_features() == reducer.n_features(),
            "Scaler produces {} columns but reducer expects {}",
            scaler.n_features(),
            reducer.n_features()
        );
        Ok(Self { scaler, reducer })
    }

    pub fn input_width(&self) -> usize {
        self.scaler.n_features()
    }

    pub fn output_width(&self) -> usize {
        self.reducer.n_components()
    }

    pub fn apply(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let scaled = self.scaler.transform(x)?;
        let reduced = self.reducer.transform(scaled.view())?;
        tracing::debug!(
            rows = reduced.nrows(),
            width = reduced.ncols(),
            "applied transform chain"
        );
        Ok(reduced)
    }
}
