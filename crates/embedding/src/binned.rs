//! Binned spectrum vectors and the dense network that embeds them.
//!
//! The binned vector has one slot per fixed-width m/z bin, holding the
//! largest `intensity^intensity_power` that falls into the bin. A
//! [`BinnedDenseModel`] feeds that vector through a stack of fully connected
//! layers (weights `out x in`, bias, activation). A model without layers
//! returns the binned vector itself, which is a useful baseline and keeps
//! test fixtures small.
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use spectrum::{Peak, ProcessedSpectrum};

use crate::{EmbeddingError, EmbeddingModel};

/// Fixed-width m/z binning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Binning {
    pub mz_min: f64,
    pub mz_max: f64,
    pub bin_width: f64,
    pub intensity_power: f64,
}

impl Default for Binning {
    fn default() -> Self {
        Self {
            mz_min: 10.0,
            mz_max: 1000.0,
            bin_width: 0.1,
            intensity_power: 0.5,
        }
    }
}

impl Binning {
    pub fn new(mz_min: f64, mz_max: f64, bin_width: f64) -> Self {
        Self {
            mz_min,
            mz_max,
            bin_width,
            ..Default::default()
        }
    }

    pub fn with_intensity_power(mut self, power: f64) -> Self {
        self.intensity_power = power;
        self
    }

    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if !(self.mz_min.is_finite() && self.mz_max.is_finite() && self.bin_width.is_finite()) {
            return Err(EmbeddingError::InvalidModel(
                "binning bounds must be finite".into(),
            ));
        }
        if self.mz_max <= self.mz_min || self.bin_width <= 0.0 {
            return Err(EmbeddingError::InvalidModel(format!(
                "binning [{}, {}) with width {} is empty",
                self.mz_min, self.mz_max, self.bin_width
            )));
        }
        if !self.intensity_power.is_finite() || self.intensity_power <= 0.0 {
            return Err(EmbeddingError::InvalidModel(
                "binning intensity_power must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn n_bins(&self) -> usize {
        let raw = (self.mz_max - self.mz_min) / self.bin_width;
        let rounded = raw.round();
        // (1000 - 10) / 0.1 is 9900.000000000002 in f64
        if (raw - rounded).abs() < 1e-6 {
            rounded as usize
        } else {
            raw.ceil() as usize
        }
    }

    pub fn bin_index(&self, mz: f64) -> Option<usize> {
        if mz < self.mz_min || mz >= self.mz_max {
            return None;
        }
        let index = ((mz - self.mz_min) / self.bin_width).floor() as usize;
        (index < self.n_bins()).then_some(index)
    }

    pub fn vectorize(&self, peaks: &[Peak]) -> Vec<f32> {
        let mut bins = vec![0f32; self.n_bins()];
        for peak in peaks {
            if let Some(index) = self.bin_index(peak.mz) {
                let value = peak.intensity.powf(self.intensity_power) as f32;
                if value > bins[index] {
                    bins[index] = value;
                }
            }
        }
        bins
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

/// Fully connected layer, `y = activation(W x + b)`.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl DenseLayer {
    /// `weights` is row-major with one row per output unit.
    pub fn new(
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
        activation: Activation,
    ) -> Result<Self, EmbeddingError> {
        let rows = weights.len();
        let cols = weights.first().map(Vec::len).unwrap_or(0);
        if rows == 0 || cols == 0 {
            return Err(EmbeddingError::InvalidModel("dense layer has no weights".into()));
        }
        if weights.iter().any(|row| row.len() != cols) {
            return Err(EmbeddingError::InvalidModel(
                "dense layer rows have different lengths".into(),
            ));
        }
        if bias.len() != rows {
            return Err(EmbeddingError::InvalidModel(format!(
                "dense layer has {rows} rows but {} bias terms",
                bias.len()
            )));
        }
        let flat: Vec<f32> = weights.into_iter().flatten().collect();
        if flat.iter().chain(&bias).any(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidModel(
                "dense layer contains non-finite parameters".into(),
            ));
        }
        let weights = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| EmbeddingError::InvalidModel(e.to_string()))?;

        Ok(Self {
            weights,
            bias: Array1::from_vec(bias),
            activation,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.weights.ncols()
    }

    pub fn output_dim(&self) -> usize {
        self.weights.nrows()
    }

    fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        let mut out = self.weights.dot(input) + &self.bias;
        let activation = self.activation;
        out.mapv_inplace(|v| activation.apply(v));
        out
    }
}

/// Binned input followed by dense layers.
#[derive(Debug, Clone)]
pub struct BinnedDenseModel {
    name: String,
    binning: Binning,
    layers: Vec<DenseLayer>,
    dimension: usize,
}

impl BinnedDenseModel {
    pub fn new(
        name: impl Into<String>,
        binning: Binning,
        layers: Vec<DenseLayer>,
    ) -> Result<Self, EmbeddingError> {
        binning.validate()?;
        let mut width = binning.n_bins();
        for (position, layer) in layers.iter().enumerate() {
            if layer.input_dim() != width {
                return Err(EmbeddingError::InvalidModel(format!(
                    "layer {position} expects {} inputs but receives {width}",
                    layer.input_dim()
                )));
            }
            width = layer.output_dim();
        }
        Ok(Self {
            name: name.into(),
            binning,
            layers,
            dimension: width,
        })
    }

    pub fn binning(&self) -> &Binning {
        &self.binning
    }
}

impl EmbeddingModel for BinnedDenseModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, spectrum: &ProcessedSpectrum) -> Result<Vec<f32>, EmbeddingError> {
        let input = Array1::from_vec(self.binning.vectorize(spectrum.peaks()));
        let output = self
            .layers
            .iter()
            .fold(input, |activations, layer| layer.forward(&activations));
        Ok(output.to_vec())
    }
}
