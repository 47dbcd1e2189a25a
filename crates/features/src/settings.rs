use serde::{Deserialize, Serialize};

use crate::FeatureError;

/// Numeric parameters shared by all features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    /// Absolute peak matching tolerance in Dalton.
    pub tolerance: f64,
    /// Peak weight is `mz^mz_power * intensity^intensity_power`.
    pub mz_power: f64,
    pub intensity_power: f64,
    pub mass_similarity_base: f64,
    /// Base of the `1 - base^n` transform applied to counts.
    pub matches_transform_base: f64,
    /// Precursor m/z features are divided by this value.
    pub max_precursor_mz: f64,
    /// Closest related structures considered by neighbourhood features.
    pub neighbourhood_size: usize,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.1,
            mz_power: 0.0,
            intensity_power: 1.0,
            mass_similarity_base: 0.8,
            matches_transform_base: 0.93,
            max_precursor_mz: 13428.370894192036,
            neighbourhood_size: 10,
        }
    }
}

impl FeatureSettings {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_powers(mut self, mz_power: f64, intensity_power: f64) -> Self {
        self.mz_power = mz_power;
        self.intensity_power = intensity_power;
        self
    }

    pub fn with_neighbourhood_size(mut self, size: usize) -> Self {
        self.neighbourhood_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), FeatureError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(FeatureError::InvalidSettings("tolerance must be > 0".into()));
        }
        if !self.mz_power.is_finite() || !self.intensity_power.is_finite() {
            return Err(FeatureError::InvalidSettings(
                "mz_power and intensity_power must be finite".into(),
            ));
        }
        for (name, base) in [
            ("mass_similarity_base", self.mass_similarity_base),
            ("matches_transform_base", self.matches_transform_base),
        ] {
            if !(base > 0.0 && base < 1.0) {
                return Err(FeatureError::InvalidSettings(format!(
                    "{name} must be in (0, 1)"
                )));
            }
        }
        if !self.max_precursor_mz.is_finite() || self.max_precursor_mz <= 0.0 {
            return Err(FeatureError::InvalidSettings(
                "max_precursor_mz must be > 0".into(),
            ));
        }
        if self.neighbourhood_size == 0 {
            return Err(FeatureError::InvalidSettings(
                "neighbourhood_size must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// `1 - base^count`: 0 for no matches, approaching 1 for many.
    pub fn transform_count(&self, count: usize) -> f64 {
        1.0 - self.matches_transform_base.powi(count.min(i32::MAX as usize) as i32)
    }
}
