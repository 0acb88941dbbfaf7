//! # Pipeline Settings
//!
//! Global settings that the coordinators compare against their cached copies
//! every frame. A change in any value the shadow path depends on is picked up
//! as resource drift and triggers a rebuild on the next frame.
//!
//! ## Design Goals
//!
//! - **Serializable**: loads from TOML or RON through [`Config`]
//! - **Forgiving**: every field has a default, partial files are fine
//! - **Validated**: [`PipelineSettings::validate`] rejects values the pipeline cannot honour

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};
use crate::shadows::ShadowQuality;

/// Global shadow switch, mirroring the usual quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShadowsSetting {
    /// No shadows are baked or sampled
    Disable,
    /// Only hard shadows are sampled
    HardOnly,
    /// Hard and soft shadows
    #[default]
    All,
}

/// Quality tier settings shared by every light and viewpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    /// Multi-sample level (1, 2, 4 or 8)
    pub anti_aliasing: u32,
    /// Global shadow switch
    pub shadows: ShadowsSetting,
    /// Shadow resolution used by lights that defer to the quality settings
    pub shadow_resolution: ShadowQuality,
    /// Number of directional cascades (1, 2 or 4)
    pub shadow_cascades: u32,
    /// Split point for two cascades, as a fraction of the shadow distance
    pub cascade_2_split: f32,
    /// Split points for four cascades, as fractions of the shadow distance
    pub cascade_4_split: [f32; 3],
    /// Maximum distance from the viewpoint at which directional shadows are drawn
    pub shadow_distance: f32,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            anti_aliasing: 1,
            shadows: ShadowsSetting::All,
            shadow_resolution: ShadowQuality::High,
            shadow_cascades: 4,
            cascade_2_split: 1.0 / 3.0,
            cascade_4_split: [0.067, 0.2, 0.467],
            shadow_distance: 150.0,
        }
    }
}

impl QualitySettings {
    /// Number of cascades actually used; orthographic viewpoints never cascade
    pub fn effective_cascades(&self, orthographic: bool) -> usize {
        if orthographic {
            return 1;
        }
        match self.shadow_cascades {
            4 => 4,
            2 => 2,
            _ => 1,
        }
    }

    /// Cascade split points as fractions of the shadow distance, last one is always 1
    pub fn split_percents(&self, orthographic: bool) -> Vec<f32> {
        match self.effective_cascades(orthographic) {
            4 => {
                let [a, b, c] = self.cascade_4_split;
                vec![a, b, c, 1.0]
            }
            2 => vec![self.cascade_2_split, 1.0],
            _ => vec![1.0],
        }
    }
}

/// Top-level settings for the volumetric render pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Quality tier settings
    pub quality: QualitySettings,
    /// Number of viewport descriptors per swap chain (at least 2)
    pub swap_chain_length: usize,
    /// Half-width of the random sort bias given to every render bundle
    pub z_bias_range: f32,
    /// Screen max-dimension assumed before any viewpoint reports its size
    pub default_max_dimension: u32,
    /// Ask lighting shaders for a fixed ambient term instead of probes
    pub fixed_ambient_lighting: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            quality: QualitySettings::default(),
            swap_chain_length: 2,
            z_bias_range: 0.001,
            default_max_dimension: 640,
            fixed_ambient_lighting: false,
        }
    }
}

impl Config for PipelineSettings {}

impl PipelineSettings {
    /// Set the quality settings
    pub fn with_quality(mut self, quality: QualitySettings) -> Self {
        self.quality = quality;
        self
    }

    /// Set the directional cascade count
    pub fn with_shadow_cascades(mut self, cascades: u32) -> Self {
        self.quality.shadow_cascades = cascades;
        self
    }

    /// Set the global shadow switch
    pub fn with_shadows(mut self, shadows: ShadowsSetting) -> Self {
        self.quality.shadows = shadows;
        self
    }

    /// Set the multi-sample level
    pub fn with_anti_aliasing(mut self, samples: u32) -> Self {
        self.quality.anti_aliasing = samples;
        self
    }

    /// Set the swap chain length
    pub fn with_swap_chain_length(mut self, length: usize) -> Self {
        self.swap_chain_length = length;
        self
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.swap_chain_length < 2 {
            return Err(ConfigError::Invalid(format!(
                "swap_chain_length must be at least 2, got {}",
                self.swap_chain_length
            )));
        }
        if !matches!(self.quality.anti_aliasing, 1 | 2 | 4 | 8) {
            return Err(ConfigError::Invalid(format!(
                "anti_aliasing must be 1, 2, 4 or 8, got {}",
                self.quality.anti_aliasing
            )));
        }
        if !matches!(self.quality.shadow_cascades, 1 | 2 | 4) {
            return Err(ConfigError::Invalid(format!(
                "shadow_cascades must be 1, 2 or 4, got {}",
                self.quality.shadow_cascades
            )));
        }
        let splits = self.quality.cascade_4_split;
        let ordered = splits[0] > 0.0 && splits[0] < splits[1] && splits[1] < splits[2] && splits[2] < 1.0;
        if !ordered || !(self.quality.cascade_2_split > 0.0 && self.quality.cascade_2_split < 1.0) {
            return Err(ConfigError::Invalid("cascade splits must be increasing within (0, 1)".to_string()));
        }
        if self.quality.shadow_distance <= 0.0 {
            return Err(ConfigError::Invalid("shadow_distance must be positive".to_string()));
        }
        if !(0.0..0.5).contains(&self.z_bias_range) {
            return Err(ConfigError::Invalid("z_bias_range must be within [0, 0.5)".to_string()));
        }
        Ok(())
    }
}
