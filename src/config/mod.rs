use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level alignment configuration.
///
/// The four recognised options live at the top level; the nested sections
/// hold the tuning knobs of the individual stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Lowe ratio: keep a match when `d1 < ratio_threshold * d2`.
    pub ratio_threshold: f32,
    /// Minimum number of matches surviving the ratio test. A pair with
    /// exactly `min_matches` good matches is accepted; only fewer fail.
    pub min_matches: usize,
    /// Cap on keypoints per image, strongest first. `0` keeps all.
    pub max_features: usize,
    /// RANSAC reprojection tolerance in pixels.
    pub inlier_tolerance: f64,
    pub sift: SiftConfig,
    pub matcher: MatcherConfig,
    pub ransac: RansacConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub n_octave_layers: usize,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    pub sigma: f32,
    /// Double the input resolution before building the scale space.
    pub upscale_input: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Number of randomized kd-trees in the forest.
    pub trees: usize,
    /// Leaf points examined per query before the search stops.
    pub checks: usize,
    pub leaf_size: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iterations: usize,
    pub confidence: f64,
    pub refine_iterations: usize,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.7,
            min_matches: 10,
            max_features: 0,
            inlier_tolerance: 3.0,
            sift: SiftConfig::default(),
            matcher: MatcherConfig::default(),
            ransac: RansacConfig::default(),
        }
    }
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            n_octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
            upscale_input: true,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            trees: 5,
            checks: 50,
            leaf_size: 1,
            seed: 0x5eed,
        }
    }
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            confidence: 0.99,
            refine_iterations: 10,
            min_inliers: 3,
            seed: 0x5eed,
        }
    }
}

impl AlignConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config = if content.trim_start().starts_with('{') {
            serde_json::from_str(&content).context("invalid JSON configuration")?
        } else {
            toml::from_str(&content).context("invalid TOML configuration")?
        };
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> anyhow::Result<()> {
        let content = self.to_string_pretty(format)?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("failed to write config file {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn to_string_pretty(&self, format: ConfigFormat) -> anyhow::Result<String> {
        Ok(match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        })
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            errors.push("ratio_threshold must be in (0, 1]".to_string());
        }

        if self.min_matches < 2 {
            errors.push("min_matches must be at least 2".to_string());
        }

        if !(self.inlier_tolerance > 0.0 && self.inlier_tolerance.is_finite()) {
            errors.push("inlier_tolerance must be a positive number".to_string());
        }

        if self.sift.n_octave_layers == 0 {
            errors.push("sift.n_octave_layers must be positive".to_string());
        }

        if self.sift.contrast_threshold < 0.0 {
            errors.push("sift.contrast_threshold must be non-negative".to_string());
        }

        if self.sift.edge_threshold <= 1.0 {
            errors.push("sift.edge_threshold must be greater than 1.0".to_string());
        }

        if self.sift.sigma <= 0.5 {
            errors.push("sift.sigma must be greater than 0.5".to_string());
        }

        if self.matcher.trees == 0 {
            errors.push("matcher.trees must be positive".to_string());
        }

        if self.matcher.checks == 0 {
            errors.push("matcher.checks must be positive".to_string());
        }

        if self.matcher.leaf_size == 0 {
            errors.push("matcher.leaf_size must be positive".to_string());
        }

        if self.ransac.max_iterations == 0 {
            errors.push("ransac.max_iterations must be positive".to_string());
        }

        if !(self.ransac.confidence > 0.0 && self.ransac.confidence < 1.0) {
            errors.push("ransac.confidence must be in (0, 1)".to_string());
        }

        if self.ransac.min_inliers < 2 {
            errors.push("ransac.min_inliers must be at least 2".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

pub fn load_config_or_default(config_path: Option<&Path>) -> AlignConfig {
    let Some(path) = config_path else {
        return AlignConfig::default();
    };

    match AlignConfig::load_from_file(path) {
        Ok(config) => match config.validate() {
            Ok(()) => config,
            Err(errors) => {
                for error in &errors {
                    tracing::warn!(config = %path.display(), "{}", error);
                }
                tracing::warn!("configuration rejected, using defaults");
                AlignConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(config = %path.display(), error = %e, "failed to load config, using defaults");
            AlignConfig::default()
        }
    }
}
