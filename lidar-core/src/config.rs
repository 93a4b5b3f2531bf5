//! TOML configuration named by `LIDARVIEWER_CONFIGFILENAME`.
use crate::accumulator::AccumulatorSettings;
use crate::builder::BuildSettings;
use crate::error::ConfigError;
use crate::reader::lod::LodSettings;
use crate::reader::ReaderOptions;
use constants::files::CONFIG_FILE_ENV_VAR;
use constants::{preprocessor, viewer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

const MIB: usize = 1024 * 1024;

/// The `[LidarPreprocessor]` section; sizes in MiB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreprocessorConfig {
    pub memory_cache_size: usize,
    #[serde(rename = "tempOctreeMaxNumPointsPerNode")]
    pub temp_octree_max_points_per_node: u32,
    #[serde(rename = "tempOctreeFileNameTemplate")]
    pub temp_octree_template: String,
    #[serde(rename = "maxNumPointsPerNode")]
    pub max_points_per_node: u32,
    pub num_threads: usize,
    #[serde(rename = "tempPointFileNameTemplate")]
    pub temp_point_template: String,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: preprocessor::DEFAULT_MEMORY_CACHE_SIZE_MIB,
            temp_octree_max_points_per_node: preprocessor::DEFAULT_TEMP_OCTREE_MAX_POINTS_PER_NODE,
            temp_octree_template: preprocessor::DEFAULT_TEMP_OCTREE_TEMPLATE.to_string(),
            max_points_per_node: preprocessor::DEFAULT_MAX_POINTS_PER_NODE,
            num_threads: preprocessor::DEFAULT_NUM_THREADS,
            temp_point_template: preprocessor::DEFAULT_TEMP_POINT_TEMPLATE.to_string(),
        }
    }
}

impl PreprocessorConfig {
    pub fn accumulator_settings(&self) -> AccumulatorSettings {
        AccumulatorSettings {
            memory_size: self.memory_cache_size * MIB,
            temp_octree_max_points_per_node: self.temp_octree_max_points_per_node,
            temp_octree_template: self.temp_octree_template.clone(),
        }
    }

    pub fn build_settings(&self) -> BuildSettings {
        BuildSettings {
            max_points_per_node: self.max_points_per_node,
            num_threads: self.num_threads,
            memory_size: self.memory_cache_size * MIB,
            temp_point_template: self.temp_point_template.clone(),
            ..Default::default()
        }
    }
}

/// The `[LidarViewer]` section; sizes in MiB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerConfig {
    pub memory_cache_size: usize,
    pub graphics_cache_size: usize,
    pub render_quality: f64,
    pub focus_and_context_weight: f64,
    pub lod_threshold: f64,
    pub default_selector_radius: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: viewer::DEFAULT_MEMORY_CACHE_SIZE_MIB,
            graphics_cache_size: viewer::DEFAULT_GRAPHICS_CACHE_SIZE_MIB,
            render_quality: viewer::DEFAULT_RENDER_QUALITY,
            focus_and_context_weight: viewer::DEFAULT_FOCUS_AND_CONTEXT_WEIGHT,
            lod_threshold: viewer::DEFAULT_LOD_THRESHOLD,
            default_selector_radius: viewer::DEFAULT_SELECTOR_RADIUS,
        }
    }
}

impl ViewerConfig {
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            memory_cache_size: self.memory_cache_size * MIB,
            graphics_cache_size: self.graphics_cache_size * MIB,
            colors_path: None,
        }
    }

    pub fn lod_settings(&self) -> LodSettings {
        LodSettings {
            render_quality: self.render_quality,
            focus_weight: self.focus_and_context_weight,
            threshold: self.lod_threshold,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "LidarPreprocessor")]
    pub preprocessor: PreprocessorConfig,
    #[serde(rename = "LidarViewer")]
    pub viewer: ViewerConfig,
}

impl Config {
    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    /// Load `path` if it exists; unreadable or malformed files are reported and replaced by defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{e}; using built-in defaults");
                Self::default()
            }
        }
    }

    /// Path named by the environment, if any.
    pub fn env_path() -> Option<PathBuf> {
        std::env::var_os(CONFIG_FILE_ENV_VAR).map(PathBuf::from)
    }

    /// Configuration from the file named by the environment, or the defaults.
    pub fn from_env() -> Self {
        Self::env_path()
            .map(|path| Self::load_or_default(&path))
            .unwrap_or_default()
    }
}
