//! Configuration of the gridding operators, from TOML files or the command line

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, de};

use crate::error::{GridError, Result};
use crate::kernel::KernelType;

/// Parse a field from a TOML string, via the type's `FromStr`
fn deserialize_from_str<'d, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    String::deserialize(deserializer)?
        .parse::<T>()
        .map_err(de::Error::custom)
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct GridOpts {

    /// `NN`, `KB3`, `KB5`, `KB7`, `ES3`, `ES5` or `ES7`
    #[serde(deserialize_with = "deserialize_from_str")]
    pub kernel: KernelType,

    /// Grid oversampling factor
    pub osamp: f32,

    /// Add virtual conjugate coils
    pub vcc: bool,

    /// Edge length of the subgrids which partition the parallel work
    pub subgrid_size: usize,

    /// Subgrids holding more samples than this are split into several tasks
    pub split_size: usize,

    /// Samples before this index in each trace are ignored
    pub read0: usize,

    /// Apply the normal operator through a precomputed Töplitz transfer function.
    /// Not available with virtual conjugate coils.
    pub toeplitz: bool,

    /// The NUFFT processes channels in this many groups, to bound the size of
    /// its oversampled grid. Must divide the number of channels.
    pub batches: usize,
}

impl Default for GridOpts {
    fn default() -> Self {
        Self {
            kernel: KernelType::default(),
            osamp: 2.0,
            vcc: false,
            subgrid_size: 32,
            split_size: 16384,
            read0: 0,
            toeplitz: false,
            batches: 1,
        }
    }
}

impl GridOpts {

    /// Reject combinations which cannot produce a working operator
    pub fn validate(&self) -> Result<()> {
        let width = self.kernel.width();
        if !self.osamp.is_finite() || self.osamp < 1.0 {
            return Err(GridError::config(format!("oversampling must be at least 1, got {}", self.osamp)))
        }
        if self.subgrid_size == 0 { return Err(GridError::config("subgrid size must be positive")) }
        if self.split_size   == 0 { return Err(GridError::config("split size must be positive")) }
        if self.batches      == 0 { return Err(GridError::config("at least one channel batch is needed")) }
        if self.toeplitz && self.vcc {
            return Err(GridError::config("the Töplitz embedding cannot be combined with virtual conjugate coils"))
        }
        if width > self.subgrid_size {
            return Err(GridError::config(format!(
                "kernel {} (width {width}) is wider than the subgrid size {}", self.kernel, self.subgrid_size
            )))
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {

    #[serde(default)]
    pub grid: GridOpts,

    /// Size of the worker pool; all available cores when absent
    pub threads: Option<usize>,
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<Config> {
    let config: Config = toml::from_str(text)?;
    config.grid.validate()?;
    Ok(config)
}
