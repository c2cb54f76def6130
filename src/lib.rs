//! Gridding and non-uniform FFT operators for non-Cartesian MR data.
//!
//! The data flow is `Trajectory` + kernel → `Mapping` (built once) →
//! `op::Grid` (forward and adjoint, many times) → `op::Nufft`, which adds
//! apodization, padding and the FFT.

pub mod basis;
pub mod config;
pub mod error;
pub mod kernel;
pub mod mapping;
pub mod op;
pub mod threads;
pub mod trajectory;
pub mod types;
pub mod utils;

pub use basis::Basis;
pub use config::{Config, GridOpts};
pub use error::{GridError, Result};
pub use kernel::{Kernel, KernelType};
pub use mapping::{Mapping, NoncartesianIndex, Subgrid};
pub use op::{make_grid, make_nufft, realised_osamp, Operator, SampleOperator};
pub use trajectory::Trajectory;
pub use types::{Cx, Cx3, Cx5};
