//! Subspace (temporal) basis: each sample is associated with a vector of
//! `n_basis` complex coefficients, and the Cartesian grid carries one image
//! per coefficient.
//!
//! Coefficients are tabulated over a `(sample_period, trace_period)` tile and
//! looked up modulo that tile, so short tables repeat along long acquisitions.

#[derive(Clone, Debug, PartialEq)]
pub struct Basis {
    /// `(n_basis, sample_period, trace_period)`
    coefficients: Cx3,
}

impl Basis {

    pub fn new(coefficients: Cx3) -> Result<Self> {
        let (n_basis, n_samples, n_traces) = coefficients.dim();
        if n_basis == 0 || n_samples == 0 || n_traces == 0 {
            return Err(GridError::basis(format!(
                "every axis needs at least one entry, got {:?}", coefficients.dim()
            )))
        }
        Ok(Self { coefficients })
    }

    /// A single coefficient of one: no subspace
    pub fn identity() -> Self {
        Self { coefficients: Cx3::from_elem((1, 1, 1), Cx::new(1.0, 0.0)) }
    }

    pub fn n_basis      (&self) -> usize { self.coefficients.dim().0 }
    pub fn sample_period(&self) -> usize { self.coefficients.dim().1 }
    pub fn trace_period (&self) -> usize { self.coefficients.dim().2 }

    #[inline]
    pub fn coefficients(&self, sample: usize, trace: usize) -> ArrayView1<Cx> {
        let s = sample % self.sample_period();
        let t = trace  % self.trace_period();
        self.coefficients.slice(s![.., s, t])
    }

    pub fn conjugate(&self) -> Self {
        Self { coefficients: self.coefficients.mapv(|c| c.conj()) }
    }

    /// A basis is compatible with an acquisition when its period along each
    /// axis divides (or equals) the acquisition's extent along that axis, or
    /// is 1.
    pub fn check_period(&self, n_samples: usize, n_traces: usize) -> Result<()> {
        let fits = |period: usize, n: usize| period == 1 || n % period == 0;
        if fits(self.sample_period(), n_samples) && fits(self.trace_period(), n_traces) {
            Ok(())
        } else {
            Err(GridError::basis(format!(
                "periods ({}, {}) do not tile an acquisition of {n_samples} samples x {n_traces} traces",
                self.sample_period(), self.trace_period(),
            )))
        }
    }
}

impl Default for Basis {
    fn default() -> Self { Self::identity() }
}

// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{s, ArrayView1};

use crate::{
    error::{GridError, Result},
    types::{Cx, Cx3},
};
