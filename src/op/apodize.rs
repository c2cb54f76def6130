//! Deconvolution of the gridding kernel from the image.
//!
//! The table is the kernel's own response in image space: the discrete
//! Fourier transform of the zero-offset footprint, over the oversampled grid,
//! evaluated at each image voxel. It is summed one axis at a time in double
//! precision. Images are divided by it in both directions, so the operator is
//! self-adjoint.

pub struct Apodize {
    shape: Ix5,
    table: Re3,
}

impl Apodize {

    pub fn new<K: Kernel>(kernel: &K, n_channels: usize, n_basis: usize, matrix: Sz3, grid: Sz3) -> Result<Self> {
        let mut weights = kernel.buffer();
        kernel.evaluate([0.0; 3], &mut weights);
        let width = kernel.shape();

        // `phase[d][[ρ, t]]`: tap `t` sits `t - W/2` cells from the sample
        let phase: [Array2<C64>; 3] = std::array::from_fn(|d| {
            let (m, w, n) = (matrix[d], width[d], grid[d] as f64);
            Array2::from_shape_fn((m, w), |(rho, t)| {
                let rho = rho as f64 - centre(m) as f64;
                let t = t as f64 - (w / 2) as f64;
                C64::from_polar(1.0, 2.0 * PI * rho * t / n)
            })
        });
        let [m0, m1, m2] = matrix;
        let [w0, w1, w2] = width;
        let a0 = Array3::from_shape_fn((m0, w1, w2), |(r0, t1, t2)| {
            (0..w0).map(|t0| phase[0][[r0, t0]] * weights[[t0, t1, t2]] as f64).sum::<C64>()
        });
        let a1 = Array3::from_shape_fn((m0, m1, w2), |(r0, r1, t2)| {
            (0..w1).map(|t1| phase[1][[r1, t1]] * a0[[r0, t1, t2]]).sum::<C64>()
        });
        let response = Array3::from_shape_fn((m0, m1, m2), |(r0, r1, r2)| {
            (0..w2).map(|t2| phase[2][[r2, t2]] * a1[[r0, r1, t2]]).sum::<C64>().re
        });

        let (lo, hi) = response.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &a| (lo.min(a), hi.max(a)));
        if !(lo > 0.0 && hi.is_finite()) {
            return Err(GridError::config(format!(
                "kernel response is not positive over the image: range [{lo:e}, {hi:e}]"
            )))
        }
        debug!("Apodization range [{lo:.4e}, {hi:.4}]");

        let table = response.mapv(|a| a as f32);
        Ok(Self { shape: Dim([n_channels, n_basis, m0, m1, m2]), table })
    }

    pub fn table(&self) -> &Re3 { &self.table }

    fn divide(&self, x: Cx5View) -> Cx5 {
        let mut y = x.to_owned();
        for mut channel in y.outer_iter_mut() {
            for mut volume in channel.outer_iter_mut() {
                Zip::from(&mut volume).and(&self.table).for_each(|v, &a| *v /= a);
            }
        }
        y
    }
}

impl Operator for Apodize {
    type I = Ix5;
    type O = Ix5;

    fn name(&self) -> &str { "Apodize" }
    fn ishape(&self) -> Ix5 { self.shape }
    fn oshape(&self) -> Ix5 { self.shape }

    fn forward(&self, x: Cx5View) -> Result<Cx5> {
        self.check_input(&x)?;
        Ok(self.divide(x))
    }

    fn adjoint(&self, y: Cx5View) -> Result<Cx5> {
        self.check_output(&y)?;
        Ok(self.divide(y))
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::f64::consts::PI;

use ndarray::{Array2, Array3, Dim, Ix5, Zip};
use num_complex::Complex64 as C64;
use tracing::debug;

use geometry::centre;

use crate::{
    error::{GridError, Result},
    kernel::Kernel,
    types::{Cx5, Cx5View, Re3, Sz3},
};

use super::Operator;
