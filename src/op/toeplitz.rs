//! Töplitz embedding of the NUFFT normal operator.
//!
//! With density weights `w`, `Aᴴ W A` convolves the image with the point
//! spread function `psf(d) = (1/N) Σₛ wₛ exp(2πi kₛ·d)`, where `N` is the
//! number of cells in the NUFFT's grid. Over a matrix twice the image's size
//! along each active axis that convolution is circular, so it becomes a
//! product with the Fourier transform of the PSF: the transfer function. The
//! PSF is computed once, as the adjoint of a second NUFFT over the doubled
//! matrix, on a grid twice the size of the first one.
//!
//! With a basis, each pair of basis vectors `(b', b)` has its own PSF, built
//! from the weights `wₛ conj(B_b'(s)) B_b(s)`.
//!
//! A width-1 kernel moves every sample to the centre of its cell, so the PSF
//! of a nearest-neighbour NUFFT is built from the trajectory moved the same
//! way, and the embedding reproduces its normal operator exactly.

pub struct Toeplitz {
    pad: Pad,
    fft: Fft,
    /// `(basis out, basis in, q0, q1, q2)`
    transfer: Cx5,
    name: String,
}

impl Toeplitz {

    /// `primary` is the mapping of the NUFFT whose normal operator is embedded
    pub fn new<K: Kernel>(
        kernel    : &K,
        trajectory: &Trajectory,
        primary   : &Mapping,
        n_channels: usize,
        basis     : &Basis,
        density   : &Re2,
        opts      : &GridOpts,
    ) -> Result<Self> {
        let now = Instant::now();
        let n_dims = trajectory.n_dims();
        let matrix = trajectory.matrix();
        let grid = primary.cart_dims;
        let double = |n: Sz3| -> Sz3 { std::array::from_fn(|d| if d < n_dims { 2 * n[d] } else { 1 }) };
        let (matrix2, grid2) = (double(matrix), double(grid));

        let psf_trajectory = if kernel.width() == 1 { trajectory.snapped(grid) } else { trajectory.clone() };
        let psf_trajectory = psf_trajectory.with_matrix(matrix2)?;
        let mapping = Mapping::with_grid(&psf_trajectory, kernel.width(), grid2, opts)?;
        let spreader = Grid::with_mapping(kernel.clone(), Arc::new(mapping), None, 1, Arc::new(Basis::identity()))?;
        let grid_fft = Fft::new(1, 1, grid2);
        let crop = Pad::new(1, 1, matrix2, grid2)?;
        let apodize = Apodize::new(kernel, 1, 1, matrix2, grid2)?;

        let n_basis = basis.n_basis();
        let fft = Fft::new(n_channels, n_basis, matrix2);
        let (n_cells, n_cells2, n_psf) = (n_elements(grid) as f32, n_elements(grid2) as f32, n_elements(matrix2) as f32);
        // √N₂ / N turns the adjoint NUFFT into the PSF, and √Q undoes the
        // unitary scaling of the FFT over the Q cells of the PSF
        let scale = (n_cells2 * n_psf).sqrt() / n_cells;

        let (n_samples, n_traces) = primary.noncart_dims;
        let [q0, q1, q2] = matrix2;
        let mut transfer = Cx5::zeros((n_basis, n_basis, q0, q1, q2));
        for b_out in 0..n_basis {
            for b_in in 0..n_basis {
                let weights = Cx3::from_shape_fn((1, n_samples, n_traces), |(_, s, t)| {
                    let b = basis.coefficients(s, t);
                    b[b_out].conj() * b[b_in] * density[[s, t]]
                });
                let mut k = spreader.adjoint(weights.view())?;
                grid_fft.inverse_inplace(&mut k);
                let image = crop.adjoint(k.view())?;
                let mut psf = apodize.adjoint(image.view())?;
                fft.forward_inplace(&mut psf);
                Zip::from(transfer.slice_mut(s![b_out, b_in, .., .., ..]))
                    .and(psf.slice(s![0, 0, .., .., ..]))
                    .for_each(|t, &p| *t = p * scale);
            }
        }

        let name = format!("Töplitz {matrix:?} -> {matrix2:?}");
        info!("{name}: transfer function for {n_basis}² basis pairs in {} ms", group_digits(now.elapsed().as_millis()));
        let pad = Pad::new(n_channels, n_basis, matrix, matrix2)?;
        Ok(Self { pad, fft, transfer, name })
    }

    pub fn transfer(&self) -> &Cx5 { &self.transfer }

    /// Pad, transform, multiply by the transfer function (or its Hermitian
    /// transpose over the basis pairs), transform back and crop
    fn apply(&self, x: Cx5View, adjoint: bool) -> Result<Cx5> {
        let mut k = self.pad.forward(x)?;
        self.fft.forward_inplace(&mut k);
        let mut z = Cx5::zeros(k.raw_dim());
        for (mut zc, kc) in z.outer_iter_mut().zip(k.outer_iter()) {
            for (b_out, mut zb) in zc.outer_iter_mut().enumerate() {
                for (b_in, kb) in kc.outer_iter().enumerate() {
                    let t = if adjoint { self.transfer.slice(s![b_in, b_out, .., .., ..]) }
                            else       { self.transfer.slice(s![b_out, b_in, .., .., ..]) };
                    Zip::from(&mut zb).and(&kb).and(&t).par_for_each(|z, &k, &t| {
                        let t = if adjoint { t.conj() } else { t };
                        *z += t * k;
                    });
                }
            }
        }
        self.fft.inverse_inplace(&mut z);
        self.pad.adjoint(z.view())
    }
}

impl Operator for Toeplitz {
    type I = Ix5;
    type O = Ix5;

    fn name(&self) -> &str { &self.name }
    fn ishape(&self) -> Ix5 { self.pad.ishape() }
    fn oshape(&self) -> Ix5 { self.pad.ishape() }

    fn forward(&self, x: Cx5View) -> Result<Cx5> {
        self.check_input(&x)?;
        let now = Instant::now();
        let z = self.apply(x, false)?;
        debug!("{} forward: {} ms", self.name, group_digits(now.elapsed().as_millis()));
        Ok(z)
    }

    fn adjoint(&self, y: Cx5View) -> Result<Cx5> {
        self.check_output(&y)?;
        self.apply(y, true)
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::{sync::Arc, time::Instant};

use ndarray::{s, Ix5, Zip};
use tracing::{debug, info};

use geometry::n_elements;

use crate::{
    basis::Basis,
    config::GridOpts,
    error::Result,
    kernel::Kernel,
    mapping::Mapping,
    trajectory::Trajectory,
    types::{Cx3, Cx5, Cx5View, Re2, Sz3},
    utils::group_digits,
};

use super::{Apodize, Fft, Grid, Operator, Pad};
