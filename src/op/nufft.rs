//! Non-uniform FFT: apodization, padding to the oversampled grid, FFT and
//! gridding, composed into one operator from images to samples.
//!
//! Channels may be processed in batches, each through the same gridding
//! operator sized for one batch, so that only one batch's oversampled grid is
//! held at a time. With the Töplitz embedding, the normal operator skips the
//! gridding altogether (see `Toeplitz`).

pub struct Nufft<K: Kernel> {
    /// Sized for one batch of channels
    grid: Grid<K>,
    pad: Pad,
    fft: Fft,
    apodize: Apodize,
    toeplitz: Option<Toeplitz>,
    batches: usize,
    name: String,
}

impl<K: Kernel> Nufft<K> {

    /// `kernel` should have been built for the oversampling which the grid
    /// actually realises (see `realised_osamp`)
    pub fn new(
        kernel    : K,
        trajectory: &Trajectory,
        n_channels: usize,
        basis     : Option<Basis>,
        density   : Option<Re2>,
        opts      : &GridOpts,
    ) -> Result<Self> {
        opts.validate()?;
        let batches = opts.batches;
        if n_channels % batches != 0 {
            return Err(GridError::config(format!("{n_channels} channels cannot be split into {batches} equal batches")))
        }
        let grid = Grid::new(kernel, trajectory, n_channels / batches, basis, opts)?;

        let gshape = grid.ishape();
        let (n_grid_channels, n_basis) = (gshape[0], gshape[1]);
        let matrix = trajectory.matrix();
        let cart_dims = grid.mapping().cart_dims;
        let pad = Pad::new(n_grid_channels, n_basis, matrix, cart_dims)?;
        let fft = Fft::new(n_grid_channels, n_basis, cart_dims);
        let apodize = Apodize::new(grid.kernel(), n_grid_channels, n_basis, matrix, cart_dims)?;

        let name = format!("NUFFT {:?} -> {:?}", matrix, cart_dims);
        if batches > 1 { info!("{name}: {n_channels} channels in {batches} batches") }
        let toeplitz = if opts.toeplitz {
            let (n_samples, n_traces) = grid.mapping().noncart_dims;
            let density = density.unwrap_or_else(|| Re2::ones((n_samples, n_traces)));
            check_shape(&name, "density", &[n_samples, n_traces], density.shape())?;
            Some(Toeplitz::new(grid.kernel(), trajectory, grid.mapping(), n_channels, grid.basis(), &density, opts)?)
        } else {
            if density.is_some() { debug!("{name}: density weights are only used by the Töplitz embedding") }
            None
        };
        Ok(Self { grid, pad, fft, apodize, toeplitz, batches, name })
    }

    pub fn grid(&self) -> &Grid<K> { &self.grid }
    pub fn apodization(&self) -> &Re3 { self.apodize.table() }
    pub fn toeplitz(&self) -> Option<&Toeplitz> { self.toeplitz.as_ref() }

    /// Sample channels handled by each batch
    fn batch_size(&self) -> usize { self.grid.oshape()[0] }

    /// Image channels of one batch, in the order the batch's grid holds them:
    /// with virtual conjugate coils, the conjugate channels follow the primary ones
    fn image_channels(&self, batch: usize) -> Vec<usize> {
        let size = self.batch_size();
        let primary = batch * size..(batch + 1) * size;
        if self.grid.has_vcc() {
            let n_channels = size * self.batches;
            primary.clone().chain(primary.map(|c| c + n_channels)).collect()
        } else {
            primary.collect()
        }
    }
}

impl<K: Kernel> Operator for Nufft<K> {
    type I = Ix5;
    type O = Ix3;

    fn name(&self) -> &str { &self.name }

    fn ishape(&self) -> Ix5 {
        let mut shape = self.apodize.ishape();
        shape[0] *= self.batches;
        shape
    }

    fn oshape(&self) -> Ix3 {
        let mut shape = self.grid.oshape();
        shape[0] *= self.batches;
        shape
    }

    fn forward(&self, x: Cx5View) -> Result<Cx3> {
        self.check_input(&x)?;
        let now = Instant::now();
        let size = self.batch_size();
        let mut y = Cx3::zeros(self.oshape());
        for batch in 0..self.batches {
            let xb = x.select(Axis(0), &self.image_channels(batch));
            let image = self.apodize.forward(xb.view())?;
            let mut k = self.pad.forward(image.view())?;
            self.fft.forward_inplace(&mut k);
            self.grid.iforward(k.view(), y.slice_mut(s![batch * size..(batch + 1) * size, .., ..]))?;
        }
        debug!("{} forward: {} ms", self.name, group_digits(now.elapsed().as_millis()));
        Ok(y)
    }

    fn adjoint(&self, y: Cx3View) -> Result<Cx5> {
        self.check_output(&y)?;
        let now = Instant::now();
        let size = self.batch_size();
        let mut x = Cx5::zeros(self.ishape());
        for batch in 0..self.batches {
            let mut k = self.grid.adjoint(y.slice(s![batch * size..(batch + 1) * size, .., ..]))?;
            self.fft.inverse_inplace(&mut k);
            let image = self.pad.adjoint(k.view())?;
            let xb = self.apodize.adjoint(image.view())?;
            for (from, to) in self.image_channels(batch).into_iter().enumerate() {
                x.index_axis_mut(Axis(0), to).assign(&xb.index_axis(Axis(0), from));
            }
        }
        debug!("{} adjoint: {} ms", self.name, group_digits(now.elapsed().as_millis()));
        Ok(x)
    }

    fn adjoint_forward(&self, x: Cx5View) -> Result<Cx5> {
        match &self.toeplitz {
            Some(toeplitz) => {
                self.check_input(&x)?;
                toeplitz.forward(x)
            }
            None => {
                let y = self.forward(x)?;
                self.adjoint(y.view())
            }
        }
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::time::Instant;

use ndarray::{s, Axis, Ix3, Ix5};
use tracing::{debug, info};

use crate::{
    basis::Basis,
    config::GridOpts,
    error::{check_shape, GridError, Result},
    kernel::Kernel,
    trajectory::Trajectory,
    types::{Cx3, Cx3View, Cx5, Cx5View, Re2, Re3},
    utils::group_digits,
};

use super::{Apodize, Fft, Grid, Operator, Pad, Toeplitz};

// ------------------------------ TESTS ------------------------------
#[cfg(test)]
mod test {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use ndarray::Dimension;
    use float_eq::assert_float_eq;
    use crate::kernel::{KernelType, NearestNeighbour, Separable, ExpSemicircle};
    use crate::trajectory::archimedean_spiral;
    use crate::error::GridError;
    use crate::types::Cx;

    fn spiral(m: usize) -> Trajectory {
        Trajectory::isotropic(archimedean_spiral(m, 4 * m * m), m).unwrap()
    }

    #[test]
    fn shapes_follow_matrix_and_samples() {
        let traj = spiral(8);
        let opts = GridOpts { subgrid_size: 8, ..GridOpts::default() };
        let nufft = Nufft::new(Separable::<ExpSemicircle, 3>::new(3, 2.0), &traj, 2, None, None, &opts).unwrap();
        assert_eq!(nufft.ishape().slice(), &[2, 1, 8, 8, 8]);
        assert_eq!(nufft.oshape().slice(), &[2, 8, 256]);
        assert_eq!(nufft.grid().ishape().slice(), &[2, 1, 16, 16, 16]);
        assert!(nufft.toeplitz().is_none());

        let x = Cx5::from_elem(nufft.ishape(), Cx::new(1.0, 0.0));
        assert_eq!(nufft.forward(x.view()).unwrap().shape(), nufft.oshape().slice());
        let y = Cx3::from_elem(nufft.oshape(), Cx::new(1.0, 0.0));
        assert_eq!(nufft.adjoint(y.view()).unwrap().shape(), nufft.ishape().slice());
    }

    #[test]
    fn centre_sample_of_a_flat_image_is_its_dc() {
        // With NN and osamp 1 the NUFFT is just a (unitary) FFT at the sample locations
        let traj = spiral(8);
        let opts = GridOpts { kernel: KernelType::NearestNeighbour, osamp: 1.0, subgrid_size: 8, ..GridOpts::default() };
        let nufft = Nufft::new(NearestNeighbour::new(3), &traj, 1, None, None, &opts).unwrap();
        let x = Cx5::from_elem(nufft.ishape(), Cx::new(1.0, 0.0));
        let y = nufft.forward(x.view()).unwrap();
        assert_float_eq!(y[[0, 0, 0]].re, (512.0_f32).sqrt(), rmax <= 1e-4);
    }

    fn wavy(shape: Ix5) -> Cx5 {
        Cx5::from_shape_fn(shape, |(c, b, i, j, k)| {
            let t = (i * 37 + j * 11 + k * 5 + c * 3 + b * 7) as f32;
            Cx::new(t.sin(), (0.3 * t).cos())
        })
    }

    #[test]
    fn toeplitz_matches_nearest_neighbour_normal_operator() {
        let traj = spiral(6);
        let opts = GridOpts { kernel: KernelType::NearestNeighbour, toeplitz: true, osamp: 1.0, subgrid_size: 8, ..GridOpts::default() };
        let nufft = Nufft::new(NearestNeighbour::new(3), &traj, 1, None, None, &opts).unwrap();
        // The NUFFT keeps its own grid; the embedding lives on the doubled matrix
        assert_eq!(nufft.grid().mapping().cart_dims, [6, 6, 6]);
        assert_eq!(nufft.toeplitz().map(|t| t.transfer().shape().to_vec()), Some(vec![1, 1, 12, 12, 12]));

        let x = wavy(nufft.ishape());
        let fast = nufft.adjoint_forward(x.view()).unwrap();
        let slow = nufft.adjoint(nufft.forward(x.view()).unwrap().view()).unwrap();
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert_float_eq!(a.re, b.re, abs <= 1e-4);
            assert_float_eq!(a.im, b.im, abs <= 1e-4);
        }
    }

    #[test]
    fn batches_give_the_same_result_as_one_pass() {
        let traj = spiral(6);
        let opts = GridOpts { vcc: true, subgrid_size: 8, ..GridOpts::default() };
        let kernel = Separable::<ExpSemicircle, 3>::new(3, 2.0);
        let whole   = Nufft::new(kernel, &traj, 4, None, None, &opts).unwrap();
        let batched = Nufft::new(kernel, &traj, 4, None, None, &GridOpts { batches: 2, ..opts }).unwrap();
        assert_eq!(batched.ishape(), whole.ishape());
        assert_eq!(batched.oshape(), whole.oshape());
        assert_eq!(batched.grid().ishape()[0], 4);
        assert_eq!(whole  .grid().ishape()[0], 8);

        let x = wavy(whole.ishape());
        let y = whole.forward(x.view()).unwrap();
        assert_eq!(batched.forward(x.view()).unwrap(), y);
        let (a, b) = (whole.adjoint(y.view()).unwrap(), batched.adjoint(y.view()).unwrap());
        for (a, b) in a.iter().zip(b.iter()) {
            assert_float_eq!(a.re, b.re, abs <= 1e-5);
            assert_float_eq!(a.im, b.im, abs <= 1e-5);
        }
    }

    #[test]
    fn batches_must_divide_the_channels() {
        let traj = spiral(4);
        let opts = GridOpts { kernel: KernelType::NearestNeighbour, batches: 2, subgrid_size: 8, ..GridOpts::default() };
        let result = Nufft::new(NearestNeighbour::new(3), &traj, 3, None, None, &opts);
        assert!(matches!(result, Err(GridError::InvalidConfiguration(_))));
    }

    #[test]
    fn density_must_match_samples() {
        let traj = spiral(4);
        let opts = GridOpts { kernel: KernelType::NearestNeighbour, toeplitz: true, subgrid_size: 8, ..GridOpts::default() };
        let result = Nufft::new(NearestNeighbour::new(3), &traj, 1, None, Some(Re2::ones((3, 3))), &opts);
        assert!(matches!(result, Err(GridError::ShapeMismatch { .. })));
    }
}
