//! Linear operators between images, oversampled grids and non-Cartesian samples.
//!
//! Every operator declares the shapes it accepts and produces, and refuses
//! arguments of any other shape.

pub mod apodize;
pub mod fft;
pub mod grid;
pub mod nufft;
pub mod pad;
pub mod toeplitz;

pub use apodize::Apodize;
pub use fft::Fft;
pub use grid::Grid;
pub use nufft::Nufft;
pub use pad::Pad;
pub use toeplitz::Toeplitz;

pub trait Operator: Send + Sync {
    type I: Dimension;
    type O: Dimension;

    fn name(&self) -> &str;
    fn ishape(&self) -> Self::I;
    fn oshape(&self) -> Self::O;

    fn forward(&self, x: ArrayView<Cx, Self::I>) -> Result<Array<Cx, Self::O>>;
    fn adjoint(&self, y: ArrayView<Cx, Self::O>) -> Result<Array<Cx, Self::I>>;

    /// `y += forward(x)`
    fn iforward(&self, x: ArrayView<Cx, Self::I>, mut y: ArrayViewMut<Cx, Self::O>) -> Result<()> {
        self.check_output(&y.view())?;
        let fx = self.forward(x)?;
        y += &fx;
        Ok(())
    }

    /// `x += adjoint(y)`
    fn iadjoint(&self, y: ArrayView<Cx, Self::O>, mut x: ArrayViewMut<Cx, Self::I>) -> Result<()> {
        self.check_input(&x.view())?;
        let ahy = self.adjoint(y)?;
        x += &ahy;
        Ok(())
    }

    /// The normal operator, `adjoint ∘ forward`
    fn adjoint_forward(&self, x: ArrayView<Cx, Self::I>) -> Result<Array<Cx, Self::I>> {
        let y = self.forward(x)?;
        self.adjoint(y.view())
    }

    fn check_input(&self, x: &ArrayView<Cx, Self::I>) -> Result<()> {
        check_shape(self.name(), "input", self.ishape().slice(), x.shape())
    }

    fn check_output(&self, y: &ArrayView<Cx, Self::O>) -> Result<()> {
        check_shape(self.name(), "output", self.oshape().slice(), y.shape())
    }
}

/// Image or grid `(channels, basis, n0, n1, n2)` to samples `(channels, samples, traces)`
pub type SampleOperator = Box<dyn Operator<I = Ix5, O = Ix3>>;

/// Gridding operator with the kernel named in `opts`
pub fn make_grid(
    trajectory: &Trajectory,
    n_channels: usize,
    basis     : Option<Basis>,
    opts      : &GridOpts,
) -> Result<SampleOperator> {
    opts.validate()?;
    let n_dims = trajectory.n_dims();
    with_kernel!(opts.kernel, n_dims, realised_osamp(trajectory, opts.osamp), |kernel| {
        Ok(Box::new(Grid::new(kernel, trajectory, n_channels, basis, opts)?) as SampleOperator)
    })
}

/// Non-uniform FFT with the kernel named in `opts`. `density` weights, of
/// shape `(samples, traces)`, are only used by the Töplitz embedding.
pub fn make_nufft(
    trajectory: &Trajectory,
    n_channels: usize,
    basis     : Option<Basis>,
    density   : Option<Re2>,
    opts      : &GridOpts,
) -> Result<SampleOperator> {
    opts.validate()?;
    let n_dims = trajectory.n_dims();
    with_kernel!(opts.kernel, n_dims, realised_osamp(trajectory, opts.osamp), |kernel| {
        Ok(Box::new(Nufft::new(kernel, trajectory, n_channels, basis, density, opts)?) as SampleOperator)
    })
}

/// Grid-to-matrix ratio along each axis, once the grid has been rounded to a
/// Fourier-friendly size
pub fn realised_osamp(trajectory: &Trajectory, osamp: f32) -> [f32; 3] {
    let matrix = trajectory.matrix();
    let grid = Mapping::grid_dims(trajectory, osamp);
    std::array::from_fn(|d| grid[d] as f32 / matrix[d] as f32)
}

// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{Array, ArrayView, ArrayViewMut, Dimension, Ix3, Ix5};

use crate::{
    basis::Basis,
    config::GridOpts,
    error::{check_shape, Result},
    mapping::Mapping,
    trajectory::Trajectory,
    types::{Cx, Re2},
    with_kernel,
};
