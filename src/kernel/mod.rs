//! Interpolation kernels used to convolve samples onto the Cartesian grid.
//!
//! A kernel turns a sub-cell offset into a small dense tensor of real weights,
//! and uses those weights to `spread` one sample into a local workspace or to
//! `gather` one sample back out of it.
//!
//! The family is closed (see `KernelType`). Each member is a concrete type, and
//! the gridding loops are generic over `Kernel`, so the choice made from the
//! configuration string is resolved once, when the operator is built, rather
//! than on every sample.

pub use nearest::NearestNeighbour;
pub use separable::{Separable, KernelFunction, ExpSemicircle, KaiserBessel, bessel_i0};

mod nearest;
mod separable;

/// Kernel weights for one sample: extent `width` along active axes, 1 elsewhere
pub type Weights = Array3<f32>;

/// Private per-subgrid workspace: `(s0, s1, s2, basis, channels)`.
///
/// Channels vary fastest, so that the innermost loops of `spread` and `gather`
/// walk contiguous memory.
pub type Workspace = Array5<Cx>;

pub trait Kernel: Clone + Send + Sync {

    /// Full (odd) support width, in grid cells, along each active axis
    fn width(&self) -> usize;

    /// Number of active spatial axes
    fn n_dims(&self) -> usize;

    /// Fill `weights` with the kernel centred `offset` away from the nearest cell
    fn evaluate(&self, offset: Point, weights: &mut Weights);

    fn shape(&self) -> Sz3 {
        let mut shape = [1; 3];
        for s in shape.iter_mut().take(self.n_dims()) { *s = self.width() }
        shape
    }

    /// Reusable storage for `evaluate`. Allocating these anew for each sample
    /// has a noticeable cost, so callers keep one per worker.
    fn buffer(&self) -> Weights { Weights::zeros(self.shape()) }

    /// Accumulate `y ⊗ b`, weighted by the kernel, into the window of `local`
    /// whose first corner is `start`.
    #[inline]
    fn spread(
        &self,
        start  : Sz3,
        offset : Point,
        b      : ArrayView1<Cx>,
        y      : ArrayView1<Cx>,
        weights: &mut Weights,
        local  : &mut Workspace,
    ) {
        self.evaluate(offset, weights);
        for ((i0, i1, i2), &w) in weights.indexed_iter() {
            if w == 0.0 { continue }
            let mut cell = local.slice_mut(s![start[0] + i0, start[1] + i1, start[2] + i2, .., ..]);
            for (mut row, &bb) in cell.outer_iter_mut().zip(b.iter()) {
                let bw = bb * w;
                for (x, &yy) in row.iter_mut().zip(y.iter()) {
                    *x += yy * bw;
                }
            }
        }
    }

    /// Add the kernel-weighted, basis-projected sum over the window of `local`
    /// starting at `start` into `y`.
    #[inline]
    fn gather(
        &self,
        start  : Sz3,
        offset : Point,
        b      : ArrayView1<Cx>,
        local  : &Workspace,
        weights: &mut Weights,
        y      : &mut [Cx],
    ) {
        self.evaluate(offset, weights);
        for ((i0, i1, i2), &w) in weights.indexed_iter() {
            if w == 0.0 { continue }
            let cell = local.slice(s![start[0] + i0, start[1] + i1, start[2] + i2, .., ..]);
            for (row, &bb) in cell.outer_iter().zip(b.iter()) {
                let bw = bb * w;
                for (yy, &x) in y.iter_mut().zip(row.iter()) {
                    *yy += x * bw;
                }
            }
        }
    }
}

/// The kernels which can be chosen by name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelType {
    NearestNeighbour,
    KaiserBessel(usize),
    ExpSemicircle(usize),
}

impl KernelType {
    pub fn width(self) -> usize {
        match self {
            Self::NearestNeighbour => 1,
            Self::KaiserBessel(w) | Self::ExpSemicircle(w) => w,
        }
    }
}

impl Default for KernelType {
    fn default() -> Self { Self::ExpSemicircle(3) }
}

impl FromStr for KernelType {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || GridError::UnknownKernel(s.to_string());
        let upper = s.trim().to_ascii_uppercase();
        if upper == "NN" { return Ok(Self::NearestNeighbour) }
        let (Some(family), Some(width)) = (upper.get(..2), upper.get(2..)) else { return Err(unknown()) };
        let width: usize = width.parse().map_err(|_| unknown())?;
        if ![3, 5, 7].contains(&width) { return Err(unknown()) }
        match family {
            "KB" => Ok(Self::KaiserBessel(width)),
            "ES" => Ok(Self::ExpSemicircle(width)),
            _    => Err(unknown()),
        }
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NearestNeighbour => write!(f, "NN"),
            Self::KaiserBessel (w) => write!(f, "KB{w}"),
            Self::ExpSemicircle(w) => write!(f, "ES{w}"),
        }
    }
}

/// Build the concrete kernel named by a `KernelType`, for the per-axis
/// oversampling `$osamp: [f32; 3]`, bind it to `$k`, and evaluate `$body` with it. Each arm is a separate monomorphisation of
/// `$body`, so no dynamic dispatch leaks into the gridding loops.
#[macro_export]
macro_rules! with_kernel {
    ($ktype:expr, $n_dims:expr, $osamp:expr, |$k:ident| $body:expr) => {{
        use $crate::kernel::{KernelType as KT, NearestNeighbour, Separable, KaiserBessel, ExpSemicircle};
        match $ktype {
            KT::NearestNeighbour  => { let $k = NearestNeighbour::new($n_dims);                                $body }
            KT::KaiserBessel (3)  => { let $k = Separable::<KaiserBessel , 3>::with_osamp($n_dims, $osamp); $body }
            KT::KaiserBessel (5)  => { let $k = Separable::<KaiserBessel , 5>::with_osamp($n_dims, $osamp); $body }
            KT::KaiserBessel (7)  => { let $k = Separable::<KaiserBessel , 7>::with_osamp($n_dims, $osamp); $body }
            KT::ExpSemicircle(3)  => { let $k = Separable::<ExpSemicircle, 3>::with_osamp($n_dims, $osamp); $body }
            KT::ExpSemicircle(5)  => { let $k = Separable::<ExpSemicircle, 5>::with_osamp($n_dims, $osamp); $body }
            KT::ExpSemicircle(7)  => { let $k = Separable::<ExpSemicircle, 7>::with_osamp($n_dims, $osamp); $body }
            other => Err($crate::error::GridError::UnknownKernel(other.to_string())),
        }
    }};
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::{fmt, str::FromStr};

use ndarray::{s, Array3, Array5, ArrayView1};

use crate::{
    error::{GridError, Result},
    types::{Cx, Point, Sz3},
};
