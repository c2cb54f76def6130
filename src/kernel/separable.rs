//! Separable kernels: a 1-D profile of the normalised squared distance is
//! evaluated once per active axis, and the weights are the outer product of
//! those profiles. For ES the product is the exponential of the summed
//! per-axis exponents.
//!
//! Because the kernel is a product, so is its image-space response, and a
//! positive 1-D response gives a positive apodization table in any number of
//! dimensions.

/// A profile `f(z)`, where `z ∈ [0, 1]` is the squared distance from the
/// sample, normalised by the kernel half-width.
pub trait KernelFunction: Copy + Send + Sync + 'static {
    const NAME: &'static str;
    fn beta(width: usize, osamp: f32) -> f32;
    fn value(z: f32, beta: f32) -> f32;
}

/// Exponential of semicircle: `exp(β (√(1-z) - 1))`
#[derive(Clone, Copy, Debug)]
pub struct ExpSemicircle;

/// Kaiser-Bessel: `I₀(β √(1-z))`
#[derive(Clone, Copy, Debug)]
pub struct KaiserBessel;

impl KernelFunction for ExpSemicircle {
    const NAME: &'static str = "ES";
    fn beta(width: usize, osamp: f32) -> f32 { 0.98 * PI * width as f32 * (1.0 - 0.5 / osamp) }
    #[inline]
    fn value(z: f32, beta: f32) -> f32 { (beta * ((1.0 - z).sqrt() - 1.0)).exp() }
}

impl KernelFunction for KaiserBessel {
    const NAME: &'static str = "KB";
    fn beta(width: usize, osamp: f32) -> f32 {
        let w = width as f32;
        let x = (w / osamp).powi(2) * (osamp - 0.5).powi(2) - 0.8;
        PI * x.max(0.0).sqrt()
    }
    #[inline]
    fn value(z: f32, beta: f32) -> f32 { bessel_i0(beta * (1.0 - z).sqrt()) }
}

/// Separable kernel of odd width `W`, normalised so that the weights it
/// produces for a sample sitting exactly on a cell have unit L2 norm.
#[derive(Clone, Copy, Debug)]
pub struct Separable<F, const W: usize> {
    n_dims: usize,
    /// Shape parameter of each axis, from that axis' oversampling
    beta: [f32; 3],
    /// `f(0)` on each axis, so that every profile peaks at 1
    peak: [f32; 3],
    scale: f32,
    function: PhantomData<F>,
}

impl<F: KernelFunction, const W: usize> Separable<F, W> {

    /// The same oversampling on every axis
    pub fn new(n_dims: usize, osamp: f32) -> Self { Self::with_osamp(n_dims, [osamp; 3]) }

    /// `osamp[d]` is the ratio of grid to matrix size along axis `d`
    pub fn with_osamp(n_dims: usize, osamp: [f32; 3]) -> Self {
        let beta = osamp.map(|o| F::beta(W, o));
        let peak = beta.map(|b| F::value(0.0, b));
        let mut kernel = Self { n_dims, beta, peak, scale: 1.0, function: PhantomData };
        let mut weights = kernel.buffer();
        kernel.evaluate([0.0; 3], &mut weights);
        let norm = weights.iter().map(|w| w * w).sum::<f32>().sqrt();
        kernel.scale = 1.0 / norm;
        debug!("{}{W} kernel in {n_dims}D: beta {:.4?}, scale {:.4e}", F::NAME, &beta[..n_dims], kernel.scale);
        kernel
    }

    pub fn beta(&self) -> [f32; 3] { self.beta }

    /// Weight of each of the `W` taps along `axis`, for a sample `offset` away
    /// from the central one. Inactive axes have a single tap of weight 1.
    #[inline]
    fn profile(&self, axis: usize, offset: f32) -> [f32; W] {
        if axis >= self.n_dims { return [1.0; W] }
        let centre = (W / 2) as f32;
        let half_width = W as f32 / 2.0;
        let (beta, peak) = (self.beta[axis], self.peak[axis]);
        std::array::from_fn(|i| {
            let u = (i as f32 - centre - offset) / half_width;
            let z = u * u;
            if z > 1.0 { 0.0 } else { F::value(z, beta) / peak }
        })
    }
}

impl<F: KernelFunction, const W: usize> Kernel for Separable<F, W> {
    fn width (&self) -> usize { W }
    fn n_dims(&self) -> usize { self.n_dims }

    #[inline]
    fn evaluate(&self, offset: Point, weights: &mut Weights) {
        let p0 = self.profile(0, offset[0]);
        let p1 = self.profile(1, offset[1]);
        let p2 = self.profile(2, offset[2]);
        for ((i0, i1, i2), w) in weights.indexed_iter_mut() {
            *w = p0[i0] * p1[i1] * p2[i2] * self.scale;
        }
    }
}

/// Modified Bessel function of the first kind, order zero.
///
/// Polynomial approximations from Abramowitz & Stegun 9.8.1 and 9.8.2;
/// relative error below 2e-7.
pub fn bessel_i0(x: f32) -> f32 {
    let ax = x.abs();
    if ax <= 3.75 {
        let t = (ax / 3.75).powi(2);
        1.0 + t * (3.515_622_9 + t * (3.089_942_4 + t * (1.206_749_2
            + t * (0.265_973_2 + t * (0.036_076_8 + t * 0.004_581_3)))))
    } else {
        let t = 3.75 / ax;
        let poly = 0.398_942_28 + t * (0.013_285_92 + t * (0.002_253_19
            + t * (-0.001_575_65 + t * (0.009_162_81 + t * (-0.020_577_06
            + t * (0.026_355_37 + t * (-0.016_476_33 + t * 0.003_923_77)))))));
        (ax.exp() / ax.sqrt()) * poly
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::{f32::consts::PI, marker::PhantomData};

use tracing::debug;

use super::{Kernel, Weights};
use crate::types::Point;
