#![allow(dead_code)]

use ndarray::{Dimension, ShapeBuilder, Zip};
use rand::Rng;
use rand_core::SeedableRng;
use rand_distr::StandardNormal;
use rand_isaac::Isaac64Rng;

use kgrid::{trajectory::archimedean_spiral, types::Re3, Cx, Trajectory};

pub fn rng(seed: u64) -> Isaac64Rng { Isaac64Rng::seed_from_u64(seed) }

/// Array of standard complex normal values
pub fn random<D: Dimension>(shape: impl ShapeBuilder<Dim = D>, seed: u64) -> ndarray::Array<Cx, D> {
    let mut rng = rng(seed);
    ndarray::Array::from_shape_simple_fn(shape, || Cx::new(rng.sample(StandardNormal), rng.sample(StandardNormal)))
}

/// Real part of `Σ a · conj(b)`, accumulated in double precision
pub fn dot<D: Dimension>(a: &ndarray::Array<Cx, D>, b: &ndarray::Array<Cx, D>) -> f64 {
    let mut sum = 0.0;
    Zip::from(a).and(b).for_each(|a, b| sum += (a.re as f64) * (b.re as f64) + (a.im as f64) * (b.im as f64));
    sum
}

/// `|⟨x,y⟩ − ⟨y,y⟩| / (⟨y,y⟩ + ⟨x,y⟩)`: zero when `y` is an orthogonal projection of `x`
pub fn projection_error<D: Dimension>(x: &ndarray::Array<Cx, D>, y: &ndarray::Array<Cx, D>) -> f64 {
    let (xy, yy) = (dot(x, y), dot(y, y));
    (xy - yy).abs() / (xy + yy)
}

/// `‖a − b‖ / ‖b‖`, accumulated in double precision
pub fn relative_difference<D: Dimension>(a: &ndarray::Array<Cx, D>, b: &ndarray::Array<Cx, D>) -> f64 {
    let mut diff = 0.0;
    Zip::from(a).and(b).for_each(|a, b| diff += (a - b).norm_sqr() as f64);
    (diff / dot(b, b)).sqrt()
}

/// Relative difference between two scalars
pub fn relative(a: f64, b: f64) -> f64 { (a - b).abs() / a.abs().max(b.abs()) }

/// Cartesian trajectory over an `m^n_dims` matrix, each point nudged away
/// from its cell centre by less than a quarter of a cell at `osamp` 2. Every
/// sample lands in a distinct cell of the oversampled grid.
pub fn jittered_cartesian(n_dims: usize, m: usize, seed: u64) -> Trajectory {
    let mut rng = rng(seed);
    let n_samples = m.pow(n_dims as u32);
    let mut points = Re3::zeros((n_dims, n_samples, 1));
    for s in 0..n_samples {
        let mut rest = s;
        for d in 0..n_dims {
            let i = rest % m;
            rest /= m;
            let jitter: f32 = rng.gen_range(-0.2..0.2);
            points[[d, s, 0]] = (i as f32 - (m / 2) as f32 + jitter * 0.5) / m as f32;
        }
    }
    Trajectory::isotropic(points, m).expect("valid trajectory")
}

pub fn spiral(m: usize) -> Trajectory {
    Trajectory::isotropic(archimedean_spiral(m / 2, 2 * m * m), m).expect("valid trajectory")
}
