//! Acquisition geometry: where in frequency space each sample was taken.
//!
//! Coordinates are normalised per axis, so that `±0.5` along axis `d` is the
//! Nyquist edge of `matrix[d]`. Non-finite coordinates are allowed: they mark
//! samples which should be ignored (blanked).

use std::f32::consts::PI;

use geometry::{centre, Point, Sz3};

use crate::error::{GridError, Result};
use crate::types::Re3;

#[derive(Clone, Debug)]
pub struct Trajectory {
    /// `(ndim, samples, traces)`
    points: Re3,
    /// Nominal image matrix. Extent 1 along unused axes.
    matrix: Sz3,
}

impl Trajectory {

    pub fn new(points: Re3, matrix: Sz3) -> Result<Self> {
        let (ndim, n_samples, n_traces) = points.dim();
        if !(1..=3).contains(&ndim) {
            return Err(GridError::trajectory(format!("points need 1, 2 or 3 coordinates, got {ndim}")))
        }
        if n_samples == 0 || n_traces == 0 {
            return Err(GridError::trajectory(format!("no samples: {n_samples} samples x {n_traces} traces")))
        }
        if let Some(d) = (0..ndim).find(|&d| matrix[d] == 0) {
            return Err(GridError::trajectory(format!("matrix extent along axis {d} is zero: {matrix:?}")))
        }
        let mut matrix = matrix;
        for m in matrix.iter_mut().skip(ndim) { *m = 1 }
        Ok(Self { points, matrix })
    }

    /// Same points, but with an isotropic `m` along every active axis
    pub fn isotropic(points: Re3, m: usize) -> Result<Self> { Self::new(points, [m; 3]) }

    pub fn n_dims   (&self) -> usize { self.points.dim().0 }
    pub fn n_samples(&self) -> usize { self.points.dim().1 }
    pub fn n_traces (&self) -> usize { self.points.dim().2 }
    pub fn matrix   (&self) -> Sz3   { self.matrix }
    pub fn points   (&self) -> &Re3  { &self.points }

    /// Location of one sample, zero-padded to rank 3
    #[inline]
    pub fn point(&self, sample: usize, trace: usize) -> Point {
        let mut p = [0.0; 3];
        for (d, x) in p.iter_mut().enumerate().take(self.n_dims()) {
            *x = self.points[[d, sample, trace]];
        }
        p
    }

    /// Point-reflected copy of the trajectory, for virtual conjugate coils
    pub fn conjugate(&self) -> Self {
        Self { points: self.points.mapv(|x| -x), matrix: self.matrix }
    }

    /// Same points, over a different image matrix
    pub fn with_matrix(&self, matrix: Sz3) -> Result<Self> { Self::new(self.points.clone(), matrix) }

    /// Every point moved onto the centre of its nearest cell in a grid of
    /// `grid` cells, rounding half-way points to even cells
    pub fn snapped(&self, grid: Sz3) -> Self {
        let mut points = self.points.clone();
        for (d, mut axis) in points.outer_iter_mut().enumerate() {
            let n = grid[d] as f32;
            let c = centre(grid[d]) as f32;
            axis.mapv_inplace(|k| ((k * n + c).round_ties_even() - c) / n);
        }
        Self { points, matrix: self.matrix }
    }

    /// Number of samples, at or after `read0` in each trace, with finite coordinates
    pub fn n_finite(&self, read0: usize) -> usize {
        (0..self.n_traces())
            .flat_map(|t| (read0..self.n_samples()).map(move |s| (s, t)))
            .filter(|&(s, t)| geometry::is_finite(&self.point(s, t)))
            .count()
    }
}

/// 3-D radial trajectory with `n_traces` spokes whose tips follow an
/// Archimedean spiral over the sphere. Each spoke runs from the centre of
/// k-space outwards in steps of `0.5 / n_read`.
pub fn archimedean_spiral(n_read: usize, n_traces: usize) -> Re3 {
    let mut points = Re3::zeros((3, n_read, n_traces));
    let n_turns = (n_traces as f32 * PI).sqrt();
    for it in 0..n_traces {
        let z = (2 * it + 1) as f32 / n_traces as f32 - 1.0;
        let theta = z.acos();
        let phi = n_turns * theta;
        let tip = [theta.sin() * phi.cos(), theta.sin() * phi.sin(), z];
        for ir in 0..n_read {
            let r = 0.5 * ir as f32 / n_read as f32;
            for d in 0..3 {
                points[[d, ir, it]] = r * tip[d];
            }
        }
    }
    points
}
