/// Each sample contributes to exactly one cell, with unit weight
#[derive(Clone, Copy, Debug)]
pub struct NearestNeighbour { n_dims: usize }

impl NearestNeighbour {
    pub fn new(n_dims: usize) -> Self { Self { n_dims } }
}

impl Kernel for NearestNeighbour {
    fn width (&self) -> usize { 1 }
    fn n_dims(&self) -> usize { self.n_dims }

    #[inline]
    fn evaluate(&self, _offset: Point, weights: &mut Weights) { weights.fill(1.0) }
}

// ----- Imports ------------------------------------------------------------------------------------------
use super::{Kernel, Weights};
use crate::types::Point;
