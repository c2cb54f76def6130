//! Centred, unitary discrete Fourier transform over the spatial axes of
//! `(channels, basis, n0, n1, n2)` tensors.
//!
//! "Centred" means that index `n/2` along each axis is the origin, both in
//! image space and in frequency space. Each axis is scaled by `1/√n`, so the
//! inverse transform is the adjoint.

pub struct Fft {
    shape: Ix5,
    /// Forward and inverse plans, for each spatial axis longer than 1
    plans: [Option<(Arc<dyn Plan<f32>>, Arc<dyn Plan<f32>>)>; 3],
}

impl Fft {

    pub fn new(n_channels: usize, n_basis: usize, spatial: Sz3) -> Self {
        let mut planner = FftPlanner::new();
        let plans = std::array::from_fn(|d| {
            let n = spatial[d];
            (n > 1).then(|| (planner.plan_fft(n, FftDirection::Forward),
                             planner.plan_fft(n, FftDirection::Inverse)))
        });
        let [n0, n1, n2] = spatial;
        Self { shape: Dim([n_channels, n_basis, n0, n1, n2]), plans }
    }

    pub fn forward_inplace(&self, x: &mut Cx5) { self.transform(x, FftDirection::Forward) }
    pub fn inverse_inplace(&self, x: &mut Cx5) { self.transform(x, FftDirection::Inverse) }

    fn transform(&self, x: &mut Cx5, direction: FftDirection) {
        for mut channel in x.outer_iter_mut() {
            for mut volume in channel.outer_iter_mut() {
                self.transform_volume(&mut volume, direction);
            }
        }
    }

    fn transform_volume(&self, volume: &mut ArrayViewMut3<Cx>, direction: FftDirection) {
        for (d, plans) in self.plans.iter().enumerate() {
            let Some((forward, inverse)) = plans else { continue };
            let plan = match direction {
                FftDirection::Forward => forward,
                FftDirection::Inverse => inverse,
            };
            let n = plan.len();
            let half = n / 2;
            let scale = 1.0 / (n as f32).sqrt();
            Zip::from(volume.lanes_mut(Axis(d)))
                .into_par_iter()
                .for_each_init(
                    || (vec![Cx::zero(); n], vec![Cx::zero(); plan.get_inplace_scratch_len()]),
                    |(buffer, scratch), (mut lane,)| {
                        // Move the origin from the centre to index 0, and back afterwards
                        for (j, b) in buffer.iter_mut().enumerate() { *b = lane[(j + half) % n] }
                        plan.process_with_scratch(buffer, scratch);
                        for (k, &b) in buffer.iter().enumerate() { lane[(k + half) % n] = b * scale }
                    });
        }
    }
}

impl Operator for Fft {
    type I = Ix5;
    type O = Ix5;

    fn name(&self) -> &str { "FFT" }
    fn ishape(&self) -> Ix5 { self.shape }
    fn oshape(&self) -> Ix5 { self.shape }

    fn forward(&self, x: Cx5View) -> Result<Cx5> {
        self.check_input(&x)?;
        let mut y = x.to_owned();
        self.forward_inplace(&mut y);
        Ok(y)
    }

    fn adjoint(&self, y: Cx5View) -> Result<Cx5> {
        self.check_output(&y)?;
        let mut x = y.to_owned();
        self.inverse_inplace(&mut x);
        Ok(x)
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::sync::Arc;

use ndarray::{ArrayViewMut3, Axis, Dim, Ix5, Zip};
use num_traits::Zero;
use rayon::prelude::*;
use rustfft::{Fft as Plan, FftDirection, FftPlanner, Length};

use crate::{
    error::Result,
    types::{Cx, Cx5, Cx5View, Sz3},
};

use super::Operator;
