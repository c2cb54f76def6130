//! Convolution gridding between an oversampled Cartesian grid and
//! non-Cartesian samples.
//!
//! Work is partitioned by subgrid. `forward` reads a padded window of the grid
//! into a subgrid-private workspace and gathers each owned sample from it into
//! the task's own run of a flat buffer. The runs are then scattered, in
//! parallel, to their disjoint places in the output. `adjoint` spreads each
//! owned sample into a private workspace and adds the whole workspace into the
//! shared grid under a single lock.
//!
//! `iforward` and `iadjoint` accumulate into caller-provided arrays, so that
//! batches of channels can be processed without a full-size temporary.
//!
//! With virtual conjugate coils the grid carries twice as many channels as the
//! samples. Channels `[C, 2C)` are seen through the point-reflected mapping,
//! complex-conjugated, and both halves are scaled by `1/√2`.

pub struct Grid<K: Kernel> {
    kernel: K,
    mapping: Arc<Mapping>,
    vcc_mapping: Option<Arc<Mapping>>,
    basis: Arc<Basis>,
    basis_conj: Basis,
    n_channels: usize,
    name: String,
}

impl<K: Kernel> Grid<K> {

    pub fn new(
        kernel    : K,
        trajectory: &Trajectory,
        n_channels: usize,
        basis     : Option<Basis>,
        opts      : &GridOpts,
    ) -> Result<Self> {
        let mapping = Mapping::new(trajectory, kernel.width(), opts)?;
        let vcc_mapping = if opts.vcc {
            info!("Adding virtual conjugate coils");
            Some(Arc::new(Mapping::new(&trajectory.conjugate(), kernel.width(), opts)?))
        } else {
            None
        };
        Self::with_mapping(kernel, Arc::new(mapping), vcc_mapping, n_channels, Arc::new(basis.unwrap_or_default()))
    }

    /// Build around existing mappings, which may be shared with other operators
    pub fn with_mapping(
        kernel     : K,
        mapping    : Arc<Mapping>,
        vcc_mapping: Option<Arc<Mapping>>,
        n_channels : usize,
        basis      : Arc<Basis>,
    ) -> Result<Self> {
        if kernel.width() != mapping.kernel_width {
            return Err(GridError::config(format!(
                "kernel width {} does not match the mapping's {}", kernel.width(), mapping.kernel_width
            )))
        }
        if kernel.n_dims() != mapping.n_dims {
            return Err(GridError::config(format!(
                "{}-D kernel cannot grid a {}-D mapping", kernel.n_dims(), mapping.n_dims
            )))
        }
        if n_channels == 0 { return Err(GridError::config("at least one channel is needed")) }
        basis.check_period(mapping.noncart_dims.0, mapping.noncart_dims.1)?;
        if let Some(vcc) = &vcc_mapping {
            if vcc.cart_dims != mapping.cart_dims || vcc.noncart_dims != mapping.noncart_dims {
                return Err(GridError::config("conjugate mapping does not match the primary one"))
            }
        }
        let name = format!("{}D Grid{}", mapping.n_dims, if vcc_mapping.is_some() { " VCC" } else { "" });
        debug!("{name}: grid {:?}, {} channels, {} basis vectors", mapping.cart_dims, n_channels, basis.n_basis());
        let basis_conj = basis.conjugate();
        Ok(Self { kernel, mapping, vcc_mapping, basis, basis_conj, n_channels, name })
    }

    pub fn kernel (&self) -> &K       { &self.kernel }
    pub fn mapping(&self) -> &Mapping { &self.mapping }
    pub fn basis  (&self) -> &Basis   { &self.basis }
    pub fn has_vcc(&self) -> bool     { self.vcc_mapping.is_some() }

    fn vcc_scale<const HAS_VCC: bool>() -> f32 { if HAS_VCC { FRAC_1_SQRT_2 } else { 1.0 } }

    fn first_channel<const IS_VCC: bool>(&self) -> usize { if IS_VCC { self.n_channels } else { 0 } }

    /// Accumulate into `y` the samples gathered through one mapping
    fn forward_task<const HAS_VCC: bool, const IS_VCC: bool>(&self, mapping: &Mapping, x: &Cx5View, y: &mut Cx3ViewMut) {
        let n_channels = self.n_channels;
        let n_basis = self.basis.n_basis();
        let half = mapping.kernel_half();
        let c0 = self.first_channel::<IS_VCC>();
        let scale = Self::vcc_scale::<HAS_VCC>();

        // `n_channels` values per sample, in subgrid order; each task owns the
        // run belonging to its subgrid
        let mut gathered = vec![Cx::zero(); mapping.n_samples() * n_channels];
        let mut runs = Vec::with_capacity(mapping.subgrids.len());
        let mut rest = gathered.as_mut_slice();
        for subgrid in &mapping.subgrids {
            let (run, tail) = rest.split_at_mut(subgrid.len() * n_channels);
            runs.push(run);
            rest = tail;
        }

        mapping.subgrids
            .par_iter()
            .zip(runs)
            .for_each_init(
                || self.kernel.buffer(),
                |weights, (subgrid, values)| {
                    let [w0, w1, w2] = subgrid.global_indices(mapping.cart_dims);
                    let [s0, s1, s2] = subgrid.size;
                    let local = Workspace::from_shape_fn((s0, s1, s2, n_basis, n_channels), |(i0, i1, i2, b, c)| {
                        let v = x[[c0 + c, b, w0[i0], w1[i1], w2[i2]]];
                        (if IS_VCC { v.conj() } else { v }) * scale
                    });
                    for (&i, out) in subgrid.indices.iter().zip(values.chunks_mut(n_channels)) {
                        let i = i as usize;
                        let n = mapping.noncart[i];
                        let b = self.basis.coefficients(n.sample(), n.trace());
                        let start = subgrid.local_start(mapping.cart[i], half);
                        self.kernel.gather(start, mapping.offset[i], b, &local, weights, out);
                    }
                });

        let n_traces = mapping.noncart_dims.1;
        Zip::indexed(y.lanes_mut(Axis(0)))
            .par_for_each(|(sample, trace), mut lane| {
                let Some(p) = mapping.slots[sample * n_traces + trace] else { return };
                let p = p as usize * n_channels;
                for (yc, &v) in lane.iter_mut().zip(&gathered[p..p + n_channels]) {
                    *yc += v;
                }
            });
    }

    /// Spread the samples through one mapping and add them into `x`
    fn adjoint_task<const HAS_VCC: bool, const IS_VCC: bool>(&self, mapping: &Mapping, y: &Cx3View, x: &mut Cx5ViewMut) {
        let n_channels = self.n_channels;
        let n_basis = self.basis.n_basis();
        let half = mapping.kernel_half();
        let c0 = self.first_channel::<IS_VCC>();
        let scale = Self::vcc_scale::<HAS_VCC>();

        let target = Mutex::new(x.view_mut());
        mapping.subgrids
            .par_iter()
            .for_each_init(
                || self.kernel.buffer(),
                |weights, subgrid| {
                    let [s0, s1, s2] = subgrid.size;
                    let mut local = Workspace::zeros((s0, s1, s2, n_basis, n_channels));
                    for &i in &subgrid.indices {
                        let i = i as usize;
                        let n = mapping.noncart[i];
                        let b = self.basis_conj.coefficients(n.sample(), n.trace());
                        let values = y.slice(s![.., n.sample(), n.trace()]);
                        let start = subgrid.local_start(mapping.cart[i], half);
                        self.kernel.spread(start, mapping.offset[i], b, values, weights, &mut local);
                    }
                    let [w0, w1, w2] = subgrid.global_indices(mapping.cart_dims);

                    // A poisoned lock still guards a consistent sum
                    let mut x = target.lock().unwrap_or_else(PoisonError::into_inner);
                    for ((i0, i1, i2, b, c), &v) in local.indexed_iter() {
                        x[[c0 + c, b, w0[i0], w1[i1], w2[i2]]] += (if IS_VCC { v.conj() } else { v }) * scale;
                    }
                });
    }
}

impl<K: Kernel> Operator for Grid<K> {
    type I = Ix5;
    type O = Ix3;

    fn name(&self) -> &str { &self.name }

    fn ishape(&self) -> Ix5 {
        let [n0, n1, n2] = self.mapping.cart_dims;
        let n_grid_channels = if self.has_vcc() { 2 * self.n_channels } else { self.n_channels };
        Dim([n_grid_channels, self.basis.n_basis(), n0, n1, n2])
    }

    fn oshape(&self) -> Ix3 {
        let (n_samples, n_traces) = self.mapping.noncart_dims;
        Dim([self.n_channels, n_samples, n_traces])
    }

    fn forward(&self, x: Cx5View) -> Result<Cx3> {
        let mut y = Cx3::zeros(self.oshape());
        self.iforward(x, y.view_mut())?;
        Ok(y)
    }

    fn adjoint(&self, y: Cx3View) -> Result<Cx5> {
        let mut x = Cx5::zeros(self.ishape());
        self.iadjoint(y, x.view_mut())?;
        Ok(x)
    }

    fn iforward(&self, x: Cx5View, mut y: Cx3ViewMut) -> Result<()> {
        self.check_input(&x)?;
        self.check_output(&y.view())?;
        let now = Instant::now();
        match &self.vcc_mapping {
            None => self.forward_task::<false, false>(&self.mapping, &x, &mut y),
            Some(vcc) => {
                self.forward_task::<true, false>(&self.mapping, &x, &mut y);
                self.forward_task::<true, true >(vcc          , &x, &mut y);
            }
        }
        debug!("{} forward: {} ms", self.name, group_digits(now.elapsed().as_millis()));
        Ok(())
    }

    fn iadjoint(&self, y: Cx3View, mut x: Cx5ViewMut) -> Result<()> {
        self.check_output(&y)?;
        self.check_input(&x.view())?;
        let now = Instant::now();
        match &self.vcc_mapping {
            None => self.adjoint_task::<false, false>(&self.mapping, &y, &mut x),
            Some(vcc) => {
                self.adjoint_task::<true, false>(&self.mapping, &y, &mut x);
                self.adjoint_task::<true, true >(vcc          , &y, &mut x);
            }
        }
        debug!("{} adjoint: {} ms", self.name, group_digits(now.elapsed().as_millis()));
        Ok(())
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use ndarray::{s, Axis, Dim, Ix3, Ix5, Zip};
use num_traits::Zero;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    basis::Basis,
    config::GridOpts,
    error::{GridError, Result},
    kernel::{Kernel, Workspace},
    mapping::Mapping,
    trajectory::Trajectory,
    types::{Cx, Cx3, Cx3View, Cx3ViewMut, Cx5, Cx5View, Cx5ViewMut, FRAC_1_SQRT_2},
    utils::group_digits,
};

use super::Operator;
