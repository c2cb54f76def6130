//! Correspondence between non-Cartesian samples and the oversampled Cartesian
//! grid, and the partition of samples into subgrids for parallel gridding.
//!
//! A `Mapping` is built once per trajectory, kernel width, oversampling and
//! subgrid size, and is immutable afterwards. Construction is serial and
//! visits samples in a fixed order, so the result depends only on its inputs.

/// Position of one sample in the `(channels, samples, traces)` data layout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NoncartesianIndex {
    pub trace: u32,
    pub sample: u32,
}

impl NoncartesianIndex {
    #[inline] pub fn sample(self) -> usize { self.sample as usize }
    #[inline] pub fn trace (self) -> usize { self.trace  as usize }
}

/// A box of grid cells, padded by the kernel half-width, together with the
/// samples whose nearest cell lies in its interior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subgrid {
    /// First cell of the padded box. May be negative: the grid is periodic.
    pub min_corner: [isize; 3],
    /// Extent of the padded box
    pub size: Sz3,
    /// Indices into `Mapping::{cart, noncart, offset}`
    pub indices: Vec<u32>,
}

impl Subgrid {

    pub fn len     (&self) -> usize { self.indices.len() }
    pub fn is_empty(&self) -> bool  { self.indices.is_empty() }

    /// First corner, inside this subgrid's workspace, of the kernel window
    /// around `cell`
    #[inline]
    pub fn local_start(&self, cell: CartIndex, half: Sz3) -> Sz3 {
        std::array::from_fn(|d| (cell[d] as isize - half[d] as isize - self.min_corner[d]) as usize)
    }

    /// For each axis, the (wrapped) global grid index of every workspace index
    pub fn global_indices(&self, cart_dims: Sz3) -> [Vec<usize>; 3] {
        std::array::from_fn(|d| {
            (0..self.size[d])
                .map(|i| wrap(self.min_corner[d] + i as isize, cart_dims[d]))
                .collect()
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mapping {
    /// Number of active spatial axes
    pub n_dims: usize,
    /// Oversampled Cartesian grid; extent 1 along inactive axes
    pub cart_dims: Sz3,
    /// `(samples, traces)`
    pub noncart_dims: (usize, usize),
    pub kernel_width: usize,
    pub subgrid_size: usize,
    pub cart: Vec<CartIndex>,
    pub noncart: Vec<NoncartesianIndex>,
    pub offset: Vec<Point>,
    pub subgrids: Vec<Subgrid>,
    /// For each `(sample, trace)`, in row-major order, the position of that
    /// sample when the subgrids' indices are read one after the other.
    /// `None` for blanked and skipped samples.
    pub slots: Vec<Option<u32>>,
}

impl Mapping {

    pub fn new(trajectory: &Trajectory, kernel_width: usize, opts: &GridOpts) -> Result<Self> {
        let osamp = opts.osamp;
        if !osamp.is_finite() || osamp < 1.0 {
            return Err(GridError::config(format!("oversampling must be at least 1, got {osamp}")))
        }
        Self::with_grid(trajectory, kernel_width, Self::grid_dims(trajectory, osamp), opts)
    }

    /// Grid size for `trajectory` at oversampling `osamp`
    pub fn grid_dims(trajectory: &Trajectory, osamp: f32) -> Sz3 {
        let matrix = trajectory.matrix();
        let mut cart_dims = [1; 3];
        for d in 0..trajectory.n_dims() { cart_dims[d] = fft_size(matrix[d] as f32 * osamp) }
        cart_dims
    }

    /// Map onto a grid of exactly `cart_dims`, ignoring `opts.osamp`
    pub fn with_grid(trajectory: &Trajectory, kernel_width: usize, cart_dims: Sz3, opts: &GridOpts) -> Result<Self> {
        let GridOpts { subgrid_size, split_size, read0, .. } = *opts;
        if subgrid_size == 0 { return Err(GridError::config("subgrid size must be positive")) }
        if split_size   == 0 { return Err(GridError::config("split size must be positive")) }
        if kernel_width % 2 == 0 {
            return Err(GridError::config(format!("kernel width must be odd, got {kernel_width}")))
        }
        if kernel_width > subgrid_size {
            return Err(GridError::config(format!(
                "kernel width {kernel_width} exceeds subgrid size {subgrid_size}"
            )))
        }
        let n_dims = trajectory.n_dims();
        if cart_dims.iter().enumerate().any(|(d, &n)| n == 0 || (d >= n_dims && n != 1)) {
            return Err(GridError::config(format!("grid {cart_dims:?} does not fit a {n_dims}-D trajectory")))
        }

        let mut subgrids = empty_subgrids(n_dims, cart_dims, kernel_width, subgrid_size);
        let n_buckets: Sz3 = std::array::from_fn(|d| cart_dims[d].div_ceil(subgrid_size));
        let bucket_of = |cell: CartIndex| {
            let b: Sz3 = std::array::from_fn(|d| cell[d] as usize / subgrid_size);
            (b[0] * n_buckets[1] + b[1]) * n_buckets[2] + b[2]
        };

        let mut cart    = vec![];
        let mut noncart = vec![];
        let mut offset  = vec![];
        let mut n_blanked = 0_usize;
        for trace in 0..trajectory.n_traces() {
            for sample in read0..trajectory.n_samples() {
                let point = trajectory.point(sample, trace);
                if !geometry::is_finite(&point) {
                    n_blanked += 1;
                    continue
                }
                let (cell, o) = nearest_cell(point, n_dims, cart_dims);
                subgrids[bucket_of(cell)].indices.push(cart.len() as u32);
                cart.push(cell);
                noncart.push(NoncartesianIndex { trace: trace as u32, sample: sample as u32 });
                offset.push(o);
            }
        }

        let n_buckets = subgrids.len();
        subgrids.retain(|s| !s.is_empty());
        let n_retained = subgrids.len();
        let mut subgrids: Vec<Subgrid> = subgrids.into_iter()
            .flat_map(|s| split(s, split_size))
            .collect();
        subgrids.sort_by(|a, b| b.len().cmp(&a.len()));

        let (n_samples, n_traces) = (trajectory.n_samples(), trajectory.n_traces());
        let mut slots = vec![None; n_samples * n_traces];
        for (position, &i) in subgrids.iter().flat_map(|s| s.indices.iter()).enumerate() {
            let n = noncart[i as usize];
            slots[n.sample() * n_traces + n.trace()] = Some(position as u32);
        }

        info!("Mapping: grid {cart_dims:?}, {} samples ({} blanked)",
              group_digits(cart.len()), group_digits(n_blanked));
        info!("Subgrids: {} of {} kept, {} empty removed, {} tasks after splitting",
              group_digits(n_retained), group_digits(n_buckets),
              group_digits(n_buckets - n_retained), group_digits(subgrids.len()));
        if cart.is_empty() { warn!("Mapping contains no samples") }

        Ok(Self {
            n_dims,
            cart_dims,
            noncart_dims: (n_samples, n_traces),
            kernel_width,
            subgrid_size,
            cart,
            noncart,
            offset,
            subgrids,
            slots,
        })
    }

    pub fn n_samples(&self) -> usize { self.cart.len() }

    /// Kernel half-width along each axis: zero along inactive ones
    pub fn kernel_half(&self) -> Sz3 {
        std::array::from_fn(|d| if d < self.n_dims { self.kernel_width / 2 } else { 0 })
    }
}

/// Round a sample to its nearest cell, half to even, and return the cell
/// (wrapped into the grid) and the remaining offset in `[-0.5, 0.5]`
#[inline]
fn nearest_cell(point: Point, n_dims: usize, cart_dims: Sz3) -> (CartIndex, Point) {
    let mut cell = [0; 3];
    let mut offset = [0.0; 3];
    for d in 0..n_dims {
        let n = cart_dims[d];
        let position = point[d] * n as f32 + centre(n) as f32;
        let rounded = position.round_ties_even();
        offset[d] = position - rounded;
        cell[d] = wrap(rounded as isize, n) as u32;
    }
    (cell, offset)
}

fn empty_subgrids(n_dims: usize, cart_dims: Sz3, kernel_width: usize, edge: usize) -> Vec<Subgrid> {
    let half = kernel_width / 2;
    let n: Sz3 = std::array::from_fn(|d| cart_dims[d].div_ceil(edge));
    iproduct!(0..n[0], 0..n[1], 0..n[2])
        .map(|(i0, i1, i2)| {
            let ib = [i0, i1, i2];
            let min_corner = std::array::from_fn(|d| {
                if d < n_dims { (ib[d] * edge) as isize - half as isize } else { 0 }
            });
            let size = std::array::from_fn(|d| {
                if d < n_dims { edge.min(cart_dims[d] - ib[d] * edge) + 2 * half } else { 1 }
            });
            Subgrid { min_corner, size, indices: vec![] }
        })
        .collect()
}

/// Divide an overfull subgrid into several which share its box
fn split(subgrid: Subgrid, split_size: usize) -> Vec<Subgrid> {
    if subgrid.len() <= split_size { return vec![subgrid] }
    let Subgrid { min_corner, size, indices } = subgrid;
    indices.chunks(split_size)
        .map(|chunk| Subgrid { min_corner, size, indices: chunk.to_vec() })
        .collect()
}

// ----- Imports ------------------------------------------------------------------------------------------
use itertools::iproduct;
use tracing::{info, warn};

use geometry::{centre, fft_size, wrap};

use crate::{
    config::GridOpts,
    error::{GridError, Result},
    trajectory::Trajectory,
    types::{CartIndex, Point, Sz3},
    utils::group_digits,
};
