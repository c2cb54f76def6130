use ndarray::{Array2, Array3, Array5, ArrayView3, ArrayView5, ArrayViewMut3, ArrayViewMut5};

pub use geometry::{Point, CartIndex, Sz3};

/// Complex sample/voxel value
pub type Cx = num_complex::Complex32;

/// Sample-shaped data: `(channels, samples, traces)`
pub type Cx3 = Array3<Cx>;
pub type Cx3View<'a> = ArrayView3<'a, Cx>;
pub type Cx3ViewMut<'a> = ArrayViewMut3<'a, Cx>;

/// Grid- or image-shaped data: `(channels, basis, n0, n1, n2)`
pub type Cx5 = Array5<Cx>;
pub type Cx5View<'a> = ArrayView5<'a, Cx>;
pub type Cx5ViewMut<'a> = ArrayViewMut5<'a, Cx>;

/// Trajectory coordinates: `(ndim, samples, traces)`
pub type Re3 = Array3<f32>;

/// One real weight per non-Cartesian sample: `(samples, traces)`
pub type Re2 = Array2<f32>;

pub const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;
