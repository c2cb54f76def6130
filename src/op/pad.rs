/// Centred zero-padding of the spatial axes; the adjoint crops.
#[derive(Clone, Debug)]
pub struct Pad {
    ishape: Ix5,
    oshape: Ix5,
    start: Sz3,
}

impl Pad {

    /// Pad `(channels, basis, inner)` to `(channels, basis, outer)`
    pub fn new(n_channels: usize, n_basis: usize, inner: Sz3, outer: Sz3) -> Result<Self> {
        if (0..3).any(|d| inner[d] > outer[d]) {
            return Err(GridError::config(format!("cannot pad {inner:?} to the smaller {outer:?}")))
        }
        let start = std::array::from_fn(|d| centred_start(inner[d], outer[d]));
        let [i0, i1, i2] = inner;
        let [o0, o1, o2] = outer;
        Ok(Self {
            ishape: Dim([n_channels, n_basis, i0, i1, i2]),
            oshape: Dim([n_channels, n_basis, o0, o1, o2]),
            start,
        })
    }

    fn window(&self) -> SliceInfo<[SliceInfoElem; 5], Ix5, Ix5> {
        let [a, b, c] = self.start;
        let (n0, n1, n2) = (self.ishape[2], self.ishape[3], self.ishape[4]);
        s![.., .., a..a + n0, b..b + n1, c..c + n2]
    }
}

impl Operator for Pad {
    type I = Ix5;
    type O = Ix5;

    fn name(&self) -> &str { "Pad" }
    fn ishape(&self) -> Ix5 { self.ishape }
    fn oshape(&self) -> Ix5 { self.oshape }

    fn forward(&self, x: Cx5View) -> Result<Cx5> {
        self.check_input(&x)?;
        let mut y = Cx5::zeros(self.oshape());
        y.slice_mut(self.window()).assign(&x);
        Ok(y)
    }

    fn adjoint(&self, y: Cx5View) -> Result<Cx5> {
        self.check_output(&y)?;
        Ok(y.slice(self.window()).to_owned())
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{s, Dim, Ix5, SliceInfo, SliceInfoElem};

use geometry::centred_start;

use crate::{
    error::{GridError, Result},
    types::{Cx5, Cx5View, Sz3},
};

use super::Operator;
