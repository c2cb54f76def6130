//! Fixed-size coordinates and index arithmetic shared by the gridding code.
//!
//! Everything here is rank 3. Acquisitions with fewer spatial dimensions use
//! the leading axes and leave the trailing ones with extent 1.

mod point;
mod size;

pub use point::{Point, CartIndex, is_finite};
pub use size::{Sz3, fft_size, wrap, centre, centred_start, n_elements};
