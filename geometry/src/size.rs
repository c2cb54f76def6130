/// Extent of the three spatial axes of a grid
pub type Sz3 = [usize; 3];

/// Grid size which the FFT handles well.
///
/// Empirical rule of thumb: anything above 8 is rounded to the nearest
/// integer and then up to a multiple of 8; small sizes are just rounded up.
pub fn fft_size(x: f32) -> usize {
    if x > 8.0 {
        let n = x.round_ties_even() as usize;
        (n + 7) & !7
    } else {
        x.ceil() as usize
    }
}

/// Periodic wrap of a possibly negative index into `[0, n)`
#[inline]
pub fn wrap(i: isize, n: usize) -> usize { i.rem_euclid(n as isize) as usize }

/// Index of the zero-frequency cell of an axis with `n` cells
#[inline]
pub fn centre(n: usize) -> usize { n / 2 }

/// Where a centred block of `inner` cells starts inside `outer` cells
#[inline]
pub fn centred_start(inner: usize, outer: usize) -> usize { centre(outer) - centre(inner) }

pub fn n_elements(sz: Sz3) -> usize { sz.iter().product() }
