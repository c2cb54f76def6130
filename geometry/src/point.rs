/// Position of one sample in frequency space, or a sub-cell offset.
///
/// Unused trailing components are zero.
pub type Point = [f32; 3];

/// Integer coordinate of a cell on the oversampled Cartesian grid.
pub type CartIndex = [u32; 3];

/// Non-finite components mark samples which were deliberately blanked
pub fn is_finite(p: &Point) -> bool { p.iter().all(|x| x.is_finite()) }
