mod common;

use common::{dot, jittered_cartesian, projection_error, random, relative, relative_difference, spiral};

use float_eq::assert_float_eq;
use ndarray::{Dimension, Zip};
#[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
use rstest::rstest;

use kgrid::{
    config::parse_config,
    make_grid, make_nufft,
    threads::build_pool,
    types::{Re2, Re3},
    Basis, Cx3, Cx5, GridError, GridOpts, KernelType, Mapping, Operator, Trajectory,
};

fn opts(kernel: &str) -> GridOpts {
    GridOpts { kernel: kernel.parse().unwrap(), subgrid_size: 8, ..GridOpts::default() }
}

// Every sample of a jittered Cartesian trajectory has a cell of its own, so
// under nearest-neighbour gridding Gᴴ G is an orthogonal projection.
#[rstest(/**/ n_dims,
             case(1),
             case(2),
             case(3),
)]
fn nearest_neighbour_normal_operator_is_a_projection(n_dims: usize) {
    let trajectory = jittered_cartesian(n_dims, 16, 7);
    let grid = make_grid(&trajectory, 1, None, &opts("NN")).unwrap();
    let x = random(grid.ishape(), 1);
    let y = grid.adjoint_forward(x.view()).unwrap();
    assert_eq!(y.shape(), x.shape());
    let error = projection_error(&x, &y);
    assert!(error < 1e-6, "relative error {error:e}");
}

#[test]
fn nearest_neighbour_dot_test_at_matrix_16() {
    let trajectory = jittered_cartesian(3, 16, 42);
    let grid = make_grid(&trajectory, 1, None, &GridOpts { kernel: KernelType::NearestNeighbour, ..GridOpts::default() }).unwrap();
    assert_eq!(grid.ishape().slice(), &[1, 1, 32, 32, 32]);
    assert_eq!(grid.oshape().slice(), &[1, 16 * 16 * 16, 1]);

    let x = random(grid.ishape(), 3);
    let y = grid.adjoint(grid.forward(x.view()).unwrap().view()).unwrap();
    assert!(projection_error(&x, &y) < 1e-6);
}

#[rstest(/**/ kernel,
             case("NN"),
             case("ES3"),
             case("ES5"),
             case("ES7"),
             case("KB3"),
             case("KB5"),
             case("KB7"),
)]
fn grid_adjoint_matches_forward(kernel: &str) {
    let trajectory = spiral(16);
    let grid = make_grid(&trajectory, 2, None, &opts(kernel)).unwrap();
    let x = random(grid.ishape(), 10);
    let y = random(grid.oshape(), 11);
    let gx = grid.forward(x.view()).unwrap();
    let ghy = grid.adjoint(y.view()).unwrap();
    let (lhs, rhs) = (dot(&gx, &y), dot(&x, &ghy));
    assert!(relative(lhs, rhs) < 1e-4, "⟨Gx,y⟩ = {lhs}, ⟨x,Gᴴy⟩ = {rhs}");
}

#[rstest(/**/ kernel,
             case("NN"),
             case("ES3"),
             case("KB5"),
)]
fn nufft_adjoint_matches_forward(kernel: &str) {
    let trajectory = spiral(12);
    let nufft = make_nufft(&trajectory, 1, None, None, &opts(kernel)).unwrap();
    let x = random(nufft.ishape(), 20);
    let y = random(nufft.oshape(), 21);
    let (lhs, rhs) = (dot(&nufft.forward(x.view()).unwrap(), &y), dot(&x, &nufft.adjoint(y.view()).unwrap()));
    assert!(relative(lhs, rhs) < 1e-4, "⟨Nx,y⟩ = {lhs}, ⟨x,Nᴴy⟩ = {rhs}");
}

// Conjugation makes the operator real-linear only: the real inner product is
// the one it is adjoint under
#[test]
fn virtual_conjugate_coils_are_adjoint_in_the_real_inner_product() {
    let trajectory = spiral(16);
    let grid = make_grid(&trajectory, 2, None, &GridOpts { vcc: true, ..opts("ES3") }).unwrap();
    assert_eq!(grid.ishape()[0], 4);
    assert_eq!(grid.oshape()[0], 2);
    let x = random(grid.ishape(), 30);
    let y = random(grid.oshape(), 31);
    let (lhs, rhs) = (dot(&grid.forward(x.view()).unwrap(), &y), dot(&x, &grid.adjoint(y.view()).unwrap()));
    assert!(relative(lhs, rhs) < 1e-4, "⟨Gx,y⟩ = {lhs}, ⟨x,Gᴴy⟩ = {rhs}");
}

#[test]
fn basis_grid_is_adjoint() {
    let trajectory = spiral(16); // 8 samples per trace
    let basis = Basis::new(random((3, 4, 1), 40)).unwrap();
    let grid = make_grid(&trajectory, 2, Some(basis), &opts("KB3")).unwrap();
    assert_eq!(grid.ishape()[1], 3);
    let x = random(grid.ishape(), 41);
    let y = random(grid.oshape(), 42);
    let (lhs, rhs) = (dot(&grid.forward(x.view()).unwrap(), &y), dot(&x, &grid.adjoint(y.view()).unwrap()));
    assert!(relative(lhs, rhs) < 1e-4, "⟨Gx,y⟩ = {lhs}, ⟨x,Gᴴy⟩ = {rhs}");
}

#[test]
fn basis_period_must_tile_the_acquisition() {
    let trajectory = spiral(16);
    let basis = Basis::new(random((2, 3, 1), 0)).unwrap();
    let result = make_grid(&trajectory, 1, Some(basis), &opts("ES3"));
    assert!(matches!(result, Err(GridError::Basis(_))));
}

#[rstest(/**/ kernel,
             case("NN"),
             case("ES3"),
             case("KB7"),
)]
fn shapes_are_enforced(kernel: &str) {
    let trajectory = spiral(8);
    for op in [
        make_grid (&trajectory, 3, None,       &opts(kernel)).unwrap(),
        make_nufft(&trajectory, 3, None, None, &opts(kernel)).unwrap(),
    ] {
        let (c, b, n0, n1, n2) = op.ishape().into_pattern();
        let (oc, s, t) = op.oshape().into_pattern();
        assert_eq!((c, b, oc, s, t), (3, 1, 3, 4, 128));

        let x = Cx5::zeros(op.ishape());
        assert_eq!(op.forward(x.view()).unwrap().dim(), (3, 4, 128));
        let y = Cx3::zeros(op.oshape());
        assert_eq!(op.adjoint(y.view()).unwrap().dim(), (3, 1, n0, n1, n2));

        let wrong = Cx5::zeros((3, 1, n0, n1, n2 + 1));
        assert!(matches!(op.forward(wrong.view()), Err(GridError::ShapeMismatch { .. })));
        let wrong = Cx3::zeros((2, 4, 128));
        assert!(matches!(op.adjoint(wrong.view()), Err(GridError::ShapeMismatch { .. })));
    }
}

#[test]
fn blanked_samples_are_excluded_and_read_as_zero() {
    let mut points = kgrid::trajectory::archimedean_spiral(8, 32);
    let blanked = [(0, 2, 5), (1, 7, 31), (2, 4, 0)];
    for &(d, s, t) in &blanked { points[[d, s, t]] = f32::NAN }
    let trajectory = Trajectory::isotropic(points, 16).unwrap();
    assert_eq!(trajectory.n_finite(0), 8 * 32 - blanked.len());

    let mapping = Mapping::new(&trajectory, 3, &opts("ES3")).unwrap();
    let owned: usize = mapping.subgrids.iter().map(|s| s.len()).sum();
    assert_eq!(owned, 8 * 32 - blanked.len());

    let grid = make_grid(&trajectory, 1, None, &opts("ES3")).unwrap();
    let y = grid.forward(random(grid.ishape(), 50).view()).unwrap();
    for &(_, s, t) in &blanked {
        assert_eq!(y[[0, s, t]], kgrid::Cx::new(0.0, 0.0));
    }
    assert!(y.iter().all(|v| v.re.is_finite() && v.im.is_finite()));
}

#[test]
fn half_way_samples_round_to_even_cells() {
    // Grid of 8 cells, centre 4: these land exactly half way between cells
    let k = [0.0625, 0.1875, -0.0625, -0.1875];
    let points = Re3::from_shape_vec((1, 4, 1), k.to_vec()).unwrap();
    let trajectory = Trajectory::isotropic(points, 8).unwrap();
    let mapping = Mapping::new(&trajectory, 1, &GridOpts { osamp: 1.0, ..opts("NN") }).unwrap();
    assert_eq!(mapping.cart_dims, [8, 1, 1]);
    let cells: Vec<u32> = mapping.cart.iter().map(|c| c[0]).collect();
    assert_eq!(cells, vec![4, 6, 4, 2]);
    let offsets: Vec<f32> = mapping.offset.iter().map(|o| o[0]).collect();
    assert_eq!(offsets, vec![0.5, -0.5, -0.5, 0.5]);
}

#[test]
fn single_thread_agrees_with_many_threads() {
    let trajectory = spiral(16);
    let o = opts("KB3");
    let (one, many) = (build_pool(Some(1)).unwrap(), build_pool(Some(4)).unwrap());

    let m1 = one .install(|| Mapping::new(&trajectory, 3, &o)).unwrap();
    let m4 = many.install(|| Mapping::new(&trajectory, 3, &o)).unwrap();
    assert_eq!(m1, m4);

    let x = random((2, 1, 32, 32, 32), 60);
    let y = random((2, 8, 512), 61);
    let (f1, a1) = one.install(|| {
        let grid = make_grid(&trajectory, 2, None, &o).unwrap();
        (grid.forward(x.view()).unwrap(), grid.adjoint(y.view()).unwrap())
    });
    let (f4, a4) = many.install(|| {
        let grid = make_grid(&trajectory, 2, None, &o).unwrap();
        (grid.forward(x.view()).unwrap(), grid.adjoint(y.view()).unwrap())
    });
    // Forward gathers without shared state; adjoint sums in scheduling order
    assert_eq!(f1, f4);
    for (a, b) in a1.iter().zip(a4.iter()) {
        assert_float_eq!(a.re, b.re, abs <= 1e-4);
        assert_float_eq!(a.im, b.im, abs <= 1e-4);
    }
}

#[test]
fn toeplitz_normal_operator_from_config() {
    let config = parse_config(r#"
        threads = 2

        [grid]
        kernel = "NN"
        osamp = 1.0
        subgrid_size = 8
        toeplitz = true
    "#).unwrap();
    let pool = build_pool(config.threads).unwrap();
    let trajectory = spiral(8);
    let density = Re2::ones((trajectory.n_samples(), trajectory.n_traces()));
    let nufft = pool.install(|| make_nufft(&trajectory, 2, None, Some(density), &config.grid)).unwrap();
    assert_eq!(nufft.ishape().slice(), &[2, 1, 8, 8, 8]);

    let x = random(nufft.ishape(), 70);
    let fast = pool.install(|| nufft.adjoint_forward(x.view())).unwrap();
    let slow = pool.install(|| nufft.adjoint(nufft.forward(x.view()).unwrap().view())).unwrap();
    let error = relative_difference(&fast, &slow);
    assert!(error < 1e-5, "relative difference {error:e}");
}

/// Density weights growing with distance from the centre of k-space
fn ramp(trajectory: &Trajectory) -> Re2 {
    Re2::from_shape_fn((trajectory.n_samples(), trajectory.n_traces()), |(s, t)| {
        let k = trajectory.point(s, t);
        0.05 + k.iter().map(|x| x * x).sum::<f32>()
    })
}

/// `Aᴴ W A x`, through the two resampling passes
fn weighted_normal(nufft: &kgrid::SampleOperator, density: &Re2, x: &Cx5) -> Cx5 {
    let mut y = nufft.forward(x.view()).unwrap();
    for mut channel in y.outer_iter_mut() {
        Zip::from(&mut channel).and(density).for_each(|v, &w| *v *= w);
    }
    nufft.adjoint(y.view()).unwrap()
}

// The embedding approximates the exact normal operator at least as well as
// the NUFFT does, so the two agree to within the kernel's accuracy
#[rstest(/**/ kernel, osamp, tolerance,
             case("NN" , 1.0 , 1e-5),
             case("NN" , 2.0 , 1e-5),
             case("ES3", 2.0 , 1e-1),
             case("KB5", 2.0 , 5e-3),
             case("ES5", 1.3 , 5e-2),
             case("KB7", 1.25, 5e-2),
)]
fn toeplitz_embedding_matches_forward_then_adjoint(kernel: &str, osamp: f32, tolerance: f64) {
    let trajectory = spiral(12);
    let density = ramp(&trajectory);
    let o = GridOpts { osamp, toeplitz: true, ..opts(kernel) };
    let nufft = make_nufft(&trajectory, 2, None, Some(density.clone()), &o).unwrap();
    let x = random(nufft.ishape(), 80);
    let fast = nufft.adjoint_forward(x.view()).unwrap();
    let slow = weighted_normal(&nufft, &density, &x);
    let error = relative_difference(&fast, &slow);
    assert!(error < tolerance, "{kernel} at {osamp}: relative difference {error:e}");
}

#[test]
fn toeplitz_embedding_couples_basis_vectors() {
    let trajectory = spiral(12); // 6 samples per trace
    let basis = Basis::new(random((3, 6, 1), 90)).unwrap();
    let density = ramp(&trajectory);
    let o = GridOpts { toeplitz: true, ..opts("KB5") };
    let nufft = make_nufft(&trajectory, 1, Some(basis), Some(density.clone()), &o).unwrap();
    assert_eq!(nufft.ishape()[1], 3);
    let x = random(nufft.ishape(), 91);
    let fast = nufft.adjoint_forward(x.view()).unwrap();
    let slow = weighted_normal(&nufft, &density, &x);
    let error = relative_difference(&fast, &slow);
    assert!(error < 5e-3, "relative difference {error:e}");
}

#[test]
fn toeplitz_embedding_refuses_conjugate_coils() {
    let o = GridOpts { toeplitz: true, vcc: true, ..opts("ES3") };
    let result = make_nufft(&spiral(8), 1, None, None, &o);
    assert!(matches!(result, Err(GridError::InvalidConfiguration(_))));
}

// Every kernel keeps a positive apodization, and so builds, down to the
// lowest oversampling the configuration accepts
#[rstest(/**/ osamp,
             case(1.0 ),
             case(1.1 ),
             case(1.25),
             case(1.3 ),
             case(1.5 ),
)]
fn nufft_builds_at_low_oversampling(osamp: f32) {
    for m in [12, 32] {
        let trajectory = spiral(m);
        for kernel in ["ES3", "ES5", "ES7", "KB3", "KB5", "KB7"] {
            let nufft = make_nufft(&trajectory, 1, None, None, &GridOpts { osamp, ..opts(kernel) });
            assert!(nufft.is_ok(), "{kernel}, matrix {m}, osamp {osamp}: {:?}", nufft.err());
        }
    }
}

#[test]
fn channel_batches_from_config() {
    let config = parse_config("[grid]\nkernel = \"KB3\"\nsubgrid_size = 8\nbatches = 3").unwrap();
    let trajectory = spiral(8);
    let batched = make_nufft(&trajectory, 6, None, None, &config.grid).unwrap();
    let whole   = make_nufft(&trajectory, 6, None, None, &GridOpts { batches: 1, ..config.grid }).unwrap();
    assert_eq!(batched.ishape(), whole.ishape());
    let x = random(whole.ishape(), 100);
    assert_eq!(batched.forward(x.view()).unwrap(), whole.forward(x.view()).unwrap());

    let result = make_nufft(&trajectory, 4, None, None, &config.grid);
    assert!(matches!(result, Err(GridError::InvalidConfiguration(_))));
}

#[rstest(/**/ text,
             case("[grid]\nkernel = \"ES4\""),
             case("[grid]\nosamp = 0.5"),
             case("[grid]\nkernel = \"KB7\"\nsubgrid_size = 4"),
             case("[grid]\nwobble = 3"),
             case("[grid]\ntoeplitz = true\nvcc = true"),
             case("[grid]\nbatches = 0"),
)]
fn bad_configurations_are_rejected(text: &str) {
    assert!(parse_config(text).is_err());
}
