// ----------------------------------- CLI -----------------------------------
use clap::Parser;

use kgrid::utils::parse_triplet;

#[derive(Parser, Debug, Clone)]
#[clap(name = "kgrid-bench", about = "Time the NUFFT on a spiral trajectory")]
pub struct Cli {

    /// Image matrix
    #[clap(short, long, value_parser = parse_triplet::<usize>, default_value = "64,64,64")]
    pub matrix: [usize; 3],

    /// Samples per spoke (default: largest matrix extent / 2)
    #[clap(long)]
    pub read: Option<usize>,

    /// Number of spokes (default: enough to cover the sphere at Nyquist)
    #[clap(long)]
    pub spokes: Option<usize>,

    /// Number of receive channels
    #[clap(short, long, default_value = "4")]
    pub channels: usize,

    /// How many times to repeat each operation
    #[clap(short, long, default_value = "5")]
    pub repeats: u64,

    /// TOML file with a `[grid]` table; flags below override it
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Kernel: NN, KB3, KB5, KB7, ES3, ES5 or ES7
    #[clap(short, long)]
    pub kernel: Option<KernelType>,

    /// Grid oversampling
    #[clap(short, long)]
    pub osamp: Option<f32>,

    /// Add virtual conjugate coils
    #[clap(long)]
    pub vcc: bool,

    /// Use the Töplitz embedding for the normal operator
    #[clap(long)]
    pub toeplitz: bool,

    /// Subgrid edge length
    #[clap(long)]
    pub subgrid_size: Option<usize>,

    /// Process the channels in this many batches
    #[clap(long)]
    pub batches: Option<usize>,

    /// Maximum number of rayon threads
    #[clap(short = 'j', long)]
    pub threads: Option<usize>,
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Zip;
use rand::prelude::*;
use rand_distr::StandardNormal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use kgrid::{
    config::read_config_file,
    make_grid, make_nufft,
    threads::build_pool,
    trajectory::{archimedean_spiral, Trajectory},
    utils::{group_digits, timing::Progress},
    Config, Cx, Cx3, Cx5, KernelType, GridOpts,
};

fn main() -> Result<(), Box<dyn Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    run(Cli::parse())
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {

    // --- Options: file first, then flags -------------------------------------------
    let Config { grid: base, threads } = match &args.config {
        Some(path) => read_config_file(path)?,
        None       => Config::default(),
    };
    let opts = GridOpts {
        kernel      : args.kernel      .unwrap_or(base.kernel),
        osamp       : args.osamp       .unwrap_or(base.osamp),
        subgrid_size: args.subgrid_size.unwrap_or(base.subgrid_size),
        batches     : args.batches     .unwrap_or(base.batches),
        vcc         : args.vcc      || base.vcc,
        toeplitz    : args.toeplitz || base.toeplitz,
        ..base
    };
    opts.validate()?;
    let pool = build_pool(args.threads.or(threads))?;

    // --- Trajectory ---------------------------------------------------------------
    let m_max = args.matrix.iter().copied().max().unwrap_or(1);
    let n_read = args.read.unwrap_or(m_max / 2).max(1);
    let n_spokes = args.spokes.unwrap_or_else(|| {
        (std::f32::consts::PI * (m_max * m_max) as f32).ceil() as usize
    });
    let trajectory = Trajectory::new(archimedean_spiral(n_read, n_spokes), args.matrix)?;
    info!("{} samples in {} spokes, matrix {:?}, {:?}",
          group_digits(n_read * n_spokes), group_digits(n_spokes), args.matrix, opts);

    let mut progress = Progress::new();
    progress.start("Building NUFFT");
    let nufft = pool.install(|| make_nufft(&trajectory, args.channels, None, None, &opts))?;
    progress.done();

    // --- Random image -------------------------------------------------------------
    let mut rng = StdRng::seed_from_u64(42);
    let mut x = Cx5::zeros(nufft.ishape());
    x.iter_mut().for_each(|v| *v = Cx::new(rng.sample(StandardNormal), rng.sample(StandardNormal)));

    // --- Timed repetitions --------------------------------------------------------
    let bar = ProgressBar::new(args.repeats);
    bar.set_style(ProgressStyle::default_bar()
                  .template("{msg}\n[{elapsed_precise}] {wide_bar} {pos}/{len} ({eta_precise})")?);
    let mut y: Option<Cx3> = None;
    for (label, adjoint) in [("forward", false), ("adjoint", true)] {
        bar.reset();
        bar.set_message(format!("NUFFT {label}"));
        progress.start(&format!("{} x {label}", args.repeats));
        for _ in 0..args.repeats {
            pool.install(|| -> kgrid::Result<()> {
                if adjoint {
                    if let Some(y) = &y { nufft.adjoint(y.view())?; }
                } else {
                    y = Some(nufft.forward(x.view())?);
                }
                Ok(())
            })?;
            bar.inc(1);
        }
        progress.done_with_message(&format!("{label} total"));
    }
    bar.finish_and_clear();

    // --- Nearest-neighbour dot test -----------------------------------------------
    let nn = GridOpts { kernel: KernelType::NearestNeighbour, vcc: false, toeplitz: false, ..opts };
    let grid = pool.install(|| make_grid(&trajectory, 1, None, &nn))?;
    let mut g = Cx5::zeros(grid.ishape());
    g.iter_mut().for_each(|v| *v = Cx::new(rng.sample(StandardNormal), rng.sample(StandardNormal)));
    let ag = pool.install(|| grid.adjoint_forward(g.view()))?;
    let dot = |a: &Cx5, b: &Cx5| {
        let mut sum = 0.0_f64;
        Zip::from(a).and(b).for_each(|a, b| sum += (a * b.conj()).re as f64);
        sum
    };
    let (xy, yy) = (dot(&g, &ag), dot(&ag, &ag));
    println!("NN dot test: <x,y> = {xy:.6e}, <y,y> = {yy:.6e}, relative difference {:.3e}",
             (xy - yy).abs() / (xy + yy));
    Ok(())
}

// ------------------------------ TESTS ------------------------------
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn small_batched_run() {
        let args = Cli::try_parse_from([
            "kgrid-bench", "--matrix", "8,8,8", "--read", "4", "--spokes", "30",
            "--channels", "2", "--repeats", "2", "--kernel", "KB3",
            "--subgrid-size", "8", "--batches", "2", "-j", "2",
        ]).unwrap();
        assert_eq!(args.batches, Some(2));
        run(args).unwrap();
    }
}
