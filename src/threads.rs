//! Worker pools. Operators never reach for a global pool: callers build one
//! here, once, and `install` operator calls into it.

/// Pool with `n_threads` workers, or one per available core when `None`
pub fn build_pool(n_threads: Option<usize>) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new();
    if let Some(n) = n_threads {
        if n == 0 { return Err(GridError::config("thread count must be positive")) }
        builder = builder.num_threads(n);
    }
    let pool = builder.build()?;
    info!("Using up to {} threads", pool.current_num_threads());
    Ok(pool)
}

// ----- Imports ------------------------------------------------------------------------------------------
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

use crate::error::{GridError, Result};
