//! Serial / parallel driver for the per-timepoint fitting map
//!
//! The work unit is one timepoint: apply the fitting callable for every
//! requested channel against that timepoint's snapshot. In parallel mode
//! the units run on a dedicated bounded rayon pool; indexed parallel
//! iteration plus `collect` keeps the assembled ordering equal to serial
//! mode no matter which worker finishes first.
//!
//! While the pool is active, math-library thread counts (OpenBLAS, MKL,
//! OpenMP) are clamped to 1 so a numeric library inside the callable does
//! not multiply against the pool's own parallelism.

use crate::models::FitResult;
use crate::table::Snapshot;
use crate::{Error, Result};
use rayon::prelude::*;
use std::env;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Default worker count for parallel fitting
pub const DEFAULT_WORKERS: usize = 4;

/// Fitting execution options
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Run the per-timepoint map on a worker pool
    pub parallel: bool,
    /// Worker pool size (ignored when `parallel` is false)
    pub workers: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl FitOptions {
    /// Serial execution
    #[must_use]
    pub fn serial() -> Self {
        Self::default()
    }

    /// Parallel execution on `workers` threads
    #[must_use]
    pub const fn parallel(workers: usize) -> Self {
        Self {
            parallel: true,
            workers,
        }
    }
}

/// Run the callable over every (time, channel) cell.
///
/// Returns one result row per snapshot, in snapshot (time) order, each row
/// in channel order. The first callable failure aborts everything.
pub(crate) fn run_model<F>(
    snapshots: &[Snapshot<'_>],
    channels: &[String],
    function: &F,
    options: &FitOptions,
) -> Result<Vec<Vec<Box<dyn FitResult>>>>
where
    F: Fn(&Snapshot<'_>, &str) -> Result<Box<dyn FitResult>> + Sync,
{
    if options.parallel {
        debug!(
            workers = options.workers,
            timepoints = snapshots.len(),
            channels = channels.len(),
            "running parallel fit"
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers.max(1))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;
        let _clamp = MathThreadClamp::engage();
        pool.install(|| {
            snapshots
                .par_iter()
                .map(|snapshot| fit_one_time(snapshot, channels, function))
                .collect()
        })
    } else {
        snapshots
            .iter()
            .map(|snapshot| fit_one_time(snapshot, channels, function))
            .collect()
    }
}

fn fit_one_time<F>(
    snapshot: &Snapshot<'_>,
    channels: &[String],
    function: &F,
) -> Result<Vec<Box<dyn FitResult>>>
where
    F: Fn(&Snapshot<'_>, &str) -> Result<Box<dyn FitResult>> + Sync,
{
    channels
        .iter()
        .map(|channel| {
            function(snapshot, channel).map_err(|source| Error::Fit {
                time: snapshot.time().clone(),
                channel: channel.clone(),
                source: Box::new(source),
            })
        })
        .collect()
}

/// Environment variables math libraries consult for their thread counts
const MATH_THREAD_VARS: [&str; 3] = [
    "OPENBLAS_NUM_THREADS",
    "MKL_NUM_THREADS",
    "OMP_NUM_THREADS",
];

/// Shared clamp state: engagement count plus the snapshot taken by the
/// first engagement. The environment is process-global, so the snapshot
/// must be too.
struct ClampState {
    engaged: usize,
    saved: Vec<(&'static str, Option<String>)>,
}

static CLAMP: Mutex<ClampState> = Mutex::new(ClampState {
    engaged: 0,
    saved: Vec::new(),
});

/// RAII clamp of math-library parallelism while a worker pool is active.
///
/// Engagements are refcounted through a process-wide mutex: the first
/// engagement snapshots the previous values and sets the variables to 1,
/// the last drop restores the snapshot. Overlapping fits from multiple
/// threads therefore never restore mid-flight or clobber each other's
/// snapshots.
struct MathThreadClamp;

impl MathThreadClamp {
    fn engage() -> Self {
        let mut state = CLAMP.lock().unwrap_or_else(PoisonError::into_inner);
        if state.engaged == 0 {
            state.saved = MATH_THREAD_VARS
                .iter()
                .map(|&var| {
                    let previous = env::var(var).ok();
                    env::set_var(var, "1");
                    (var, previous)
                })
                .collect();
        }
        state.engaged += 1;
        Self
    }
}

impl Drop for MathThreadClamp {
    fn drop(&mut self) {
        let mut state = CLAMP.lock().unwrap_or_else(PoisonError::into_inner);
        state.engaged -= 1;
        if state.engaged == 0 {
            for (var, previous) in state.saved.drain(..) {
                match previous {
                    Some(value) => env::set_var(var, value),
                    None => env::remove_var(var),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_thread_clamp_restores_after_last_engagement() {
        env::set_var("OMP_NUM_THREADS", "8");
        {
            let _clamp = MathThreadClamp::engage();
            assert_eq!(env::var("OMP_NUM_THREADS").unwrap(), "1");
        }
        assert_eq!(env::var("OMP_NUM_THREADS").unwrap(), "8");

        // overlapping engagements: the inner drop must not restore while
        // the outer engagement is still alive
        {
            let _outer = MathThreadClamp::engage();
            {
                let _inner = MathThreadClamp::engage();
                assert_eq!(env::var("OMP_NUM_THREADS").unwrap(), "1");
            }
            assert_eq!(env::var("OMP_NUM_THREADS").unwrap(), "1");
        }
        assert_eq!(env::var("OMP_NUM_THREADS").unwrap(), "8");
        env::remove_var("OMP_NUM_THREADS");
    }

    #[test]
    fn test_fit_options_defaults() {
        let options = FitOptions::default();
        assert!(!options.parallel);
        assert_eq!(options.workers, DEFAULT_WORKERS);
        assert!(FitOptions::parallel(2).parallel);
    }
}
