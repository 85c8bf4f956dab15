//! Worker pool for tile jobs

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use crossbeam::channel::unbounded;

use crate::error::{Error, Result};
use super::job::{TileJob, TileResult};

/// Runs independent tile jobs on a fixed pool of workers
///
/// Each worker builds its own context once, before its first job, and
/// keeps it for the whole run. Results come back in submission order.
#[derive(Debug, Clone, Copy)]
pub struct TileScheduler {
    workers: usize,
}

impl TileScheduler {
    /// Pool of `workers` threads; zero means one per available core
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            workers
        };
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `jobs`, returning one result per job in submission order
    ///
    /// `init` is called once per worker with the worker index. A worker
    /// whose initialization fails takes no jobs; jobs no worker could run
    /// are reported as failed. A job that panics becomes a failed result and
    /// its worker rebuilds its context before the next job.
    pub fn run<C, I, E>(&self, jobs: Vec<TileJob>, init: I, exec: E) -> Vec<TileResult>
    where
        I: Fn(usize) -> Result<C> + Sync,
        E: Fn(&mut C, &TileJob) -> TileResult + Sync,
    {
        let total = jobs.len();
        let workers = self.workers.min(total.max(1));
        tracing::info!(jobs = total, workers, "Scheduling tile jobs");

        let (job_tx, job_rx) = unbounded::<(usize, &TileJob)>();
        let (result_tx, result_rx) = unbounded::<(usize, TileResult)>();
        let (init_err_tx, init_err_rx) = unbounded::<String>();

        for entry in jobs.iter().enumerate() {
            let _ = job_tx.send(entry);
        }
        drop(job_tx);

        thread::scope(|scope| {
            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let init_err_tx = init_err_tx.clone();
                let init = &init;
                let exec = &exec;

                scope.spawn(move || {
                    let mut context = match init(worker) {
                        Ok(context) => context,
                        Err(e) => {
                            tracing::error!(worker, error = %e, "Worker initialization failed");
                            let _ = init_err_tx.send(e.to_string());
                            return;
                        }
                    };

                    while let Ok((index, job)) = job_rx.recv() {
                        let result = match panic::catch_unwind(AssertUnwindSafe(|| exec(&mut context, job))) {
                            Ok(result) => result,
                            Err(payload) => {
                                let failure = panicked(job, payload);
                                match init(worker) {
                                    Ok(fresh) => context = fresh,
                                    Err(e) => {
                                        tracing::error!(worker, error = %e, "Worker re-initialization failed");
                                        let _ = result_tx.send((index, failure));
                                        let _ = init_err_tx.send(e.to_string());
                                        return;
                                    }
                                }
                                failure
                            }
                        };
                        match result.error() {
                            Some(e) => tracing::warn!(
                                tile_x = job.tile.tile_x,
                                tile_y = job.tile.tile_y,
                                error = %e,
                                "Tile failed"
                            ),
                            None => tracing::debug!(
                                tile_x = job.tile.tile_x,
                                tile_y = job.tile.tile_y,
                                worker,
                                "Tile done"
                            ),
                        }
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(job_rx);
        drop(result_tx);
        drop(init_err_tx);

        let mut slots: Vec<Option<TileResult>> = (0..total).map(|_| None).collect();
        for (index, result) in result_rx.iter() {
            slots[index] = Some(result);
        }

        let init_error = init_err_rx.iter().next();
        let results: Vec<TileResult> = slots
            .into_iter()
            .zip(jobs)
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| {
                    let reason = match &init_error {
                        Some(e) => format!("No worker available: {}", e),
                        None => "No worker available".to_string(),
                    };
                    TileResult::failed(
                        job.tile.clone(),
                        Error::ResampleFailure {
                            tile_x: job.tile.tile_x,
                            tile_y: job.tile.tile_y,
                            reason,
                        },
                    )
                })
            })
            .collect();

        let failed = results.iter().filter(|r| !r.is_success()).count();
        tracing::info!(succeeded = total - failed, failed, "Tile jobs finished");
        results
    }
}

/// Failed result for a job whose execution panicked
fn panicked(job: &TileJob, payload: Box<dyn Any + Send>) -> TileResult {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    TileResult::failed(
        job.tile.clone(),
        Error::ResampleFailure {
            tile_x: job.tile.tile_x,
            tile_y: job.tile.tile_y,
            reason: format!("panicked: {}", message),
        },
    )
}

impl Default for TileScheduler {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use crate::engine::job::{TileMode, TileOutput, TileTarget};
    use crate::grid::{GeoGrid, GeoTransform, Projection};
    use crate::tiling::TilePlanner;

    fn jobs(count: u64) -> Vec<TileJob> {
        let grid = GeoGrid::new(count, 1, GeoTransform::new(0.0, 1.0, 0.0, -1.0), Projection::default()).unwrap();
        let target = Arc::new(grid);
        TilePlanner::new(1)
            .unwrap()
            .plan(&target)
            .unwrap()
            .into_iter()
            .map(|tile| TileJob {
                input: PathBuf::from("mem://input"),
                target: Arc::clone(&target),
                tile,
                mode: TileMode::Shift(0),
                output: TileTarget::Memory,
            })
            .collect()
    }

    fn done(job: &TileJob) -> TileResult {
        TileResult::succeeded(job.tile.clone(), TileOutput::File(PathBuf::from(format!("{}", job.tile.tile_x))))
    }

    #[test]
    fn test_results_follow_submission_order() {
        let scheduler = TileScheduler::new(4);
        let results = scheduler.run(
            jobs(12),
            |_| Ok(()),
            |_, job| {
                // Later jobs finish first
                thread::sleep(Duration::from_millis(5 * (12 - job.tile.tile_x as u64)));
                done(job)
            },
        );

        assert_eq!(results.len(), 12);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.tile.tile_x, i);
            assert!(result.is_success());
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let results = TileScheduler::new(3).run(
            jobs(6),
            |_| Ok(()),
            |_, job| {
                if job.tile.tile_x % 2 == 0 {
                    TileResult::failed(
                        job.tile.clone(),
                        Error::InvalidTileGeometry("bad".to_string()),
                    )
                } else {
                    done(job)
                }
            },
        );

        let flags: Vec<bool> = results.iter().map(|r| r.is_success()).collect();
        assert_eq!(flags, vec![false, true, false, true, false, true]);
        assert!(results[0].error().is_some());
        assert!(results[1].error().is_none());
    }

    #[test]
    fn test_init_runs_once_per_worker() {
        let inits = AtomicUsize::new(0);
        let results = TileScheduler::new(3).run(
            jobs(30),
            |worker| {
                inits.fetch_add(1, Ordering::SeqCst);
                Ok(worker)
            },
            |_, job| done(job),
        );
        assert_eq!(results.len(), 30);
        assert!(inits.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_failed_init_leaves_jobs_to_healthy_workers() {
        let results = TileScheduler::new(2).run(
            jobs(5),
            |worker| {
                if worker == 0 {
                    Err(Error::InvalidConfiguration("no drivers".to_string()))
                } else {
                    Ok(())
                }
            },
            |_, job| done(job),
        );
        assert!(results.iter().all(|r| r.is_success()));

        let results = TileScheduler::new(2).run(
            jobs(3),
            |_| Err::<(), _>(Error::InvalidConfiguration("no drivers".to_string())),
            |_, job| done(job),
        );
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.is_success()));
        assert!(results[0].error().unwrap().to_string().contains("no drivers"));
    }

    #[test]
    fn test_panicking_tile_does_not_abort_siblings() {
        let inits = AtomicUsize::new(0);
        let results = TileScheduler::new(2).run(
            jobs(6),
            |_| {
                inits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            |_, job| {
                if job.tile.tile_x == 1 {
                    panic!("kernel index out of range");
                }
                done(job)
            },
        );

        assert_eq!(results.len(), 6);
        let flags: Vec<bool> = results.iter().map(|r| r.is_success()).collect();
        assert_eq!(flags, vec![true, false, true, true, true, true]);
        match results[1].error() {
            Some(Error::ResampleFailure { tile_x: 1, tile_y: 0, reason }) => {
                assert!(reason.contains("kernel index out of range"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        // The worker that hit the panic rebuilt its context
        assert!(inits.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_empty_job_list() {
        let results = TileScheduler::new(2).run(Vec::new(), |_| Ok(()), |_, job: &TileJob| done(job));
        assert!(results.is_empty());
    }
}
