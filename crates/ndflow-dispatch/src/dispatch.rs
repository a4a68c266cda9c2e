//! The threaded dispatcher: parallel execution of a stage's compute
//! callback across disjoint sub-regions.

use crossbeam_channel::unbounded;

use ndflow_core::error::{DispatchError, StageError};
use ndflow_core::region::Region;
use ndflow_image::Tile;

use crate::progress::ProgressReporter;
use crate::split::split_region;

/// A stage's per-sub-region compute callback.
///
/// Invoked concurrently from worker threads: it must treat all inputs
/// as read-only and write only the tiles it is handed (one per stage
/// output, each covering the assigned sub-region).
pub type Compute<'a> = dyn Fn(&Region, &mut [Tile]) -> Result<(), StageError> + Sync + 'a;

/// Splits a requested region across a bounded worker pool and blocks
/// until every sub-region completes.
///
/// Workers receive sub-regions over a crossbeam channel, allocate
/// their own output tiles, run the callback, report progress, and send
/// the tiles back; the caller blits them into the owned output buffer.
/// On a worker error the remaining sub-regions still run to completion
/// (no cancellation) and the first error observed is surfaced.
#[derive(Clone, Debug)]
pub struct ThreadedDispatcher {
    workers: usize,
    min_elements: u64,
}

impl ThreadedDispatcher {
    /// Default floor on sub-region size; splitting finer than this
    /// costs more in scheduling than it buys in parallelism.
    pub const DEFAULT_MIN_ELEMENTS: u64 = 64;

    /// Create a dispatcher with `workers` worker threads (>= 1).
    pub fn new(workers: usize) -> Result<Self, DispatchError> {
        if workers == 0 {
            return Err(DispatchError::NoWorkers);
        }
        Ok(Self {
            workers,
            min_elements: Self::DEFAULT_MIN_ELEMENTS,
        })
    }

    /// Override the minimum sub-region size (elements). Mostly for
    /// tests that want to force a specific partition count.
    pub fn with_min_elements(mut self, min_elements: u64) -> Self {
        self.min_elements = min_elements.max(1);
        self
    }

    /// Number of worker threads this dispatcher spawns.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Execute `compute` over `region`, producing `outputs` tiles per
    /// sub-region.
    ///
    /// Returns tile sets in deterministic sub-region order (the order
    /// [`split_region`] produced), so the caller's blit order, and any
    /// floating-point accumulation it implies, is reproducible
    /// regardless of which worker finished first.
    pub fn dispatch(
        &self,
        region: &Region,
        outputs: usize,
        compute: &Compute<'_>,
        progress: &ProgressReporter<'_>,
    ) -> Result<Vec<Vec<Tile>>, DispatchError> {
        let pieces = split_region(region, self.workers, self.min_elements);
        if pieces.is_empty() {
            return Ok(Vec::new());
        }

        let (task_tx, task_rx) = unbounded::<(usize, Region)>();
        let (result_tx, result_rx) = unbounded::<(usize, Result<Vec<Tile>, StageError>)>();
        for task in pieces.iter().cloned().enumerate() {
            // Unbounded channel; send cannot block or fail here.
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        let thread_count = self.workers.min(pieces.len());
        std::thread::scope(|scope| {
            for _ in 0..thread_count {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    while let Ok((index, sub)) = task_rx.recv() {
                        let result = run_one(&sub, outputs, compute, progress);
                        let _ = result_tx.send((index, result));
                    }
                });
            }
        });
        drop(result_tx);

        // Barrier reached: every worker has finished. Collect results;
        // the first error in completion order wins.
        let mut slots: Vec<Option<Vec<Tile>>> = (0..pieces.len()).map(|_| None).collect();
        let mut first_error: Option<StageError> = None;
        while let Ok((index, result)) = result_rx.recv() {
            match result {
                Ok(tiles) => slots[index] = Some(tiles),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(reason) = first_error {
            return Err(DispatchError::WorkerFailed { reason });
        }

        let mut tile_sets = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Some(tiles) => tile_sets.push(tiles),
                // Every piece either errored (returned above) or
                // produced tiles; an empty slot cannot happen.
                None => {
                    return Err(DispatchError::WorkerFailed {
                        reason: StageError::ExecutionFailed {
                            reason: "worker produced no result for its sub-region".into(),
                        },
                    })
                }
            }
        }
        Ok(tile_sets)
    }
}

/// Allocate tiles for one sub-region, run the callback, report
/// progress on success.
fn run_one(
    sub: &Region,
    outputs: usize,
    compute: &Compute<'_>,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<Tile>, StageError> {
    let mut tiles = Vec::with_capacity(outputs);
    for _ in 0..outputs {
        let tile = Tile::allocate(sub).map_err(|_| StageError::ResourceExhaustion {
            elements: sub.num_elements(),
        })?;
        tiles.push(tile);
    }
    compute(sub, &mut tiles)?;
    progress.completed(sub.num_elements());
    Ok(tiles)
}
