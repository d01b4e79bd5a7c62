use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::partitioner::{PartitionConfig, Partitioner, WorkUnit};
use crate::common::{FaceRegion, Image};
use crate::error::{CancelReason, PipelineError};
use crate::pipeline::blur::{BlurConfig, BlurPatch, RegionBlurFilter};

/// Result of blurring every region of one image.
#[derive(Debug, Clone)]
pub struct BlurOutcome {
    pub image: Image,
    pub workers_used: usize,
    pub units: usize,
}

/// Bounded pool of blur workers.
///
/// Each unit of work covers a rectangle no other unit touches, so workers only
/// read the shared source image and hand back patches. The merge step writes the
/// patches in unit order, which keeps the output independent of completion order.
pub struct WorkerPool {
    pool: Arc<rayon::ThreadPool>,
    config: BlurConfig,
    partitioner: Partitioner,
    filter: RegionBlurFilter,
}

fn build_thread_pool(worker_count: usize) -> Result<rayon::ThreadPool, PipelineError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .thread_name(|index| format!("blur-worker-{}", index))
        .build()
        .map_err(|e| PipelineError::BlurFailure(format!("failed to start workers: {}", e)))
}

/// Thread pools kept alive across jobs, one per worker count.
#[derive(Default)]
pub struct WorkerPools {
    pools: Mutex<HashMap<usize, Arc<rayon::ThreadPool>>>,
}

impl WorkerPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// A blur pool for `config`, running on the cached threads for its worker count.
    pub fn get(&self, config: BlurConfig, partition: PartitionConfig) -> Result<WorkerPool, PipelineError> {
        let pool = self.thread_pool(config.worker_count())?;
        Ok(WorkerPool::with_thread_pool(pool, config, partition))
    }

    pub fn thread_pool(&self, worker_count: usize) -> Result<Arc<rayon::ThreadPool>, PipelineError> {
        let mut pools = self
            .pools
            .lock()
            .map_err(|_| PipelineError::BlurFailure("worker pool cache is poisoned".to_string()))?;
        if let Some(pool) = pools.get(&worker_count) {
            return Ok(pool.clone());
        }
        let pool = Arc::new(build_thread_pool(worker_count)?);
        debug!("Started {} blur worker threads", worker_count);
        pools.insert(worker_count, pool.clone());
        Ok(pool)
    }

    /// Number of distinct thread pools started so far.
    pub fn len(&self) -> usize {
        self.pools.lock().map(|pools| pools.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorkerPool {
    /// A pool with its own threads, released when the pool is dropped.
    pub fn new(config: BlurConfig, partition: PartitionConfig) -> Result<Self, PipelineError> {
        let pool = build_thread_pool(config.worker_count())?;
        Ok(Self::with_thread_pool(Arc::new(pool), config, partition))
    }

    fn with_thread_pool(
        pool: Arc<rayon::ThreadPool>,
        config: BlurConfig,
        partition: PartitionConfig,
    ) -> Self {
        Self {
            pool,
            config,
            partitioner: Partitioner::new(partition),
            filter: RegionBlurFilter::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.config.worker_count()
    }

    pub fn blur_all(
        &self,
        image: &Image,
        regions: &[FaceRegion],
        cancel: &CancellationToken,
    ) -> Result<BlurOutcome, PipelineError> {
        if regions.is_empty() {
            debug!("No regions to blur, returning a copy of the input");
            return Ok(BlurOutcome {
                image: image.clone(),
                workers_used: 0,
                units: 0,
            });
        }

        let units = self
            .partitioner
            .plan(regions, image.width(), image.height());
        let output = self.execute(image, &units, cancel)?;
        let workers_used = self.worker_count().min(units.len());
        Ok(BlurOutcome {
            image: output,
            workers_used,
            units: units.len(),
        })
    }

    pub(crate) fn execute(
        &self,
        image: &Image,
        units: &[WorkUnit],
        cancel: &CancellationToken,
    ) -> Result<Image, PipelineError> {
        let start_time = Instant::now();
        let intensity = self.config.intensity();
        let abort = AtomicBool::new(false);
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results: Vec<Option<Result<BlurPatch, PipelineError>>> = self.pool.install(|| {
            units
                .par_iter()
                .with_max_len(1)
                .map(|unit| {
                    if cancel.is_cancelled() || abort.load(Ordering::Acquire) {
                        return None;
                    }
                    let running = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(running, Ordering::SeqCst);
                    let result = self
                        .filter
                        .apply_tile(image, unit.region, unit.tile, intensity);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    if result.is_err() {
                        abort.store(true, Ordering::Release);
                    }
                    Some(result)
                })
                .collect()
        });

        if cancel.is_cancelled() {
            debug!("Discarding output of {} units after cancellation", units.len());
            return Err(PipelineError::Cancelled(CancelReason::Requested));
        }

        let mut patches = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results.into_iter().flatten() {
            match result {
                Ok(patch) => patches.push(patch),
                Err(e) => failures.push(e),
            }
        }
        if let Some(first) = failures.first() {
            return Err(PipelineError::BlurFailure(format!(
                "{} of {} units failed, first: {}",
                failures.len(),
                units.len(),
                first
            )));
        }
        if patches.len() != units.len() {
            return Err(PipelineError::BlurFailure(format!(
                "only {} of {} units completed",
                patches.len(),
                units.len()
            )));
        }

        let mut output = image.clone();
        for patch in &patches {
            patch.write_into(&mut output)?;
        }

        info!(
            "Blurred {} units on {} workers (peak {}) in {}us",
            units.len(),
            self.worker_count(),
            peak.load(Ordering::SeqCst),
            start_time.elapsed().as_micros()
        );
        Ok(output)
    }
}
