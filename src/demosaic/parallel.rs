//! Work partitioning, progress and cancellation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(feature = "rayon")]
use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::{ParallelSlice, ParallelSliceMut},
};
use tracing::debug;

use super::{raster::RasterMut, DebayerError, DebayerResult};

/// Smallest number of output rows handed to a worker.
pub(crate) const MIN_ROWS_PER_THREAD: usize = 16;
/// Rows processed between two progress updates.
pub(crate) const MONITOR_INTERVAL: usize = 16;

/// Number of workers for `count` work items.
///
/// Every worker gets at least `min_per_thread` items (one worker at the least), and
/// at most `max_threads` workers are used.
///
/// # Usage
/// ```
/// use cfadebayer::number_of_threads;
///
/// assert_eq!(number_of_threads(1000, 16, 8), 8);
/// assert_eq!(number_of_threads(40, 16, 8), 2);
/// assert_eq!(number_of_threads(3, 16, 8), 1);
/// ```
pub fn number_of_threads(count: usize, min_per_thread: usize, max_threads: usize) -> usize {
    (count / min_per_thread.max(1)).clamp(1, max_threads.max(1))
}

/// Progress counter and cancellation flag of a demosaicing call.
///
/// The counter is reset at the start of every stage of a call. Workers advance
/// it every 16 rows (or once per X-Trans tile) and stop with
/// [`DebayerError::Cancelled`] once [`StatusMonitor::cancel`] has been called.
///
/// # Usage
/// ```
/// use cfadebayer::StatusMonitor;
///
/// let monitor = StatusMonitor::new();
/// assert!(!monitor.is_cancelled());
/// monitor.cancel();
/// assert!(monitor.is_cancelled());
/// ```
#[derive(Debug, Default)]
pub struct StatusMonitor {
    total: AtomicUsize,
    count: AtomicUsize,
    cancelled: AtomicBool,
}

impl StatusMonitor {
    /// Create a new monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Workers observe the request at their next progress update.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Number of work items of the current stage.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Number of work items completed in the current stage.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn initialize(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }

    pub(crate) fn advance(&self, n: usize) -> DebayerResult<()> {
        self.count.fetch_add(n, Ordering::Relaxed);
        if self.is_cancelled() {
            Err(DebayerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-call worker pool.
pub(crate) struct Executor<'m> {
    threads: usize,
    monitor: &'m StatusMonitor,
    #[cfg(feature = "rayon")]
    pool: rayon::ThreadPool,
}

impl<'m> Executor<'m> {
    pub fn new(max_threads: Option<usize>, monitor: &'m StatusMonitor) -> DebayerResult<Self> {
        let threads = max_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1);
        #[cfg(feature = "rayon")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("debayer-{i}"))
            .build()
            .map_err(|e| DebayerError::ThreadPool(e.to_string()))?;
        Ok(Executor {
            threads,
            monitor,
            #[cfg(feature = "rayon")]
            pool,
        })
    }

    pub fn monitor(&self) -> &StatusMonitor {
        self.monitor
    }

    /// Fill an interleaved RGB image `width` pixels wide, one row at a time.
    ///
    /// `kernel(y, row)` writes image row `y`. Rows are split into contiguous bands,
    /// one per worker.
    pub fn rows<F>(&self, dst: &mut [f32], width: usize, kernel: F) -> DebayerResult<()>
    where
        F: Fn(usize, &mut [f32]) + Sync,
    {
        let stride = 3 * width;
        if stride == 0 || dst.is_empty() {
            return Ok(());
        }
        let height = dst.len() / stride;
        self.monitor.initialize(height);
        let workers = number_of_threads(height, MIN_ROWS_PER_THREAD, self.threads);
        let band = height.div_ceil(workers);
        debug!(height, workers, band, "row partition");

        let work = |(i, chunk): (usize, &mut [f32])| -> DebayerResult<()> {
            let mut raster = RasterMut::with_offset(i * band, width, chunk);
            let mut pending = 0;
            for y in raster.rows() {
                kernel(y, raster.borrow_row_mut(y));
                pending += 1;
                if pending == MONITOR_INTERVAL {
                    self.monitor.advance(pending)?;
                    pending = 0;
                }
            }
            self.monitor.advance(pending)
        };

        #[cfg(feature = "rayon")]
        {
            self.pool.install(|| {
                dst.par_chunks_mut(band * stride)
                    .enumerate()
                    .try_for_each(work)
            })
        }
        #[cfg(not(feature = "rayon"))]
        {
            dst.chunks_mut(band * stride).enumerate().try_for_each(work)
        }
    }

    /// Map every item, in contiguous groups of items, one group per worker.
    /// The results keep the order of `items`.
    pub fn tiles<I, R, F>(&self, items: &[I], f: F) -> DebayerResult<Vec<R>>
    where
        I: Sync,
        R: Send,
        F: Fn(&I) -> R + Sync,
    {
        self.monitor.initialize(items.len());
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let workers = number_of_threads(items.len(), 1, self.threads);
        let group = items.len().div_ceil(workers);
        debug!(tiles = items.len(), workers, group, "tile partition");

        let work = |group: &[I]| -> DebayerResult<Vec<R>> {
            group
                .iter()
                .map(|item| {
                    if self.monitor.is_cancelled() {
                        return Err(DebayerError::Cancelled);
                    }
                    let out = f(item);
                    self.monitor.advance(1)?;
                    Ok(out)
                })
                .collect()
        };

        #[cfg(feature = "rayon")]
        let groups = self.pool.install(|| {
            items
                .par_chunks(group)
                .map(work)
                .collect::<DebayerResult<Vec<_>>>()
        })?;
        #[cfg(not(feature = "rayon"))]
        let groups = items
            .chunks(group)
            .map(work)
            .collect::<DebayerResult<Vec<_>>>()?;

        Ok(groups.into_iter().flatten().collect())
    }
}
