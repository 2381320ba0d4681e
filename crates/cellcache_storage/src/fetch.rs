//! Background fetching: strict-priority task queues drained by a fixed pool of worker threads.
//!
//! Level 0 is the most urgent. Workers always take from the lowest-numbered non-empty level, so lower priorities can starve
//! under sustained urgent load. Queued tasks can be cancelled per level; a task that has already started always runs to
//! completion.

use crate::{CacheError, CacheResult, CellCacheOptions};

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub type FetchAction = Box<dyn FnOnce() -> CacheResult<()> + Send + 'static>;

/// A unit of background work, labelled for logging.
pub struct FetchTask {
    label: String,
    action: FetchAction,
}

impl FetchTask {
    pub fn new(
        label: impl Into<String>,
        action: impl FnOnce() -> CacheResult<()> + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            action: Box::new(action),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn run(self) {
        let Self { label, action } = self;
        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => tracing::trace!("fetched {}", label),
            Ok(Err(e)) => tracing::warn!("fetch of {} failed: {}", label, e),
            Err(_) => tracing::warn!("fetch of {} panicked", label),
        }
    }
}

pub struct PriorityQueues {
    state: Mutex<QueueState>,
    task_ready: Condvar,
    idle: Condvar,
}

struct QueueState {
    levels: Vec<VecDeque<FetchTask>>,
    num_queued: usize,
    num_running: usize,
    closed: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.num_queued == 0 && self.num_running == 0
    }
}

impl PriorityQueues {
    pub fn new(num_levels: usize) -> Self {
        assert!(num_levels > 0, "need at least one priority level");

        Self {
            state: Mutex::new(QueueState {
                levels: (0..num_levels).map(|_| VecDeque::new()).collect(),
                num_queued: 0,
                num_running: 0,
                closed: false,
            }),
            task_ready: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    pub fn num_levels(&self) -> usize {
        self.state.lock().levels.len()
    }

    /// Queue `task` at `level`, or at the lowest priority if `level` is out of range. With `to_front`, the task jumps ahead of
    /// everything already queued at that level.
    pub fn enqueue(&self, task: FetchTask, level: usize, to_front: bool) -> CacheResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CacheError::SchedulerClosed);
        }
        let level = level.min(state.levels.len() - 1);
        let queue = &mut state.levels[level];
        if to_front {
            queue.push_front(task);
        } else {
            queue.push_back(task);
        }
        state.num_queued += 1;
        drop(state);

        self.task_ready.notify_one();

        Ok(())
    }

    /// Discards every task at `level` that has not started yet, returning how many were discarded.
    pub fn clear_level(&self, level: usize) -> usize {
        let discarded: Vec<FetchTask> = {
            let mut state = self.state.lock();
            let discarded: Vec<_> = match state.levels.get_mut(level) {
                Some(queue) => queue.drain(..).collect(),
                None => return 0,
            };
            state.num_queued -= discarded.len();
            if state.is_idle() {
                self.idle.notify_all();
            }
            discarded
        };
        if !discarded.is_empty() {
            tracing::debug!("cleared {} queued fetches at level {}", discarded.len(), level);
        }

        // Tasks are dropped outside the lock; their captured state may have cleanup to do.
        discarded.len()
    }

    pub fn clear_all(&self) -> usize {
        (0..self.num_levels()).map(|level| self.clear_level(level)).sum()
    }

    /// The number of tasks queued and not yet started.
    pub fn len(&self) -> usize {
        self.state.lock().num_queued
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len_level(&self, level: usize) -> usize {
        self.state
            .lock()
            .levels
            .get(level)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// The number of tasks currently executing.
    pub fn num_running(&self) -> usize {
        self.state.lock().num_running
    }

    /// Blocks until nothing is queued or running. Returns immediately on a closed queue.
    pub fn wait_until_idle(&self) {
        let mut state = self.state.lock();
        while !state.is_idle() && !state.closed {
            self.idle.wait(&mut state);
        }
    }

    /// Rejects further tasks, discards queued ones and wakes every worker so it can exit.
    pub fn close(&self) {
        let mut discarded = Vec::new();
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.num_queued = 0;
            for queue in state.levels.iter_mut() {
                discarded.extend(queue.drain(..));
            }
        }
        self.task_ready.notify_all();
        self.idle.notify_all();

        if !discarded.is_empty() {
            tracing::debug!("discarded {} queued fetches on close", discarded.len());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Blocks until a task is available, taking the most urgent one. `None` once the queues are closed.
    fn take(&self) -> Option<FetchTask> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(task) = state.levels.iter_mut().find_map(VecDeque::pop_front) {
                state.num_queued -= 1;
                state.num_running += 1;
                return Some(task);
            }
            self.task_ready.wait(&mut state);
        }
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        state.num_running -= 1;
        if state.is_idle() {
            self.idle.notify_all();
        }
    }
}

/// A fixed set of named threads that execute tasks from shared `PriorityQueues`. Dropping the pool closes the queues and joins
/// the workers; tasks that were already running finish first.
pub struct WorkerPool {
    queues: Arc<PriorityQueues>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(queues: Arc<PriorityQueues>, num_threads: usize) -> CacheResult<Self> {
        if num_threads == 0 {
            return Err(CacheError::Config(
                "a worker pool needs at least one thread".into(),
            ));
        }

        let mut pool = Self {
            queues,
            workers: Vec::with_capacity(num_threads),
        };
        for i in 0..num_threads {
            let queues = pool.queues.clone();
            // On failure, dropping the partial pool shuts down the threads already started.
            let handle = thread::Builder::new()
                .name(format!("cell-fetcher-{}", i))
                .spawn(move || Self::worker_loop(&queues))?;
            pool.workers.push(handle);
        }
        tracing::debug!("started {} fetcher threads", num_threads);

        Ok(pool)
    }

    fn worker_loop(queues: &PriorityQueues) {
        while let Some(task) = queues.take() {
            task.run();
            queues.finish();
        }
    }

    pub fn queues(&self) -> &Arc<PriorityQueues> {
        &self.queues
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.queues.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("a fetcher thread panicked");
            }
        }
    }
}

/// Queues and the workers that drain them.
pub struct FetchScheduler {
    queues: Arc<PriorityQueues>,
    _pool: WorkerPool,
}

impl FetchScheduler {
    pub fn new(num_levels: usize, num_threads: usize) -> CacheResult<Self> {
        if num_levels == 0 {
            return Err(CacheError::Config(
                "need at least one priority level".into(),
            ));
        }
        let queues = Arc::new(PriorityQueues::new(num_levels));
        let pool = WorkerPool::new(queues.clone(), num_threads)?;

        Ok(Self {
            queues,
            _pool: pool,
        })
    }

    pub fn from_options(options: &CellCacheOptions) -> CacheResult<Self> {
        options.validate()?;

        Self::new(options.num_priority_levels, options.num_fetcher_threads)
    }

    pub fn queues(&self) -> &Arc<PriorityQueues> {
        &self.queues
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recording_task(record: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> FetchTask {
        let record = record.clone();
        FetchTask::new(name, move || {
            record.lock().push(name);
            Ok(())
        })
    }

    #[test]
    fn single_worker_takes_strict_priority_order() {
        let queues = Arc::new(PriorityQueues::new(3));
        let record = Arc::new(Mutex::new(Vec::new()));

        // Everything is queued before the worker starts.
        queues.enqueue(recording_task(&record, "low"), 2, false).unwrap();
        queues.enqueue(recording_task(&record, "high-1"), 0, false).unwrap();
        queues.enqueue(recording_task(&record, "mid"), 1, false).unwrap();
        queues.enqueue(recording_task(&record, "high-2"), 0, false).unwrap();
        queues.enqueue(recording_task(&record, "urgent"), 0, true).unwrap();
        assert_eq!(queues.len(), 5);
        assert_eq!(queues.len_level(0), 3);

        let _pool = WorkerPool::new(queues.clone(), 1).unwrap();
        queues.wait_until_idle();

        assert_eq!(
            *record.lock(),
            vec!["urgent", "high-1", "high-2", "mid", "low"]
        );
    }

    #[test]
    fn out_of_range_level_is_clamped_to_lowest_priority() {
        let queues = PriorityQueues::new(2);
        queues
            .enqueue(FetchTask::new("far", || Ok(())), 99, false)
            .unwrap();

        assert_eq!(queues.len_level(1), 1);
    }

    #[test]
    fn clear_level_drops_only_unstarted_tasks_at_that_level() {
        let queues = PriorityQueues::new(2);
        let witness = Arc::new(());
        for _ in 0..3 {
            let w = witness.clone();
            queues
                .enqueue(FetchTask::new("stale", move || {
                    drop(w);
                    Ok(())
                }), 1, false)
                .unwrap();
        }
        queues
            .enqueue(FetchTask::new("keep", || Ok(())), 0, false)
            .unwrap();

        assert_eq!(queues.clear_level(1), 3);
        assert_eq!(queues.len(), 1);
        assert_eq!(queues.len_level(0), 1);
        // The discarded closures were dropped.
        assert_eq!(Arc::strong_count(&witness), 1);

        assert_eq!(queues.clear_all(), 1);
        assert!(queues.is_empty());
    }

    #[test]
    fn failing_and_panicking_tasks_do_not_stop_the_worker() {
        let scheduler = FetchScheduler::new(1, 1).unwrap();
        let queues = scheduler.queues();
        let done = Arc::new(AtomicUsize::new(0));

        queues
            .enqueue(
                FetchTask::new("fails", || Err(CacheError::loader("no data"))),
                0,
                false,
            )
            .unwrap();
        queues
            .enqueue(FetchTask::new("panics", || panic!("bad tile")), 0, false)
            .unwrap();
        let d = done.clone();
        queues
            .enqueue(
                FetchTask::new("succeeds", move || {
                    d.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
                0,
                false,
            )
            .unwrap();
        queues.wait_until_idle();

        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(queues.num_running(), 0);
    }

    #[test]
    fn many_workers_run_everything() {
        let scheduler = FetchScheduler::new(2, 4).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..100 {
            let d = done.clone();
            scheduler
                .queues()
                .enqueue(
                    FetchTask::new(format!("task {}", i), move || {
                        d.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                    i % 2,
                    false,
                )
                .unwrap();
        }
        scheduler.queues().wait_until_idle();

        assert_eq!(done.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn dropping_the_pool_closes_the_queues() {
        let queues = Arc::new(PriorityQueues::new(1));
        let pool = WorkerPool::new(queues.clone(), 2).unwrap();
        assert_eq!(pool.num_threads(), 2);
        drop(pool);

        assert!(queues.is_closed());
        assert!(matches!(
            queues.enqueue(FetchTask::new("late", || Ok(())), 0, false),
            Err(CacheError::SchedulerClosed)
        ));
        // Does not hang on a closed queue.
        queues.wait_until_idle();
    }

    #[test]
    fn zero_threads_or_levels_are_rejected() {
        assert!(matches!(
            FetchScheduler::new(1, 0),
            Err(CacheError::Config(_))
        ));
        assert!(matches!(
            FetchScheduler::new(0, 1),
            Err(CacheError::Config(_))
        ));
    }
}
