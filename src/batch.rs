//! Processing many items with bounded concurrency, a newer run
//! superseding older ones.
//!
//! Each run shuffles its items, then walks them in order.  Every item is
//! resolved to a source, processed asynchronously and its output applied
//! (drawn).  Every item runs in its own task, so a panicking stage only
//! skips its item.  Items at a wave boundary (`i % width == 0`) are
//! awaited by the run itself; the others apply their output as soon as
//! they are done, in any order.  At most `width` items are in
//! flight at any time.
//!
//! Runs sharing the same [`Runs`] tracker get increasing generations.
//! Before issuing an item a run checks whether a newer generation has
//! started and, if so, stops issuing work.  Items already dispatched are
//! not cancelled: with [`StaleResults::Apply`] they still apply their
//! output, possibly after the newer run has drawn; with
//! [`StaleResults::Discard`] their output is dropped.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};
use crate::Result;

/// Default number of items in flight.
pub const DEFAULT_WIDTH: usize = 10;

/// What to do with outputs of a run completing after it was superseded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StaleResults {
    /// Apply them anyway.
    #[default]
    Apply,
    /// Drop them.
    Discard,
}

/// Generations of the runs drawing onto one surface.
#[derive(Debug, Default)]
pub struct Runs {
    latest: AtomicU64,
    active: Mutex<BTreeSet<u64>>,
}

impl Runs {
    pub fn new() -> Arc<Self> { Arc::new(Runs::default()) }

    /// Start a new generation, superseding all previous ones.
    pub fn start(self: &Arc<Self>) -> RunToken {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.active_set().insert(generation);
        RunToken { runs: Arc::clone(self), generation }
    }

    /// The most recently started generation (0 before any run).
    pub fn latest(&self) -> u64 { self.latest.load(Ordering::SeqCst) }

    /// Number of runs not finished yet.
    pub fn active(&self) -> usize { self.active_set().len() }

    fn active_set(&self) -> std::sync::MutexGuard<'_, BTreeSet<u64>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Membership of a run in [`Runs`]; the run leaves the active set when
/// the token is dropped.
#[derive(Debug)]
pub struct RunToken {
    runs: Arc<Runs>,
    generation: u64,
}

impl RunToken {
    pub fn generation(&self) -> u64 { self.generation }

    /// Whether a newer run has started.
    pub fn is_superseded(&self) -> bool { self.runs.latest() > self.generation }
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.runs.active_set().remove(&self.generation);
    }
}

/// The work done on each item of a run.
pub trait Stage: Send + Sync + 'static {
    type Item: Send + Sync + 'static;
    type Source: Send + 'static;
    type Output: Send + 'static;

    /// Find what `item` refers to.  An error skips the item.
    fn resolve(&self, item: &Self::Item) -> Result<Self::Source>;

    /// Produce the output of an item.  An error skips the item.
    fn process(&self, source: Self::Source)
               -> impl Future<Output = Result<Self::Output>> + Send;

    /// The side effect of a processed item.
    fn apply(&self, item: &Self::Item, output: Self::Output);
}

/// Summary of a finished run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub generation: u64,
    /// Items handed to the run.
    pub total: usize,
    /// Items dispatched for processing.
    pub issued: usize,
    /// Outputs applied.
    pub applied: usize,
    /// Items skipped: unresolved, failed or panicked.
    pub skipped: usize,
    /// Outputs dropped because the run was superseded.
    pub discarded: usize,
    /// The run stopped early because a newer one started.
    pub superseded: bool,
}

#[derive(Default)]
struct Counters {
    applied: AtomicUsize,
    skipped: AtomicUsize,
    discarded: AtomicUsize,
}

/// Runs a [`Stage`] over batches of items.
pub struct BatchProcessor<S: Stage> {
    stage: Arc<S>,
    runs: Arc<Runs>,
    width: usize,
    stale: StaleResults,
    seed: Option<u64>,
}

impl<S: Stage> Clone for BatchProcessor<S> {
    fn clone(&self) -> Self {
        BatchProcessor { stage: Arc::clone(&self.stage),
                         runs: Arc::clone(&self.runs),
                         width: self.width, stale: self.stale,
                         seed: self.seed }
    }
}

impl<S: Stage> BatchProcessor<S> {
    /// A processor with [`DEFAULT_WIDTH`] items in flight, applying
    /// stale results and shuffling from entropy.
    pub fn new(stage: Arc<S>, runs: Arc<Runs>) -> Self {
        BatchProcessor { stage, runs, width: DEFAULT_WIDTH,
                         stale: StaleResults::default(), seed: None }
    }

    /// Maximum number of items in flight (at least 1).
    pub fn width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn stale_results(mut self, stale: StaleResults) -> Self {
        self.stale = stale;
        self
    }

    /// Seed the shuffle; without a seed the order changes every run.
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn stage(&self) -> &Arc<S> { &self.stage }

    pub fn runs(&self) -> &Arc<Runs> { &self.runs }

    /// Process `items`, superseding any run in progress.  Returns once
    /// every dispatched item has finished.
    pub async fn run(&self, mut items: Vec<S::Item>) -> RunReport {
        let token = Arc::new(self.runs.start());
        let generation = token.generation();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        items.shuffle(&mut rng);
        info!(generation, items = items.len(), "run started");

        let mut report = RunReport { generation, total: items.len(),
                                     ..RunReport::default() };
        let counters = Arc::new(Counters::default());
        let permits = Arc::new(Semaphore::new(self.width));
        let mut tasks = JoinSet::new();

        for (i, item) in items.into_iter().enumerate() {
            if token.is_superseded() {
                report.superseded = true;
                break
            }
            let source = match self.stage.resolve(&item) {
                Ok(s) => s,
                Err(e) => {
                    warn!(generation, error = %e, "skipping item");
                    report.skipped += 1;
                    continue
                }
            };
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await
            else { break };
            // A newer run may have started while waiting for a slot.
            if token.is_superseded() {
                report.superseded = true;
                break
            }
            report.issued += 1;
            let job = Job { stage: Arc::clone(&self.stage),
                            token: Arc::clone(&token),
                            counters: Arc::clone(&counters),
                            stale: self.stale };
            let task = async move {
                let _permit = permit;
                job.complete(item, source).await;
            };
            if i % self.width == 0 {
                if let Err(e) = tokio::spawn(task).await {
                    task_failed(generation, &e, &counters);
                }
            } else {
                tasks.spawn(task);
            }
        }
        if report.superseded {
            debug!(generation, latest = self.runs.latest(),
                   issued = report.issued, "run superseded");
        }

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res { task_failed(generation, &e, &counters) }
        }
        report.applied = counters.applied.load(Ordering::SeqCst);
        report.skipped += counters.skipped.load(Ordering::SeqCst);
        report.discarded = counters.discarded.load(Ordering::SeqCst);
        info!(generation, applied = report.applied, skipped = report.skipped,
              discarded = report.discarded, "run finished");
        report
    }
}

/// A panicking stage skips its item.
fn task_failed(generation: u64, e: &JoinError, counters: &Counters) {
    warn!(generation, error = %e, "item task failed");
    counters.skipped.fetch_add(1, Ordering::SeqCst);
}

/// One dispatched item.
struct Job<S: Stage> {
    stage: Arc<S>,
    token: Arc<RunToken>,
    counters: Arc<Counters>,
    stale: StaleResults,
}

impl<S: Stage> Job<S> {
    async fn complete(self, item: S::Item, source: S::Source) {
        let generation = self.token.generation();
        match self.stage.process(source).await {
            Ok(out) => {
                if self.stale == StaleResults::Discard
                    && self.token.is_superseded() {
                    debug!(generation, "discarding stale output");
                    self.counters.discarded.fetch_add(1, Ordering::SeqCst);
                } else {
                    self.stage.apply(&item, out);
                    self.counters.applied.fetch_add(1, Ordering::SeqCst);
                }
            }
            Err(e) => {
                warn!(generation, error = %e, "skipping item");
                self.counters.skipped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use crate::Error;

    /// Items are numbers; `missing` ones do not resolve.  Processing
    /// sleeps a little and tracks how many items are in flight.
    #[derive(Default)]
    struct Count {
        missing: Vec<usize>,
        applied: Mutex<Vec<usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Stage for Count {
        type Item = usize;
        type Source = usize;
        type Output = usize;

        fn resolve(&self, item: &usize) -> Result<usize> {
            if self.missing.contains(item) {
                return Err(Error::MissingSource(format!("{item}.fits")))
            }
            Ok(*item)
        }

        async fn process(&self, source: usize) -> Result<usize> {
            let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(n, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(source * 2)
        }

        fn apply(&self, item: &usize, output: usize) {
            assert_eq!(output, item * 2);
            self.applied.lock().unwrap().push(*item);
        }
    }

    /// Counts the warnings logged.
    #[derive(Clone, Default)]
    struct Warnings(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for Warnings {
        fn on_event(&self, event: &tracing::Event<'_>, _: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Run `fut` on a single thread with `warnings` collecting the logs
    /// of the run and of the items it spawns.
    fn logged<F: Future>(warnings: &Warnings, fut: F) -> F::Output {
        let subscriber = tracing_subscriber::registry().with(warnings.clone());
        tracing::subscriber::with_default(subscriber, || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all().build().unwrap()
                .block_on(fut)
        })
    }

    #[test]
    fn missing_source_is_skipped_with_one_warning() {
        let stage = Arc::new(Count { missing: vec![12], ..Count::default() });
        let p = BatchProcessor::new(Arc::clone(&stage), Runs::new())
            .seed(Some(7));
        let warnings = Warnings::default();
        let report = logged(&warnings, p.run((0 .. 25).collect()));
        assert_eq!(warnings.0.load(Ordering::SeqCst), 1);
        assert_eq!(report.total, 25);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 24);
        assert!(!report.superseded);
        let mut applied = stage.applied.lock().unwrap().clone();
        applied.sort_unstable();
        let expected: Vec<usize> = (0 .. 25).filter(|&i| i != 12).collect();
        assert_eq!(applied, expected);
        assert_eq!(p.runs().active(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_is_bounded() {
        let stage = Arc::new(Count::default());
        let p = BatchProcessor::new(Arc::clone(&stage), Runs::new()).width(4);
        let report = p.run((0 .. 60).collect()).await;
        assert_eq!(report.applied, 60);
        assert!(stage.max_in_flight.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn empty_run() {
        let p = BatchProcessor::new(Arc::new(Count::default()), Runs::new());
        let report = p.run(vec![]).await;
        assert_eq!(report, RunReport { generation: 1, ..RunReport::default() });
    }

    #[test]
    fn tokens_track_generations() {
        let runs = Runs::new();
        let a = runs.start();
        assert!(!a.is_superseded());
        let b = runs.start();
        assert_eq!((a.generation(), b.generation()), (1, 2));
        assert!(a.is_superseded() && !b.is_superseded());
        assert_eq!(runs.active(), 2);
        drop(b);
        assert_eq!(runs.active(), 1);
        // Finished newer runs still supersede older ones.
        assert!(a.is_superseded());
        drop(a);
        assert_eq!((runs.active(), runs.latest()), (0, 2));
    }

    /// Panics on item 3.
    #[derive(Default)]
    struct Fragile {
        applied: AtomicUsize,
    }

    impl Stage for Fragile {
        type Item = usize;
        type Source = usize;
        type Output = ();

        fn resolve(&self, item: &usize) -> Result<usize> { Ok(*item) }

        async fn process(&self, source: usize) -> Result<()> {
            tokio::task::yield_now().await;
            assert_ne!(source, 3, "corrupt frame");
            Ok(())
        }

        fn apply(&self, _: &usize, _: ()) {
            self.applied.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn panicking_item_is_skipped_wherever_it_runs() {
        // Width 1 awaits every item at a wave boundary, width 10 spawns
        // most of them.
        for width in [1, 10] {
            let stage = Arc::new(Fragile::default());
            let p = BatchProcessor::new(Arc::clone(&stage), Runs::new())
                .width(width);
            let report = p.run((0 .. 12).collect()).await;
            assert_eq!((report.issued, report.applied, report.skipped),
                       (12, 11, 1), "width {width}");
            assert_eq!(stage.applied.load(Ordering::SeqCst), 11);
            assert_eq!(p.runs().active(), 0);
        }
    }

    /// The first `process` call goes through; the others wait for the
    /// gate to open.
    struct Gated {
        gate: Semaphore,
        started: AtomicUsize,
        applied: AtomicUsize,
    }

    impl Gated {
        fn new() -> Self {
            Gated { gate: Semaphore::new(0), started: AtomicUsize::new(0),
                    applied: AtomicUsize::new(0) }
        }
    }

    impl Stage for Gated {
        type Item = usize;
        type Source = ();
        type Output = ();

        fn resolve(&self, _: &usize) -> Result<()> { Ok(()) }

        async fn process(&self, _: ()) -> Result<()> {
            if self.started.fetch_add(1, Ordering::SeqCst) > 0 {
                let _open = self.gate.acquire().await;
            }
            Ok(())
        }

        fn apply(&self, _: &usize, _: ()) {
            self.applied.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Start run A over 100 items, let it dispatch its first waves, run
    /// B to completion, then release A.
    async fn supersede(stale: StaleResults) -> (RunReport, RunReport, usize) {
        let runs = Runs::new();
        let gated = Arc::new(Gated::new());
        let a = BatchProcessor::new(Arc::clone(&gated), Arc::clone(&runs))
            .stale_results(stale);
        let run_a = tokio::spawn(async move { a.run((0 .. 100).collect()).await });

        // Item 0 completes, items 1..=9 are spawned and item 10 is
        // awaited by the run: 11 started, all blocked.
        tokio::time::timeout(Duration::from_secs(5), async {
            while gated.started.load(Ordering::SeqCst) < 11 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }).await.expect("run A did not dispatch its first waves");
        assert_eq!(runs.active(), 1);

        let b = BatchProcessor::new(Arc::new(Count::default()),
                                    Arc::clone(&runs));
        let report_b = b.run((0 .. 10).collect()).await;

        gated.gate.add_permits(1000);
        let report_a = run_a.await.unwrap();
        (report_a, report_b, gated.applied.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn newer_run_supersedes_older() {
        let (a, b, applied_a) = supersede(StaleResults::Apply).await;
        assert!(a.superseded);
        assert_eq!(a.issued, 11);
        // Dispatched items still completed and were drawn.
        assert_eq!((a.applied, a.discarded, applied_a), (11, 0, 11));
        assert!(!b.superseded);
        assert_eq!(b.applied, 10);
    }

    #[tokio::test]
    async fn stale_outputs_can_be_discarded() {
        let (a, _, applied_a) = supersede(StaleResults::Discard).await;
        assert!(a.superseded);
        assert_eq!(a.issued, 11);
        // Only item 0 finished before run B started.
        assert_eq!((a.applied, a.discarded, applied_a), (1, 10, 1));
    }
}
