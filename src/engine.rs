//! The incremental execution engine.
//!
//! The engine memoizes queries keyed by caller-supplied values. For each
//! key it keeps a task with a reservation slot, a completion signal, the
//! computed value, collected diagnostics, a failed flag, and its
//! dependency edges. The first caller to a key becomes its computer;
//! everyone else awaits the signal. Parallelism is bounded by a
//! semaphore, and a computing query releases its permit while blocked in
//! [`QueryCtx::resolve`] so a deep dependency chain cannot starve the
//! pool.
//!
//! Three things may interrupt a query: cancellation (the task resets to
//! not-started and is retried on the next run), an explicit
//! [`QueryCtx::fail`] (the task completes with its failed flag set, and
//! dependents that check the flag cascade), and a panic (caught at the
//! task boundary, the slot reset, and the payload surfaced to the root
//! as a structured failure). A bug can cost a result; it can never
//! corrupt the cache.

use std::fmt;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::report::{Diagnostic, Report, Severity};

/// A memoizable computation.
pub trait Query: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;
    /// Shared immutable environment handed to every execution.
    type Env: Sync;

    fn run(&self, cx: &QueryCtx<'_, Self>) -> Result<Self::Value, Fail>;
}

/// Why a query produced no value.
#[derive(Clone, Debug)]
pub enum Fail {
    /// The query called [`QueryCtx::fail`]; its diagnostics say why.
    Failed,
    Cancelled,
    /// A panic caught at the task boundary.
    Panicked { query: String, panic: String },
}

/// Cooperative cancellation for one `run` call.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The result of one root query.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: Option<T>,
    /// Diagnostics of the query and everything it transitively
    /// depended on.
    pub errors: Vec<Diagnostic>,
    pub failed: bool,
    /// True iff this call computed the value rather than returning the
    /// memoized one.
    pub changed: bool,
}

/// The result of one sub-query inside [`QueryCtx::resolve`]: only the
/// query's *direct* diagnostics, not its dependencies'.
#[derive(Debug)]
pub struct Resolved<T> {
    pub value: Option<T>,
    pub errors: Vec<Diagnostic>,
    pub failed: bool,
}

const EMPTY: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

struct Task<Q: Query> {
    state: AtomicU8,
    gate: Mutex<()>,
    signal: Condvar,
    value: Mutex<Option<Q::Value>>,
    errors: Mutex<Vec<Diagnostic>>,
    failed: AtomicBool,
    /// Direct dependencies, in resolution order.
    deps: Mutex<Vec<Q>>,
    /// Queries that resolved this one.
    dependents: Mutex<Vec<Q>>,
}

impl<Q: Query> Task<Q> {
    fn new() -> Task<Q> {
        Task {
            state: AtomicU8::new(EMPTY),
            gate: Mutex::new(()),
            signal: Condvar::new(),
            value: Mutex::new(None),
            errors: Mutex::new(Vec::new()),
            failed: AtomicBool::new(false),
            deps: Mutex::new(Vec::new()),
            dependents: Mutex::new(Vec::new()),
        }
    }

    fn finish(&self, state: u8) {
        let _guard = self.gate.lock();
        self.state.store(state, Ordering::SeqCst);
        self.signal.notify_all();
    }

    /// Discard partial results and return the slot to not-started.
    fn reset(&self) {
        *self.value.lock() = None;
        self.errors.lock().clear();
        self.deps.lock().clear();
        self.failed.store(false, Ordering::SeqCst);
        self.finish(EMPTY);
    }
}

/// A counting semaphore bounding worker parallelism.
struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Semaphore {
        Semaphore {
            permits: Mutex::new(permits.max(1)),
            available: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    fn release(&self) {
        *self.permits.lock() += 1;
        self.available.notify_one();
    }
}

/// The memoizing, parallel query runner.
pub struct Executor<Q: Query> {
    tasks: Mutex<FxHashMap<Q, Arc<Task<Q>>>>,
    semaphore: Semaphore,
    /// Run holds this shared; invalidate holds it exclusively.
    dirty: RwLock<()>,
}

impl<Q: Query> Executor<Q> {
    /// `parallelism` bounds concurrently computing queries; pass the
    /// hardware concurrency for the default behavior.
    pub fn new(parallelism: usize) -> Executor<Q> {
        Executor {
            tasks: Mutex::new(FxHashMap::default()),
            semaphore: Semaphore::new(parallelism),
            dirty: RwLock::new(()),
        }
    }

    /// Computes (or recalls) each root query, in parallel.
    pub fn run(&self, env: &Q::Env, token: &CancelToken, roots: &[Q]) -> Vec<Outcome<Q::Value>> {
        let _shared = self.dirty.read();
        let results: Vec<Result<bool, Fail>> = std::thread::scope(|scope| {
            let handles: Vec<_> = roots
                .iter()
                .map(|query| {
                    let query = query.clone();
                    scope.spawn(move || self.execute(env, token, &query, None).map(|(_, c)| c))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("query thread panicked past the boundary"))
                .collect()
        });

        roots
            .iter()
            .zip(results)
            .map(|(query, result)| match result {
                Ok(changed) => {
                    let (errors, failed) = self.collect_transitive(query);
                    let value = self
                        .tasks
                        .lock()
                        .get(query)
                        .and_then(|task| task.value.lock().clone());
                    Outcome {
                        value,
                        errors,
                        failed,
                        changed,
                    }
                }
                Err(Fail::Cancelled) => Outcome {
                    value: None,
                    errors: Vec::new(),
                    failed: false,
                    changed: false,
                },
                Err(Fail::Failed) => {
                    let (errors, failed) = self.collect_transitive(query);
                    Outcome {
                        value: None,
                        errors,
                        failed,
                        changed: true,
                    }
                }
                Err(Fail::Panicked { query, panic }) => Outcome {
                    value: None,
                    errors: vec![Diagnostic::ice("internal compiler error")
                        .note(format!("while computing {query}"))
                        .trace(panic)],
                    failed: true,
                    changed: true,
                },
            })
            .collect()
    }

    /// Evicts `keys` and every query that transitively depends on one
    /// of them. Takes the session lock exclusively, so it cannot race a
    /// `run`.
    pub fn invalidate(&self, keys: &[Q]) {
        let _exclusive = self.dirty.write();
        let tasks = self.tasks.lock();
        let mut doomed: Vec<Q> = Vec::new();
        let mut stack: Vec<Q> = keys.to_vec();
        while let Some(query) = stack.pop() {
            if doomed.contains(&query) {
                continue;
            }
            if let Some(task) = tasks.get(&query) {
                stack.extend(task.dependents.lock().iter().cloned());
            }
            doomed.push(query);
        }
        drop(tasks);
        let mut tasks = self.tasks.lock();
        for query in doomed {
            tasks.remove(&query);
        }
    }

    /// Number of memoized tasks; a test and introspection aid.
    pub fn cached_len(&self) -> usize {
        self.tasks.lock().len()
    }

    fn task_for(&self, query: &Q) -> Arc<Task<Q>> {
        self.tasks
            .lock()
            .entry(query.clone())
            .or_insert_with(|| Arc::new(Task::new()))
            .clone()
    }

    fn execute(
        &self,
        env: &Q::Env,
        token: &CancelToken,
        query: &Q,
        parent: Option<&Q>,
    ) -> Result<(Arc<Task<Q>>, bool), Fail> {
        loop {
            if token.is_cancelled() {
                return Err(Fail::Cancelled);
            }
            let task = self.task_for(query);
            if let Some(parent) = parent {
                let mut dependents = task.dependents.lock();
                if !dependents.contains(parent) {
                    dependents.push(parent.clone());
                }
            }

            match task
                .state
                .compare_exchange(EMPTY, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    // Elected computer.
                    self.semaphore.acquire();
                    let cx = QueryCtx {
                        executor: self,
                        env,
                        token,
                        task: &task,
                        query,
                    };
                    let result = catch_unwind(AssertUnwindSafe(|| query.run(&cx)));
                    self.semaphore.release();
                    return match result {
                        Ok(Ok(value)) => {
                            *task.value.lock() = Some(value);
                            task.finish(DONE);
                            Ok((task, true))
                        }
                        Ok(Err(Fail::Failed)) => {
                            task.failed.store(true, Ordering::SeqCst);
                            task.finish(DONE);
                            Ok((task, true))
                        }
                        Ok(Err(fail @ (Fail::Cancelled | Fail::Panicked { .. }))) => {
                            // Not this task's own doing; forget the
                            // partial work so a later run retries.
                            task.reset();
                            Err(fail)
                        }
                        Err(payload) => {
                            task.reset();
                            Err(Fail::Panicked {
                                query: format!("{query:?}"),
                                panic: panic_message(payload),
                            })
                        }
                    };
                }
                Err(DONE) => return Ok((task, false)),
                Err(_) => {
                    // Someone else is computing; await the signal, with
                    // periodic wakeups so cancellation can abort the
                    // wait.
                    let mut guard = task.gate.lock();
                    while task.state.load(Ordering::SeqCst) == RUNNING {
                        if token.is_cancelled() {
                            return Err(Fail::Cancelled);
                        }
                        task.signal
                            .wait_for(&mut guard, Duration::from_millis(25));
                    }
                    // Re-examine: the task may be DONE, or EMPTY again
                    // after a reset, in which case we compete to compute
                    // it ourselves.
                }
            }
        }
    }

    /// Diagnostics and failure of `query` plus everything it touched.
    fn collect_transitive(&self, query: &Q) -> (Vec<Diagnostic>, bool) {
        let tasks = self.tasks.lock();
        let mut errors = Vec::new();
        let mut failed = false;
        let mut visited: Vec<Q> = Vec::new();
        let mut stack = vec![query.clone()];
        while let Some(current) = stack.pop() {
            if visited.contains(&current) {
                continue;
            }
            if let Some(task) = tasks.get(&current) {
                errors.extend(task.errors.lock().iter().cloned());
                failed |= task.failed.load(Ordering::SeqCst);
                stack.extend(task.deps.lock().iter().cloned());
            }
            visited.push(current);
        }
        (errors, failed)
    }
}

/// Execution context handed to a running query.
pub struct QueryCtx<'e, Q: Query> {
    executor: &'e Executor<Q>,
    env: &'e Q::Env,
    token: &'e CancelToken,
    task: &'e Arc<Task<Q>>,
    query: &'e Q,
}

impl<'e, Q: Query> QueryCtx<'e, Q> {
    pub fn env(&self) -> &'e Q::Env {
        self.env
    }

    /// Records a diagnostic against the current query.
    pub fn report(&self, diagnostic: Diagnostic) {
        self.task.errors.lock().push(diagnostic);
    }

    /// Drains a [`Report`] into the current query's diagnostics.
    pub fn report_all(&self, report: &Report) {
        self.task.errors.lock().extend(report.drain());
    }

    /// Aborts the current query, keeping its diagnostics. Dependents
    /// that check [`Resolved::failed`] cascade.
    pub fn fail<T>(&self) -> Result<T, Fail> {
        Err(Fail::Failed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), Fail> {
        if self.token.is_cancelled() {
            Err(Fail::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Computes a batch of sub-queries in parallel, blocking until all
    /// complete. The calling query's semaphore permit is released for
    /// the duration, so blocked parents never starve the pool.
    pub fn resolve(&self, queries: &[Q]) -> Result<Vec<Resolved<Q::Value>>, Fail> {
        self.check_cancelled()?;
        {
            let mut deps = self.task.deps.lock();
            for query in queries {
                if !deps.contains(query) {
                    deps.push(query.clone());
                }
            }
        }

        self.executor.semaphore.release();
        let results: Vec<Result<Arc<Task<Q>>, Fail>> = std::thread::scope(|scope| {
            let handles: Vec<_> = queries
                .iter()
                .map(|query| {
                    let query = query.clone();
                    scope.spawn(move || {
                        self.executor
                            .execute(self.env, self.token, &query, Some(self.query))
                            .map(|(task, _)| task)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("query thread panicked past the boundary"))
                .collect()
        });
        self.executor.semaphore.acquire();

        let mut resolved = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(task) => resolved.push(Resolved {
                    value: task.value.lock().clone(),
                    errors: task.errors.lock().clone(),
                    failed: task.failed.load(Ordering::SeqCst),
                }),
                Err(fail) => return Err(fail),
            }
        }
        Ok(resolved)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

/// Renders an engine failure as a diagnostic, for hosts that want one.
pub fn fail_to_diagnostic(fail: &Fail) -> Diagnostic {
    match fail {
        Fail::Failed => Diagnostic::error("query failed"),
        Fail::Cancelled => Diagnostic::new(Severity::Note, "compilation was cancelled"),
        Fail::Panicked { query, panic } => Diagnostic::ice("internal compiler error")
            .note(format!("while computing {query}"))
            .trace(panic.clone()),
    }
}
