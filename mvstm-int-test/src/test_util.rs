use mvstm::config::default_config;
use mvstm::errors::{ErrorKind, StmError, StmResult};
use mvstm::{is_running, Ref, StmConfig, Value};
use std::backtrace::Backtrace;
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread; threads they spawn must be joined before returning.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> StmResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> StmResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> StmResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx).map_err(|e| {
                        (format!("After run failed: {:?}", e), backtrace.to_string())
                    }),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
                last_error = Some(e);
                last_backtrace = Some(bt);
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    format!("Unknown panic: {:?}", panic_err.type_id())
                };

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Panic: {}", err_msg);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
                last_error = Some(format!("Panic: {}", err_msg));
                last_backtrace = Some(Backtrace::capture().to_string());
            }
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// Per-test configuration and the refs a test creates.
#[derive(Clone)]
pub struct TestContext {
    name: String,
    config: StmConfig,
}

impl TestContext {
    pub fn new(config: StmConfig) -> Self {
        Self {
            name: uuid::Uuid::new_v4().to_string(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> StmConfig {
        self.config
    }

    /// A ref with this context's default history bounds.
    pub fn new_ref(&self, value: impl Into<Value>) -> StmResult<Ref> {
        Ref::with_history(
            value.into(),
            self.config.min_history(),
            self.config.max_history(),
        )
    }
}

pub fn create_test_context() -> StmResult<TestContext> {
    Ok(TestContext::new(default_config()))
}

pub fn create_test_context_with(config: StmConfig) -> StmResult<TestContext> {
    Ok(TestContext::new(config))
}

/// Fails if the test left a transaction installed on the calling thread.
pub fn cleanup(ctx: TestContext) -> StmResult<()> {
    if is_running() {
        return Err(StmError::new(
            &format!("Test {} leaked a running transaction", ctx.name()),
            ErrorKind::IllegalState,
        ));
    }
    Ok(())
}

/// Integer content of `r`, or 0 if it holds something else.
pub fn int_value(r: &Ref) -> i64 {
    r.current_value()
        .ok()
        .and_then(|v| v.as_i64())
        .unwrap_or_default()
}

/// Spawns `threads` workers that start together and returns their handles.
pub fn spawn_together<F, R>(threads: usize, work: F) -> Vec<JoinHandle<R>>
where
    F: Fn(usize) -> R + Send + Sync + 'static,
    R: Send + 'static,
{
    let barrier = Arc::new(Barrier::new(threads));
    let work = Arc::new(work);
    (0..threads)
        .map(|index| {
            let barrier = barrier.clone();
            let work = work.clone();
            thread::spawn(move || {
                barrier.wait();
                work(index)
            })
        })
        .collect()
}

/// Joins every handle, failing on the first worker panic.
pub fn join_all<R>(handles: Vec<JoinHandle<R>>) -> StmResult<Vec<R>> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = handle.join().map_err(|_| {
            StmError::new("Worker thread panicked", ErrorKind::InternalError)
        })?;
        results.push(result);
    }
    Ok(results)
}
