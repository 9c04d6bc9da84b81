use mvstm::blocking::BlockOn;
use mvstm::common::{callable, DeferredCall};
use mvstm::config::StmBuilder;
use mvstm::errors::ErrorKind;
use mvstm::{block_retry, read, run, run_with, val, write, Ref, StmResult, Value};
use mvstm_int_test::test_util::{
    cleanup, create_test_context, create_test_context_with, int_value, run_test, TestContext,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

// long enough that only a real wake-up resumes a blocked transaction in time
fn blocking_context() -> StmResult<TestContext> {
    create_test_context_with(StmBuilder::new().block_wait(Duration::from_secs(10)).build()?)
}

#[test]
fn test_blocked_consumer_wakes_on_commit() {
    run_test(
        blocking_context,
        |ctx| {
            let config = ctx.config();
            let slot = ctx.new_ref(Value::Null)?;

            let consumer_slot = slot.clone();
            let consumer = thread::spawn(move || {
                let started = Instant::now();
                let mut attempts = 0;
                let taken = run_with(&config, || {
                    attempts += 1;
                    let item = read(&consumer_slot)?;
                    if item.is_null() {
                        return block_retry(None, None, BlockOn::Any);
                    }
                    write(&consumer_slot, Value::Null)?;
                    Ok(item)
                });
                (taken, attempts, started.elapsed())
            });

            thread::sleep(Duration::from_millis(200));
            run(|| write(&slot, val!("item")))?;

            let (taken, attempts, elapsed) = consumer.join().expect("consumer panicked");
            assert_eq!(taken?, Some(val!("item")));
            assert_eq!(attempts, 2);
            assert!(elapsed < Duration::from_secs(5));
            assert!(slot.current_value()?.is_null());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_commit_before_blocking_is_not_missed() {
    run_test(
        blocking_context,
        |ctx| {
            let config = ctx.config();
            let slot = ctx.new_ref(Value::Null)?;
            let (read_tx, read_rx) = mpsc::channel();
            let (committed_tx, committed_rx) = mpsc::channel();

            let consumer_slot = slot.clone();
            let consumer = thread::spawn(move || {
                let started = Instant::now();
                let mut attempts = 0;
                let taken = run_with(&config, || {
                    attempts += 1;
                    let item = read(&consumer_slot)?;
                    if item.is_null() {
                        if attempts == 1 {
                            // let the producer commit between the read and the block
                            let _ = read_tx.send(());
                            let _ = committed_rx.recv_timeout(Duration::from_secs(5));
                        }
                        return block_retry(None, None, BlockOn::Any);
                    }
                    Ok(item)
                });
                (taken, attempts, started.elapsed())
            });

            read_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("consumer never read the slot");
            run(|| write(&slot, val!("early")))?;
            let _ = committed_tx.send(());

            let (taken, attempts, elapsed) = consumer.join().expect("consumer panicked");
            assert_eq!(taken?, Some(val!("early")));
            assert_eq!(attempts, 2);
            assert!(elapsed < Duration::from_secs(5));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_block_on_all_waits_for_every_ref() {
    run_test(
        blocking_context,
        |ctx| {
            let config = ctx.config();
            let a = ctx.new_ref(0)?;
            let b = ctx.new_ref(0)?;
            let done = Arc::new(AtomicBool::new(false));

            let (ca, cb, flag) = (a.clone(), b.clone(), done.clone());
            let consumer = thread::spawn(move || {
                let result = run_with(&config, || {
                    let va = read(&ca)?.as_i64().unwrap_or_default();
                    let vb = read(&cb)?.as_i64().unwrap_or_default();
                    if va == 0 || vb == 0 {
                        return block_retry(None, None, BlockOn::All);
                    }
                    Ok(va + vb)
                });
                flag.store(true, Ordering::SeqCst);
                result
            });

            thread::sleep(Duration::from_millis(100));
            run(|| write(&a, val!(1)))?;
            thread::sleep(Duration::from_millis(300));
            assert!(!done.load(Ordering::SeqCst));

            run(|| write(&b, val!(2)))?;
            let sum = consumer.join().expect("consumer panicked")?;
            assert_eq!(sum, Some(3));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_guard_decides_when_to_wake() {
    run_test(
        blocking_context,
        |ctx| {
            let config = ctx.config();
            let level = ctx.new_ref(0)?;
            let checks = Arc::new(AtomicUsize::new(0));

            let (watched, counter) = (level.clone(), checks.clone());
            let guard = DeferredCall::new(
                callable(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Bool(int_value(&watched) >= 3))
                }),
                vec![],
                false,
            );

            let consumer_level = level.clone();
            let consumer = thread::spawn(move || {
                let mut attempts = 0;
                let result = run_with(&config, || {
                    attempts += 1;
                    let current = read(&consumer_level)?.as_i64().unwrap_or_default();
                    if current < 3 {
                        return block_retry(
                            Some(vec![consumer_level.clone()]),
                            Some(guard.clone()),
                            BlockOn::Any,
                        );
                    }
                    Ok(current)
                });
                (attempts, result)
            });

            for step in 1..=3 {
                thread::sleep(Duration::from_millis(100));
                run(|| write(&level, val!(step)))?;
            }

            let (attempts, result) = consumer.join().expect("consumer panicked");
            assert_eq!(result?, Some(3));
            assert_eq!(attempts, 2);
            assert!(checks.load(Ordering::SeqCst) >= 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_blocking_on_nothing_is_rejected() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let error = run(|| block_retry::<()>(None, None, BlockOn::Any)).unwrap_err();
            assert_eq!(error.kind(), &ErrorKind::InvalidArgument);

            let error = run(|| block_retry::<()>(Some(Vec::<Ref>::new()), None, BlockOn::All))
                .unwrap_err();
            assert_eq!(error.kind(), &ErrorKind::InvalidArgument);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
