use mvstm::errors::{ErrorKind, StmError};
use mvstm::{
    alternative, block_retry, ensure, or_else, read, run, val, write, BlockOn, OrElseMode, Value,
};
use mvstm_int_test::test_util::{cleanup, create_test_context, int_value, run_test};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_blocked_branch_falls_through() {
    run_test(
        || create_test_context(),
        |ctx| {
            let primary = ctx.new_ref(Value::Null)?;
            let fallback = ctx.new_ref("spare")?;

            let taken = run(|| {
                or_else(
                    OrElseMode::BlockingRetryOnly,
                    vec![
                        alternative(|| {
                            let value = read(&primary)?;
                            if value.is_null() {
                                return block_retry(None, None, BlockOn::Any);
                            }
                            write(&primary, Value::Null)?;
                            Ok(value)
                        }),
                        alternative(|| {
                            let value = read(&fallback)?;
                            write(&fallback, Value::Null)?;
                            Ok(value)
                        }),
                    ],
                )
            })?;

            assert_eq!(taken, Some(val!("spare")));
            assert!(fallback.current_value()?.is_null());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_failed_branch_writes_are_rolled_back() {
    run_test(
        || create_test_context(),
        |ctx| {
            let r = ctx.new_ref(1)?;
            let log = ctx.new_ref("")?;

            let seen = run(|| {
                or_else(
                    OrElseMode::AnyRetry,
                    vec![
                        alternative(|| {
                            write(&r, val!(50))?;
                            write(&log, val!("first"))?;
                            Err(StmError::retry())
                        }),
                        alternative(|| read(&r)),
                    ],
                )
            })?;

            assert_eq!(seen, Some(val!(1)));
            assert_eq!(r.current_value()?, val!(1));
            assert_eq!(log.current_value()?, val!(""));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_non_retry_error_does_not_fall_through() {
    run_test(
        || create_test_context(),
        |ctx| {
            let r = ctx.new_ref(1)?;
            let error = run(|| {
                or_else(
                    OrElseMode::AnyRetry,
                    vec![
                        alternative(|| {
                            Err::<Value, _>(StmError::new("broken", ErrorKind::CallbackError))
                        }),
                        alternative(|| read(&r)),
                    ],
                )
            })
            .unwrap_err();
            assert_eq!(error.kind(), &ErrorKind::CallbackError);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_failed_branch_releases_its_refs() {
    run_test(
        || create_test_context(),
        |ctx| {
            let guarded = ctx.new_ref(0)?;
            let claimed = ctx.new_ref(0)?;
            let other = ctx.new_ref(0)?;
            let (started_tx, started_rx) = mpsc::channel();

            let (g, c, o) = (guarded.clone(), claimed.clone(), other.clone());
            let slow = thread::spawn(move || {
                run(|| {
                    or_else(
                        OrElseMode::AnyRetry,
                        vec![
                            alternative(|| {
                                ensure(&g)?;
                                write(&c, val!(100))?;
                                Err(StmError::retry())
                            }),
                            alternative(|| {
                                let _ = started_tx.send(());
                                thread::sleep(Duration::from_millis(400));
                                write(&o, val!(1))
                            }),
                        ],
                    )
                })
            });

            started_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("second branch never ran");
            let started = Instant::now();
            let mut attempts = 0;
            run(|| {
                attempts += 1;
                write(&guarded, val!(5))?;
                write(&claimed, val!(6))
            })?;
            let elapsed = started.elapsed();

            slow.join().expect("slow transaction panicked")?;
            assert_eq!(attempts, 1);
            assert!(elapsed < Duration::from_millis(300));
            assert_eq!(int_value(&guarded), 5);
            assert_eq!(int_value(&claimed), 6);
            assert_eq!(int_value(&other), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
