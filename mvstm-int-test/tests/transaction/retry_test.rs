use mvstm::config::StmBuilder;
use mvstm::errors::{ErrorKind, StmError};
use mvstm::{abort, read, run, run_with, val, write, Value};
use mvstm_int_test::test_util::{cleanup, create_test_context, run_test};

#[test]
fn test_retry_limit_is_exact() {
    run_test(
        || create_test_context(),
        |ctx| {
            let r = ctx.new_ref(0)?;
            let mut attempts = 0u32;
            let error = run(|| {
                attempts += 1;
                read(&r)?;
                Err::<Value, _>(StmError::retry())
            })
            .unwrap_err();

            assert_eq!(error.kind(), &ErrorKind::RetryLimitExceeded);
            assert_eq!(attempts, 10_000);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_configured_retry_limit() {
    run_test(
        || create_test_context(),
        |ctx| {
            let config = StmBuilder::new().retry_limit(3).build()?;
            let r = ctx.new_ref(0)?;
            let mut attempts = 0;
            let error = run_with(&config, || {
                attempts += 1;
                write(&r, val!(attempts))?;
                Err::<(), _>(StmError::retry())
            })
            .unwrap_err();

            assert_eq!(error.kind(), &ErrorKind::RetryLimitExceeded);
            assert_eq!(attempts, 3);
            assert_eq!(r.current_value()?, val!(0));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_transient_retry_is_invisible() {
    run_test(
        || create_test_context(),
        |ctx| {
            let r = ctx.new_ref(0)?;
            let mut attempts = 0;
            let result = run(|| {
                attempts += 1;
                write(&r, val!(attempts))?;
                if attempts < 5 {
                    return Err(StmError::retry());
                }
                Ok(attempts)
            })?;

            assert_eq!(result, Some(5));
            assert_eq!(r.current_value()?, val!(5));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_fatal_error_stops_the_loop() {
    run_test(
        || create_test_context(),
        |ctx| {
            let r = ctx.new_ref(0)?;
            let mut attempts = 0;
            let error = run(|| {
                attempts += 1;
                write(&r, val!(1))?;
                Err::<(), _>(StmError::new("bad input", ErrorKind::CallbackError))
            })
            .unwrap_err();

            assert_eq!(error.kind(), &ErrorKind::CallbackError);
            assert_eq!(error.message(), "bad input");
            assert_eq!(attempts, 1);
            assert_eq!(r.current_value()?, val!(0));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_abort_returns_none_and_keeps_state() {
    run_test(
        || create_test_context(),
        |ctx| {
            let r = ctx.new_ref("kept")?;
            let result = run(|| {
                write(&r, val!("dropped"))?;
                abort::<Value>()
            })?;
            assert!(result.is_none());
            assert_eq!(r.current_value()?, val!("kept"));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
