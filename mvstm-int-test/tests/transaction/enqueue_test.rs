use mvstm::common::callable;
use mvstm::errors::StmError;
use mvstm::{enqueue, run, val, write, Value};
use mvstm_int_test::test_util::{cleanup, create_test_context, run_test};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_action_runs_after_commit_on_another_thread() {
    run_test(
        || create_test_context(),
        |ctx| {
            let r = ctx.new_ref(0)?;
            let seen = Arc::new(Mutex::new(None));
            let caller = thread::current().id();

            let (sink, target) = (seen.clone(), r.clone());
            run(|| {
                write(&r, val!(1))?;
                let (sink, target) = (sink.clone(), target.clone());
                enqueue(
                    callable(move |args| {
                        let committed = target.current_value()?;
                        *sink.lock() =
                            Some((thread::current().id(), committed, args.to_vec()));
                        Ok(Value::Null)
                    }),
                    vec![val!("payload")],
                )
            })?;

            awaitility::at_most(Duration::from_secs(2)).until(|| seen.lock().is_some());
            let (worker, committed, args) = seen.lock().clone().expect("action did not run");
            assert_ne!(worker, caller);
            assert_eq!(committed, val!(1));
            assert_eq!(args, vec![val!("payload")]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_actions_of_discarded_attempts_are_dropped() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let runs = Arc::new(AtomicUsize::new(0));
            let mut attempts = 0;

            run(|| {
                attempts += 1;
                let counter = runs.clone();
                enqueue(
                    callable(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Value::Null)
                    }),
                    vec![],
                )?;
                if attempts < 4 {
                    return Err(StmError::retry());
                }
                Ok(())
            })?;

            awaitility::at_most(Duration::from_secs(2)).until(|| runs.load(Ordering::SeqCst) >= 1);
            thread::sleep(Duration::from_millis(100));
            assert_eq!(runs.load(Ordering::SeqCst), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
