use mvstm::common::callable;
use mvstm::errors::{ErrorKind, StmError};
use mvstm::event::{current_context, dismiss, listen, listener_count, notify, DismissScope};
use mvstm::{run, val, Value};
use mvstm_int_test::test_util::{cleanup, create_test_context, run_test};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn counting(counter: &Arc<AtomicUsize>) -> mvstm::Callable {
    let counter = counter.clone();
    callable(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Null)
    })
}

#[test]
fn test_one_shot_listener_fires_once() {
    run_test(
        || create_test_context(),
        |ctx| {
            let channel = format!("one-shot-{}", ctx.name());
            let fired = Arc::new(AtomicUsize::new(0));
            listen(channel.as_str(), counting(&fired), vec![], false, true)?;
            assert_eq!(listener_count(channel.as_str()), 1);

            notify(channel.as_str(), Value::Null)?;
            notify(channel.as_str(), Value::Null)?;

            assert_eq!(fired.load(Ordering::SeqCst), 1);
            assert_eq!(listener_count(channel.as_str()), 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_one_shot_listener_fires_once_across_threads() {
    run_test(
        || create_test_context(),
        |ctx| {
            let channel = format!("racing-{}", ctx.name());
            let fired = Arc::new(AtomicUsize::new(0));
            listen(channel.as_str(), counting(&fired), vec![], false, true)?;

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let channel = channel.clone();
                    thread::spawn(move || notify(channel.as_str(), Value::Null))
                })
                .collect();
            for handle in handles {
                handle.join().expect("notifier panicked")?;
            }

            assert_eq!(fired.load(Ordering::SeqCst), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_listener_reads_context_and_args() {
    run_test(
        || create_test_context(),
        |ctx| {
            let channel = format!("context-{}", ctx.name());
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = seen.clone();
            listen(
                channel.as_str(),
                callable(move |args| {
                    sink.lock().push((current_context(), args.to_vec()));
                    Ok(Value::Null)
                }),
                vec![val!("bound")],
                false,
                false,
            )?;

            notify(channel.as_str(), val!(42))?;
            notify(channel.as_str(), val!(43))?;

            assert!(current_context().is_null());
            let seen = seen.lock();
            assert_eq!(
                *seen,
                vec![
                    (val!(42), vec![val!("bound")]),
                    (val!(43), vec![val!("bound")]),
                ]
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_thread_local_listener_stays_on_its_thread() {
    run_test(
        || create_test_context(),
        |ctx| {
            let channel = format!("local-{}", ctx.name());
            let fired = Arc::new(AtomicUsize::new(0));
            let handle = listen(channel.as_str(), counting(&fired), vec![], true, false)?;

            let remote = channel.clone();
            thread::spawn(move || notify(remote.as_str(), Value::Null))
                .join()
                .expect("notifier panicked")?;
            assert_eq!(fired.load(Ordering::SeqCst), 0);

            notify(channel.as_str(), Value::Null)?;
            assert_eq!(fired.load(Ordering::SeqCst), 1);

            assert!(!dismiss(channel.as_str(), handle, DismissScope::Global)?);
            assert!(dismiss(channel.as_str(), handle, DismissScope::Local)?);
            notify(channel.as_str(), Value::Null)?;
            assert_eq!(fired.load(Ordering::SeqCst), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_listener_failure_reaches_notifier() {
    run_test(
        || create_test_context(),
        |ctx| {
            let channel = format!("failing-{}", ctx.name());
            let after = Arc::new(AtomicUsize::new(0));
            listen(
                channel.as_str(),
                callable(|_| Err(StmError::new("listener broke", ErrorKind::CallbackError))),
                vec![],
                false,
                false,
            )?;
            listen(channel.as_str(), counting(&after), vec![], false, false)?;

            let error = notify(channel.as_str(), Value::Null).unwrap_err();
            assert_eq!(error.kind(), &ErrorKind::CallbackError);
            assert_eq!(after.load(Ordering::SeqCst), 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_channel_operations_rejected_in_transaction() {
    run_test(
        || create_test_context(),
        |ctx| {
            let channel = format!("forbidden-{}", ctx.name());
            let fired = Arc::new(AtomicUsize::new(0));

            let error = run(|| listen(channel.as_str(), counting(&fired), vec![], false, false))
                .unwrap_err();
            assert_eq!(error.kind(), &ErrorKind::IllegalState);

            let error = run(|| notify(channel.as_str(), Value::Null)).unwrap_err();
            assert_eq!(error.kind(), &ErrorKind::IllegalState);
            assert_eq!(listener_count(channel.as_str()), 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
