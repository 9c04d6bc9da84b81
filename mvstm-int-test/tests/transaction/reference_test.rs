use mvstm::errors::ErrorKind;
use mvstm::reference::{validator, watcher};
use mvstm::{read, run, val, write, Ref, Value};
use mvstm_int_test::test_util::{
    cleanup, create_test_context, join_all, run_test, spawn_together,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn test_validator_guards_commits() {
    run_test(
        || create_test_context(),
        |ctx| {
            let balance = ctx.new_ref(100)?;
            balance.set_validator(Some(validator(|v| Ok(v.as_i64().is_some_and(|v| v >= 0)))))?;

            run(|| write(&balance, val!(40)))?;
            let error = run(|| write(&balance, val!(-1))).unwrap_err();

            assert_eq!(error.kind(), &ErrorKind::ValidationError);
            assert_eq!(balance.current_value()?, val!(40));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_watches_see_each_commit() {
    run_test(
        || create_test_context(),
        |ctx| {
            let r = ctx.new_ref(1)?;
            let changes = Arc::new(Mutex::new(Vec::new()));
            let sink = changes.clone();
            r.add_watch(
                "audit",
                watcher(move |key, _, old, new| {
                    sink.lock()
                        .push((key.to_string(), old.clone(), new.clone()));
                }),
            );

            run(|| write(&r, val!(2)))?;
            run(|| write(&r, val!(3)))?;
            assert!(r.remove_watch("audit"));
            run(|| write(&r, val!(4)))?;

            let changes = changes.lock();
            assert_eq!(
                *changes,
                vec![
                    ("audit".to_string(), val!(1), val!(2)),
                    ("audit".to_string(), val!(2), val!(3)),
                ]
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_exclusive_ref_is_taken_once() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let token = Ref::exclusive(val!("token"));
            let shared = token.clone();
            let handles = spawn_together(6, move |_| run(|| read(&shared)));

            let mut winners = 0;
            for result in join_all(handles)? {
                match result? {
                    Some(Value::String(s)) if s == "token" => winners += 1,
                    Some(Value::Null) => {}
                    other => panic!("unexpected read {:?}", other),
                }
            }
            assert_eq!(winners, 1);
            assert!(token.current_value()?.is_null());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_history_grows_under_faults() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let r = Ref::with_history(val!(0), 0, 3)?;
            let invalid = Ref::with_history(val!(0), 4, 2);
            assert_eq!(invalid.unwrap_err().kind(), &ErrorKind::InvalidArgument);

            for i in 1..=5 {
                run(|| write(&r, val!(i)))?;
            }
            assert_eq!(r.history_count(), 1);

            r.set_min_history(3)?;
            for i in 6..=8 {
                run(|| write(&r, val!(i)))?;
            }
            assert_eq!(r.history_count(), 3);
            r.trim_history();
            assert_eq!(r.history_count(), 1);
            assert_eq!(r.current_value()?, val!(8));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_unbound_ref() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let r = Ref::unbound();
            assert_eq!(r.current_value().unwrap_err().kind(), &ErrorKind::UnboundRef);
            run(|| write(&r, val!("bound")))?;
            assert_eq!(r.current_value()?, val!("bound"));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
