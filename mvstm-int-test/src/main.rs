use mvstm::errors::StmResult;
use mvstm::reference::adder;
use mvstm::{alter, commute, get_cpu_count, read, run, val, write, Ref};
use mvstm_int_test::test_util::join_all;
use std::sync::Arc;
use std::thread;

const ACCOUNTS: usize = 16;
const OPS_PER_THREAD: usize = 20000;

fn main() -> StmResult<()> {
    colog::init();
    let threads = get_cpu_count();
    println!("Starting contention test on {} threads...", threads);

    let counter = Ref::new(val!(0));
    let start = std::time::Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || -> StmResult<()> {
                for _ in 0..OPS_PER_THREAD {
                    run(|| commute(&counter, adder(), vec![val!(1)]))?;
                }
                Ok(())
            })
        })
        .collect();
    join_all(handles)?.into_iter().collect::<StmResult<Vec<()>>>()?;
    println!(
        "Committed {} commutes in {:?}, counter = {}",
        threads * OPS_PER_THREAD,
        start.elapsed(),
        counter.current_value()?
    );

    let counter = Ref::new(val!(0));
    let start = std::time::Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || -> StmResult<()> {
                for _ in 0..OPS_PER_THREAD {
                    run(|| alter(&counter, adder(), vec![val!(1)]))?;
                }
                Ok(())
            })
        })
        .collect();
    join_all(handles)?.into_iter().collect::<StmResult<Vec<()>>>()?;
    println!(
        "Committed {} alters in {:?}, counter = {}",
        threads * OPS_PER_THREAD,
        start.elapsed(),
        counter.current_value()?
    );

    let accounts: Arc<Vec<Ref>> = Arc::new((0..ACCOUNTS).map(|_| Ref::new(val!(1000))).collect());
    let start = std::time::Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|worker| {
            let accounts = accounts.clone();
            thread::spawn(move || -> StmResult<()> {
                for op in 0..OPS_PER_THREAD {
                    let from = &accounts[(worker + op) % ACCOUNTS];
                    let to = &accounts[(worker * 7 + op * 3 + 1) % ACCOUNTS];
                    if from == to {
                        continue;
                    }
                    run(|| {
                        let balance = read(from)?.as_i64().unwrap_or_default();
                        let target = read(to)?.as_i64().unwrap_or_default();
                        write(from, val!(balance - 1))?;
                        write(to, val!(target + 1))
                    })?;
                }
                Ok(())
            })
        })
        .collect();
    join_all(handles)?.into_iter().collect::<StmResult<Vec<()>>>()?;
    let total = run(|| {
        let mut total = 0;
        for account in accounts.iter() {
            total += read(account)?.as_i64().unwrap_or_default();
        }
        Ok(total)
    })?;
    println!(
        "Ran transfers in {:?}, total balance = {:?} (expected {})",
        start.elapsed(),
        total,
        ACCOUNTS * 1000
    );
    Ok(())
}
