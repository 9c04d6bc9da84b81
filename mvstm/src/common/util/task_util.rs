/// Spawn a detached task on a new thread.
///
/// Post-commit actions go through here so a slow action never delays the
/// committing thread.
pub fn async_task<OP>(op: OP)
where
    OP: FnOnce() + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name("mvstm-action".to_string())
        .spawn(op);
    if let Err(e) = spawned {
        log::error!("Failed to spawn post-commit action thread: {}", e);
    }
}
