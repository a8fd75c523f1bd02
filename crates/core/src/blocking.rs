use tokio::runtime::{Handle, RuntimeFlavor};

/// Runs blocking work (a `reqwest::blocking` client and everything it owns)
/// from sync code that may sit under a tokio runtime.
///
/// The blocking client builds and drops its own runtime, which tokio forbids
/// on an async worker. On the multi-threaded scheduler the work moves off the
/// worker with `block_in_place`; on a current-thread runtime it runs on a
/// scoped thread instead.
pub(crate) fn run_blocking<T: Send>(work: impl FnOnce() -> T + Send) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        Ok(_) => std::thread::scope(|scope| match scope.spawn(work).join() {
            Ok(value) => value,
            Err(panic) => std::panic::resume_unwind(panic),
        }),
        Err(_) => work(),
    }
}
