//! Blocking bridge for the synchronous API.
//!
//! File and remote futures need a tokio reactor. Blocking callers outside of
//! any runtime get a lazily built, process-wide multi-thread runtime; callers
//! on a multi-thread runtime worker are moved off the worker with
//! [`tokio::task::block_in_place`] and reuse their own runtime.
//!
//! A current-thread runtime cannot be re-entered from one of its own tasks, so
//! there the future is polled on the calling thread while the shared runtime's
//! workers drive timers, sockets and blocking file I/O for it.

use once_cell::sync::Lazy;
use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    debug!("Starting multicache blocking runtime");
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("multicache-io")
        .enable_all()
        .build()
        .unwrap_or_else(|e| panic!("failed to start multicache runtime: {}", e))
});

/// Run `future` to completion on the calling thread.
///
/// Resources created by the future (remote connections in particular) belong
/// to whichever runtime drove it. A remote backend built asynchronously on a
/// current-thread runtime is serviced by that runtime, which is parked while
/// a blocking call waits; build it with the blocking constructor instead.
pub fn block_on<F: Future>(future: F) -> F::Output {
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => {
                let _entered = RUNTIME.enter();
                futures::executor::block_on(future)
            }
            _ => tokio::task::block_in_place(|| handle.block_on(future)),
        },
        Err(_) => RUNTIME.block_on(future),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_block_on_outside_runtime() {
        let value = block_on(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            7
        });
        assert_eq!(value, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_on_inside_multi_thread_runtime() {
        let value = block_on(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            "done"
        });
        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_block_on_inside_current_thread_runtime() {
        let value = block_on(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            tokio::task::spawn_blocking(|| 21 * 2)
                .await
                .expect("Failed to join blocking task")
        });
        assert_eq!(value, 42);
    }
}
