//! Process runtime.

use std::future::Future;
use std::io;

use tokio::runtime::Builder;

/// Run `future` to completion on a fresh multi-threaded runtime.
///
/// The runtime is released without waiting for leftover work, so a
/// scheduled task abandoned at the drain deadline cannot hold up exit.
pub fn block_on_then_release<F: Future>(future: F) -> io::Result<F::Output> {
    let runtime = Builder::new_multi_thread().enable_all().build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn hung_blocking_work_does_not_hold_up_release() {
        let started = Instant::now();
        let value = block_on_then_release(async {
            tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(30)));
            7
        })
        .unwrap();

        assert_eq!(value, 7);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
