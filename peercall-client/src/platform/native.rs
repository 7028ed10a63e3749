/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Native (tokio) platform primitives.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Returns the current time in milliseconds since the Unix epoch.
pub fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}

/// A one-shot timer.
///
/// Dropping the handle before the delay elapses cancels the timer. The task
/// that the timer itself runs must not drop its own handle, since that would
/// abort it mid-way; it should [`disarm`](Self::disarm) it instead.
#[derive(Debug)]
pub struct TimeoutHandle {
    handle: Option<JoinHandle<()>>,
}

impl TimeoutHandle {
    /// Runs `callback()` after `delay_ms`.
    ///
    /// **Important:** A tokio runtime must be active when this is called.
    pub fn new<F, Fut>(delay_ms: u64, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            callback().await;
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Lets the timer run to completion without being tied to this handle.
    pub fn disarm(mut self) {
        self.handle.take();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for TimeoutHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Spawn an async task on the tokio runtime.
///
/// The future must be `Send + 'static` because tokio tasks may run on any
/// thread in a multi-threaded runtime.
pub fn spawn<F: Future<Output = ()> + Send + 'static>(future: F) -> JoinHandle<()> {
    tokio::spawn(future)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_now_ms_returns_reasonable_value() {
        let ms = now_ms();
        // Should be well past year 2020 (1577836800000 ms)
        assert!(ms > 1_577_836_800_000.0, "now_ms() returned {ms}");
        // Should be before year 2100
        assert!(ms < 4_102_444_800_000.0, "now_ms() returned {ms}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let _handle = TimeoutHandle::new(1_000, move || async move {
            flag.store(true, Ordering::Relaxed);
        });

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(!fired.load(Ordering::Relaxed));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(fired.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timeout() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = TimeoutHandle::new(100, move || async move {
            flag.store(true, Ordering::Relaxed);
        });
        drop(handle);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!fired.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_keeps_timer_running() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        TimeoutHandle::new(100, move || async move {
            flag.store(true, Ordering::Relaxed);
        })
        .disarm();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(fired.load(Ordering::Relaxed));
    }
}
