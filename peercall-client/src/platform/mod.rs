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

//! Platform primitives used by the call client.
//!
//! - **`now_ms()`**: current time in milliseconds since the Unix epoch
//! - **`TimeoutHandle`**: a one-shot timer that runs a future after a delay
//!   and is cancelled when the handle is dropped
//! - **`spawn(future)`**: spawn an async task on the runtime
//!
//! Everything here runs on `tokio`. Timers sleep on tokio's clock, so paused
//! test time drives the call timers too.

mod native;

pub use native::*;
