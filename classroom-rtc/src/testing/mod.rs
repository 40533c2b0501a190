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

//! In-memory stand-ins for the device layer and the network layer.
//!
//! [`FakeCaptureBackend`] hands out fake sources and counts how many are live
//! per kind. [`LoopbackTransportFactory`] creates transports that complete
//! negotiation locally and expose a [`FakeTransportHandle`] for every
//! transport they create, so tests can inspect applied candidates and sent
//! payloads or inject remote tracks, data and failures.

mod fake_capture;
mod loopback;

pub use fake_capture::FakeCaptureBackend;
pub use loopback::{FakeTransportHandle, LoopbackTransportFactory};
