// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mocks and an end-to-end harness for Leadwire tests.

pub mod harness;
pub mod mock_backend;
pub mod mock_sink;
pub mod mock_source;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_backend::MockBackend;
pub use mock_sink::{Delivered, MockSink};
pub use mock_source::{MockSource, MockSourceHandle, raw_message};
