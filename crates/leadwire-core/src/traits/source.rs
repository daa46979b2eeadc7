// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upstream chat session trait.

use async_trait::async_trait;

use crate::error::ConnectionError;
use crate::traits::adapter::PluginAdapter;
use crate::types::RawMessage;

/// One authenticated connection to an upstream chat service.
///
/// The session manager owns each source exclusively and drives it from a
/// dedicated task, so methods take `&mut self`.
#[async_trait]
pub trait ChatSource: PluginAdapter {
    /// Establishes (or re-establishes) the upstream connection.
    ///
    /// Returns [`ConnectionError::Auth`] when credentials are rejected.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Waits for the next batch of inbound messages.
    ///
    /// An empty batch is a normal poll timeout. Messages within a batch are in
    /// upstream arrival order.
    async fn receive(&mut self) -> Result<Vec<RawMessage>, ConnectionError>;
}
