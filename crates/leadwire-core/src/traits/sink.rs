// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscriber delivery trait.

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DeliveryEntry, Subscriber};

/// Sends a queue entry to one subscriber destination.
#[async_trait]
pub trait DeliverySink: PluginAdapter {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        entry: &DeliveryEntry,
    ) -> Result<(), DeliveryError>;
}
