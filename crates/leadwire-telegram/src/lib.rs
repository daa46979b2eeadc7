// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram adapters for Leadwire.
//!
//! - [`TelegramSource`] long-polls a bot that sits in the watched groups and
//!   channels and yields their text messages.
//! - [`TelegramSink`] sends classified items to subscriber chats through a
//!   separate delivery bot, with accept/reject buttons attached.
//! - [`FeedbackListener`] polls the delivery bot for button presses and
//!   forwards them as feedback records.

pub mod errors;
pub mod feedback;
pub mod sink;
pub mod source;

pub use errors::{connection_error, delivery_error};
pub use feedback::{FeedbackListener, PressRejected, feedback_record};
pub use sink::{TelegramSink, callback_data, parse_callback, render};
pub use source::TelegramSource;
