// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of Bot API failures onto pipeline errors.

use leadwire_core::{ConnectionError, DeliveryError};
use teloxide::{ApiError, RequestError};

/// Classify a failure of a session's bot.
pub fn connection_error(session: &str, err: &RequestError) -> ConnectionError {
    match err {
        RequestError::Api(ApiError::InvalidToken) => ConnectionError::Auth {
            session: session.to_string(),
            message: err.to_string(),
        },
        RequestError::RetryAfter(wait) => ConnectionError::Transient {
            session: session.to_string(),
            message: err.to_string(),
            retry_after: Some(wait.duration()),
        },
        _ => ConnectionError::Transient {
            session: session.to_string(),
            message: err.to_string(),
            retry_after: None,
        },
    }
}

/// Classify a failure to send to a subscriber.
///
/// A destination that refuses the bot is `Rejected`; everything else may
/// succeed later.
pub fn delivery_error(subscriber: &str, err: &RequestError) -> DeliveryError {
    match err {
        RequestError::Api(
            ApiError::BotBlocked
            | ApiError::ChatNotFound
            | ApiError::UserDeactivated
            | ApiError::BotKicked
            | ApiError::InvalidToken,
        ) => DeliveryError::Rejected {
            subscriber: subscriber.to_string(),
            message: err.to_string(),
        },
        RequestError::RetryAfter(wait) => DeliveryError::Transient {
            subscriber: subscriber.to_string(),
            message: format!("flood wait {}s", wait.seconds()),
        },
        _ => DeliveryError::Transient {
            subscriber: subscriber.to_string(),
            message: err.to_string(),
        },
    }
}
