// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadwire run` command implementation.
//!
//! Opens the SQLite store, builds the filter and classifier, connects one
//! Telegram session per `[[sessions]]` entry and runs the pipeline until a
//! shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use leadwire_classifier::Classifier;
use leadwire_config::model::LeadwireConfig;
use leadwire_core::{ChatSource, FeedbackStore, LeadwireError, PluginAdapter, Subscriber, shared_weights};
use leadwire_filter::{FilterEngine, RuleSet};
use leadwire_metrics::register_metrics;
use leadwire_pipeline::{Pipeline, PipelineParts, install_signal_handler, shared_subscribers};
use leadwire_storage::SqliteStore;
use leadwire_telegram::{FeedbackListener, TelegramSink, TelegramSource};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::reload::{self, ReloadTargets};

const FEEDBACK_BUFFER: usize = 256;

/// Runs the pipeline. Returns an error for startup failures only.
pub async fn run_serve(
    config: LeadwireConfig,
    watch: Option<PathBuf>,
) -> Result<(), LeadwireError> {
    info!("starting leadwire");
    register_metrics();

    if config.sessions.is_empty() {
        return Err(LeadwireError::Config(
            "no [[sessions]] configured; add at least one bot session".into(),
        ));
    }

    let store = Arc::new(SqliteStore::new(
        config.storage.clone(),
        config.delivery.queue_policy(),
    ));
    store.initialize().await?;

    let weights = shared_weights(store.current_weights().await?);
    let filter = Arc::new(FilterEngine::new(
        RuleSet::compile(&config.filter)?,
        weights.clone(),
    ));
    let classifier = Arc::new(Classifier::from_config(&config.classifier, weights.clone())?);
    info!(
        backend = classifier.backend_name(),
        max_attempts = classifier.max_attempts(),
        "classifier ready"
    );

    let sources = config
        .sessions
        .iter()
        .map(|session| {
            TelegramSource::new(session).map(|source| Box::new(source) as Box<dyn ChatSource>)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let token = config.delivery.bot_token.as_deref().ok_or_else(|| {
        LeadwireError::Config("delivery.bot_token is required to deliver to subscribers".into())
    })?;
    let sink = Arc::new(TelegramSink::new(token)?);
    let subscribers =
        shared_subscribers(config.subscribers.iter().map(Subscriber::from).collect());
    let (feedback_tx, feedback_rx) = mpsc::channel(FEEDBACK_BUFFER);

    let cancel = install_signal_handler();
    let parts = PipelineParts {
        sources,
        filter: filter.clone(),
        classifier,
        queue: store.clone(),
        dead_letters: store.clone(),
        feedback: store.clone(),
        metrics_store: store.clone(),
        sink: sink.clone(),
        subscribers: subscribers.clone(),
        weights,
        feedback_rx: Some(feedback_rx),
    };

    let pipeline = match Pipeline::start(parts, &config, cancel.clone()).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "pipeline failed to start");
            cancel.cancel();
            if let Err(e) = store.shutdown().await {
                warn!(error = %e, "store shutdown failed");
            }
            return Err(e);
        }
    };

    let listener = FeedbackListener::new(sink.bot(), feedback_tx, subscribers.clone())
        .spawn(cancel.clone());

    let watcher = match watch {
        Some(path) => {
            let targets = ReloadTargets {
                filter,
                subscribers,
            };
            match reload::spawn_watcher(path, config.clone(), targets, cancel.clone()) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "config hot reload unavailable");
                    None
                }
            }
        }
        None => {
            info!("no config file to watch, hot reload disabled");
            None
        }
    };

    info!(
        sessions = pipeline.health().alive_sessions(),
        subscribers = config.subscribers.len(),
        "leadwire running"
    );

    pipeline.wait().await;
    if let Err(e) = listener.await {
        error!(error = %e, "feedback listener panicked");
    }
    if let Some(watcher) = watcher {
        if let Err(e) = watcher.await {
            error!(error = %e, "config watcher panicked");
        }
    }

    store.shutdown().await?;
    info!("leadwire stopped");
    Ok(())
}
