// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config file hot reload.
//!
//! Filter rules, exclusions, pass-through and the subscriber list are
//! swapped in place. Every other section is read once at startup; edits to
//! them are reported and otherwise ignored until restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use leadwire_config::model::LeadwireConfig;
use leadwire_core::{LeadwireError, Subscriber};
use leadwire_filter::{FilterEngine, RuleSet};
use leadwire_pipeline::SharedSubscribers;
use notify_debouncer_mini::notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Live state a reload may replace.
#[derive(Clone)]
pub struct ReloadTargets {
    pub filter: Arc<FilterEngine>,
    pub subscribers: SharedSubscribers,
}

/// Apply the reloadable parts of `next`.
///
/// Nothing is swapped when the new rules fail to compile.
pub fn apply(
    current: &LeadwireConfig,
    next: &LeadwireConfig,
    targets: &ReloadTargets,
) -> Result<(), LeadwireError> {
    let rules = RuleSet::compile(&next.filter)?;
    targets.filter.reload(rules);

    let subscribers: Vec<Subscriber> = next.subscribers.iter().map(Subscriber::from).collect();
    let count = subscribers.len();
    targets.subscribers.store(Arc::new(subscribers));
    info!(subscribers = count, "subscribers reloaded");

    for section in restart_only_changes(current, next) {
        warn!(section, "config section changed; restart to apply");
    }
    Ok(())
}

/// Sections whose edits only take effect after a restart.
fn restart_only_changes(current: &LeadwireConfig, next: &LeadwireConfig) -> Vec<&'static str> {
    let mut changed = Vec::new();
    let mut check = |name: &'static str, differs: bool| {
        if differs {
            changed.push(name);
        }
    };
    check("pipeline", differs(&current.pipeline, &next.pipeline));
    check("storage", differs(&current.storage, &next.storage));
    check("sessions", differs(&current.sessions, &next.sessions));
    check("reconnect", differs(&current.reconnect, &next.reconnect));
    check("classifier", differs(&current.classifier, &next.classifier));
    check("delivery", differs(&current.delivery, &next.delivery));
    check("feedback", differs(&current.feedback, &next.feedback));
    check("metrics", differs(&current.metrics, &next.metrics));
    changed
}

fn differs<T: Serialize>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a != b,
        _ => true,
    }
}

/// Watch `path` and apply every valid edit until `cancel` fires.
///
/// The parent directory is watched so editors that replace the file on save
/// are still seen.
pub fn spawn_watcher(
    path: PathBuf,
    initial: LeadwireConfig,
    targets: ReloadTargets,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, notify_debouncer_mini::notify::Error> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let file_name = path.file_name().map(|n| n.to_os_string());

    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
        Ok(events) => {
            let touched = events
                .iter()
                .any(|event| event.path.file_name() == file_name.as_deref());
            if touched {
                let _ = tx.send(());
            }
        }
        Err(e) => warn!(error = %e, "config watcher error"),
    })?;
    debouncer
        .watcher()
        .watch(watch_dir(&path), RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "watching config for changes");

    Ok(tokio::spawn(async move {
        let _debouncer = debouncer;
        let mut current = initial;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = rx.recv() => {
                    if event.is_none() {
                        break;
                    }
                }
            }

            match leadwire_config::load_and_validate_path(&path) {
                Ok(next) => match apply(&current, &next, &targets) {
                    Ok(()) => current = next,
                    Err(e) => warn!(error = %e, "config reload rejected, keeping current rules"),
                },
                Err(errors) => {
                    for error in &errors {
                        warn!(error = %error, "config reload rejected");
                    }
                }
            }
        }
        debug!("config watcher stopped");
    }))
}

fn watch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
