//! Watch mode: initial pass, then one pass per aggregated change batch

use crate::core::state::PassMode;
use crate::execution::controller::{Compile, WatchSource};
use crate::execution::{Completion, RunError};
use crate::watch::{WatchError, WatcherMessage};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Notifications delivered during a watch session
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// One pass finished
    Pass(Completion),
    /// The watcher could not start or died; the session has ended
    WatcherFailed(WatchError),
}

type EventSender = Arc<Mutex<Option<mpsc::UnboundedSender<WatchEvent>>>>;

fn deliver(sender: &EventSender, event: WatchEvent) {
    let guard = sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(tx) = guard.as_ref() {
        let _ = tx.send(event);
    }
}

/// Handle to a running watch session
pub struct Watching {
    stop: watch::Sender<bool>,
    sender: EventSender,
    task: Option<JoinHandle<()>>,
}

impl Watching {
    /// Start watching `target`
    ///
    /// Fails when `target` is closed, compiling, or already watching.
    pub fn start<C>(target: Arc<C>) -> Result<(Watching, mpsc::UnboundedReceiver<WatchEvent>), RunError>
    where
        C: Compile + ?Sized + 'static,
    {
        target.begin_watch()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let sender: EventSender = Arc::new(Mutex::new(Some(tx)));

        info!("Watching {}", target.label());
        let task = tokio::spawn(watch_loop(target, sender.clone(), stop_rx));

        Ok((
            Watching {
                stop: stop_tx,
                sender,
                task: Some(task),
            },
            rx,
        ))
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Stop the session: no new passes start, an in-flight pass finishes,
    /// and no further events are delivered
    pub async fn stop(mut self) {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let _ = self.stop.send(true);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("watch task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Watching {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

async fn watch_loop<C>(target: Arc<C>, sender: EventSender, mut stop: watch::Receiver<bool>)
where
    C: Compile + ?Sized + 'static,
{
    run_session(target.as_ref(), &sender, &mut stop).await;
    target.end_watch();
    debug!("Watch session of {} ended", target.label());
}

/// Change batches from every subscribed source, tagged with the source index
struct SourceChanges {
    rx: mpsc::UnboundedReceiver<(usize, WatcherMessage)>,
    // Dropping the set aborts the forwarders, which drops the watchers
    _forwarders: JoinSet<()>,
}

fn subscribe(sources: Vec<WatchSource>) -> Result<SourceChanges, WatchError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut forwarders = JoinSet::new();

    for (index, source) in sources.into_iter().enumerate() {
        let Some(file_system) = source.file_system else {
            return Err(WatchError::Failed(format!(
                "no watch file system installed for {}",
                source.label
            )));
        };
        let mut changes = file_system.watch(&source.roots, &source.options)?;
        debug!("Subscribed {} to {:?}", source.label, source.roots);

        let tx = tx.clone();
        forwarders.spawn(async move {
            while let Some(message) = changes.recv().await {
                if tx.send((index, message)).is_err() {
                    return;
                }
            }
            let _ = tx.send((
                index,
                WatcherMessage::Failed("watcher stopped unexpectedly".to_string()),
            ));
        });
    }

    Ok(SourceChanges {
        rx,
        _forwarders: forwarders,
    })
}

async fn run_session<C>(target: &C, sender: &EventSender, stop: &mut watch::Receiver<bool>)
where
    C: Compile + ?Sized,
{
    let completion = target.compile(PassMode::Watch).await;
    deliver(sender, WatchEvent::Pass(completion));

    if *stop.borrow() {
        return;
    }

    let mut changes = match subscribe(target.watch_sources()) {
        Ok(changes) => changes,
        Err(e) => {
            warn!("Failed to start watcher for {}: {}", target.label(), e);
            deliver(sender, WatchEvent::WatcherFailed(e));
            return;
        }
    };

    loop {
        let message = tokio::select! {
            biased;
            _ = stop.changed() => break,
            message = changes.rx.recv() => message,
        };

        let mut batch: BTreeMap<usize, Vec<PathBuf>> = BTreeMap::new();
        let mut pending_failure = None;
        let mut next = message;

        // Batches that queued up while the last pass ran fold into this one
        loop {
            match next {
                Some((source, WatcherMessage::Changed(paths))) => {
                    batch.entry(source).or_default().extend(paths);
                }
                Some((_, WatcherMessage::Failed(reason))) => {
                    pending_failure = Some(reason);
                    break;
                }
                None => {
                    pending_failure = Some("watcher stopped unexpectedly".to_string());
                    break;
                }
            }
            next = match changes.rx.try_recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            };
        }

        if !batch.is_empty() {
            for (source, changed) in batch.iter_mut() {
                changed.sort();
                changed.dedup();
                debug!("{} change(s) detected in source {} of {}", changed.len(), source, target.label());
                target.invalidate(*source, changed);
            }

            let sources: Vec<usize> = batch.keys().copied().collect();
            let completion = target.recompile(&sources).await;
            deliver(sender, WatchEvent::Pass(completion));
        }

        if let Some(reason) = pending_failure {
            deliver(sender, WatchEvent::WatcherFailed(WatchError::Failed(reason)));
            break;
        }
    }
}
