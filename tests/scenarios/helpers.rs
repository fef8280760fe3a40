//! Test utilities: a scripted engine and a manually driven watcher

use async_trait::async_trait;
use packline::core::config::{Configuration, WatchOptions};
use packline::core::hooks::HookRegistry;
use packline::watch::{WatchError, WatchFileSystem, WatcherMessage};
use packline::{BuildEngine, BuildStats, Bootstrap, CompilationError, EngineError, EngineFactory};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// What a mock build should produce
#[derive(Debug, Clone)]
pub enum Script {
    Clean,
    CompilationError(String),
    Fatal(String),
}

/// Shared record of everything the mock engines did
#[derive(Debug, Default)]
pub struct EngineLog {
    /// `start:<name>` / `end:<name>` / `close:<name>` in the order they happened
    pub events: Mutex<Vec<String>>,
    pub wired: Mutex<Vec<Configuration>>,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl EngineLog {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {} not recorded: {:?}", event, self.events()))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

/// Creates one [`MockEngine`] per pipeline, scripted by pipeline name
#[derive(Clone, Default)]
pub struct MockEngineFactory {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Script>>>>,
    delay: Option<Duration>,
    pub log: Arc<EngineLog>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue results for the pipeline called `name` (unnamed pipelines use "default")
    pub fn script(self, name: &str, results: Vec<Script>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), results.into_iter().collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(
        &self,
        config: &Configuration,
        _hooks: &mut HookRegistry,
    ) -> Result<Box<dyn BuildEngine>, EngineError> {
        self.log.wired.lock().unwrap().push(config.clone());
        let name = config.name.clone().unwrap_or_else(|| "default".to_string());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(&name)
            .unwrap_or_default();

        Ok(Box::new(MockEngine {
            name,
            script: Mutex::new(script),
            delay: self.delay,
            log: self.log.clone(),
        }))
    }
}

/// Engine that replays a script, then builds cleanly
pub struct MockEngine {
    name: String,
    script: Mutex<VecDeque<Script>>,
    delay: Option<Duration>,
    log: Arc<EngineLog>,
}

#[async_trait]
impl BuildEngine for MockEngine {
    async fn build(&self) -> Result<BuildStats, EngineError> {
        self.log.push(format!("start:{}", self.name));
        let running = self.log.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_running.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Clean);

        self.log.running.fetch_sub(1, Ordering::SeqCst);
        self.log.push(format!("end:{}", self.name));

        match step {
            Script::Clean => Ok(BuildStats::new().with_asset(format!("{}.js", self.name), 128)),
            Script::CompilationError(message) => {
                Ok(BuildStats::new().with_error(CompilationError::new(message).in_module("./src/broken.js")))
            }
            Script::Fatal(message) => Err(EngineError::Internal(message)),
        }
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.log.push(format!("close:{}", self.name));
        Ok(())
    }
}

/// One `watch` call seen by a [`ManualWatcher`]
#[derive(Debug, Clone)]
pub struct Subscription {
    pub roots: Vec<PathBuf>,
    pub options: WatchOptions,
    sender: mpsc::Sender<WatcherMessage>,
}

/// Watcher whose change batches are pushed by the test
#[derive(Default)]
pub struct ManualWatcher {
    subscriptions: Mutex<Vec<Subscription>>,
    fail_on_start: Option<WatchError>,
}

impl ManualWatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(error: WatchError) -> Arc<Self> {
        Arc::new(Self {
            fail_on_start: Some(error),
            ..Self::default()
        })
    }

    pub fn is_started(&self) -> bool {
        !self.subscriptions.lock().unwrap().is_empty()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Roots of every subscription, in subscription order
    pub fn roots(&self) -> Vec<PathBuf> {
        self.subscriptions()
            .into_iter()
            .flat_map(|subscription| subscription.roots)
            .collect()
    }

    /// Deliver each path to the subscriptions whose roots contain it
    pub fn change(&self, paths: &[&str]) {
        for subscription in self.subscriptions.lock().unwrap().iter() {
            let matching: Vec<PathBuf> = paths
                .iter()
                .map(PathBuf::from)
                .filter(|path| subscription.roots.iter().any(|root| path.starts_with(root)))
                .collect();
            if !matching.is_empty() {
                let _ = subscription.sender.try_send(WatcherMessage::Changed(matching));
            }
        }
    }

    pub fn fail(&self, reason: &str) {
        for subscription in self.subscriptions.lock().unwrap().iter() {
            let _ = subscription.sender.try_send(WatcherMessage::Failed(reason.to_string()));
        }
    }
}

impl WatchFileSystem for ManualWatcher {
    fn watch(
        &self,
        roots: &[PathBuf],
        options: &WatchOptions,
    ) -> Result<mpsc::Receiver<WatcherMessage>, WatchError> {
        if let Some(error) = &self.fail_on_start {
            return Err(error.clone());
        }

        let (tx, rx) = mpsc::channel(16);
        self.subscriptions.lock().unwrap().push(Subscription {
            roots: roots.to_vec(),
            options: options.clone(),
            sender: tx,
        });
        Ok(rx)
    }
}

/// Wait until the watcher subscribed (after the initial pass)
pub async fn wait_for_watcher(watcher: &ManualWatcher) {
    wait_for_subscriptions(watcher, 1).await;
}

/// Wait until `count` subscriptions exist
pub async fn wait_for_subscriptions(watcher: &ManualWatcher, count: usize) {
    for _ in 0..200 {
        if watcher.subscriptions.lock().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("watcher never reached {} subscription(s)", count);
}

/// Bootstrap wired with a mock engine factory and a manual watcher
pub fn bootstrap(factory: &MockEngineFactory, watcher: &Arc<ManualWatcher>) -> Bootstrap {
    let watch_file_system: Arc<dyn WatchFileSystem> = watcher.clone();
    Bootstrap::new(factory.clone()).with_watch_file_system(watch_file_system)
}
