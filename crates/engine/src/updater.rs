//! Filesystem watch loop: raw events are filtered, collapsed by a debounce
//! window and turned into one rebuild per burst.
//!
//! A single actor task owns the pending-path set and the timer; everything
//! else talks to it over a command channel.
//!
//! ```text
//! notify ──> filter ──> Schedule ─┐
//! schedule()/flush()/cancel() ────┼──> actor ──> invalidate + generate
//!                                 │      ├──> broadcast<ContextEvent>
//!                                 │      └──> watch<WatchHealth>
//! ```

use crate::config::WatchConfig;
use crate::error::{EngineError, Result};
use crate::generator::ContextGenerator;
use context_merkle::IgnoreMatcher;
use context_protocol::path_filters::matches_any_loose_pattern;
use context_protocol::{ContextEvent, FileChangeKind, GenerateOptions, GenerationResult};
use notify::event::{EventKind, ModifyKind};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub kind: FileChangeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatchHealth {
    pub watching: bool,
    pub pending_paths: usize,
    pub rebuilding: bool,
    pub last_error: Option<String>,
    pub last_rebuild_ms: Option<u64>,
    pub rebuild_count: u64,
}

enum UpdaterCommand {
    Schedule(Vec<FileChange>),
    Flush,
    Cancel,
    WatchError(String),
    Stop,
}

struct Running {
    command_tx: mpsc::Sender<UpdaterCommand>,
    _watcher: Option<RecommendedWatcher>,
    task: JoinHandle<()>,
}

/// Keeps a generated context fresh while files change.
///
/// Stopped until [`start`](Self::start); [`stop`](Self::stop) returns it to
/// stopped and may be followed by another `start`.
pub struct IncrementalUpdater {
    generator: Arc<ContextGenerator>,
    options: GenerateOptions,
    config: WatchConfig,
    events_tx: broadcast::Sender<ContextEvent>,
    health_tx: Arc<watch::Sender<WatchHealth>>,
    latest_tx: Arc<watch::Sender<Option<Arc<GenerationResult>>>>,
    running: TokioMutex<Option<Running>>,
}

/// Decides which raw paths are worth a rebuild.
#[derive(Debug, Clone)]
struct EventFilter {
    root: PathBuf,
    matcher: IgnoreMatcher,
    patterns: Vec<String>,
}

impl EventFilter {
    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            return None;
        }
        let rel = parts.join("/");
        if self.matcher.is_ignored(&rel) || matches_any_loose_pattern(&rel, &self.patterns) {
            return None;
        }
        Some(rel)
    }

    fn convert(&self, event: &Event) -> Vec<FileChange> {
        let Some(kind) = change_kind(&event.kind) else {
            return Vec::new();
        };
        event
            .paths
            .iter()
            .filter_map(|p| self.relative(p))
            .map(|path| FileChange { path, kind })
            .collect()
    }
}

fn change_kind(kind: &EventKind) -> Option<FileChangeKind> {
    match kind {
        EventKind::Create(_) => Some(FileChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileChangeKind::Renamed),
        EventKind::Modify(_) | EventKind::Any => Some(FileChangeKind::Modified),
        EventKind::Remove(_) => Some(FileChangeKind::Removed),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

impl IncrementalUpdater {
    pub fn new(generator: Arc<ContextGenerator>, options: GenerateOptions, config: WatchConfig) -> Self {
        let (events_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        let (health_tx, _) = watch::channel(WatchHealth::default());
        let (latest_tx, _) = watch::channel(None);
        Self {
            generator,
            options,
            config,
            events_tx,
            health_tx: Arc::new(health_tx),
            latest_tx: Arc::new(latest_tx),
            running: TokioMutex::new(None),
        }
    }

    /// Register the filesystem watch and start the debounce loop. A failed
    /// registration is the one fatal watcher error.
    pub async fn start(&self) -> Result<()> {
        self.start_inner(true).await
    }

    /// Start the debounce loop without an OS watch; changes arrive only via
    /// [`schedule`](Self::schedule).
    pub async fn start_manual(&self) -> Result<()> {
        self.start_inner(false).await
    }

    async fn start_inner(&self, register: bool) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            log::debug!("Updater already watching");
            return Ok(());
        }

        let (command_tx, command_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let watcher = if register {
            Some(create_fs_watcher(
                self.generator.root(),
                self.filter(),
                command_tx.clone(),
            )?)
        } else {
            None
        };

        let actor = Actor {
            generator: self.generator.clone(),
            options: self.options.clone(),
            debounce: self.config.debounce(),
            max_batch_wait: self.config.max_batch_wait(),
            events_tx: self.events_tx.clone(),
            health_tx: self.health_tx.clone(),
            latest_tx: self.latest_tx.clone(),
        };
        self.health_tx.send_modify(|h| {
            h.watching = true;
            h.pending_paths = 0;
        });
        let task = tokio::spawn(actor.run(command_rx));

        log::info!(
            "Watching {} (debounce {:?})",
            self.generator.root().display(),
            self.config.debounce()
        );
        *running = Some(Running {
            command_tx,
            _watcher: watcher,
            task,
        });
        Ok(())
    }

    /// Stop watching; pending paths and timers are dropped.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        drop(running._watcher);
        let _ = running.command_tx.send(UpdaterCommand::Stop).await;
        if let Err(err) = running.task.await {
            log::warn!("Updater task ended abnormally: {err}");
        }
        self.health_tx.send_modify(|h| {
            h.watching = false;
            h.pending_paths = 0;
            h.rebuilding = false;
        });
        log::info!("Stopped watching {}", self.generator.root().display());
    }

    pub fn is_watching(&self) -> bool {
        self.health_tx.borrow().watching
    }

    /// Queue a change as if the filesystem had reported it.
    pub async fn schedule(&self, path: impl Into<String>, kind: FileChangeKind) -> Result<()> {
        let change = FileChange {
            path: context_protocol::normalize_rel_path(&path.into()),
            kind,
        };
        self.send(UpdaterCommand::Schedule(vec![change])).await
    }

    /// Fire the pending batch now instead of waiting out the window.
    pub async fn flush(&self) -> Result<()> {
        self.send(UpdaterCommand::Flush).await
    }

    /// Drop the pending batch.
    pub async fn cancel(&self) -> Result<()> {
        self.send(UpdaterCommand::Cancel).await
    }

    async fn send(&self, command: UpdaterCommand) -> Result<()> {
        let tx = match self.running.lock().await.as_ref() {
            Some(running) => running.command_tx.clone(),
            None => return Err(EngineError::Other("updater is not watching".to_string())),
        };
        tx.send(command)
            .await
            .map_err(|_| EngineError::Other("updater loop has stopped".to_string()))
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events_tx.subscribe()
    }

    #[must_use]
    pub fn health(&self) -> WatchHealth {
        self.health_tx.borrow().clone()
    }

    #[must_use]
    pub fn health_stream(&self) -> watch::Receiver<WatchHealth> {
        self.health_tx.subscribe()
    }

    /// Result of the most recent successful rebuild.
    pub fn latest_result(&self) -> Option<Arc<GenerationResult>> {
        self.latest_tx.borrow().clone()
    }

    fn filter(&self) -> EventFilter {
        EventFilter {
            root: self.generator.root().to_path_buf(),
            matcher: IgnoreMatcher::new(&self.generator.config().merkle.ignore)
                .unwrap_or_else(|_| IgnoreMatcher::with_defaults()),
            patterns: self.config.ignore.clone(),
        }
    }
}

impl Drop for IncrementalUpdater {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.running.try_lock() {
            if let Some(running) = guard.take() {
                let _ = running.command_tx.try_send(UpdaterCommand::Stop);
            }
        }
    }
}

fn create_fs_watcher(
    root: &Path,
    filter: EventFilter,
    sender: mpsc::Sender<UpdaterCommand>,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let command = match res {
                Ok(event) => {
                    let changes = filter.convert(&event);
                    if changes.is_empty() {
                        return;
                    }
                    UpdaterCommand::Schedule(changes)
                }
                Err(err) => UpdaterCommand::WatchError(err.to_string()),
            };
            let _ = sender.blocking_send(command);
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

struct Actor {
    generator: Arc<ContextGenerator>,
    options: GenerateOptions,
    debounce: Duration,
    max_batch_wait: Duration,
    events_tx: broadcast::Sender<ContextEvent>,
    health_tx: Arc<watch::Sender<WatchHealth>>,
    latest_tx: Arc<watch::Sender<Option<Arc<GenerationResult>>>>,
}

#[derive(Default)]
struct Pending {
    paths: BTreeSet<String>,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
    flush: bool,
}

impl Pending {
    fn deadline(&self, debounce: Duration, max_wait: Duration) -> Option<Instant> {
        if self.paths.is_empty() {
            return None;
        }
        if self.flush {
            return Some(Instant::now());
        }
        let quiet = self.last_event? + debounce;
        let forced = self.first_event? + max_wait;
        Some(quiet.min(forced))
    }

    fn take(&mut self) -> Vec<String> {
        let paths = std::mem::take(&mut self.paths).into_iter().collect();
        *self = Self::default();
        paths
    }
}

impl Actor {
    async fn run(self, mut commands: mpsc::Receiver<UpdaterCommand>) {
        let mut pending = Pending::default();

        loop {
            let deadline = pending.deadline(self.debounce, self.max_batch_wait);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(UpdaterCommand::Schedule(changes)) => {
                        let now = Instant::now();
                        for change in changes {
                            let _ = self.events_tx.send(ContextEvent::FileChanged {
                                path: change.path.clone(),
                                kind: change.kind,
                            });
                            pending.paths.insert(change.path);
                        }
                        pending.first_event.get_or_insert(now);
                        pending.last_event = Some(now);
                        self.publish_pending(pending.paths.len());
                    }
                    Some(UpdaterCommand::Flush) => pending.flush = !pending.paths.is_empty(),
                    Some(UpdaterCommand::Cancel) => {
                        pending.take();
                        self.publish_pending(0);
                    }
                    Some(UpdaterCommand::WatchError(message)) => {
                        log::warn!("Watcher error: {message}");
                        self.health_tx.send_modify(|h| h.last_error = Some(message.clone()));
                        let _ = self.events_tx.send(ContextEvent::error(message));
                    }
                    Some(UpdaterCommand::Stop) | None => break,
                },
                () = async {
                    if let Some(deadline) = deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if deadline.is_some() => {
                    let paths = pending.take();
                    self.rebuild(paths).await;
                }
            }
        }
        self.health_tx.send_modify(|h| {
            h.watching = false;
            h.pending_paths = 0;
        });
    }

    fn publish_pending(&self, count: usize) {
        self.health_tx.send_modify(|h| h.pending_paths = count);
    }

    /// Invalidate and regenerate; failures become an error event.
    async fn rebuild(&self, paths: Vec<String>) {
        let started = std::time::Instant::now();
        self.health_tx.send_modify(|h| {
            h.rebuilding = true;
            h.pending_paths = 0;
        });

        let dropped = self.generator.invalidate_paths(&paths);
        log::debug!("Rebuilding for {} paths ({dropped} cache entries dropped)", paths.len());
        let outcome = self.generator.generate(self.options.clone()).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(result) => {
                self.latest_tx.send_replace(Some(Arc::new(result)));
                self.health_tx.send_modify(|h| {
                    h.rebuilding = false;
                    h.last_error = None;
                    h.last_rebuild_ms = Some(duration_ms);
                    h.rebuild_count += 1;
                });
                let _ = self
                    .events_tx
                    .send(ContextEvent::ContextUpdated { paths, duration_ms });
            }
            Err(err) => {
                log::error!("Context rebuild failed: {err}");
                let message = err.to_string();
                self.health_tx.send_modify(|h| {
                    h.rebuilding = false;
                    h.last_error = Some(message.clone());
                    h.last_rebuild_ms = Some(duration_ms);
                    h.rebuild_count += 1;
                });
                let _ = self.events_tx.send(ContextEvent::error(message));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RenameMode};

    fn filter() -> EventFilter {
        EventFilter {
            root: PathBuf::from("/repo"),
            matcher: IgnoreMatcher::with_defaults(),
            patterns: vec!["*.swp".to_string(), "tmp/".to_string()],
        }
    }

    #[test]
    fn converts_and_filters_raw_events() {
        let filter = filter();
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/repo/src/a.ts"))
            .add_path(PathBuf::from("/repo/src/.a.ts.swp"))
            .add_path(PathBuf::from("/repo/node_modules/x/index.js"))
            .add_path(PathBuf::from("/repo/tmp/scratch.ts"))
            .add_path(PathBuf::from("/elsewhere/b.ts"));
        assert_eq!(
            filter.convert(&event),
            vec![FileChange {
                path: "src/a.ts".to_string(),
                kind: FileChangeKind::Modified,
            }]
        );

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/repo/b.ts"));
        assert_eq!(filter.convert(&created)[0].kind, FileChangeKind::Created);
        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/repo/c.ts"));
        assert_eq!(filter.convert(&renamed)[0].kind, FileChangeKind::Renamed);
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/repo/c.ts"));
        assert!(filter.convert(&access).is_empty());
    }

    #[test]
    fn deadline_is_quiet_period_capped_by_max_wait() {
        let mut pending = Pending::default();
        let debounce = Duration::from_millis(100);
        let max_wait = Duration::from_millis(250);
        assert!(pending.deadline(debounce, max_wait).is_none());

        let start = Instant::now();
        pending.paths.insert("a".to_string());
        pending.first_event = Some(start);
        pending.last_event = Some(start + Duration::from_millis(200));
        assert_eq!(
            pending.deadline(debounce, max_wait),
            Some(start + Duration::from_millis(250))
        );

        pending.last_event = Some(start + Duration::from_millis(50));
        assert_eq!(
            pending.deadline(debounce, max_wait),
            Some(start + Duration::from_millis(150))
        );
        assert_eq!(pending.take(), vec!["a".to_string()]);
        assert!(pending.first_event.is_none());
    }
}
