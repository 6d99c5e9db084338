//! Config File Watcher
//!
//! The OS watcher callback only pushes a unit event onto a channel. A
//! single async loop drains that channel, applies the debounce window and
//! runs the reload on the blocking pool.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::RuleConfigError;
use crate::store::RuleStore;

/// Notifications closer together than this collapse into one reload
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Pause before reading so the writer can finish the burst
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Leading-edge debouncer: the first event fires, later events inside the
/// window are dropped
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_fired: Option<Instant>,
}

impl Debouncer {
    /// Create a debouncer with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
        }
    }

    /// Returns true if an event observed at `now` should fire
    pub fn should_fire(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }
}

/// Running watcher plus its reload loop
pub(crate) struct ConfigWatcher {
    watcher: RecommendedWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Watch the directory containing `config_path`
    pub(crate) fn spawn(store: Weak<RuleStore>, config_path: PathBuf) -> Result<Self, RuleConfigError> {
        let watch_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = config_path.file_name().map(OsString::from);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_config_change(&event, file_name.as_deref()) {
                    // Receiver gone means the loop is shutting down
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!(error = %e, "Config watcher error"),
        })?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(reload_loop(store, rx, cancel.clone()));

        info!("Watching {} for rules config changes", config_path.display());
        Ok(Self { watcher, cancel, task })
    }

    /// Stop the OS watcher and wait for the reload loop to exit
    pub(crate) async fn shutdown(self) {
        drop(self.watcher);
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Config reload loop panicked");
        }
    }
}

fn is_config_change(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event.paths.iter().any(|p| p.file_name() == file_name)
}

async fn reload_loop(
    store: Weak<RuleStore>,
    mut events: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    let mut debouncer = Debouncer::new(DEBOUNCE_WINDOW);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                if event.is_none() {
                    break;
                }
                if !debouncer.should_fire(Instant::now()) {
                    debug!("Debounced config change notification");
                    continue;
                }

                tokio::time::sleep(SETTLE_DELAY).await;
                while events.try_recv().is_ok() {}

                let Some(store) = store.upgrade() else {
                    break;
                };
                info!("Rules config changed on disk, reloading");
                match tokio::task::spawn_blocking(move || store.reload_config()).await {
                    Ok(reloaded) => debug!(reloaded, "Watcher-triggered reload finished"),
                    Err(e) => error!(error = %e, "Config reload task failed"),
                }
            }
        }
    }

    debug!("Config reload loop stopped");
}
