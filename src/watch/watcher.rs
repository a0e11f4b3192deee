// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Background file watcher feeding a shared [`FilesView`].
//!
//! Parent directories are watched rather than the files themselves so that
//! editors which save by renaming a temp file over the original are seen.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::FilesView;
use crate::error::{Result, SgptError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn lock_view(view: &Mutex<FilesView>) -> MutexGuard<'_, FilesView> {
    match view.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(target: "sgpt.watch", "files view lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Handle to a running watcher.
pub struct WatchHandle {
    thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    changed_rx: Receiver<PathBuf>,
}

impl WatchHandle {
    /// Paths that changed since the last call.
    pub fn drain_changes(&self) -> Vec<PathBuf> {
        self.changed_rx.try_iter().collect()
    }

    /// Stop watching and wait for the thread to finish.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| SgptError::Watch("Watcher thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Watches every file in a [`FilesView`] and records changes into it.
pub struct FileWatcher {
    view: Arc<Mutex<FilesView>>,
}

impl FileWatcher {
    pub fn new(view: Arc<Mutex<FilesView>>) -> Self {
        Self { view }
    }

    /// Start watching in a background thread.
    pub fn start(self) -> Result<WatchHandle> {
        let (fs_tx, fs_rx) = mpsc::channel::<Event>();
        let (changed_tx, changed_rx) = mpsc::channel::<PathBuf>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = fs_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| SgptError::Watch(format!("Failed to create watcher: {}", e)))?;

        let dirs: BTreeSet<PathBuf> = lock_view(&self.view)
            .paths()
            .filter_map(|p| p.parent().map(PathBuf::from))
            .collect();
        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    SgptError::Watch(format!("Failed to watch {}: {}", dir.display(), e))
                })?;
        }
        tracing::debug!(target: "sgpt.watch", directories = dirs.len(), "watcher started");

        let view = self.view;
        let thread_shutdown = Arc::clone(&shutdown);
        let thread = thread::spawn(move || {
            // The watcher lives as long as this thread
            let _watcher = watcher;
            while !thread_shutdown.load(Ordering::SeqCst) {
                match fs_rx.recv_timeout(POLL_INTERVAL) {
                    Ok(event) => Self::handle_event(&view, event, &changed_tx),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::debug!(target: "sgpt.watch", "watcher stopped");
        });

        Ok(WatchHandle {
            thread: Some(thread),
            shutdown,
            changed_rx,
        })
    }

    fn handle_event(view: &Mutex<FilesView>, event: Event, changed_tx: &mpsc::Sender<PathBuf>) {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }

        let mut view = lock_view(view);
        for path in event.paths {
            if !view.is_tracked(&path) {
                continue;
            }
            match view.refresh(&path) {
                Ok(true) => {
                    let _ = changed_tx.send(path);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(target: "sgpt.watch", path = %path.display(), error = %e, "failed to read changed file")
                }
            }
        }
    }
}
