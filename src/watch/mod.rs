// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File watching for the watch REPL
//!
//! [`FilesView`] keeps every version of the watched files and a unified
//! diff per change; [`FileWatcher`] keeps it current from OS file events.

mod view;
mod watcher;

pub use view::{resolve_path, ChangingFile, FilesView};
pub use watcher::{FileWatcher, WatchHandle};
