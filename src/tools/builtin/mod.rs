// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Built-in tools for sgpt

use std::sync::Arc;

use crate::tools::ToolRegistry;

mod shell;

pub use shell::ShellTool;

/// Register every built-in tool
pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(Arc::new(ShellTool::new()));
}
