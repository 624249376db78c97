//! Built-in build-step modules.
//!
//! - `shell`: run commands in the working directory
//! - `echo`: log a message

pub mod echo;
pub mod shell;

use distonic_core::ModuleRegistry;
use std::sync::Arc;

pub use echo::EchoModule;
pub use shell::ShellModule;

/// A registry with every built-in module.
pub fn builtin_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry
        .register("shell", Arc::new(ShellModule))
        .register("echo", Arc::new(EchoModule));
    registry
}
