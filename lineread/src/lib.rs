#![forbid(unsafe_code)]

/// lineread: interactive line editing, history, and completion library.
///
/// # Architecture (SEA Pattern)
///
/// - `api/` — public types re-exported at crate root
/// - `core/` — implementations (buffer, editor, completer, hinter, history, config)
/// - `spi/` — external provider integration (empty for now)
pub mod api;
pub mod core;
pub mod spi;

// Re-export the API surface at crate root for convenience.
pub use api::*;
