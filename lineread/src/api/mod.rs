/// L2 API: Public types and traits for the lineread crate.
///
/// Re-exports the main user-facing types from the core layer.
pub use crate::core::buffer::LineBuffer;
pub use crate::core::completer::{
    common_prefix, insertion_for, Completer, Completion, CompletionOverride, Generator,
    PathCompleter, DEFAULT_WORD_BREAK_CHARS,
};
pub use crate::core::config::{ColorConfig, ReadlineConfig};
pub use crate::core::editor::{visible_width, LineEditor};
pub use crate::core::hinter::Hinter;
pub use crate::core::history::{History, HistoryEntry, HistoryError};
