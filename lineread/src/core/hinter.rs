use super::config::ColorConfig;
use super::history::History;

/// History-based hinter (fish-shell style)
pub struct Hinter {
    colors: ColorConfig,
}

impl Hinter {
    pub fn new(colors: ColorConfig) -> Self {
        Self { colors }
    }

    /// Suffix of the most recent history entry that extends `line`, or
    /// `None` when nothing matches. Returned without styling; render with
    /// [`Hinter::paint`].
    pub fn hint(&self, line: &str, history: &History) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }

        history
            .iter()
            .rev() // Most recent first
            .find(|entry| entry.starts_with(line) && entry.len() > line.len())
            .map(|entry| entry[line.len()..].to_string())
    }

    /// Wrap a hint in its configured color for display.
    pub fn paint(&self, hint: &str) -> String {
        format!("{}{}\x1b[0m", self.colors.hint_ansi(), hint)
    }
}
