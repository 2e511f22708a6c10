use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Characters that end the partial word handed to the generator: blanks,
/// quoting characters, and shell metacharacters.
pub const DEFAULT_WORD_BREAK_CHARS: &str = " \t\n\"\\'`@$><=;|&{(";

/// Completion candidate.
///
/// `text` is what gets inserted in place of the partial word; `display` is
/// what a listing UI would show (file names grow a trailing `/` for
/// directories).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub display: String,
}

impl Completion {
    fn plain(text: String) -> Self {
        Self {
            display: text.clone(),
            text,
        }
    }
}

/// Candidate generator registered by the application.
///
/// Called with the partial word and a call index that is 0 on the first call
/// of a completion trigger and increments by one per call. Each call returns
/// one candidate; an empty string means no more candidates. The usual shape
/// computes the full candidate set when the index is 0 and replays it one
/// candidate per call.
pub type Generator = Box<dyn FnMut(&str, usize) -> String>;

/// Shared flag a generator sets to report that it fully handled a trigger,
/// suppressing the filename-completion fallback even when it produced no
/// candidates.
///
/// Obtain a handle with [`Completer::handled_override`] and move a clone into
/// the generator closure. Setting it is only meaningful from inside a
/// generator call: the engine clears the flag when a completion session
/// starts, so a set made at any other time is absorbed without effect.
#[derive(Debug, Clone, Default)]
pub struct CompletionOverride(Arc<AtomicBool>);

impl CompletionOverride {
    pub fn set(&self, handled: bool) {
        self.0.store(handled, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives the pull-based completion protocol for the editor.
///
/// Owns the registered generator and the word-break configuration; one
/// completion session runs per trigger and its candidate list stays
/// available through [`Completer::last_candidates`] for listing or cycling.
pub struct Completer {
    generator: Option<Generator>,
    word_break_chars: String,
    handled: CompletionOverride,
    last_candidates: Vec<Completion>,
}

impl Completer {
    pub fn new() -> Self {
        Self {
            generator: None,
            word_break_chars: DEFAULT_WORD_BREAK_CHARS.to_string(),
            handled: CompletionOverride::default(),
            last_candidates: Vec::new(),
        }
    }

    /// Register the candidate generator for subsequent completion triggers.
    pub fn set_generator<F>(&mut self, generator: F)
    where
        F: FnMut(&str, usize) -> String + 'static,
    {
        self.generator = Some(Box::new(generator));
    }

    /// Drop the registered generator; triggers fall through to filename
    /// completion.
    pub fn clear_generator(&mut self) {
        self.generator = None;
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Handle for the "completion handled" flag, to be captured by the
    /// generator closure.
    pub fn handled_override(&self) -> CompletionOverride {
        self.handled.clone()
    }

    pub fn set_word_break_chars(&mut self, chars: impl Into<String>) {
        self.word_break_chars = chars.into();
    }

    pub fn word_break_chars(&self) -> &str {
        &self.word_break_chars
    }

    /// Run one completion session for `word`.
    ///
    /// Pulls candidates from the generator (call index 0, 1, 2, … until the
    /// empty-string sentinel) in yielded order, without deduplication. When
    /// no generator is registered, or when it yields nothing and did not set
    /// the handled flag, filename completion provides the candidates.
    pub fn complete_word(&mut self, word: &str) -> Vec<Completion> {
        self.handled.set(false);
        let candidates = match self.generator.as_mut() {
            Some(generator) => {
                let mut state = 0;
                let collected: Vec<Completion> = std::iter::from_fn(|| {
                    let candidate = generator(word, state);
                    state += 1;
                    (!candidate.is_empty()).then(|| Completion::plain(candidate))
                })
                .collect();
                if collected.is_empty() && !self.handled.get() {
                    PathCompleter::complete_path(word)
                } else {
                    collected
                }
            }
            None => PathCompleter::complete_path(word),
        };
        debug!(word, count = candidates.len(), "completion session");
        self.last_candidates = candidates.clone();
        candidates
    }

    /// Candidates collected by the most recent session.
    pub fn last_candidates(&self) -> &[Completion] {
        &self.last_candidates
    }
}

impl Default for Completer {
    fn default() -> Self {
        Self::new()
    }
}

/// What to insert at the cursor for a candidate set: the sole candidate
/// verbatim, or the longest common prefix of several when it extends the
/// partial word. `None` leaves the line unchanged.
pub fn insertion_for(word: &str, candidates: &[Completion]) -> Option<String> {
    match candidates {
        [] => None,
        [only] => Some(only.text.clone()),
        many => {
            let prefix = common_prefix(many);
            (prefix.len() > word.len()).then_some(prefix)
        }
    }
}

/// Longest common prefix of all candidate texts.
pub fn common_prefix(completions: &[Completion]) -> String {
    if completions.is_empty() {
        return String::new();
    }
    if completions.len() == 1 {
        return completions[0].text.clone();
    }

    let first = &completions[0].text;
    let mut prefix_len = first.chars().count();

    for comp in &completions[1..] {
        prefix_len = first
            .chars()
            .zip(comp.text.chars())
            .take(prefix_len)
            .take_while(|(a, b)| a == b)
            .count();
    }

    first.chars().take(prefix_len).collect()
}

/// Filesystem path completer, the fallback when the application's generator
/// declines a trigger.
pub struct PathCompleter;

impl PathCompleter {
    /// Complete a partial path. Candidate `text` keeps the typed directory
    /// part verbatim (including `~/`) so it can replace the partial word
    /// in-place; only the file-name component is matched against entries.
    pub fn complete_path(partial: &str) -> Vec<Completion> {
        let partial = if partial == "~" { "~/" } else { partial };
        let (typed_dir, prefix) = match partial.rfind('/') {
            Some(i) => partial.split_at(i + 1),
            None => ("", partial),
        };

        let scan_dir = if typed_dir.is_empty() {
            PathBuf::from(".")
        } else if let Some(rest) = typed_dir.strip_prefix("~/") {
            dirs::home_dir()
                .map(|h| h.join(rest))
                .unwrap_or_else(|| PathBuf::from(typed_dir))
        } else {
            PathBuf::from(typed_dir)
        };

        let mut candidates: Vec<Completion> = std::fs::read_dir(scan_dir)
            .ok()
            .into_iter()
            .flat_map(|entries| entries.filter_map(Result::ok))
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let display = if entry.path().is_dir() {
                    format!("{name}/")
                } else {
                    name.clone()
                };
                Completion {
                    text: format!("{typed_dir}{name}"),
                    display,
                }
            })
            .collect();
        candidates.sort_by(|a, b| a.text.cmp(&b.text));
        candidates
    }
}
