use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::warn;

/// Errors surfaced by history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A logical index resolved outside `[0, len)` after normalization.
    #[error("history index {index} out of range ({len} entries)")]
    OutOfRange { index: isize, len: usize },

    /// File read/write failure. A missing file on `load` is not an error;
    /// it is reported as `Ok(false)`.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A single accepted line.
///
/// The timestamp is captured when the line is added and is `None` for
/// entries restored from a file (the line-per-entry format cannot carry it).
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    text: String,
    timestamp: Option<SystemTime>,
}

impl HistoryEntry {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }
}

/// Ordered log of accepted input lines.
///
/// Entries are addressed by logical index: `0` is the oldest retained entry
/// and negative indices count back from the end (`-1` = most recent). When a
/// retention cap is set ([`History::stifle`]), appending past the cap evicts
/// the oldest entry and the base offset grows by one, so `base() + logical
/// index` stays the entry's sequence number since the last [`History::clear`].
/// All addressing goes through [`History::get`]; nothing outside this module
/// sees raw storage positions.
pub struct History {
    entries: Vec<HistoryEntry>,
    stifle: Option<usize>,
    base: usize,
    file_path: Option<PathBuf>,
}

impl History {
    /// Empty, unstifled history.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            stifle: None,
            base: 0,
            file_path: None,
        }
    }

    /// History with a retention cap and a backing file.
    ///
    /// Existing file content is loaded immediately; the history is saved
    /// back to the same file on drop (best effort). Explicit [`History::save`]
    /// remains available for callers that want deterministic persistence.
    pub fn with_file(max_size: usize, file_path: PathBuf) -> Self {
        let mut history = Self::new();
        history.stifle = Some(max_size);
        history.file_path = Some(file_path.clone());
        match history.load(Some(&file_path)) {
            Ok(_) => {}
            Err(e) => warn!(path = %file_path.display(), error = %e, "failed to load history"),
        }
        history
    }

    /// Append an accepted line.
    ///
    /// No-op when the line is empty or all-whitespace, when it begins with
    /// whitespace (callers prefix a space to keep a line out of history), or
    /// when it repeats the most recent entry. Dedup is adjacency-only: the
    /// same text may appear again later in the log.
    pub fn add(&mut self, line: &str) {
        if line.trim().is_empty() || line.starts_with(char::is_whitespace) {
            return;
        }
        if self.entries.last().is_some_and(|last| last.text == line) {
            return;
        }
        self.push(HistoryEntry {
            text: line.to_string(),
            timestamp: Some(SystemTime::now()),
        });
    }

    /// Entry text at a logical index; negative counts from the end.
    pub fn get(&self, index: isize) -> Result<&str, HistoryError> {
        self.entry(index).map(HistoryEntry::text)
    }

    /// Full entry at a logical index; negative counts from the end.
    pub fn entry(&self, index: isize) -> Result<&HistoryEntry, HistoryError> {
        let len = self.entries.len();
        let normalized = if index < 0 {
            index + len as isize
        } else {
            index
        };
        if normalized < 0 || normalized >= len as isize {
            return Err(HistoryError::OutOfRange { index, len });
        }
        Ok(&self.entries[normalized as usize])
    }

    /// Iterate entry texts oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.entries.iter().map(HistoryEntry::text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence number of the oldest retained entry. Starts at 0 and grows
    /// by one for every entry evicted under the retention cap.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Drop all entries and reset sequence numbering.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.base = 0;
    }

    /// Cap retention at the last `max` entries, evicting any surplus now.
    pub fn stifle(&mut self, max: usize) {
        self.stifle = Some(max);
        self.evict_to_cap();
    }

    /// Remove the retention cap. Returns the previous cap when the history
    /// was stifled, `None` when it was not.
    pub fn unstifle(&mut self) -> Option<usize> {
        self.stifle.take()
    }

    pub fn is_stifled(&self) -> bool {
        self.stifle.is_some()
    }

    /// Append the entries of a newline-delimited file, in file order.
    ///
    /// Returns whether the file existed; a missing file means "nothing to
    /// load" and is not an error. Entries are restored verbatim — the dedup
    /// and leading-space policies of [`History::add`] are deliberately not
    /// reapplied — except that blank lines are skipped, since they cannot
    /// exist as entries. The retention cap still applies.
    pub fn load(&mut self, path: Option<&Path>) -> Result<bool, HistoryError> {
        let path = self.resolve_path(path);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            self.push(HistoryEntry {
                text: line,
                timestamp: None,
            });
        }
        Ok(true)
    }

    /// Overwrite `path` (or the default) with the full log, one entry per
    /// line.
    pub fn save(&self, path: Option<&Path>) -> Result<(), HistoryError> {
        let path = self.resolve_path(path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            writeln!(writer, "{}", entry.text)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Append the last `n` entries to `path` (or the default), creating the
    /// file if absent. No-op when the log is empty, whatever `n` is.
    ///
    /// Append-only writes let several processes share one history file
    /// without rewriting it; see [`History::truncate_file`] for trimming.
    pub fn append_to_file(&self, n: usize, path: Option<&Path>) -> Result<(), HistoryError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let path = self.resolve_path(path);
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let mut writer = BufWriter::new(file);
        let skip = self.entries.len().saturating_sub(n);
        for entry in &self.entries[skip..] {
            writeln!(writer, "{}", entry.text)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Rewrite `path` (or the default) keeping only its last `max_lines`
    /// lines. Operates on the file alone, not on any in-memory log; a
    /// missing file is left as-is.
    pub fn truncate_file(path: Option<&Path>, max_lines: usize) -> Result<(), HistoryError> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<Result<_, io::Error>>()?;
        if lines.len() <= max_lines {
            return Ok(());
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        for line in &lines[lines.len() - max_lines..] {
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Default backing file: `~/.lineread_history`, or `.lineread_history`
    /// in the working directory when no home directory is resolvable.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".lineread_history"))
            .unwrap_or_else(|| PathBuf::from(".lineread_history"))
    }

    fn resolve_path(&self, path: Option<&Path>) -> PathBuf {
        path.map(Path::to_path_buf)
            .or_else(|| self.file_path.clone())
            .unwrap_or_else(Self::default_path)
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        self.evict_to_cap();
    }

    fn evict_to_cap(&mut self) {
        if let Some(cap) = self.stifle {
            while self.entries.len() > cap {
                self.entries.remove(0);
                self.base += 1;
            }
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for History {
    fn drop(&mut self) {
        if self.file_path.is_none() {
            return;
        }
        if let Err(e) = self.save(None) {
            warn!(error = %e, "failed to save history");
        }
    }
}
