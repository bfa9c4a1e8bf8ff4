//! Terse textual progress: single-character markers plus run banners.

use std::cell::RefCell;
use std::io::Write;

pub const GREEN_TICK: &str = "\x1b[1;32m✓\x1b[0m";
pub const YELLOW_TICK: &str = "\x1b[1;33m✓\x1b[0m";
pub const RED_CROSS: &str = "\x1b[1;31m✗\x1b[0m";

/// Progress events, each rendered as one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// An operation is about to be sampled and applied.
    Step,
    /// The invariant pool is being checked after an effective step.
    InvariantPass,
    /// The primary application received an action.
    PrimaryDispatch,
    /// A forked application received an action.
    ForkDispatch,
}

impl Marker {
    pub fn symbol(self) -> char {
        match self {
            Marker::Step => '|',
            Marker::InvariantPass => '=',
            Marker::PrimaryDispatch => ':',
            Marker::ForkDispatch => '.',
        }
    }
}

/// Destination for progress output. Shared by the driver and every adapter
/// of a run, so implementations use interior mutability.
pub trait ProgressSink {
    fn mark(&self, marker: Marker);

    /// Free-form text: banners, failure reports.
    fn write(&self, text: &str);
}

/// Writes to stdout, flushing after every write so markers show up live.
#[derive(Debug, Default)]
pub struct StdoutProgress {
    quiet: bool,
}

impl StdoutProgress {
    pub fn new() -> Self {
        Self { quiet: false }
    }

    /// Suppress the single-character markers but keep banners.
    pub fn quiet() -> Self {
        Self { quiet: true }
    }

    fn emit(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        // Progress output is best-effort; a closed stdout must not end the run.
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl ProgressSink for StdoutProgress {
    fn mark(&self, marker: Marker) {
        if !self.quiet {
            let mut buf = [0u8; 4];
            self.emit(marker.symbol().encode_utf8(&mut buf));
        }
    }

    fn write(&self, text: &str) {
        self.emit(text);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn mark(&self, _marker: Marker) {}

    fn write(&self, _text: &str) {}
}

/// Keeps the full transcript in memory, plus the marker sequence on its own.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    transcript: RefCell<String>,
    markers: RefCell<Vec<Marker>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> String {
        self.transcript.borrow().clone()
    }

    /// Number of times `marker` was emitted.
    pub fn count(&self, marker: Marker) -> usize {
        self.markers.borrow().iter().filter(|m| **m == marker).count()
    }

    /// Markers in emission order.
    pub fn markers(&self) -> Vec<Marker> {
        self.markers.borrow().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn mark(&self, marker: Marker) {
        self.markers.borrow_mut().push(marker);
        self.transcript.borrow_mut().push(marker.symbol());
    }

    fn write(&self, text: &str) {
        self.transcript.borrow_mut().push_str(text);
    }
}

/// UTC wall-clock stamp for banners, e.g. `[14:03:27]`.
pub fn timestamp() -> String {
    chrono::Utc::now().format("[%H:%M:%S]").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_symbols() {
        let symbols: String = [
            Marker::Step,
            Marker::InvariantPass,
            Marker::PrimaryDispatch,
            Marker::ForkDispatch,
        ]
        .iter()
        .map(|m| m.symbol())
        .collect();
        assert_eq!(symbols, "|=:.");
    }

    #[test]
    fn test_recording_separates_markers_from_text() {
        let progress = RecordingProgress::new();
        progress.write("banner with | and : inside\n");
        progress.mark(Marker::Step);
        progress.mark(Marker::PrimaryDispatch);
        progress.write("more text.");
        progress.mark(Marker::InvariantPass);

        assert_eq!(
            progress.markers(),
            vec![Marker::Step, Marker::PrimaryDispatch, Marker::InvariantPass]
        );
        assert_eq!(progress.count(Marker::Step), 1);
        assert!(progress.transcript().contains("banner with"));
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), 10);
        assert!(ts.starts_with('[') && ts.ends_with(']'));
    }
}
