//! Single-line ANSI status display.

use super::{ProgressReporter, ProgressSnapshot};
use crate::core::StepOutcome;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::io::{self, Write};
use std::time::{Duration, Instant};

const GREEN: &str = "\x1b[0;32m";
const YELLOW: &str = "\x1b[1;33m";
const RED: &str = "\x1b[0;31m";
const GREY: &str = "\x1b[0;90m";
const END: &str = "\x1b[0m";

/// Writes one glyph per step and rewrites the line in place with `\r`.
///
/// Waiting steps show a yellow `.`, running steps blink green at random
/// intervals, failures show a red `✘`, successes a green `✔` and cancelled
/// steps a grey `-`.
pub struct TerminalProgress {
    out: Mutex<Box<dyn Write + Send>>,
    blink: Mutex<HashMap<String, (bool, Instant)>>,
}

impl std::fmt::Debug for TerminalProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalProgress").finish_non_exhaustive()
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new(Box::new(io::stdout()))
    }
}

impl TerminalProgress {
    /// Creates a reporter writing to `out`.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            blink: Mutex::new(HashMap::new()),
        }
    }

    fn blink_on(&self, name: &str) -> bool {
        let now = Instant::now();
        let mut blink = self.blink.lock();
        let state = blink.entry(name.to_string()).or_insert((false, now));
        if state.1 <= now {
            let delay = Duration::from_secs_f64(rand::thread_rng().gen::<f64>());
            *state = (!state.0, now + delay);
        }
        state.0
    }

    /// Formats the status line for a snapshot.
    #[must_use]
    pub fn render_line(&self, snapshot: &ProgressSnapshot) -> String {
        let mut line = String::from("\r");
        for entry in &snapshot.entries {
            let glyph = match entry.outcome {
                StepOutcome::Pending => format!(" {YELLOW}."),
                StepOutcome::Running => {
                    let mark = if self.blink_on(&entry.name) { " " } else { "." };
                    format!(" {GREEN}{mark}")
                }
                StepOutcome::Failed => format!(" {RED}\u{2718}"),
                StepOutcome::Succeeded => format!(" {GREEN}\u{2714}"),
                StepOutcome::Cancelled => format!(" {GREY}-"),
            };
            line.push_str(&glyph);
        }
        line.push_str("  ");
        line.push_str(END);
        line
    }

    fn write(&self, text: &str) {
        let mut out = self.out.lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl ProgressReporter for TerminalProgress {
    fn render(&self, snapshot: &ProgressSnapshot) {
        let line = self.render_line(snapshot);
        self.write(&line);
    }

    fn finish(&self, snapshot: &ProgressSnapshot) {
        let mut line = self.render_line(snapshot);
        line.push('\n');
        self.write(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressEntry;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn snapshot(outcomes: &[(&str, StepOutcome)]) -> ProgressSnapshot {
        ProgressSnapshot {
            entries: outcomes
                .iter()
                .map(|(name, outcome)| ProgressEntry {
                    name: (*name).to_string(),
                    outcome: *outcome,
                })
                .collect(),
        }
    }

    #[test]
    fn test_glyphs() {
        let progress = TerminalProgress::new(Box::new(io::sink()));
        let line = progress.render_line(&snapshot(&[
            ("a", StepOutcome::Pending),
            ("b", StepOutcome::Failed),
            ("c", StepOutcome::Succeeded),
            ("d", StepOutcome::Cancelled),
        ]));
        assert!(line.starts_with('\r'));
        assert!(line.contains(&format!("{YELLOW}.")));
        assert!(line.contains(&format!("{RED}\u{2718}")));
        assert!(line.contains(&format!("{GREEN}\u{2714}")));
        assert!(line.contains(&format!("{GREY}-")));
        assert!(line.ends_with(END));
    }

    #[test]
    fn test_finish_ends_line() {
        let buf = SharedBuf::default();
        let progress = TerminalProgress::new(Box::new(buf.clone()));
        let snap = snapshot(&[("a", StepOutcome::Succeeded)]);
        progress.render(&snap);
        progress.finish(&snap);
        let text = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert_eq!(text.matches('\r').count(), 2);
        assert!(text.ends_with('\n'));
    }
}
