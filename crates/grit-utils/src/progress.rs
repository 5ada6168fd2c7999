use std::io::{self, Write};

/// Callback seam for long-running operations.
///
/// Producers report work in phases: `begin_task` opens a phase with an
/// optional total, `update` advances the counter, `end_task` closes the
/// phase. Implementations decide what (if anything) to show the user.
pub trait Progress {
    /// Start a new phase. `total` is `None` when the amount of work is
    /// unknown up front.
    fn begin_task(&mut self, title: &str, total: Option<u64>);

    /// Report the current count within the active phase.
    fn update(&mut self, count: u64);

    /// Finish the active phase.
    fn end_task(&mut self);
}

/// Progress sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin_task(&mut self, _title: &str, _total: Option<u64>) {}
    fn update(&mut self, _count: u64) {}
    fn end_task(&mut self) {}
}

/// Progress display on stderr, a trimmed version of C git's progress.c:
///
/// - `Receiving objects: 42` (no total)
/// - `Receiving objects:  50% (42/84)` (with total)
///
/// Redraws only when the integer percentage changes to avoid flooding
/// the terminal on fast updates.
pub struct TextProgress {
    title: String,
    total: Option<u64>,
    last_percent: Option<u32>,
    active: bool,
}

impl TextProgress {
    pub fn new() -> Self {
        Self {
            title: String::new(),
            total: None,
            last_percent: None,
            active: false,
        }
    }

    fn draw(&mut self, count: u64, done: bool) {
        let mut err = io::stderr();
        let line = match self.total {
            Some(total) if total > 0 => {
                let percent = ((count as f64 / total as f64) * 100.0) as u32;
                if !done && self.last_percent == Some(percent) {
                    return;
                }
                self.last_percent = Some(percent);
                format!("{}: {:3}% ({}/{})", self.title, percent, count, total)
            }
            _ => format!("{}: {}", self.title, count),
        };
        let terminator = if done { ", done.\n" } else { "\r" };
        let _ = write!(err, "{}{}", line, terminator);
        let _ = err.flush();
    }
}

impl Default for TextProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for TextProgress {
    fn begin_task(&mut self, title: &str, total: Option<u64>) {
        self.title = title.to_string();
        self.total = total;
        self.last_percent = None;
        self.active = true;
    }

    fn update(&mut self, count: u64) {
        if self.active {
            self.draw(count, false);
        }
    }

    fn end_task(&mut self) {
        if self.active {
            let count = self.total.unwrap_or(0);
            self.draw(count, true);
            self.active = false;
        }
    }
}

/// Test double recording every call it receives.
#[derive(Debug, Default)]
pub struct CountingProgress {
    pub tasks: Vec<(String, Option<u64>)>,
    pub last_count: u64,
    pub ended: usize,
}

impl Progress for CountingProgress {
    fn begin_task(&mut self, title: &str, total: Option<u64>) {
        self.tasks.push((title.to_string(), total));
        self.last_count = 0;
    }

    fn update(&mut self, count: u64) {
        self.last_count = count;
    }

    fn end_task(&mut self) {
        self.ended += 1;
    }
}
