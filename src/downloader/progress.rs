// Line-oriented parsing of yt-dlp output into progress values.

use regex::Regex;

/// Parse a yt-dlp progress line like
/// `[download]  45.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32`
/// and return the percentage, or `None` for any other line.
pub fn parse_progress(line: &str) -> Option<f64> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex =
            Regex::new(r"\[download\]\s+(\d+\.?\d*)%").unwrap();
    }

    let caps = PROGRESS_RE.captures(line)?;
    caps.get(1)?.as_str().parse::<f64>().ok()
}

/// Clamps the per-job percentage to a non-decreasing sequence. yt-dlp resets
/// its counter for every playlist entry and post-processing fragment; the
/// job-level progress must never run backwards.
#[derive(Debug, Default)]
pub struct ProgressGate {
    last: f64,
}

impl ProgressGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass the value through if it keeps the sequence non-decreasing.
    pub fn accept(&mut self, percent: f64) -> Option<f64> {
        if percent < self.last {
            return None;
        }
        self.last = percent;
        Some(percent)
    }

    pub fn last(&self) -> f64 {
        self.last
    }
}
