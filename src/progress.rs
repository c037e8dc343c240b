use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::ffmpeg::duration_to_seconds;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=\s*(?P<time>\d{2}:\d{2}:\d{2}\.\d+)").unwrap());
static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"size=\s*(?P<size>\d+)\s*(?P<unit>[kKmMgG]i?B)").unwrap());
static SPEED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"speed=\s*(?P<speed>[\d.]+)x").unwrap());

/// One FFmpeg status line, e.g. `size=  512kB time=00:00:32.00 bitrate= 131.1kbits/s speed=64x`
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub time_seconds: f64,
    pub size_bytes: Option<u64>,
    pub speed: Option<f64>,
}

impl ProgressSample {
    pub fn parse(line: &str) -> Option<Self> {
        let time = TIME_RE.captures(line)?;
        let time_seconds = duration_to_seconds(&time["time"])?;

        let size_bytes = SIZE_RE.captures(line).and_then(|cap| {
            let value: u64 = cap["size"].parse().ok()?;
            let multiplier = match cap["unit"].chars().next()?.to_ascii_lowercase() {
                'k' => 1024,
                'm' => 1024 * 1024,
                'g' => 1024 * 1024 * 1024,
                _ => 1,
            };
            Some(value * multiplier)
        });

        let speed = SPEED_RE
            .captures(line)
            .and_then(|cap| cap["speed"].parse().ok());

        Some(Self {
            time_seconds,
            size_bytes,
            speed,
        })
    }
}

/// Progress tracking for a running merge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMetrics {
    /// Time when the merge started
    #[serde(skip)]
    pub start_time: Option<Instant>,
    /// Total elapsed time since start
    pub elapsed_time: Duration,
    /// Combined duration of all inputs (in seconds), when known
    pub total_duration: Option<f64>,
    /// Media time written so far (in seconds)
    pub processed_seconds: f64,
    /// Output bytes written so far
    pub output_size: u64,
    /// Speed FFmpeg last reported, as a multiple of real time
    pub reported_speed: Option<f64>,
}

impl ProgressMetrics {
    pub fn new(total_duration: Option<f64>) -> Self {
        Self {
            start_time: Some(Instant::now()),
            elapsed_time: Duration::from_secs(0),
            total_duration: total_duration.filter(|d| *d > 0.0),
            processed_seconds: 0.0,
            output_size: 0,
            reported_speed: None,
        }
    }

    pub fn update_elapsed(&mut self) {
        if let Some(start) = self.start_time {
            self.elapsed_time = start.elapsed();
        }
    }

    /// Fold in a status line; returns true if it carried progress
    pub fn update_from_line(&mut self, line: &str) -> bool {
        match ProgressSample::parse(line) {
            Some(sample) => {
                self.processed_seconds = sample.time_seconds.max(0.0);
                if let Some(size) = sample.size_bytes {
                    self.output_size = size;
                }
                if sample.speed.is_some() {
                    self.reported_speed = sample.speed;
                }
                self.update_elapsed();
                true
            }
            None => false,
        }
    }

    /// Completion percentage (0.0 to 100.0), if the total is known
    pub fn percent(&self) -> Option<f64> {
        self.total_duration
            .map(|total| (self.processed_seconds / total * 100.0).clamp(0.0, 100.0))
    }

    /// Seconds of media processed per wall-clock second
    pub fn calculate_speed(&self) -> f64 {
        let elapsed_secs = self.elapsed_time.as_secs_f64();
        if elapsed_secs > 0.0 {
            self.processed_seconds / elapsed_secs
        } else {
            0.0
        }
    }

    /// Estimated wall-clock seconds remaining
    pub fn calculate_eta(&self) -> Option<f64> {
        let total = self.total_duration?;
        if self.processed_seconds <= 0.0 || self.processed_seconds >= total {
            return None;
        }

        let speed = self.calculate_speed();
        if speed <= 0.0 {
            return None;
        }

        Some((total - self.processed_seconds) / speed)
    }
}
