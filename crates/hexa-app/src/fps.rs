// SPDX-License-Identifier: CEPL-1.0
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const REPORT_EVERY: Duration = Duration::from_secs(1);
/// Gaps this long (window drags, minimize) are not frame times.
const MAX_SAMPLE: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FpsReport {
    pub fps: f32,
    pub frame_ms: f32,
}

/// Rolling average over the last `window` frame times.
pub struct FpsCounter {
    samples: VecDeque<f32>,
    window: usize,
    last_frame: Instant,
    last_report: Instant,
}

impl FpsCounter {
    pub fn new(now: Instant, window: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(window),
            window: window.max(1),
            last_frame: now,
            last_report: now,
        }
    }

    /// Records a presented frame. Yields a report at most once per second.
    pub fn tick(&mut self, now: Instant) -> Option<FpsReport> {
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        if dt > 0.0 && dt < MAX_SAMPLE {
            self.samples.push_back(dt);
            while self.samples.len() > self.window {
                self.samples.pop_front();
            }
        }

        if now.duration_since(self.last_report) < REPORT_EVERY {
            return None;
        }
        self.last_report = now;
        let avg = self.average()?;
        Some(FpsReport {
            fps: 1.0 / avg,
            frame_ms: self.samples.back().copied().unwrap_or(avg) * 1000.0,
        })
    }

    fn average(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }
}
