// AI
//! 📊 progress.rs — "Are we there yet?" — every bulk load, every time, forever.
//!
//! Two things live here:
//! - `ProgressMetrics`: the live view while lines are being read. A sliding-window rate,
//!   a comfy table, an indicatif bar. Hidden unless `runtime.progress` is on.
//! - `RunSummary`: the end-of-run numbers, the one-line stats log, and the summary table.
//!
//! ⚠️ Watching this progress bar will not make it go faster. Science says no. 🦆

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

const MIB: u64 = 1024 * 1024;

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS when you should probably call your mom.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// 📡 Speedometer reading. Lines and MiB per second over the last few seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rates {
    lines_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 Live reading progress: lines queued, bytes consumed, lines skipped.
///
/// # Ancient Proverb
/// "He who loads ten million docs without a progress bar, loads alone and in darkness."
pub struct ProgressMetrics {
    source_name: String,
    /// 📏 Bytes we expect to read. Zero means "no idea" (stdin, gzip).
    total_size: u64,
    total_bytes: u64,
    total_lines: u64,
    skipped_lines: u64,
    progress_bar: ProgressBar,
    rate_samples: VecDeque<(Instant, u64, u64)>,
    window: Duration,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("total_size", &self.total_size)
            .field("total_bytes", &self.total_bytes)
            .field("total_lines", &self.total_lines)
            .field("skipped_lines", &self.skipped_lines)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 A visible bar when `visible`, a silent accountant otherwise.
    pub fn new(source_name: impl Into<String>, total_size: u64, visible: bool) -> Self {
        let progress_bar = if visible {
            let the_bar = ProgressBar::new(total_size);
            if let Ok(style) = ProgressStyle::default_bar().template("{msg}\n| [{bar:40.cyan/blue}]") {
                the_bar.set_style(style.progress_chars("=>-"));
            }
            the_bar
        } else {
            ProgressBar::hidden()
        };

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            source_name: source_name.into(),
            total_size,
            total_bytes: 0,
            total_lines: 0,
            skipped_lines: 0,
            progress_bar,
            rate_samples,
            window: Duration::from_secs(5),
            start_time,
        }
    }

    /// 🔄 Absolute counters in, fresh table out.
    pub fn update(&mut self, bytes_read: u64, lines_queued: u64, lines_skipped: u64) {
        self.total_bytes = bytes_read;
        self.total_lines = lines_queued;
        self.skipped_lines = lines_skipped;

        let rates = self.calculate_rates(Instant::now());
        if !self.progress_bar.is_hidden() {
            self.render(rates);
        }
        self.progress_bar.set_position(self.total_bytes);
    }

    pub fn finish(&self) {
        self.progress_bar.finish();
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    /// 📈 Sliding window: compare now against the oldest sample still inside it.
    fn calculate_rates(&mut self, now: Instant) -> Rates {
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > self.window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples
            .push_back((now, self.total_bytes, self.total_lines));

        if let Some(&(oldest_time, oldest_bytes, oldest_lines)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.total_bytes.saturating_sub(oldest_bytes);
                let lines_delta = self.total_lines.saturating_sub(oldest_lines);
                return Rates {
                    lines_per_sec: lines_delta as f64 / elapsed,
                    mib_per_sec: (bytes_delta as f64 / elapsed) / MIB as f64,
                };
            }
        }
        Rates {
            lines_per_sec: 0.0,
            mib_per_sec: 0.0,
        }
    }

    fn percent_done(&self) -> Option<f64> {
        (self.total_size > 0)
            .then(|| (self.total_bytes as f64 / self.total_size as f64 * 100.0).min(100.0))
    }

    /// 🎨 Three rows, two columns, no borders.
    fn render(&self, rates: Rates) {
        let elapsed = self.start_time.elapsed();
        let (percent, remaining) = match self.percent_done() {
            Some(percent) if percent > 0.0 => {
                // 🔮 linear extrapolation: assumes the future looks like the past
                let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
                let remaining_secs = (total_estimated - elapsed.as_secs_f64()).max(0.0);
                (
                    format!("{percent:.2}%"),
                    format_duration(Duration::from_secs_f64(remaining_secs)),
                )
            }
            _ => ("--".to_string(), "--:--".to_string()),
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Docs/s", format_number(rates.lines_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Docs", format_number(self.total_lines)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} skipped / {percent}", format_number(self.skipped_lines)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{remaining} remaining")).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.source_name, table));
    }
}

/// 🏁 What happened, in numbers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// 📥 Lines handed to the workers.
    pub docs_queued: u64,
    /// 🩹 Lines dropped by skip-broken.
    pub lines_skipped: u64,
    /// ✅ Documents in batches the cluster accepted.
    pub docs_indexed: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub workers: usize,
    pub elapsed: Duration,
    /// 🛑 The run was cut short by the shutdown button.
    pub cancelled: bool,
}

impl RunSummary {
    /// ⏱️ Elapsed seconds, floored at 0.1 so tiny runs don't report infinite speed.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64().max(0.1)
    }

    pub fn docs_per_sec(&self) -> f64 {
        self.docs_queued as f64 / self.elapsed_secs()
    }

    /// 📜 `N docs in X.XXs at Y.YYY docs/s with W workers`
    pub fn stats_line(&self) -> String {
        format!(
            "{} docs in {:.2}s at {:.3} docs/s with {} workers",
            self.docs_queued,
            self.elapsed_secs(),
            self.docs_per_sec(),
            self.workers
        )
    }

    /// 🍽️ The end-of-run table the CLI prints.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["📊 metric", "value"]);
        let rows: [(&str, String); 8] = [
            ("docs queued", format_number(self.docs_queued)),
            ("docs indexed", format_number(self.docs_indexed)),
            ("lines skipped", format_number(self.lines_skipped)),
            ("batches sent", format_number(self.batches_sent)),
            ("batches failed", format_number(self.batches_failed)),
            ("workers", self.workers.to_string()),
            ("elapsed", format!("{:.2}s", self.elapsed_secs())),
            ("throughput", format!("{:.3} docs/s", self.docs_per_sec())),
        ];
        for (metric, value) in rows {
            table.add_row(vec![
                Cell::new(metric),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(10_000_000), "10,000,000");
    }

    #[test]
    fn the_one_where_long_runs_grow_an_hours_column() {
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
    }

    #[test]
    fn the_one_where_the_stats_line_matches_the_classic_format() {
        let the_summary = RunSummary {
            docs_queued: 1000,
            elapsed: Duration::from_secs(2),
            workers: 4,
            ..RunSummary::default()
        };
        assert_eq!(
            the_summary.stats_line(),
            "1000 docs in 2.00s at 500.000 docs/s with 4 workers"
        );
    }

    #[test]
    fn the_one_where_instant_runs_are_floored_at_a_tenth_of_a_second() {
        let the_summary = RunSummary {
            docs_queued: 5,
            elapsed: Duration::from_millis(3),
            workers: 1,
            ..RunSummary::default()
        };
        assert_eq!(the_summary.elapsed_secs(), 0.1);
        assert!(the_summary.stats_line().starts_with("5 docs in 0.10s at 50.000 docs/s"));
        assert!(the_summary.to_table().to_string().contains("docs queued"));
    }

    #[test]
    fn the_one_where_the_window_forgets_old_samples() {
        let mut the_metrics = ProgressMetrics::new("test", 0, false);
        let the_future = the_metrics.start_time + Duration::from_secs(10);
        the_metrics.total_lines = 100;
        let the_rates = the_metrics.calculate_rates(the_future);
        // 🧹 the t=0 seed fell out of the window, only "now" is left
        assert_eq!(the_metrics.rate_samples.len(), 1);
        assert_eq!(the_rates.lines_per_sec, 0.0);
        assert_eq!(the_metrics.percent_done(), None);
    }

    #[test]
    fn the_one_where_hidden_bars_still_count() {
        let mut the_metrics = ProgressMetrics::new("test", 200, false);
        the_metrics.update(100, 10, 1);
        assert_eq!(the_metrics.total_lines(), 10);
        assert_eq!(the_metrics.percent_done(), Some(50.0));
        the_metrics.finish();
    }
}
