//! Running averages and per-batch progress display

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;

/// Sample-weighted running average of a scalar
#[derive(Debug, Clone)]
pub struct AverageMeter {
    pub name: String,
    /// Decimal places when displayed
    pub precision: usize,
    /// Use scientific notation when displayed
    pub scientific: bool,
    pub val: f64,
    pub sum: f64,
    pub count: usize,
    pub avg: f64,
}

impl AverageMeter {
    pub fn new(name: &str, precision: usize) -> Self {
        Self {
            name: name.to_string(),
            precision,
            scientific: false,
            val: 0.0,
            sum: 0.0,
            count: 0,
            avg: 0.0,
        }
    }

    pub fn scientific(name: &str, precision: usize) -> Self {
        Self {
            scientific: true,
            ..Self::new(name, precision)
        }
    }

    /// Records `val` as the mean over `n` samples.
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }
}

impl fmt::Display for AverageMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.precision;
        if self.scientific {
            write!(f, "{} {:.p$e} ({:.p$e})", self.name, self.val, self.avg)
        } else {
            write!(f, "{} {:.p$} ({:.p$})", self.name, self.val, self.avg)
        }
    }
}

/// Renders `prefix[ i/N]` followed by every meter on a progress bar.
pub struct ProgressMeter {
    num_batches: usize,
    prefix: String,
    print_freq: usize,
    bar: ProgressBar,
}

impl ProgressMeter {
    pub fn new(num_batches: usize, prefix: impl Into<String>, print_freq: usize) -> Self {
        let bar = ProgressBar::new(num_batches as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("{bar:30.cyan/blue} {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self::with_bar(num_batches, prefix, print_freq, bar)
    }

    pub fn hidden(num_batches: usize, prefix: impl Into<String>, print_freq: usize) -> Self {
        Self::with_bar(num_batches, prefix, print_freq, ProgressBar::hidden())
    }

    fn with_bar(num_batches: usize, prefix: impl Into<String>, print_freq: usize, bar: ProgressBar) -> Self {
        Self {
            num_batches,
            prefix: prefix.into(),
            print_freq: print_freq.max(1),
            bar,
        }
    }

    pub fn line(&self, batch: usize, meters: &[&AverageMeter]) -> String {
        let width = self.num_batches.to_string().len();
        let mut entries = vec![format!(
            "{}[{:>width$}/{}]",
            self.prefix, batch, self.num_batches
        )];
        entries.extend(meters.iter().map(|m| m.to_string()));
        entries.join("\t")
    }

    pub fn display(&self, batch: usize, meters: &[&AverageMeter]) {
        let line = self.line(batch, meters);
        self.bar.set_position(batch as u64 + 1);
        self.bar.set_message(line.clone());
        if batch % self.print_freq == 0 || batch + 1 == self.num_batches {
            tracing::info!("{}", line);
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_average_is_independent_of_batching() {
        // 10 samples in batches 4 + 4 + 2
        let mut a = AverageMeter::new("Acc@1", 2);
        a.update(50.0, 4);
        a.update(75.0, 4);
        a.update(100.0, 2);

        // same samples, batches 5 + 5 with matching per-batch means
        let mut b = AverageMeter::new("Acc@1", 2);
        b.update((50.0 * 4.0 + 75.0 * 1.0) / 5.0, 5);
        b.update((75.0 * 3.0 + 100.0 * 2.0) / 5.0, 5);

        assert!((a.avg - 70.0).abs() < 1e-12);
        assert!((a.avg - b.avg).abs() < 1e-12);
        assert_eq!(a.count, 10);
        assert_eq!(a.val, 100.0);
    }

    #[test]
    fn test_display_formats() {
        let mut m = AverageMeter::new("Acc@1", 2);
        m.update(12.346, 1);
        assert_eq!(m.to_string(), "Acc@1 12.35 (12.35)");

        let mut l = AverageMeter::scientific("Loss", 2);
        l.update(1234.0, 1);
        assert_eq!(l.to_string(), "Loss 1.23e3 (1.23e3)");
    }

    #[test]
    fn test_progress_line() {
        let p = ProgressMeter::hidden(120, "Epoch: [3]", 10);
        let mut m = AverageMeter::new("Time", 1);
        m.update(0.5, 1);
        assert_eq!(p.line(7, &[&m]), "Epoch: [3][  7/120]\tTime 0.5 (0.5)");
    }
}
