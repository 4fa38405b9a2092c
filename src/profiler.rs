use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Default number of times a profiled region is executed per measurement.
pub const DEFAULT_REPETITIONS: u32 = 100;

/// Source of timestamps for the profiler. `None` means the primitive is unavailable.
pub trait Clock: fmt::Debug {
    fn now(&self) -> Option<Duration>;
}

/// Wall clock measured from the moment the clock was created.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Option<Duration> {
        Some(self.origin.elapsed())
    }
}

/// Running average of one labelled region.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Section {
    total: Duration,
    samples: u32,
}

impl Section {
    pub fn average(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total / self.samples
        }
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}

/// GPU section profiler.
///
/// The caller runs the timed body `repetitions()` times between `start` and
/// `stop`; the profiler divides the elapsed time by that count. Both calls take
/// a `drain` closure that blocks until outstanding GPU work has completed, so
/// the measured interval covers the GPU execution and nothing queued before it.
/// When disabled, `start` and `stop` do nothing (the drain is not invoked).
#[derive(Debug)]
pub struct Profiler {
    clock: Box<dyn Clock>,
    enabled: bool,
    repetitions: u32,
    started: Option<Duration>,
    sections: BTreeMap<String, Section>,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::default())
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            enabled: false,
            repetitions: DEFAULT_REPETITIONS,
            started: None,
            sections: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        tracing::debug!(enabled, "profiler");
        self.enabled = enabled;
        if !enabled {
            self.started = None;
        }
    }

    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Sets how many times the caller repeats the timed body. Clamped to at least 1.
    pub fn set_repetitions(&mut self, repetitions: u32) {
        self.repetitions = repetitions.max(1);
    }

    pub fn start(&mut self, drain: impl FnOnce()) {
        if !self.enabled {
            return;
        }
        drain();
        self.started = self.clock.now();
        tracing::trace!("profiler start");
    }

    /// Ends the measured region and folds the per-repetition time into `label`'s average.
    /// Returns the sample just recorded.
    pub fn stop(&mut self, label: &str, drain: impl FnOnce()) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        drain();
        let elapsed = match (self.started.take(), self.clock.now()) {
            (Some(begin), Some(end)) => end.saturating_sub(begin),
            _ => Duration::ZERO,
        };
        let sample = elapsed / self.repetitions;

        let section = self.sections.entry(label.to_string()).or_default();
        section.total += sample;
        section.samples += 1;
        tracing::debug!(section = label, sample_us = sample.as_micros() as u64, "profiler stop");
        Some(sample)
    }

    /// Current average for `label`, if anything has been recorded since the last reset.
    pub fn section(&self, label: &str) -> Option<Duration> {
        self.sections.get(label).map(Section::average)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(name, section)| (name.as_str(), section))
    }

    pub fn reset(&mut self) {
        tracing::trace!("profiler reset");
        self.started = None;
        self.sections.clear();
    }
}

impl fmt::Display for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, section) in &self.sections {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}: {:.2} ms", name, section.average().as_secs_f64() * 1000.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Clock advanced by hand from the test.
    #[derive(Debug, Clone, Default)]
    pub struct ManualClock(pub Rc<Cell<Duration>>);

    impl ManualClock {
        pub fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Option<Duration> {
            Some(self.0.get())
        }
    }

    #[derive(Debug)]
    struct MissingClock;

    impl Clock for MissingClock {
        fn now(&self) -> Option<Duration> {
            None
        }
    }

    #[test]
    fn test_average_is_total_divided_by_repetitions() {
        for repetitions in [1u32, 2, 7, 100, 1000] {
            let clock = ManualClock::default();
            let mut profiler = Profiler::with_clock(clock.clone());
            profiler.set_enabled(true);
            profiler.set_repetitions(repetitions);

            profiler.start(|| {});
            for _ in 0..repetitions {
                clock.advance(Duration::from_micros(250));
            }
            let sample = profiler.stop("effect", || {});

            assert_eq!(sample, Some(Duration::from_micros(250)));
            assert_eq!(profiler.section("effect"), Some(Duration::from_micros(250)));
        }
    }

    #[test]
    fn test_running_average_across_stops() {
        let clock = ManualClock::default();
        let mut profiler = Profiler::with_clock(clock.clone());
        profiler.set_enabled(true);
        profiler.set_repetitions(2);

        profiler.start(|| {});
        clock.advance(Duration::from_millis(2));
        profiler.stop("effect", || {});

        profiler.start(|| {});
        clock.advance(Duration::from_millis(6));
        profiler.stop("effect", || {});

        // (1 ms + 3 ms) / 2
        assert_eq!(profiler.section("effect"), Some(Duration::from_millis(2)));
    }

    #[test]
    fn test_drain_counts_inside_measurement() {
        let clock = ManualClock::default();
        let mut profiler = Profiler::with_clock(clock.clone());
        profiler.set_enabled(true);
        profiler.set_repetitions(1);

        // Work queued before start is drained before the clock is read.
        profiler.start(|| clock.advance(Duration::from_millis(50)));
        profiler.stop("effect", || clock.advance(Duration::from_millis(4)));

        assert_eq!(profiler.section("effect"), Some(Duration::from_millis(4)));
    }

    #[test]
    fn test_disabled_profiler_is_inert() {
        let mut profiler = Profiler::with_clock(ManualClock::default());
        let mut drained = false;
        profiler.start(|| drained = true);
        assert!(profiler.stop("effect", || drained = true).is_none());
        assert!(!drained);
        assert!(profiler.section("effect").is_none());
    }

    #[test]
    fn test_unavailable_clock_reports_zero() {
        let mut profiler = Profiler::with_clock(MissingClock);
        profiler.set_enabled(true);
        profiler.start(|| {});
        assert_eq!(profiler.stop("effect", || {}), Some(Duration::ZERO));
    }

    #[test]
    fn test_reset_and_repetition_floor() {
        let mut profiler = Profiler::with_clock(ManualClock::default());
        profiler.set_repetitions(0);
        assert_eq!(profiler.repetitions(), 1);

        profiler.set_enabled(true);
        profiler.start(|| {});
        profiler.stop("effect", || {});
        assert!(profiler.section("effect").is_some());

        profiler.reset();
        assert!(profiler.section("effect").is_none());
        assert_eq!(profiler.to_string(), "");
    }
}
