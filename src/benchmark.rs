use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::image_loader::CatalogEntry;
use crate::pipeline::EFFECT_SECTION;
use crate::profiler::Profiler;

pub const DEFAULT_OUTPUT: &str = "Benchmark.txt";

/// Opens the benchmark sink. Each sweep starts from an empty file.
pub fn open_sink(path: &Path) -> io::Result<Box<dyn Write>> {
    let file = File::create(path)?;
    Ok(Box::new(BufWriter::new(file)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStatus {
    Idle,
    Running,
}

/// Walks the catalog once, writing one averaged effect sample per image.
#[derive(Default)]
pub struct BenchmarkSweep {
    images: Vec<CatalogEntry>,
    index: usize,
    sink: Option<Box<dyn Write>>,
}

impl std::fmt::Debug for BenchmarkSweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkSweep")
            .field("images", &self.images.len())
            .field("index", &self.index)
            .field("active", &self.is_active())
            .finish()
    }
}

impl BenchmarkSweep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    pub fn status(&self) -> SweepStatus {
        if self.is_active() {
            SweepStatus::Running
        } else {
            SweepStatus::Idle
        }
    }

    /// (current index, total images)
    pub fn progress(&self) -> (usize, usize) {
        (self.index, self.images.len())
    }

    /// Image the sweep is currently sampling.
    pub fn current(&self) -> Option<&CatalogEntry> {
        self.images.get(self.index)
    }

    /// Begins a sweep over `images`. Returns false if one is already running
    /// or there is nothing to sweep; the caller is expected to select the
    /// first image and enable profiling.
    pub fn start(&mut self, images: Vec<CatalogEntry>, sink: Box<dyn Write>) -> bool {
        if self.is_active() || images.is_empty() {
            return false;
        }
        tracing::info!(images = images.len(), "benchmark started");
        self.images = images;
        self.index = 0;
        self.sink = Some(sink);
        true
    }

    /// Records the last effect sample and advances to the next image through
    /// `advance`, which receives the next catalog entry. The profiler is reset after
    /// every sample. Finishes (and flushes) once the last image is written.
    pub fn tick<E, F>(&mut self, profiler: &mut Profiler, advance: F) -> Result<SweepStatus, E>
    where
        E: From<io::Error>,
        F: FnOnce(&CatalogEntry) -> Result<(), E>,
    {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(SweepStatus::Idle);
        };

        let millis = profiler
            .section(EFFECT_SECTION)
            .map(|avg| avg.as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        if let Err(e) = writeln!(sink, "{:.4}", millis) {
            self.abort();
            return Err(e.into());
        }
        tracing::debug!(image = self.current().map(|e| e.name.as_str()).unwrap_or_default(), millis, "benchmark sample");

        self.index += 1;
        profiler.reset();

        if self.index >= self.images.len() {
            self.finish().map_err(E::from)?;
            return Ok(SweepStatus::Idle);
        }

        if let Err(e) = advance(&self.images[self.index]) {
            self.abort();
            return Err(e);
        }
        Ok(SweepStatus::Running)
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.flush()?;
            tracing::info!(images = self.images.len(), "benchmark finished");
        }
        Ok(())
    }

    /// Stops a running sweep, keeping whatever was written.
    pub fn abort(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.flush();
            tracing::warn!(index = self.index, total = self.images.len(), "benchmark aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::tests::ManualClock;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    /// Sink whose contents stay readable after the sweep drops it.
    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedSink {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.borrow().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn names(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("Scene{:02}.png", i)).collect()
    }

    fn entries(count: usize) -> Vec<CatalogEntry> {
        names(count).iter().map(|name| CatalogEntry::builtin(name)).collect()
    }

    #[test]
    fn test_sweep_writes_one_line_per_image() {
        for count in [1usize, 2, 7, 12] {
            let sink = SharedSink::default();
            let mut sweep = BenchmarkSweep::new();
            let mut profiler = Profiler::with_clock(ManualClock::default());
            profiler.set_enabled(true);
            assert!(sweep.start(entries(count), Box::new(sink.clone())));

            let mut visited = Vec::new();
            let mut transitions = 0;
            for tick in 1..=count {
                let status = sweep
                    .tick::<io::Error, _>(&mut profiler, |next| {
                        visited.push(next.name.clone());
                        Ok(())
                    })
                    .unwrap();
                if status == SweepStatus::Idle {
                    transitions += 1;
                    assert_eq!(tick, count);
                }
            }

            assert_eq!(transitions, 1);
            assert!(!sweep.is_active());
            assert_eq!(sink.lines().len(), count);
            assert_eq!(visited, names(count)[1..].to_vec());
        }
    }

    #[test]
    fn test_samples_are_formatted_in_milliseconds() {
        let clock = ManualClock::default();
        let sink = SharedSink::default();
        let mut sweep = BenchmarkSweep::new();
        let mut profiler = Profiler::with_clock(clock.clone());
        profiler.set_enabled(true);
        profiler.set_repetitions(1);
        sweep.start(entries(2), Box::new(sink.clone()));

        profiler.start(|| {});
        clock.advance(Duration::from_micros(1500));
        profiler.stop(EFFECT_SECTION, || {});
        sweep.tick::<io::Error, _>(&mut profiler, |_| Ok(())).unwrap();

        // Profiler was reset, so the second image has no sample yet.
        assert!(profiler.section(EFFECT_SECTION).is_none());
        sweep.tick::<io::Error, _>(&mut profiler, |_| Ok(())).unwrap();

        assert_eq!(sink.lines(), vec!["1.5000", "0.0000"]);
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let mut sweep = BenchmarkSweep::new();
        assert!(sweep.start(entries(3), Box::new(SharedSink::default())));
        assert!(!sweep.start(entries(5), Box::new(SharedSink::default())));
        assert_eq!(sweep.progress(), (0, 3));
        assert!(!BenchmarkSweep::new().start(Vec::new(), Box::new(SharedSink::default())));
    }

    #[test]
    fn test_tick_when_idle_does_nothing() {
        let mut sweep = BenchmarkSweep::new();
        let mut profiler = Profiler::new();
        let status = sweep
            .tick::<io::Error, _>(&mut profiler, |_| panic!("must not advance"))
            .unwrap();
        assert_eq!(status, SweepStatus::Idle);
    }

    #[test]
    fn test_write_failure_stops_sweep() {
        let mut sweep = BenchmarkSweep::new();
        let mut profiler = Profiler::new();
        sweep.start(entries(3), Box::new(BrokenSink));
        assert!(sweep.tick::<io::Error, _>(&mut profiler, |_| Ok(())).is_err());
        assert!(!sweep.is_active());
    }

    #[test]
    fn test_advance_failure_stops_sweep() {
        let sink = SharedSink::default();
        let mut sweep = BenchmarkSweep::new();
        let mut profiler = Profiler::new();
        sweep.start(entries(3), Box::new(sink.clone()));
        let result = sweep.tick(&mut profiler, |_| Err(io::Error::new(io::ErrorKind::NotFound, "gone")));
        assert!(result.is_err());
        assert!(!sweep.is_active());
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn test_second_sweep_replaces_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_OUTPUT);
        for count in [3usize, 2] {
            let mut sweep = BenchmarkSweep::new();
            let mut profiler = Profiler::new();
            sweep.start(entries(count), open_sink(&path).unwrap());
            for _ in 0..count {
                sweep.tick::<io::Error, _>(&mut profiler, |_| Ok(())).unwrap();
            }
            assert!(!sweep.is_active());
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0.0000\n0.0000\n");
    }
}
