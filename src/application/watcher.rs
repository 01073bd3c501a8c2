//! Bounded polling that decides when an out-of-band file write has finished.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use crate::config::WatcherSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchLimits {
    pub existence_max_polls: u32,
    pub stability_max_polls: u32,
    pub poll_interval: Duration,
}

impl Default for WatchLimits {
    fn default() -> Self {
        Self {
            existence_max_polls: 200,
            stability_max_polls: 1000,
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl From<&WatcherSettings> for WatchLimits {
    fn from(settings: &WatcherSettings) -> Self {
        Self {
            existence_max_polls: settings.existence_max_polls.get(),
            stability_max_polls: settings.stability_max_polls.get(),
            poll_interval: settings.poll_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    NotStarted,
    Growing,
    Stable,
    Ready,
    TimedOut,
}

/// Which bound applies to the current poll count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineKind {
    Existence,
    Stability,
}

impl DeadlineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeadlineKind::Existence => "existence",
            DeadlineKind::Stability => "stability",
        }
    }
}

/// Per-path watch state. Feed it one size reading per poll.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    path: PathBuf,
    limits: WatchLimits,
    last_observed_size: Option<u64>,
    poll_count: u32,
    deadline: DeadlineKind,
    phase: WatchPhase,
}

impl WatchHandle {
    pub fn new(path: PathBuf, limits: WatchLimits) -> Self {
        Self {
            path,
            limits,
            last_observed_size: None,
            poll_count: 0,
            deadline: DeadlineKind::Existence,
            phase: WatchPhase::NotStarted,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn deadline(&self) -> DeadlineKind {
        self.deadline
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    pub fn last_observed_size(&self) -> Option<u64> {
        self.last_observed_size
    }

    /// Advance with the size seen on this poll (`None` when the file is absent).
    pub fn observe(&mut self, size: Option<u64>) -> WatchPhase {
        if matches!(
            self.phase,
            WatchPhase::Stable | WatchPhase::Ready | WatchPhase::TimedOut
        ) {
            return self.phase;
        }

        match (self.phase, size) {
            (WatchPhase::NotStarted, None) => {
                self.poll_count += 1;
                if self.poll_count >= self.limits.existence_max_polls {
                    self.phase = WatchPhase::TimedOut;
                }
            }
            (WatchPhase::NotStarted, Some(size)) => {
                self.phase = WatchPhase::Growing;
                self.deadline = DeadlineKind::Stability;
                self.poll_count = 0;
                self.last_observed_size = Some(size);
            }
            (_, size) => {
                self.poll_count += 1;
                match (self.last_observed_size, size) {
                    (Some(previous), Some(current)) if previous == current && current > 0 => {
                        self.phase = WatchPhase::Stable;
                    }
                    _ => {
                        self.last_observed_size = size;
                        if self.poll_count >= self.limits.stability_max_polls {
                            self.phase = WatchPhase::TimedOut;
                        }
                    }
                }
            }
        }
        self.phase
    }

    /// Settle a `Stable` handle after reading the content: `Ready` when the
    /// read length matches the stable size, otherwise back to `Growing`.
    pub fn confirm(&mut self, read_len: u64) -> WatchPhase {
        if self.phase != WatchPhase::Stable {
            return self.phase;
        }
        if Some(read_len) == self.last_observed_size {
            self.phase = WatchPhase::Ready;
        } else {
            self.phase = WatchPhase::Growing;
            self.last_observed_size = Some(read_len);
            if self.poll_count >= self.limits.stability_max_polls {
                self.phase = WatchPhase::TimedOut;
            }
        }
        self.phase
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Ready(Bytes),
    TimedOut { deadline: DeadlineKind, polls: u32 },
}

/// Filesystem observations the watcher relies on.
#[async_trait]
pub trait FileInspector: Send + Sync {
    async fn size(&self, path: &Path) -> io::Result<Option<u64>>;
    async fn read(&self, path: &Path) -> io::Result<Bytes>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsInspector;

#[async_trait]
impl FileInspector for FsInspector {
    async fn size(&self, path: &Path) -> io::Result<Option<u64>> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn read(&self, path: &Path) -> io::Result<Bytes> {
        fs::read(path).await.map(Bytes::from)
    }
}

/// Poll `path` until its content is stable or a deadline passes.
pub async fn await_completion(
    inspector: &dyn FileInspector,
    path: &Path,
    limits: WatchLimits,
) -> io::Result<WatchOutcome> {
    let mut handle = WatchHandle::new(path.to_path_buf(), limits);
    loop {
        let size = inspector.size(handle.path()).await?;
        match handle.observe(size) {
            WatchPhase::Stable => {
                let bytes = inspector.read(handle.path()).await?;
                if handle.confirm(bytes.len() as u64) == WatchPhase::Ready {
                    debug!(
                        target = "application::watcher",
                        path = %handle.path().display(),
                        polls = handle.poll_count(),
                        size_bytes = bytes.len(),
                        "Output stabilised"
                    );
                    return Ok(WatchOutcome::Ready(bytes));
                }
            }
            WatchPhase::TimedOut => {
                debug!(
                    target = "application::watcher",
                    path = %handle.path().display(),
                    polls = handle.poll_count(),
                    deadline = handle.deadline().as_str(),
                    last_size = handle.last_observed_size().unwrap_or(0),
                    "Output watch timed out"
                );
                return Ok(WatchOutcome::TimedOut {
                    deadline: handle.deadline(),
                    polls: handle.poll_count(),
                });
            }
            WatchPhase::NotStarted | WatchPhase::Growing | WatchPhase::Ready => {}
        }
        if handle.phase() == WatchPhase::TimedOut {
            return Ok(WatchOutcome::TimedOut {
                deadline: handle.deadline(),
                polls: handle.poll_count(),
            });
        }
        tokio::time::sleep(limits.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;

    /// Replays scripted size readings; the last reading repeats forever.
    struct ScriptedInspector {
        sizes: Mutex<VecDeque<Option<u64>>>,
        last: Mutex<Option<u64>>,
        size_calls: Mutex<u32>,
    }

    impl ScriptedInspector {
        fn new(sizes: &[Option<u64>]) -> Self {
            Self {
                sizes: Mutex::new(sizes.iter().copied().collect()),
                last: Mutex::new(None),
                size_calls: Mutex::new(0),
            }
        }

        fn size_calls(&self) -> u32 {
            *self.size_calls.lock().expect("lock")
        }
    }

    #[async_trait]
    impl FileInspector for ScriptedInspector {
        async fn size(&self, _path: &Path) -> io::Result<Option<u64>> {
            *self.size_calls.lock().expect("lock") += 1;
            let mut last = self.last.lock().expect("lock");
            if let Some(next) = self.sizes.lock().expect("lock").pop_front() {
                *last = next;
            }
            Ok(*last)
        }

        async fn read(&self, _path: &Path) -> io::Result<Bytes> {
            let len = self.last.lock().expect("lock").unwrap_or(0);
            Ok(Bytes::from(vec![b'x'; len as usize]))
        }
    }

    fn fast_limits(existence: u32, stability: u32) -> WatchLimits {
        WatchLimits {
            existence_max_polls: existence,
            stability_max_polls: stability,
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn repeated_non_zero_size_becomes_stable() {
        let mut handle = WatchHandle::new(PathBuf::from("out.svg"), WatchLimits::default());
        assert_eq!(handle.observe(Some(0)), WatchPhase::Growing);
        assert_eq!(handle.observe(Some(10)), WatchPhase::Growing);
        assert_eq!(handle.observe(Some(10)), WatchPhase::Stable);
        assert_eq!(handle.confirm(10), WatchPhase::Ready);
    }

    #[test]
    fn zero_size_never_counts_as_stable() {
        let mut handle = WatchHandle::new(PathBuf::from("out.svg"), fast_limits(5, 3));
        assert_eq!(handle.observe(Some(0)), WatchPhase::Growing);
        assert_eq!(handle.observe(Some(0)), WatchPhase::Growing);
        assert_eq!(handle.observe(Some(0)), WatchPhase::Growing);
        assert_eq!(handle.observe(Some(0)), WatchPhase::TimedOut);
        assert_eq!(handle.deadline(), DeadlineKind::Stability);
    }

    #[test]
    fn short_read_returns_to_growing() {
        let mut handle = WatchHandle::new(PathBuf::from("out.stl"), WatchLimits::default());
        handle.observe(Some(4));
        assert_eq!(handle.observe(Some(4)), WatchPhase::Stable);
        assert_eq!(handle.confirm(9), WatchPhase::Growing);
        assert_eq!(handle.observe(Some(9)), WatchPhase::Stable);
    }

    #[tokio::test]
    async fn sequence_reaches_ready_after_second_reading_of_ten() {
        let inspector = ScriptedInspector::new(&[Some(0), Some(10), Some(10), Some(10)]);
        let outcome = await_completion(&inspector, Path::new("out.svg"), fast_limits(5, 5))
            .await
            .expect("watch");
        assert_eq!(outcome, WatchOutcome::Ready(Bytes::from(vec![b'x'; 10])));
        assert_eq!(inspector.size_calls(), 3);
    }

    #[tokio::test]
    async fn file_that_never_appears_times_out_on_existence() {
        let inspector = ScriptedInspector::new(&[None]);
        let outcome = await_completion(&inspector, Path::new("out.svg"), fast_limits(4, 100))
            .await
            .expect("watch");
        assert_eq!(
            outcome,
            WatchOutcome::TimedOut {
                deadline: DeadlineKind::Existence,
                polls: 4
            }
        );
        assert_eq!(inspector.size_calls(), 4);
    }

    #[tokio::test]
    async fn file_that_keeps_growing_times_out_on_stability() {
        let sizes: Vec<Option<u64>> = (1..=50).map(|n| Some(n * 10)).collect();
        let inspector = ScriptedInspector::new(&sizes);
        let outcome = await_completion(&inspector, Path::new("out.svg"), fast_limits(100, 6))
            .await
            .expect("watch");
        assert_eq!(
            outcome,
            WatchOutcome::TimedOut {
                deadline: DeadlineKind::Stability,
                polls: 6
            }
        );
        assert_eq!(inspector.size_calls(), 7);
    }

    #[tokio::test]
    async fn existence_and_stability_bounds_are_independent() {
        let mut sizes = vec![None; 8];
        sizes.extend([Some(3), Some(3)]);
        let inspector = ScriptedInspector::new(&sizes);
        let outcome = await_completion(&inspector, Path::new("out.svg"), fast_limits(10, 2))
            .await
            .expect("watch");
        assert!(matches!(outcome, WatchOutcome::Ready(_)));
    }

    #[tokio::test]
    async fn fs_inspector_reports_missing_files_as_none() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("absent.svg");
        assert_eq!(FsInspector.size(&path).await.expect("size"), None);

        std::fs::write(&path, b"<svg/>").expect("write");
        assert_eq!(FsInspector.size(&path).await.expect("size"), Some(6));
        let outcome = await_completion(&FsInspector, &path, fast_limits(5, 5))
            .await
            .expect("watch");
        assert_eq!(outcome, WatchOutcome::Ready(Bytes::from_static(b"<svg/>")));
    }
}
