use std::fs;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What the watcher compares between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn read(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Reports a change once the file has stopped changing for `delay`.
/// The game rewrites the stats file in several steps at the end of a run.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    last_seen: Option<FileStamp>,
    reported: Option<FileStamp>,
    changed_at: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration, initial: Option<FileStamp>) -> Self {
        Self {
            delay,
            last_seen: initial,
            reported: initial,
            changed_at: None,
        }
    }

    pub fn observe(&mut self, stamp: Option<FileStamp>, now: Instant) -> bool {
        if stamp != self.last_seen {
            self.last_seen = stamp;
            self.changed_at = Some(now);
            return false;
        }
        let Some(changed_at) = self.changed_at else {
            return false;
        };
        if stamp.is_none() || now.duration_since(changed_at) < self.delay {
            return false;
        }
        self.changed_at = None;
        if stamp == self.reported {
            return false;
        }
        self.reported = stamp;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant, SystemTime};

    use super::{Debouncer, FileStamp};

    fn stamp(len: u64) -> Option<FileStamp> {
        Some(FileStamp {
            len,
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(len)),
        })
    }

    #[test]
    fn settled_change_is_reported_once() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_secs(1), stamp(10));
        assert!(!d.observe(stamp(10), start));
        assert!(!d.observe(stamp(20), start + Duration::from_millis(100)));
        assert!(!d.observe(stamp(20), start + Duration::from_millis(600)));
        assert!(d.observe(stamp(20), start + Duration::from_millis(1_200)));
        assert!(!d.observe(stamp(20), start + Duration::from_millis(5_000)));
    }

    #[test]
    fn writes_in_progress_restart_the_delay() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_secs(1), stamp(10));
        assert!(!d.observe(stamp(11), start));
        assert!(!d.observe(stamp(12), start + Duration::from_millis(900)));
        assert!(!d.observe(stamp(12), start + Duration::from_millis(1_500)));
        assert!(d.observe(stamp(12), start + Duration::from_millis(2_000)));
    }

    #[test]
    fn missing_file_is_never_reported() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(10), stamp(10));
        assert!(!d.observe(None, start));
        assert!(!d.observe(None, start + Duration::from_secs(1)));
    }

    #[test]
    fn change_back_to_reported_state_is_ignored() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(100), stamp(10));
        assert!(!d.observe(stamp(11), start));
        assert!(!d.observe(stamp(10), start + Duration::from_millis(50)));
        assert!(!d.observe(stamp(10), start + Duration::from_millis(500)));
    }
}
