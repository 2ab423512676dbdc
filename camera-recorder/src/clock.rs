use chrono::{Local, NaiveDate, NaiveDateTime};

/// Source of local wall-clock time.
///
/// Day boundaries and file names follow the local calendar, so the seam
/// returns naive local time rather than UTC.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Wall clock pinned to a start instant and advanced by tokio time.
///
/// Under a paused tokio runtime every sleep moves this clock forward too,
/// which lets tests cross midnight without waiting for it.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct TokioClock {
    start: NaiveDateTime,
    origin: tokio::time::Instant,
}

#[cfg(test)]
impl TokioClock {
    pub fn starting_at(start: NaiveDateTime) -> Self {
        Self {
            start,
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(test)]
impl Clock for TokioClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = self.origin.elapsed();
        match chrono::Duration::from_std(elapsed) {
            Ok(offset) => self.start + offset,
            Err(_) => self.start,
        }
    }
}
