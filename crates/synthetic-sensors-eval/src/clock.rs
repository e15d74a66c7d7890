//! Ambient wall-clock access, injected rather than called directly so
//! tests (and sandboxed hosts) can supply a `FixedClock`. Mirrors the
//! teacher's `system-clock` cargo feature split between ambient
//! `Local::now`/`Utc::now` and an injectable alternative.

use chrono::{NaiveDate, NaiveDateTime};

pub trait Clock: Send + Sync {
    fn local_now(&self) -> NaiveDateTime;
    fn utc_now(&self) -> NaiveDateTime;
}

#[cfg(feature = "system-clock")]
pub struct SystemClock;

#[cfg(feature = "system-clock")]
impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
    fn utc_now(&self) -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }
}

/// A clock pinned to a fixed instant, for deterministic tests.
pub struct FixedClock {
    pub local: NaiveDateTime,
    pub utc: NaiveDateTime,
}

impl FixedClock {
    pub fn at(dt: NaiveDateTime) -> Self {
        Self { local: dt, utc: dt }
    }
}

impl Clock for FixedClock {
    fn local_now(&self) -> NaiveDateTime {
        self.local
    }
    fn utc_now(&self) -> NaiveDateTime {
        self.utc
    }
}

pub fn today_of(dt: NaiveDateTime) -> NaiveDate {
    dt.date()
}
