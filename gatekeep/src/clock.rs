//! Clocks used when checking the time-bound claims of a token

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use serde::{de, Deserialize, Deserializer, Serialize};

/// Seconds elapsed since 1970-01-01T00:00:00Z
///
/// Deserializes from any JSON number. Fractional seconds are truncated
/// toward the epoch, and times before the epoch collapse onto it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UnixTime(pub u64);

impl<'de> Deserialize<'de> for UnixTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_u64(NumericDateVisitor)
    }
}

struct NumericDateVisitor;

impl<'de> de::Visitor<'de> for NumericDateVisitor {
    type Value = UnixTime;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("seconds since the Unix epoch")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(UnixTime(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(UnixTime(u64::try_from(v).unwrap_or(0)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() {
            return Err(E::invalid_value(de::Unexpected::Float(v), &self));
        }

        // Float to integer casts saturate, so negative values land on zero
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let secs = v.floor() as u64;
        Ok(UnixTime(secs))
    }
}

impl UnixTime {
    /// Moves this time forward by `secs`, saturating at the maximum value
    #[must_use]
    pub const fn saturating_add(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Moves this time backward by `secs`, saturating at the epoch
    #[must_use]
    pub const fn saturating_sub(self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }
}

impl From<SystemTime> for UnixTime {
    fn from(t: SystemTime) -> Self {
        // Times before the epoch collapse onto the epoch itself.
        let since = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self(since.as_secs())
    }
}

impl fmt::Display for UnixTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A source of the current time
pub trait Clock: fmt::Debug + Send + Sync {
    /// The current time according to this clock
    fn now(&self) -> UnixTime;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    #[inline]
    fn now(&self) -> UnixTime {
        T::now(self)
    }
}

impl<T: Clock + ?Sized> Clock for &'_ T {
    #[inline]
    fn now(&self) -> UnixTime {
        T::now(self)
    }
}

/// The operating system's wall clock
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime::from(SystemTime::now())
    }
}

/// A manually driven clock
///
/// Clones share the same underlying time, so a clock handed to a verifier
/// can still be moved forward by the test that created it.
#[derive(Clone, Debug, Default)]
pub struct TestClock(Arc<AtomicU64>);

impl TestClock {
    /// Creates a clock stopped at `time`
    pub fn new(time: UnixTime) -> Self {
        Self(Arc::new(AtomicU64::new(time.0)))
    }

    /// Sets the current time
    pub fn set(&self, time: UnixTime) {
        self.0.store(time.0, Ordering::SeqCst);
    }

    /// Advances the current time by `secs`
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_clones_share_time() {
        let clock = TestClock::new(UnixTime(100));
        let shared = clock.clone();

        clock.advance(5);
        assert_eq!(shared.now(), UnixTime(105));

        shared.set(UnixTime(7));
        assert_eq!(clock.now(), UnixTime(7));
    }

    #[test]
    fn numeric_date_accepts_fractional_seconds() -> color_eyre::Result<()> {
        let t: UnixTime = serde_json::from_str("1700000000.5")?;
        assert_eq!(t, UnixTime(1_700_000_000));

        let t: UnixTime = serde_json::from_str("1700000000")?;
        assert_eq!(t, UnixTime(1_700_000_000));

        let t: UnixTime = serde_json::from_str("-5")?;
        assert_eq!(t, UnixTime(0));

        assert!(serde_json::from_str::<UnixTime>("\"soon\"").is_err());
        Ok(())
    }

    #[test]
    fn pre_epoch_system_time_is_epoch() {
        let t = SystemTime::UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(UnixTime::from(t), UnixTime(0));
    }
}
