use std::{
    fmt,
    ops::{Add, Sub},
    time::{Duration, SystemTime},
};

/// A source of current [timestamps][Timestamp].
///
/// [`Clock::new`] calls [`SystemTime::now`] and [`Instant::now`] once, and then
/// [`Clock::now`] computes timestamps based on the difference between that
/// initial `Instant` and the current one. Timestamps from one `Clock` never go
/// backwards, even if the system time is adjusted.
///
/// [`Instant::now`]: tokio::time::Instant::now
#[cfg(feature = "clock")]
#[cfg_attr(docsrs, doc(cfg(feature = "clock")))]
#[derive(Clone, Debug)]
pub struct Clock {
    offset: Duration,
    reference: tokio::time::Instant,
}

#[cfg(feature = "clock")]
impl Clock {
    /// Create a new [`Clock`] initialized with [`SystemTime::now`].
    pub fn new() -> Self {
        let (now, reference) = (SystemTime::now(), tokio::time::Instant::now());

        Self {
            offset: Timestamp::offset(now),
            reference,
        }
    }

    /// Compute the [`Duration`] between [`Instant::now`] and the anchor
    /// [`Instant`] recorded by [`Clock::new`], and return it as a
    /// [`Timestamp`].
    ///
    /// [`Instant`]: tokio::time::Instant
    /// [`Instant::now`]: tokio::time::Instant::now
    pub fn now(&self) -> Timestamp {
        Timestamp::from_duration_since_epoch(self.offset + self.elapsed())
    }

    /// The [duration][Duration] since the [`Clock`] was
    /// [created][Clock::new()].
    #[inline]
    pub fn elapsed(&self) -> Duration {
        tokio::time::Instant::now().duration_since(self.reference)
    }
}

#[cfg(feature = "clock")]
impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// A wall-clock time, represented as nanoseconds since the Unix epoch
/// (1970-01-01 00:00:00 UTC).
///
/// One nanosecond is the smallest step between two timestamps; the sending
/// side of a [sorter][crate::Outbox] bumps a timestamp by one [tick][Timestamp::TICK]
/// whenever the clock fails to advance.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Default)]
#[repr(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The zero [`Timestamp`], representing the epoch.
    pub const ZERO: Timestamp = Timestamp(0);

    /// The smallest representable difference between two timestamps.
    pub const TICK: Duration = Duration::from_nanos(1);

    /// Initialize a [`Timestamp`] with the number of nanoseconds that have
    /// elapsed since `1970-01-01`.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Use [`SystemTime::now`] to produce a [`Timestamp`] for the current
    /// system time.
    ///
    /// Unlike [`Clock::now`], consecutive calls may go backwards.
    pub fn now() -> Self {
        Self::from_duration_since_epoch(Self::offset(SystemTime::now()))
    }

    #[inline]
    pub(crate) const fn from_duration_since_epoch(duration: Duration) -> Self {
        Self(ns(duration))
    }

    /// Read the raw value of the [`Timestamp`]: nanoseconds since the Unix
    /// epoch.
    #[inline]
    pub const fn into_raw(self) -> u64 {
        self.0
    }

    /// Check if this [`Timestamp`] is equal to the epoch time, represented as
    /// `0u64`.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The timestamp one [tick][Timestamp::TICK] after this one.
    #[inline]
    pub const fn next(self) -> Self {
        match self.0.checked_add(1) {
            Some(t) => Self(t),
            None => panic!("timestamp overflow"),
        }
    }

    fn offset(time: SystemTime) -> Duration {
        time.duration_since(SystemTime::UNIX_EPOCH)
            .expect("the system time is set to a date prior to 1970")
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nanos = self.0 % 1_000_000_000;
        write!(f, "Timestamp({secs}.{nanos:09})")
    }
}

impl From<Timestamp> for u64 {
    fn from(value: Timestamp) -> Self {
        value.into_raw()
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        Self::from_duration_since_epoch(Self::offset(value))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Self::Output {
        match self.0.checked_add(ns(duration)) {
            Some(t) => Self(t),
            None => panic!("timestamp overflow"),
        }
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    /// Subtract a [`Duration`], saturating at the epoch.
    fn sub(self, duration: Duration) -> Self::Output {
        Self(self.0.saturating_sub(ns(duration)))
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        Duration::from_nanos(self.0.saturating_sub(rhs.0))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Self(u64::deserialize(d)?))
    }
}

/// Convert a [`Duration`] to `u64` integer nanoseconds.
pub(crate) const fn ns(duration: Duration) -> u64 {
    let Some(s) = duration.as_secs().checked_mul(1000 * 1000 * 1000) else {
        panic!("timestamp overflow");
    };
    let Some(t) = s.checked_add(duration.subsec_nanos() as u64) else {
        panic!("timestamp overflow");
    };

    t
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Timestamp;

    const T: Timestamp = Timestamp::new(1_701_648_000_000_000_000); // 2023-12-04 00:00:00

    #[test]
    fn arithmetic() {
        assert_eq!(T + Duration::from_secs(1), Timestamp::new(1_701_648_001_000_000_000));
        assert_eq!(T + Timestamp::TICK, T.next());
        assert_eq!((T + Duration::from_millis(250)) - T, Duration::from_millis(250));
        assert_eq!(T - (T + Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn subtraction_saturates() {
        assert_eq!(Timestamp::new(5) - Duration::from_secs(30 * 60), Timestamp::ZERO);
    }

    #[test]
    #[should_panic(expected = "timestamp overflow")]
    fn addition_overflows() {
        let _ = Timestamp::new(u64::MAX) + Duration::from_secs(1);
    }

    #[test]
    fn debug() {
        assert_eq!(
            format!("{:?}", T + Duration::from_nanos(42)),
            "Timestamp(1701648000.000000042)"
        );
    }

    #[cfg(feature = "clock")]
    #[tokio::test(start_paused = true)]
    async fn clock_follows_instant() {
        let clock = super::Clock::new();
        let start = clock.now();

        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(clock.now() - start, Duration::from_secs(5));
        assert!(start >= Timestamp::new(1_577_865_600_000_000_000));
    }
}
