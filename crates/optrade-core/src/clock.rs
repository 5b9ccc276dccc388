//! Clock and market calendar.
//!
//! Every time comparison in the system routes through here. Calling
//! `Utc::now()` or any platform-local-time API outside this module is a
//! programming error — business logic always asks a `Clock` what time it
//! is, never the OS, so tests can pin time without sleeping.

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Asia::Kolkata;
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Candle bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    M60,
    Day,
}

impl Timeframe {
    /// Bucket width as a `chrono::Duration`. `Day` is the session width
    /// (09:15-15:30 IST), not a calendar day, since a day candle's only
    /// bucket per trading date starts at session open.
    pub fn duration(&self) -> ChronoDuration {
        match self {
            Self::M1 => ChronoDuration::minutes(1),
            Self::M5 => ChronoDuration::minutes(5),
            Self::M15 => ChronoDuration::minutes(15),
            Self::M30 => ChronoDuration::minutes(30),
            Self::M60 => ChronoDuration::minutes(60),
            Self::Day => ChronoDuration::hours(6) + ChronoDuration::minutes(15),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::M60 => "60m",
            Self::Day => "day",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "60m" => Ok(Self::M60),
            "day" => Ok(Self::Day),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

/// Session open/close wall-clock times, IST.
const SESSION_OPEN: (u32, u32, u32) = (9, 15, 0);
const SESSION_CLOSE: (u32, u32, u32) = (15, 30, 0);

/// Abstraction over "what time is it" so business logic never calls
/// `Utc::now()` directly and tests can pin a fixed instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock: the OS wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock pinned to (and advanceable from) a fixed instant.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(at.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta: ChronoDuration) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .expect("fixed clock millis always in range")
    }
}

/// Injected, replaceable table of market holidays (dates with no trading).
///
/// Default is empty — the weekday-only open rule applies until a real
/// exchange holiday calendar is loaded.
#[derive(Debug, Clone, Default)]
pub struct HolidayTable {
    dates: BTreeSet<NaiveDate>,
}

impl HolidayTable {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }
}

/// Authoritative current time in IST, market-open predicate, and
/// timeframe-bucket alignment.
pub struct MarketCalendar {
    clock: Arc<dyn Clock>,
    holidays: HolidayTable,
}

impl MarketCalendar {
    pub fn new(clock: Arc<dyn Clock>, holidays: HolidayTable) -> Self {
        Self { clock, holidays }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock), HolidayTable::default())
    }

    /// Current time, IST-aware.
    pub fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&Kolkata)
    }

    /// True iff `at` falls on a weekday that is not a configured holiday,
    /// between 09:15:00 and 15:30:00 IST inclusive.
    pub fn is_market_open(&self, at: DateTime<Utc>) -> bool {
        let ist = at.with_timezone(&Kolkata);
        if matches!(ist.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        if self.holidays.is_holiday(ist.date_naive()) {
            return false;
        }
        let open = NaiveTime::from_hms_opt(SESSION_OPEN.0, SESSION_OPEN.1, SESSION_OPEN.2).unwrap();
        let close =
            NaiveTime::from_hms_opt(SESSION_CLOSE.0, SESSION_CLOSE.1, SESSION_CLOSE.2).unwrap();
        let t = ist.time();
        t >= open && t <= close
    }

    /// `is_market_open` evaluated at the injected clock's current time.
    pub fn is_market_open_now(&self) -> bool {
        self.is_market_open(self.clock.now())
    }

    /// Today's (IST calendar date of `now()`) session open/close instants,
    /// in UTC.
    pub fn today_session_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.session_bounds_for(self.now().date_naive())
    }

    /// Session open/close instants (UTC) for an arbitrary IST calendar date.
    pub fn session_bounds_for(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let open_naive = date
            .and_hms_opt(SESSION_OPEN.0, SESSION_OPEN.1, SESSION_OPEN.2)
            .unwrap();
        let close_naive = date
            .and_hms_opt(SESSION_CLOSE.0, SESSION_CLOSE.1, SESSION_CLOSE.2)
            .unwrap();
        let open = Kolkata
            .from_local_datetime(&open_naive)
            .single()
            .expect("IST has no DST ambiguity");
        let close = Kolkata
            .from_local_datetime(&close_naive)
            .single()
            .expect("IST has no DST ambiguity");
        (open.with_timezone(&Utc), close.with_timezone(&Utc))
    }

    /// Floor `ts` to the `timeframe` bucket boundary, measured from that
    /// trading day's session open (09:15 IST) — NOT from UTC/IST midnight.
    /// NSE's open time (09:15) is not an even multiple of 30 or 60 minutes
    /// from midnight, so bucket boundaries for those timeframes only line
    /// up evenly when counted from session open.
    ///
    /// A tick at exactly a bucket boundary belongs to the bucket that
    /// *starts* there (right-exclusive on the bucket it is leaving).
    pub fn align_to_bucket(&self, ts: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
        let ist = ts.with_timezone(&Kolkata);
        let (session_open, _) = self.session_bounds_for(ist.date_naive());
        if timeframe == Timeframe::Day {
            return session_open;
        }
        let width = timeframe.duration();
        let elapsed = ts.signed_duration_since(session_open);
        let elapsed_ms = elapsed.num_milliseconds().max(0);
        let width_ms = width.num_milliseconds();
        let bucket_index = elapsed_ms / width_ms;
        session_open + ChronoDuration::milliseconds(bucket_index * width_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    fn calendar() -> MarketCalendar {
        MarketCalendar::new(Arc::new(SystemClock), HolidayTable::default())
    }

    #[test]
    fn test_market_open_weekday_within_hours() {
        let cal = calendar();
        // 2026-07-27 is a Monday; 10:00 IST = 04:30 UTC.
        assert!(cal.is_market_open(utc(2026, 7, 27, 4, 30, 0)));
    }

    #[test]
    fn test_market_closed_before_open() {
        let cal = calendar();
        // 09:14:59 IST = 03:44:59 UTC.
        assert!(!cal.is_market_open(utc(2026, 7, 27, 3, 44, 59)));
    }

    #[test]
    fn test_market_open_at_exact_boundaries() {
        let cal = calendar();
        // 09:15:00 IST = 03:45:00 UTC (open, inclusive).
        assert!(cal.is_market_open(utc(2026, 7, 27, 3, 45, 0)));
        // 15:30:00 IST = 10:00:00 UTC (close, inclusive).
        assert!(cal.is_market_open(utc(2026, 7, 27, 10, 0, 0)));
        // 15:30:01 IST is closed.
        assert!(!cal.is_market_open(utc(2026, 7, 27, 10, 0, 1)));
    }

    #[test]
    fn test_market_closed_weekend() {
        let cal = calendar();
        // 2026-08-01 is a Saturday.
        assert!(!cal.is_market_open(utc(2026, 8, 1, 5, 0, 0)));
    }

    #[test]
    fn test_holiday_closes_market() {
        let holiday = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let cal = MarketCalendar::new(Arc::new(SystemClock), HolidayTable::new([holiday]));
        assert!(!cal.is_market_open(utc(2026, 7, 27, 5, 0, 0)));
    }

    #[test]
    fn test_align_to_bucket_15m_from_session_open() {
        let cal = calendar();
        // 10:02:30 IST on 2026-07-27 -> falls in the 09:45-10:00 window's
        // next bucket; session open 09:15, elapsed 47.5 min -> bucket 3 (45min) -> 10:00.
        let ts = utc(2026, 7, 27, 4, 32, 30); // 10:02:30 IST
        let bucket = cal.align_to_bucket(ts, Timeframe::M15);
        let expected = utc(2026, 7, 27, 4, 30, 0); // 10:00:00 IST
        assert_eq!(bucket, expected);
    }

    #[test]
    fn test_align_to_bucket_right_exclusive() {
        let cal = calendar();
        // exactly at a 15m boundary: 09:30:00 IST should map to itself,
        // not the previous bucket.
        let ts = utc(2026, 7, 27, 4, 0, 0); // 09:30:00 IST
        let bucket = cal.align_to_bucket(ts, Timeframe::M15);
        assert_eq!(bucket, ts);
    }

    #[test]
    fn test_align_to_bucket_30m_session_open_aligned() {
        let cal = calendar();
        // 09:45:00 IST is the second 30m bucket start after session open.
        let ts = utc(2026, 7, 27, 4, 15, 0); // 09:45:00 IST
        let bucket = cal.align_to_bucket(ts, Timeframe::M30);
        assert_eq!(bucket, ts);
    }

    #[test]
    fn test_align_to_bucket_day() {
        let cal = calendar();
        let ts = utc(2026, 7, 27, 6, 0, 0); // 11:30 IST
        let bucket = cal.align_to_bucket(ts, Timeframe::Day);
        let (open, _) = cal.session_bounds_for(NaiveDate::from_ymd_opt(2026, 7, 27).unwrap());
        assert_eq!(bucket, open);
    }

    #[test]
    fn test_session_bounds() {
        let cal = calendar();
        let date = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let (open, close) = cal.session_bounds_for(date);
        assert_eq!(open, utc(2026, 7, 27, 3, 45, 0));
        assert_eq!(close, utc(2026, 7, 27, 10, 0, 0));
    }

    #[test]
    fn test_fixed_clock_advance() {
        let clock = FixedClock::new(utc(2026, 7, 27, 4, 30, 0));
        assert_eq!(clock.now(), utc(2026, 7, 27, 4, 30, 0));
        clock.advance(ChronoDuration::minutes(15));
        assert_eq!(clock.now(), utc(2026, 7, 27, 4, 45, 0));
    }
}
