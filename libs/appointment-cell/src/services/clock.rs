// libs/appointment-cell/src/services/clock.rs
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, Utc};
use tracing::warn;

/// Source of "now" in the clinic's local time.
pub trait ClinicClock: Send + Sync {
    fn now_in_clinic_timezone(&self) -> DateTime<FixedOffset>;
}

/// Wall clock shifted into the clinic offset. The clinic runs on
/// Asia/Ho_Chi_Minh, which has no DST, so a fixed offset is exact.
#[derive(Debug, Clone, Copy)]
pub struct SystemClinicClock {
    offset: FixedOffset,
}

impl SystemClinicClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn from_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| {
            warn!("Clinic UTC offset of {} minutes is out of range, using UTC", minutes);
            Utc.fix()
        });
        Self::new(offset)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl ClinicClock for SystemClinicClock {
    fn now_in_clinic_timezone(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Always reports the same instant. Used by tests and local tooling.
#[derive(Debug, Clone, Copy)]
pub struct FixedClinicClock {
    now: DateTime<FixedOffset>,
}

impl FixedClinicClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self { now }
    }

    /// Pins the clock to a clinic-local wall time.
    pub fn at_local(local: NaiveDateTime, offset: FixedOffset) -> Self {
        let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
        Self::new(DateTime::from_naive_utc_and_offset(utc, offset))
    }
}

impl ClinicClock for FixedClinicClock {
    fn now_in_clinic_timezone(&self) -> DateTime<FixedOffset> {
        self.now
    }
}
