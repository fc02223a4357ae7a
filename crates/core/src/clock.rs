use chrono::{DateTime, NaiveDate, Utc};

/// Source of "now" for transitions and of "today" for delegation checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self { at }
    }

    /// Noon UTC on `day`.
    pub fn on(day: NaiveDate) -> Self {
        Self { at: day.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc() }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Clock, FixedClock};

    #[test]
    fn fixed_clock_reports_its_day() {
        let day = NaiveDate::from_ymd_opt(2026, 7, 14).unwrap();
        assert_eq!(FixedClock::on(day).today(), day);
    }
}
