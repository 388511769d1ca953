use chrono::{DateTime, Datelike, Months, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Length of one billing period.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "billing_interval", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[derive(Default)]
pub enum BillingInterval {
    #[default]
    Month,
    ThreeMonth,
    SixMonth,
    Year,
}

impl BillingInterval {
    /// Number of calendar months covered by one period.
    pub fn months(&self) -> u32 {
        match self {
            BillingInterval::Month => 1,
            BillingInterval::ThreeMonth => 3,
            BillingInterval::SixMonth => 6,
            BillingInterval::Year => 12,
        }
    }

    /// Short label used in invoice descriptions ("$10/mo").
    pub fn short_label(&self) -> &'static str {
        match self {
            BillingInterval::Month => "mo",
            BillingInterval::ThreeMonth => "three months",
            BillingInterval::SixMonth => "six months",
            BillingInterval::Year => "yr",
        }
    }

    /// Moves `from` forward by one interval on the calendar.
    ///
    /// Returns `None` only when the result falls outside chrono's representable range.
    pub fn advance(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        from.checked_add_months(Months::new(self.months()))
    }
}

/// Canonical bill date: start of the current day in `tz`, pulled back to the 28th
/// when the day of month is later, so every monthly step lands on a real date.
pub fn billing_anchor(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let day = local.day().min(28);
    let date = local
        .date_naive()
        .with_day(day)
        .unwrap_or_else(|| local.date_naive());
    let midnight = date.and_time(NaiveTime::MIN);

    // Midnight can fall into a DST gap in some zones; use the UTC reading then.
    tz.from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
        .with_timezone(&Utc)
}
