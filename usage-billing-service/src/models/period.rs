//! Half-open billing periods.

use chrono::{Datelike, Months, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// `[start, end)` date range, one calendar month by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BillingPeriod {
    /// The calendar month before the one containing `today`.
    pub fn previous_month(today: NaiveDate) -> Self {
        let current_month_start = today.with_day(1).unwrap_or(today);
        let start = current_month_start - Months::new(1);
        Self {
            start,
            end: current_month_start,
        }
    }

    /// Fill in whichever bound is missing.
    ///
    /// Neither bound: previous calendar month. Only `start`: one month from
    /// it. Only `end`: one month up to it. The result must be non-empty.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self, String> {
        let period = match (start, end) {
            (None, None) => Self::previous_month(today),
            (Some(start), None) => Self {
                start,
                end: start
                    .checked_add_months(Months::new(1))
                    .ok_or_else(|| format!("periodStart ({}) is out of range", start))?,
            },
            (None, Some(end)) => Self {
                start: end
                    .checked_sub_months(Months::new(1))
                    .ok_or_else(|| format!("periodEnd ({}) is out of range", end))?,
                end,
            },
            (Some(start), Some(end)) => Self { start, end },
        };

        if period.start >= period.end {
            return Err(format!(
                "periodStart ({}) must be before periodEnd ({})",
                period.start, period.end
            ));
        }

        Ok(period)
    }

    pub fn start_of_day_utc(date: NaiveDate) -> chrono::DateTime<chrono::Utc> {
        date.and_time(NaiveTime::MIN).and_utc()
    }
}
