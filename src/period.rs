//! Calendar periods
//!
//! Preheat caches resolved periods and period types for the import. The
//! resolver is a trait so callers can plug in other calendar systems; the
//! bundled [`IsoPeriodResolver`] understands ISO period strings on the
//! Gregorian calendar.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    SixMonthly,
    Yearly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 6] = [
        PeriodType::Daily,
        PeriodType::Weekly,
        PeriodType::Monthly,
        PeriodType::Quarterly,
        PeriodType::SixMonthly,
        PeriodType::Yearly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PeriodType::Daily => "Daily",
            PeriodType::Weekly => "Weekly",
            PeriodType::Monthly => "Monthly",
            PeriodType::Quarterly => "Quarterly",
            PeriodType::SixMonthly => "SixMonthly",
            PeriodType::Yearly => "Yearly",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// The period of this type that contains `date`
    pub fn create_period(&self, date: NaiveDate) -> Period {
        let (start, end) = match self {
            PeriodType::Daily => (date, date),
            PeriodType::Weekly => {
                let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
                (start, start + Duration::days(6))
            }
            PeriodType::Monthly => month_span(date.year(), date.month(), 1),
            PeriodType::Quarterly => month_span(date.year(), (date.month0() / 3) * 3 + 1, 3),
            PeriodType::SixMonthly => month_span(date.year(), (date.month0() / 6) * 6 + 1, 6),
            PeriodType::Yearly => month_span(date.year(), 1, 12),
        };

        Period {
            iso: iso_string(*self, start),
            period_type: *self,
            start,
            end,
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete calendar period
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub iso: String,
    pub period_type: PeriodType,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Resolves period identifiers encountered during preheat
pub trait PeriodResolver {
    fn resolve_period(&self, iso: &str) -> Option<Period>;

    fn resolve_period_type(&self, name: &str) -> Option<PeriodType>;
}

/// ISO period strings: `20240115`, `2024W3`, `202401`, `2024Q1`, `2024S2`, `2024`
pub struct IsoPeriodResolver {
    daily: Regex,
    weekly: Regex,
    monthly: Regex,
    quarterly: Regex,
    six_monthly: Regex,
    yearly: Regex,
}

impl Default for IsoPeriodResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IsoPeriodResolver {
    pub fn new() -> Self {
        Self {
            daily: Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("daily pattern"),
            weekly: Regex::new(r"^(\d{4})W(\d{1,2})$").expect("weekly pattern"),
            monthly: Regex::new(r"^(\d{4})(\d{2})$").expect("monthly pattern"),
            quarterly: Regex::new(r"^(\d{4})Q([1-4])$").expect("quarterly pattern"),
            six_monthly: Regex::new(r"^(\d{4})S([12])$").expect("six-monthly pattern"),
            yearly: Regex::new(r"^(\d{4})$").expect("yearly pattern"),
        }
    }

    fn start_of(&self, iso: &str) -> Option<(PeriodType, NaiveDate)> {
        let num = |s: &str| s.parse::<u32>().ok();

        if let Some(c) = self.daily.captures(iso) {
            let date = NaiveDate::from_ymd_opt(c[1].parse().ok()?, num(&c[2])?, num(&c[3])?)?;
            return Some((PeriodType::Daily, date));
        }
        if let Some(c) = self.weekly.captures(iso) {
            let date = NaiveDate::from_isoywd_opt(c[1].parse().ok()?, num(&c[2])?, Weekday::Mon)?;
            return Some((PeriodType::Weekly, date));
        }
        if let Some(c) = self.monthly.captures(iso) {
            let date = NaiveDate::from_ymd_opt(c[1].parse().ok()?, num(&c[2])?, 1)?;
            return Some((PeriodType::Monthly, date));
        }
        if let Some(c) = self.quarterly.captures(iso) {
            let month = (num(&c[2])? - 1) * 3 + 1;
            let date = NaiveDate::from_ymd_opt(c[1].parse().ok()?, month, 1)?;
            return Some((PeriodType::Quarterly, date));
        }
        if let Some(c) = self.six_monthly.captures(iso) {
            let month = (num(&c[2])? - 1) * 6 + 1;
            let date = NaiveDate::from_ymd_opt(c[1].parse().ok()?, month, 1)?;
            return Some((PeriodType::SixMonthly, date));
        }
        if let Some(c) = self.yearly.captures(iso) {
            let date = NaiveDate::from_ymd_opt(c[1].parse().ok()?, 1, 1)?;
            return Some((PeriodType::Yearly, date));
        }
        None
    }
}

impl PeriodResolver for IsoPeriodResolver {
    fn resolve_period(&self, iso: &str) -> Option<Period> {
        let (period_type, start) = self.start_of(iso)?;
        let mut period = period_type.create_period(start);
        // keep the caller's spelling (e.g. `2024W3` vs `2024W03`) as the cache key
        period.iso = iso.to_string();
        Some(period)
    }

    fn resolve_period_type(&self, name: &str) -> Option<PeriodType> {
        PeriodType::from_name(name)
    }
}

fn month_span(year: i32, first_month: u32, months: u32) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(year, first_month, 1).unwrap_or(NaiveDate::MIN);
    let next = first_month + months;
    let after = if next > 12 {
        NaiveDate::from_ymd_opt(year + 1, next - 12, 1)
    } else {
        NaiveDate::from_ymd_opt(year, next, 1)
    };
    let end = after.and_then(|d| d.pred_opt()).unwrap_or(NaiveDate::MAX);
    (start, end)
}

fn iso_string(period_type: PeriodType, start: NaiveDate) -> String {
    match period_type {
        PeriodType::Daily => start.format("%Y%m%d").to_string(),
        PeriodType::Weekly => {
            let week = start.iso_week();
            format!("{}W{}", week.year(), week.week())
        }
        PeriodType::Monthly => start.format("%Y%m").to_string(),
        PeriodType::Quarterly => format!("{}Q{}", start.year(), start.month0() / 3 + 1),
        PeriodType::SixMonthly => format!("{}S{}", start.year(), start.month0() / 6 + 1),
        PeriodType::Yearly => start.year().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_create_period_boundaries() {
        let monthly = PeriodType::Monthly.create_period(date(2024, 2, 14));
        assert_eq!(monthly.start, date(2024, 2, 1));
        assert_eq!(monthly.end, date(2024, 2, 29));
        assert_eq!(monthly.iso, "202402");

        let quarter = PeriodType::Quarterly.create_period(date(2024, 11, 3));
        assert_eq!(quarter.start, date(2024, 10, 1));
        assert_eq!(quarter.end, date(2024, 12, 31));
        assert_eq!(quarter.iso, "2024Q4");

        let weekly = PeriodType::Weekly.create_period(date(2024, 1, 3));
        assert_eq!(weekly.start, date(2024, 1, 1));
        assert_eq!(weekly.end, date(2024, 1, 7));
        assert_eq!(weekly.iso, "2024W1");
    }

    #[test]
    fn test_resolve_iso_strings() {
        let resolver = IsoPeriodResolver::new();

        let day = resolver.resolve_period("20240115").unwrap();
        assert_eq!(day.period_type, PeriodType::Daily);
        assert_eq!(day.start, date(2024, 1, 15));

        let half = resolver.resolve_period("2023S2").unwrap();
        assert_eq!(half.start, date(2023, 7, 1));
        assert_eq!(half.end, date(2023, 12, 31));

        let year = resolver.resolve_period("2022").unwrap();
        assert!(year.contains(date(2022, 6, 30)));

        assert!(resolver.resolve_period("2024Q5").is_none());
        assert!(resolver.resolve_period("not-a-period").is_none());
    }

    #[test]
    fn test_resolve_period_type_by_name() {
        let resolver = IsoPeriodResolver::new();
        assert_eq!(resolver.resolve_period_type("Monthly"), Some(PeriodType::Monthly));
        assert_eq!(resolver.resolve_period_type("BiWeekly"), None);
    }
}
