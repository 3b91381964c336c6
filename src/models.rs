use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::RatingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attendance {
    Present,
    Absent,
}

impl Attendance {
    pub fn as_flag(&self) -> &'static str {
        match self {
            Attendance::Present => "Y",
            Attendance::Absent => "N",
        }
    }
}

impl FromStr for Attendance {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "Y" | "YES" => Ok(Attendance::Present),
            "N" | "NO" => Ok(Attendance::Absent),
            "" => Err("attendance flag is empty".to_string()),
            other => Err(format!("unknown attendance flag {other:?}")),
        }
    }
}

/// Calendar month without a day component, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        // year/month are validated on construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn minus_months(&self, months: u32) -> Self {
        let index = self.year * 12 + (self.month as i32 - 1) - months as i32;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (year, month) = value
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {value:?}"))?;
        let year: i32 = year.parse().map_err(|_| format!("invalid year in {value:?}"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in {value:?}"))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range in {value:?}"))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One employee's attendance and task log for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRecord {
    pub employee_id: String,
    pub employee_name: String,
    pub department: String,
    pub date: NaiveDate,
    pub attendance: Attendance,
    pub late_early_minutes: u32,
    pub overtime_hours: f64,
    pub total_tasks: u32,
    pub completed_tasks: u32,
}

impl DailyRecord {
    /// Builds a record, treating missing or negative numeric fields as zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        employee_id: impl Into<String>,
        employee_name: impl Into<String>,
        department: impl Into<String>,
        date: NaiveDate,
        attendance: Attendance,
        late_early_minutes: Option<i64>,
        overtime_hours: Option<f64>,
        total_tasks: Option<i64>,
        completed_tasks: Option<i64>,
    ) -> Self {
        Self {
            employee_id: employee_id.into(),
            employee_name: employee_name.into(),
            department: department.into(),
            date,
            attendance,
            late_early_minutes: non_negative_count(late_early_minutes),
            overtime_hours: overtime_hours
                .filter(|hours| hours.is_finite() && *hours > 0.0)
                .unwrap_or(0.0),
            total_tasks: non_negative_count(total_tasks),
            completed_tasks: non_negative_count(completed_tasks),
        }
    }

    pub fn year_month(&self) -> YearMonth {
        YearMonth::from_date(self.date)
    }

    pub fn is_workday(&self) -> bool {
        !matches!(self.date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

fn non_negative_count(value: Option<i64>) -> u32 {
    value
        .map(|v| v.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Rating {
    Poor = 1,
    Good = 2,
    Excellent = 3,
}

impl Rating {
    pub const ALL: [Rating; 3] = [Rating::Poor, Rating::Good, Rating::Excellent];

    /// Rounds an averaged label to the nearest rating, clamped to 1..=3.
    pub fn from_mean(mean: f64) -> Self {
        match mean.round() {
            v if v >= 3.0 => Rating::Excellent,
            v if v >= 2.0 => Rating::Good,
            _ => Rating::Poor,
        }
    }

    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rating::Poor => "poor",
            Rating::Good => "good",
            Rating::Excellent => "excellent",
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.value()
    }
}

impl TryFrom<u8> for Rating {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rating::Poor),
            2 => Ok(Rating::Good),
            3 => Ok(Rating::Excellent),
            other => Err(format!("rating must be 1, 2 or 3, got {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingSource {
    Classifier,
    Heuristic,
}

impl RatingSource {
    pub fn db_value(&self) -> &'static str {
        match self {
            RatingSource::Classifier => "classifier",
            RatingSource::Heuristic => "heuristic",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "classifier" => Some(RatingSource::Classifier),
            "heuristic" => Some(RatingSource::Heuristic),
            _ => None,
        }
    }
}

/// The three normalized monthly features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyMetrics {
    pub attendance_rate: f64,
    pub kpi_completion: f64,
    pub overtime_hours: f64,
}

impl MonthlyMetrics {
    pub fn new(
        attendance_rate: f64,
        kpi_completion: f64,
        overtime_hours: f64,
    ) -> Result<Self, RatingError> {
        check_percentage("attendance_rate", attendance_rate)?;
        check_percentage("kpi_completion", kpi_completion)?;
        if !overtime_hours.is_finite() || overtime_hours < 0.0 {
            return Err(RatingError::OutOfRange {
                field: "overtime_hours",
                value: overtime_hours,
            });
        }

        Ok(Self {
            attendance_rate,
            kpi_completion,
            overtime_hours,
        })
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.attendance_rate, self.kpi_completion, self.overtime_hours]
    }
}

fn check_percentage(field: &'static str, value: f64) -> Result<(), RatingError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(RatingError::OutOfRange { field, value })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub employee_id: String,
    pub employee_name: String,
    pub department: String,
    pub year_month: YearMonth,
    #[serde(flatten)]
    pub metrics: MonthlyMetrics,
    pub performance_rating: Option<Rating>,
    pub rating_source: Option<RatingSource>,
}

impl MonthlyAggregate {
    pub fn assign_rating(&mut self, rating: Rating, source: RatingSource) {
        self.performance_rating = Some(rating);
        self.rating_source = Some(source);
    }

    pub fn is_rated(&self) -> bool {
        self.performance_rating.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSample {
    pub metrics: MonthlyMetrics,
    pub rating: Rating,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmployeeScore {
    pub employee_id: String,
    pub employee_name: String,
    pub department: String,
    pub score: f64,
    pub months_counted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopPerformer {
    pub employee_id: String,
    pub employee_name: String,
    pub department: String,
    pub score: f64,
    pub latest_month: YearMonth,
}

#[derive(Debug, Clone)]
pub struct DepartmentSummary {
    pub department: String,
    pub employees: usize,
    pub avg_attendance_rate: f64,
    pub avg_kpi_completion: f64,
    pub avg_overtime_hours: f64,
}

/// Filters for browsing stored monthly records. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct MonthlySearch {
    pub employee_id: Option<String>,
    /// Case-insensitive substring of the employee name
    pub name: Option<String>,
    pub month: Option<YearMonth>,
}

impl MonthlySearch {
    /// `ILIKE` pattern for the name filter with wildcards in the input escaped.
    pub fn name_pattern(&self) -> Option<String> {
        let name = self.name.as_deref()?.trim();
        if name.is_empty() {
            return None;
        }
        let mut pattern = String::with_capacity(name.len() + 2);
        pattern.push('%');
        for c in name.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        Some(pattern)
    }

    pub fn employee_id(&self) -> Option<&str> {
        self.employee_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_month_steps_back_across_years() {
        let march = YearMonth::new(2024, 3).unwrap();
        assert_eq!(march.minus_months(2).to_string(), "2024-01");
        assert_eq!(march.minus_months(3).to_string(), "2023-12");
        assert_eq!(march.minus_months(15).to_string(), "2022-12");
    }

    #[test]
    fn year_month_parses_and_orders() {
        let a: YearMonth = "2023-12".parse().unwrap();
        let b: YearMonth = "2024-01".parse().unwrap();
        assert!(a < b);
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("202401".parse::<YearMonth>().is_err());
    }

    #[test]
    fn daily_record_zeroes_missing_and_negative_numbers() {
        let record = DailyRecord::new(
            "EMP001",
            "John Smith",
            "R&D",
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            Attendance::Present,
            None,
            Some(-2.0),
            Some(-1),
            None,
        );
        assert_eq!(record.late_early_minutes, 0);
        assert_eq!(record.overtime_hours, 0.0);
        assert_eq!(record.total_tasks, 0);
        assert_eq!(record.completed_tasks, 0);
    }

    #[test]
    fn attendance_flag_parsing() {
        assert_eq!("y".parse::<Attendance>().unwrap(), Attendance::Present);
        assert_eq!(" N ".parse::<Attendance>().unwrap(), Attendance::Absent);
        assert!("".parse::<Attendance>().is_err());
        assert!("maybe".parse::<Attendance>().is_err());
    }

    #[test]
    fn rating_from_mean_rounds_and_clamps() {
        assert_eq!(Rating::from_mean(2.67), Rating::Excellent);
        assert_eq!(Rating::from_mean(2.5), Rating::Excellent);
        assert_eq!(Rating::from_mean(2.33), Rating::Good);
        assert_eq!(Rating::from_mean(1.49), Rating::Poor);
        assert_eq!(Rating::from_mean(-4.0), Rating::Poor);
        assert_eq!(Rating::from_mean(7.0), Rating::Excellent);
    }

    #[test]
    fn metrics_reject_out_of_range_values() {
        assert!(MonthlyMetrics::new(100.0, 0.0, 0.0).is_ok());
        assert!(MonthlyMetrics::new(100.1, 50.0, 0.0).is_err());
        assert!(MonthlyMetrics::new(50.0, f64::NAN, 0.0).is_err());
        assert!(MonthlyMetrics::new(50.0, 50.0, -1.0).is_err());
    }

    #[test]
    fn search_name_becomes_escaped_substring_pattern() {
        let search = MonthlySearch {
            name: Some(" Ann ".to_string()),
            ..MonthlySearch::default()
        };
        assert_eq!(search.name_pattern().as_deref(), Some("%Ann%"));

        let search = MonthlySearch {
            name: Some("50%_off\\".to_string()),
            ..MonthlySearch::default()
        };
        assert_eq!(search.name_pattern().as_deref(), Some("%50\\%\\_off\\\\%"));
    }

    #[test]
    fn blank_search_filters_match_anything() {
        let search = MonthlySearch {
            employee_id: Some("  ".to_string()),
            name: Some(String::new()),
            month: None,
        };
        assert_eq!(search.employee_id(), None);
        assert_eq!(search.name_pattern(), None);
        assert_eq!(MonthlySearch::default().employee_id(), None);
    }

    #[test]
    fn rating_serializes_as_integer() {
        let json = serde_json::to_string(&Rating::Good).unwrap();
        assert_eq!(json, "2");
        let parsed: Rating = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, Rating::Excellent);
        assert!(serde_json::from_str::<Rating>("4").is_err());
    }
}
