use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::RatingError;
use crate::models::{Attendance, DailyRecord, YearMonth};

pub const EXPECTED_HEADERS: [&str; 9] = [
    "Date",
    "EmployeeID",
    "EmployeeName",
    "Department",
    "Attendance",
    "LateEarlyMinutes",
    "OvertimeHours",
    "TotalTasks",
    "CompletedTasks",
];

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: Option<String>,
    #[serde(rename = "EmployeeID")]
    employee_id: Option<String>,
    #[serde(rename = "EmployeeName")]
    employee_name: Option<String>,
    #[serde(rename = "Department")]
    department: Option<String>,
    #[serde(rename = "Attendance")]
    attendance: Option<String>,
    #[serde(rename = "LateEarlyMinutes")]
    late_early_minutes: Option<String>,
    #[serde(rename = "OvertimeHours")]
    overtime_hours: Option<String>,
    #[serde(rename = "TotalTasks")]
    total_tasks: Option<String>,
    #[serde(rename = "CompletedTasks")]
    completed_tasks: Option<String>,
}

#[derive(Debug, Default)]
pub struct ImportedBatch {
    pub records: Vec<DailyRecord>,
    pub skipped: Vec<RatingError>,
}

impl ImportedBatch {
    /// Distinct months covered by the batch, oldest first.
    pub fn months(&self) -> Vec<YearMonth> {
        let mut months: Vec<YearMonth> = self.records.iter().map(|r| r.year_month()).collect();
        months.sort();
        months.dedup();
        months
    }
}

pub fn read_csv(path: &Path) -> anyhow::Result<ImportedBatch> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_daily_records(file).with_context(|| format!("failed to import {}", path.display()))
}

/// Parses a daily log. Bad headers fail the whole file; a bad row is
/// skipped and reported.
pub fn read_daily_records<R: Read>(input: R) -> anyhow::Result<ImportedBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    let matches = headers.len() >= EXPECTED_HEADERS.len()
        && EXPECTED_HEADERS
            .iter()
            .zip(headers.iter())
            .all(|(expected, actual)| *expected == actual);
    if !matches {
        anyhow::bail!(
            "unexpected header row, expected: {}",
            EXPECTED_HEADERS.join(", ")
        );
    }

    let mut batch = ImportedBatch::default();
    for result in reader.records() {
        let parsed = result.map_err(|err| RatingError::MalformedRecord {
            line: err.position().map(|p| p.line()).unwrap_or(0),
            reason: err.to_string(),
        });
        let parsed = parsed.and_then(|row| {
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            row.deserialize::<CsvRow>(Some(&headers))
                .map_err(|err| err.to_string())
                .and_then(to_daily_record)
                .map_err(|reason| RatingError::MalformedRecord { line, reason })
        });

        match parsed {
            Ok(record) => batch.records.push(record),
            Err(err) => {
                tracing::warn!(error = %err, "skipping daily record");
                batch.skipped.push(err);
            }
        }
    }

    tracing::info!(
        records = batch.records.len(),
        skipped = batch.skipped.len(),
        "read daily records"
    );
    Ok(batch)
}

fn to_daily_record(row: CsvRow) -> Result<DailyRecord, String> {
    let date = required(row.date, "Date")?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| format!("invalid date {date:?}"))?;
    let employee_id = required(row.employee_id, "EmployeeID")?;
    let attendance: Attendance = required(row.attendance, "Attendance")?.parse()?;

    Ok(DailyRecord::new(
        employee_id,
        row.employee_name.unwrap_or_default(),
        row.department.unwrap_or_default(),
        date,
        attendance,
        lenient_int(row.late_early_minutes),
        lenient_float(row.overtime_hours),
        lenient_int(row.total_tasks),
        lenient_int(row.completed_tasks),
    ))
}

fn required(value: Option<String>, column: &str) -> Result<String, String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing {column}"))
}

// Unparseable numbers count as missing.
fn lenient_int(value: Option<String>) -> Option<i64> {
    let value = value?;
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
}

fn lenient_float(value: Option<String>) -> Option<f64> {
    value?.parse::<f64>().ok()
}
