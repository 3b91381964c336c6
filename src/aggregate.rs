//! Daily-to-monthly feature aggregation.
//!
//! Attendance is measured over workdays only; KPI completion and overtime
//! are summed over every record of the month, weekends included.

use std::collections::BTreeMap;

use crate::models::{Attendance, DailyRecord, MonthlyAggregate, MonthlyMetrics, YearMonth};

pub const WORKDAY_HOURS: f64 = 8.0;

/// Reduces one employee-month of daily records to its three metrics.
pub fn monthly_metrics<'a, I>(records: I) -> MonthlyMetrics
where
    I: IntoIterator<Item = &'a DailyRecord>,
{
    let mut expected_hours = 0.0;
    let mut effective_hours = 0.0;
    let mut total_tasks: u64 = 0;
    let mut completed_tasks: u64 = 0;
    let mut overtime_hours = 0.0;

    for record in records {
        if record.is_workday() {
            expected_hours += WORKDAY_HOURS;
            effective_hours += effective_workday_hours(record);
        }
        total_tasks += u64::from(record.total_tasks);
        completed_tasks += u64::from(record.completed_tasks);
        overtime_hours += record.overtime_hours;
    }

    let attendance_rate = if expected_hours > 0.0 {
        round1(effective_hours / expected_hours * 100.0)
    } else {
        0.0
    };
    let kpi_completion = if total_tasks > 0 {
        round1(completed_tasks as f64 / total_tasks as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    MonthlyMetrics {
        attendance_rate,
        kpi_completion,
        overtime_hours: round1(overtime_hours),
    }
}

fn effective_workday_hours(record: &DailyRecord) -> f64 {
    match record.attendance {
        Attendance::Present => {
            (WORKDAY_HOURS - f64::from(record.late_early_minutes) / 60.0).max(0.0)
        }
        Attendance::Absent => 0.0,
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Groups daily records by employee and month.
///
/// Groups come back ordered by `(employee_id, year_month)`; records inside a
/// group keep their input order.
pub fn group_by_employee_month(
    records: &[DailyRecord],
) -> BTreeMap<(String, YearMonth), Vec<&DailyRecord>> {
    let mut groups: BTreeMap<(String, YearMonth), Vec<&DailyRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.employee_id.clone(), record.year_month()))
            .or_default()
            .push(record);
    }
    groups
}

/// Produces one unrated aggregate per distinct employee-month in the input.
pub fn aggregate(records: &[DailyRecord]) -> Vec<MonthlyAggregate> {
    group_by_employee_month(records)
        .into_iter()
        .filter_map(|((employee_id, year_month), group)| {
            let first = group.first()?;
            let metrics = monthly_metrics(group.iter().copied());
            tracing::debug!(
                employee_id = %employee_id,
                month = %year_month,
                records = group.len(),
                workdays = group.iter().filter(|r| r.is_workday()).count(),
                attendance_rate = metrics.attendance_rate,
                kpi_completion = metrics.kpi_completion,
                overtime_hours = metrics.overtime_hours,
                "aggregated month"
            );

            Some(MonthlyAggregate {
                employee_name: first.employee_name.clone(),
                department: first.department.clone(),
                employee_id,
                year_month,
                metrics,
                performance_rating: None,
                rating_source: None,
            })
        })
        .collect()
}
