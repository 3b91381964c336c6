use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{DepartmentSummary, MonthlyAggregate, Rating, TopPerformer, YearMonth};

pub fn summarize_by_department(records: &[MonthlyAggregate]) -> Vec<DepartmentSummary> {
    let mut map: HashMap<&str, (usize, f64, f64, f64)> = HashMap::new();

    for record in records {
        let entry = map
            .entry(record.department.as_str())
            .or_insert((0, 0.0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += record.metrics.attendance_rate;
        entry.2 += record.metrics.kpi_completion;
        entry.3 += record.metrics.overtime_hours;
    }

    let mut summaries: Vec<DepartmentSummary> = map
        .into_iter()
        .map(|(department, (count, attendance, kpi, overtime))| {
            let n = count.max(1) as f64;
            DepartmentSummary {
                department: department.to_string(),
                employees: count,
                avg_attendance_rate: attendance / n,
                avg_kpi_completion: kpi / n,
                avg_overtime_hours: overtime / n,
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.employees
            .cmp(&a.employees)
            .then_with(|| a.department.cmp(&b.department))
    });
    summaries
}

pub fn rating_mix(records: &[MonthlyAggregate]) -> Vec<(Rating, usize)> {
    Rating::ALL
        .iter()
        .rev()
        .map(|rating| {
            let count = records
                .iter()
                .filter(|r| r.performance_rating == Some(*rating))
                .count();
            (*rating, count)
        })
        .collect()
}

pub fn build_report(
    month: YearMonth,
    records: &[MonthlyAggregate],
    top: Option<&TopPerformer>,
) -> String {
    let summaries = summarize_by_department(records);
    let mut output = String::new();

    let _ = writeln!(output, "# Monthly Performance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} employees rated)",
        month,
        records.iter().filter(|r| r.is_rated()).count()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Rating Mix");

    if records.is_empty() {
        let _ = writeln!(output, "No performance records for this month.");
    } else {
        for (rating, count) in rating_mix(records) {
            let _ = writeln!(output, "- {} ({}): {}", rating.value(), rating.label(), count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Departments");

    if summaries.is_empty() {
        let _ = writeln!(output, "No departments reported this month.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} employees, attendance {:.1}%, KPI {:.1}%, overtime {:.1}h",
                summary.department,
                summary.employees,
                summary.avg_attendance_rate,
                summary.avg_kpi_completion,
                summary.avg_overtime_hours
            );
        }
    }

    let mut lowest: Vec<&MonthlyAggregate> = records
        .iter()
        .filter(|r| r.performance_rating == Some(Rating::Poor))
        .collect();
    lowest.sort_by(|a, b| {
        a.metrics
            .kpi_completion
            .total_cmp(&b.metrics.kpi_completion)
            .then_with(|| a.employee_id.cmp(&b.employee_id))
    });
    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");

    if lowest.is_empty() {
        let _ = writeln!(output, "No employees rated poor this month.");
    } else {
        for record in lowest.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}, {}): attendance {:.1}%, KPI {:.1}%",
                record.employee_name,
                record.employee_id,
                record.department,
                record.metrics.attendance_rate,
                record.metrics.kpi_completion
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Performer (six months)");

    match top {
        Some(top) => {
            let _ = writeln!(
                output,
                "- {} ({}, {}) score {:.2} through {}",
                top.employee_name, top.employee_id, top.department, top.score, top.latest_month
            );
        }
        None => {
            let _ = writeln!(output, "No performance data available.");
        }
    }

    output
}
