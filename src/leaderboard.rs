use std::collections::HashMap;

use crate::models::{EmployeeScore, MonthlyAggregate, MonthlyMetrics, TopPerformer, YearMonth};

pub const WINDOW_MONTHS: u32 = 6;
pub const OVERTIME_CAP_HOURS: f64 = 10.0;

pub fn leaderboard_score(metrics: &MonthlyMetrics) -> f64 {
    metrics.attendance_rate * 0.40
        + metrics.kpi_completion * 0.40
        + metrics.overtime_hours.min(OVERTIME_CAP_HOURS) * 2.0
}

pub fn latest_month(records: &[MonthlyAggregate]) -> Option<YearMonth> {
    records.iter().map(|r| r.year_month).max()
}

/// First month of the six-month window ending at `latest`.
pub fn window_start(latest: YearMonth) -> YearMonth {
    latest.minus_months(WINDOW_MONTHS - 1)
}

/// Accumulated scores for everyone with a record in the window ending at the
/// latest month, highest first. Equal scores order by employee id.
pub fn rank_window(records: &[MonthlyAggregate]) -> Option<(YearMonth, Vec<EmployeeScore>)> {
    let latest = latest_month(records)?;
    let start = window_start(latest);

    let mut in_window: Vec<&MonthlyAggregate> = records
        .iter()
        .filter(|r| r.year_month >= start && r.year_month <= latest)
        .collect();
    // oldest first so the newest name and department win
    in_window.sort_by_key(|r| r.year_month);

    let mut scores: HashMap<&str, EmployeeScore> = HashMap::new();
    for record in in_window {
        let entry = scores
            .entry(record.employee_id.as_str())
            .or_insert_with(|| EmployeeScore {
                employee_id: record.employee_id.clone(),
                employee_name: String::new(),
                department: String::new(),
                score: 0.0,
                months_counted: 0,
            });
        entry.employee_name = record.employee_name.clone();
        entry.department = record.department.clone();
        entry.score += leaderboard_score(&record.metrics);
        entry.months_counted += 1;
    }

    let mut ranked: Vec<EmployeeScore> = scores.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.employee_id.cmp(&b.employee_id))
    });
    Some((latest, ranked))
}

/// The single highest scorer of the six-month window, or `None` when there
/// is no data or nobody scored above zero.
pub fn top_performer(records: &[MonthlyAggregate]) -> Option<TopPerformer> {
    let (latest_month, ranked) = rank_window(records)?;
    let best = ranked.into_iter().next().filter(|best| best.score > 0.0)?;
    tracing::debug!(
        employee_id = %best.employee_id,
        score = best.score,
        %latest_month,
        "top performer"
    );

    Some(TopPerformer {
        employee_id: best.employee_id,
        employee_name: best.employee_name,
        department: best.department,
        score: best.score,
        latest_month,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        employee_id: &str,
        month: &str,
        attendance_rate: f64,
        kpi_completion: f64,
        overtime_hours: f64,
    ) -> MonthlyAggregate {
        MonthlyAggregate {
            employee_id: employee_id.to_string(),
            employee_name: format!("Name {employee_id}"),
            department: "R&D".to_string(),
            year_month: month.parse().unwrap(),
            metrics: MonthlyMetrics {
                attendance_rate,
                kpi_completion,
                overtime_hours,
            },
            performance_rating: None,
            rating_source: None,
        }
    }

    #[test]
    fn no_data_has_no_winner() {
        assert!(top_performer(&[]).is_none());
    }

    #[test]
    fn all_zero_window_has_no_winner() {
        let records = vec![
            record("EMP001", "2024-06", 0.0, 0.0, 0.0),
            record("EMP002", "2024-05", 0.0, 0.0, 0.0),
        ];
        assert!(top_performer(&records).is_none());
        // still ranked, just not a winner
        assert_eq!(rank_window(&records).unwrap().1.len(), 2);
    }

    #[test]
    fn single_perfect_month_scores_one_hundred() {
        let top = top_performer(&[record("EMP001", "2024-06", 100.0, 100.0, 20.0)]).unwrap();
        assert_eq!(top.employee_id, "EMP001");
        assert!((top.score - 100.0).abs() < 1e-9);
        assert_eq!(top.latest_month.to_string(), "2024-06");
    }

    #[test]
    fn window_spans_six_months_including_latest() {
        let latest: YearMonth = "2024-03".parse().unwrap();
        assert_eq!(window_start(latest).to_string(), "2023-10");
    }

    #[test]
    fn scores_accumulate_inside_window_only() {
        let records = vec![
            record("EMP001", "2024-06", 50.0, 50.0, 0.0),
            record("EMP001", "2024-01", 50.0, 50.0, 0.0),
            // outside the window
            record("EMP001", "2023-12", 100.0, 100.0, 10.0),
            record("EMP002", "2024-06", 90.0, 90.0, 5.0),
        ];
        let (latest, ranked) = rank_window(&records).unwrap();
        assert_eq!(latest.to_string(), "2024-06");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].employee_id, "EMP002");
        assert!((ranked[0].score - 82.0).abs() < 1e-9);
        assert_eq!(ranked[1].employee_id, "EMP001");
        assert!((ranked[1].score - 80.0).abs() < 1e-9);
        assert_eq!(ranked[1].months_counted, 2);
    }

    #[test]
    fn overtime_is_capped() {
        let metrics = MonthlyMetrics {
            attendance_rate: 0.0,
            kpi_completion: 0.0,
            overtime_hours: 45.0,
        };
        assert_eq!(leaderboard_score(&metrics), 20.0);
    }

    #[test]
    fn ties_go_to_the_smallest_employee_id() {
        let records = vec![
            record("EMP010", "2024-06", 80.0, 80.0, 0.0),
            record("EMP002", "2024-06", 80.0, 80.0, 0.0),
            record("EMP005", "2024-06", 80.0, 80.0, 0.0),
        ];
        assert_eq!(top_performer(&records).unwrap().employee_id, "EMP002");
    }

    #[test]
    fn newest_name_and_department_are_reported() {
        let mut old = record("EMP001", "2024-01", 90.0, 90.0, 0.0);
        old.department = "Marketing".to_string();
        let new = record("EMP001", "2024-05", 90.0, 90.0, 0.0);

        let top = top_performer(&[new, old]).unwrap();
        assert_eq!(top.department, "R&D");
    }
}
