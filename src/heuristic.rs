use crate::models::{MonthlyMetrics, Rating};

const ATTENDANCE_SHARE: f64 = 0.40;
const KPI_SHARE: f64 = 0.60;

/// Weighted score on a 0-100 scale. Overtime does not contribute.
pub fn weighted_score(attendance_rate: f64, kpi_completion: f64) -> f64 {
    attendance_rate * ATTENDANCE_SHARE + kpi_completion * KPI_SHARE
}

pub fn rate(attendance_rate: f64, kpi_completion: f64) -> Rating {
    match weighted_score(attendance_rate, kpi_completion) {
        score if score >= 85.0 => Rating::Excellent,
        score if score >= 70.0 => Rating::Good,
        _ => Rating::Poor,
    }
}

pub fn rate_metrics(metrics: &MonthlyMetrics) -> Rating {
    rate(metrics.attendance_rate, metrics.kpi_completion)
}

/// Label for a synthesized training sample, or `None` when the month
/// carries no signal at all.
pub fn training_label(metrics: &MonthlyMetrics) -> Option<Rating> {
    if metrics.attendance_rate == 0.0 && metrics.kpi_completion == 0.0 {
        return None;
    }
    Some(rate_metrics(metrics))
}
