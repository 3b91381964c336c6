//! Training-set assembly for the rating classifier.

use std::fmt;

use crate::aggregate::{group_by_employee_month, monthly_metrics};
use crate::heuristic;
use crate::models::{DailyRecord, MonthlyAggregate, MonthlyMetrics, Rating, TrainingSample};

/// Labeled samples required before daily history is trusted on its own.
pub const MIN_DAILY_SAMPLES: usize = 10;

/// Below this many raw daily records the built-in seed set is used instead.
pub const SEED_HISTORY_THRESHOLD: usize = 20;

const SEED_TABLE: [(f64, f64, f64, Rating); 8] = [
    (95.0, 92.0, 10.0, Rating::Excellent),
    (90.0, 80.0, 5.0, Rating::Good),
    (70.0, 65.0, 0.0, Rating::Poor),
    (85.0, 95.0, 20.0, Rating::Excellent),
    (92.0, 70.0, 8.0, Rating::Good),
    (80.0, 80.0, 0.0, Rating::Good),
    (75.0, 90.0, 10.0, Rating::Good),
    (80.0, 60.0, 0.0, Rating::Poor),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingSource {
    DailyHistory,
    SyntheticSeed,
    MonthlyHistory,
}

impl fmt::Display for TrainingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainingSource::DailyHistory => "daily history",
            TrainingSource::SyntheticSeed => "synthetic seed",
            TrainingSource::MonthlyHistory => "monthly history",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub source: TrainingSource,
    pub samples: Vec<TrainingSample>,
}

/// Hand-authored samples spanning the feature space.
pub fn seed_samples() -> Vec<TrainingSample> {
    SEED_TABLE
        .iter()
        .map(|&(attendance_rate, kpi_completion, overtime_hours, rating)| TrainingSample {
            metrics: MonthlyMetrics {
                attendance_rate,
                kpi_completion,
                overtime_hours,
            },
            rating,
        })
        .collect()
}

/// One heuristically labeled sample per employee-month of history. Months
/// with no signal produce no sample.
pub fn from_daily_history(records: &[DailyRecord]) -> Vec<TrainingSample> {
    group_by_employee_month(records)
        .into_iter()
        .filter_map(|((employee_id, year_month), group)| {
            let metrics = monthly_metrics(group.iter().copied());
            let rating = heuristic::training_label(&metrics);
            if rating.is_none() {
                tracing::trace!(%employee_id, month = %year_month, "no label for month");
            }
            rating.map(|rating| TrainingSample { metrics, rating })
        })
        .collect()
}

/// Rated monthly records used as-is. Unrated or out-of-range rows are left out.
pub fn from_monthly_history(records: &[MonthlyAggregate]) -> Vec<TrainingSample> {
    records
        .iter()
        .filter_map(|record| {
            let rating = record.performance_rating?;
            let m = &record.metrics;
            match MonthlyMetrics::new(m.attendance_rate, m.kpi_completion, m.overtime_hours) {
                Ok(metrics) => Some(TrainingSample { metrics, rating }),
                Err(err) => {
                    tracing::warn!(
                        employee_id = %record.employee_id,
                        month = %record.year_month,
                        error = %err,
                        "skipping monthly record for training"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Picks the training set by policy: daily history, then the seed set,
/// then rated monthly history. `None` means no classifier can be trained.
pub fn build(
    daily_history: &[DailyRecord],
    monthly_history: &[MonthlyAggregate],
    allow_seed: bool,
) -> Option<TrainingSet> {
    let daily = from_daily_history(daily_history);
    if daily.len() >= MIN_DAILY_SAMPLES {
        return Some(TrainingSet {
            source: TrainingSource::DailyHistory,
            samples: daily,
        });
    }
    tracing::debug!(
        raw_records = daily_history.len(),
        samples = daily.len(),
        "daily history too thin for training"
    );

    if allow_seed && daily_history.len() < SEED_HISTORY_THRESHOLD {
        return Some(TrainingSet {
            source: TrainingSource::SyntheticSeed,
            samples: seed_samples(),
        });
    }

    let monthly = from_monthly_history(monthly_history);
    if !monthly.is_empty() {
        return Some(TrainingSet {
            source: TrainingSource::MonthlyHistory,
            samples: monthly,
        });
    }

    None
}
