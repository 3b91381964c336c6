//! Brute-force k-nearest-neighbor rating classifier.
//!
//! A fitted [`KnnModel`] is a plain value: it is built fresh from a training
//! set and owned by whoever fitted it. Nothing is cached between batches.

use crate::config::RatingConfig;
use crate::error::RatingError;
use crate::models::{MonthlyMetrics, Rating, TrainingSample};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceMetric {
    /// Plain Euclidean distance over the raw feature triple.
    Euclidean,
    /// Per-feature weighted Euclidean distance. Overtime is rescaled so that
    /// `max_overtime_hours` lands at 100, matching the percentage features.
    Weighted {
        weights: [f64; 3],
        overtime_scale: f64,
    },
}

impl DistanceMetric {
    pub fn from_config(config: &RatingConfig) -> Self {
        if !config.weighted_distance {
            return DistanceMetric::Euclidean;
        }
        DistanceMetric::Weighted {
            weights: [
                config.attendance_weight,
                config.kpi_weight,
                config.overtime_weight,
            ],
            overtime_scale: 100.0 / config.max_overtime_hours,
        }
    }

    pub fn distance(&self, a: &[f64; 3], b: &[f64; 3]) -> f64 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Weighted {
                weights,
                overtime_scale,
            } => {
                let scale = [1.0, 1.0, *overtime_scale];
                (0..3)
                    .map(|i| weights[i] * ((a[i] - b[i]) * scale[i]).powi(2))
                    .sum::<f64>()
                    .sqrt()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
    pub rating: Rating,
}

#[derive(Debug, Clone)]
pub struct KnnModel {
    samples: Vec<TrainingSample>,
    k: usize,
    metric: DistanceMetric,
}

impl KnnModel {
    pub fn fit(
        samples: Vec<TrainingSample>,
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Self, RatingError> {
        if samples.is_empty() {
            return Err(RatingError::InsufficientData);
        }
        if samples
            .iter()
            .any(|s| s.metrics.as_array().iter().any(|v| !v.is_finite()))
        {
            return Err(RatingError::NonFiniteFeature);
        }

        tracing::debug!(samples = samples.len(), k, ?metric, "fitted knn model");
        Ok(Self {
            samples,
            k: k.max(1),
            metric,
        })
    }

    /// The `k` closest training samples, nearest first. Equal distances keep
    /// training-set order.
    pub fn neighbors(&self, query: &[f64; 3]) -> Result<Vec<Neighbor>, RatingError> {
        if query.iter().any(|v| !v.is_finite()) {
            return Err(RatingError::NonFiniteFeature);
        }

        let mut scored: Vec<Neighbor> = self
            .samples
            .iter()
            .enumerate()
            .map(|(index, sample)| Neighbor {
                index,
                distance: self.metric.distance(query, &sample.metrics.as_array()),
                rating: sample.rating,
            })
            .collect();
        if scored.iter().any(|n| !n.distance.is_finite()) {
            return Err(RatingError::NonFiniteFeature);
        }
        // stable sort
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(self.k);
        Ok(scored)
    }

    pub fn predict(
        &self,
        attendance_rate: f64,
        kpi_completion: f64,
        overtime_hours: f64,
    ) -> Result<Rating, RatingError> {
        let neighbors = self.neighbors(&[attendance_rate, kpi_completion, overtime_hours])?;
        if neighbors.is_empty() {
            return Err(RatingError::InsufficientData);
        }

        let mean = neighbors
            .iter()
            .map(|n| f64::from(n.rating.value()))
            .sum::<f64>()
            / neighbors.len() as f64;
        Ok(Rating::from_mean(mean))
    }

    pub fn predict_metrics(&self, metrics: &MonthlyMetrics) -> Result<Rating, RatingError> {
        self.predict(
            metrics.attendance_rate,
            metrics.kpi_completion,
            metrics.overtime_hours,
        )
    }
}

/// Predicts with a model that may not have been fitted.
pub fn predict(model: Option<&KnnModel>, metrics: &MonthlyMetrics) -> Result<Rating, RatingError> {
    model
        .ok_or(RatingError::NotFitted)?
        .predict_metrics(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::seed_samples;
    use proptest::prelude::*;

    fn sample(a: f64, k: f64, o: f64, rating: Rating) -> TrainingSample {
        TrainingSample {
            metrics: MonthlyMetrics {
                attendance_rate: a,
                kpi_completion: k,
                overtime_hours: o,
            },
            rating,
        }
    }

    fn seed_model(k: usize) -> KnnModel {
        KnnModel::fit(seed_samples(), k, DistanceMetric::Euclidean).unwrap()
    }

    #[test]
    fn fit_rejects_empty_training_set() {
        let err = KnnModel::fit(Vec::new(), 3, DistanceMetric::Euclidean).unwrap_err();
        assert!(matches!(err, RatingError::InsufficientData));
    }

    #[test]
    fn predict_without_model_is_not_fitted() {
        let metrics = MonthlyMetrics {
            attendance_rate: 90.0,
            kpi_completion: 90.0,
            overtime_hours: 0.0,
        };
        assert!(matches!(predict(None, &metrics), Err(RatingError::NotFitted)));
    }

    #[test]
    fn seed_query_for_top_sample_is_excellent() {
        let model = seed_model(3);
        let neighbors = model.neighbors(&[95.0, 92.0, 10.0]).unwrap();
        let indices: Vec<usize> = neighbors.iter().map(|n| n.index).collect();
        // (95,92,10), (90,80,5), (85,95,20)
        assert_eq!(indices, vec![0, 1, 3]);
        assert_eq!(model.predict(95.0, 92.0, 10.0).unwrap(), Rating::Excellent);
    }

    #[test]
    fn seed_query_near_poor_samples_is_poor() {
        let model = seed_model(3);
        assert_eq!(model.predict(72.0, 62.0, 0.0).unwrap(), Rating::Poor);
    }

    #[test]
    fn k_larger_than_training_set_averages_everything() {
        let model = KnnModel::fit(
            vec![
                sample(90.0, 90.0, 0.0, Rating::Excellent),
                sample(10.0, 10.0, 0.0, Rating::Poor),
            ],
            10,
            DistanceMetric::Euclidean,
        )
        .unwrap();
        // mean 2.0
        assert_eq!(model.predict(90.0, 90.0, 0.0).unwrap(), Rating::Good);
    }

    #[test]
    fn ties_keep_training_order() {
        let model = KnnModel::fit(
            vec![
                sample(50.0, 50.0, 0.0, Rating::Poor),
                sample(50.0, 50.0, 0.0, Rating::Excellent),
            ],
            1,
            DistanceMetric::Euclidean,
        )
        .unwrap();
        assert_eq!(model.predict(50.0, 50.0, 0.0).unwrap(), Rating::Poor);
    }

    #[test]
    fn non_finite_query_is_an_error() {
        let model = seed_model(3);
        assert!(matches!(
            model.predict(f64::NAN, 90.0, 0.0),
            Err(RatingError::NonFiniteFeature)
        ));
    }

    #[test]
    fn weighted_metric_changes_the_neighborhood() {
        let samples = vec![
            sample(70.0, 50.0, 0.0, Rating::Poor),
            sample(50.0, 72.0, 0.0, Rating::Excellent),
        ];
        let query = [70.0, 72.0, 0.0];

        let plain = KnnModel::fit(samples.clone(), 1, DistanceMetric::Euclidean).unwrap();
        assert_eq!(plain.predict(70.0, 72.0, 0.0).unwrap(), Rating::Excellent);

        let attendance_heavy = DistanceMetric::Weighted {
            weights: [1.0, 0.01, 0.0],
            overtime_scale: 2.5,
        };
        let weighted = KnnModel::fit(samples, 1, attendance_heavy).unwrap();
        assert_eq!(weighted.neighbors(&query).unwrap()[0].index, 0);
    }

    #[test]
    fn fit_rejects_non_finite_samples() {
        let err = KnnModel::fit(
            vec![
                sample(90.0, 90.0, 0.0, Rating::Excellent),
                sample(f64::INFINITY, 50.0, 0.0, Rating::Poor),
            ],
            3,
            DistanceMetric::Euclidean,
        )
        .unwrap_err();
        assert!(matches!(err, RatingError::NonFiniteFeature));
    }

    #[test]
    fn negative_weight_distance_is_rejected() {
        let metric = DistanceMetric::Weighted {
            weights: [-0.4, 0.5, 0.1],
            overtime_scale: 2.5,
        };
        let model = KnnModel::fit(seed_samples(), 3, metric).unwrap();
        assert!(matches!(
            model.neighbors(&[100.0, 50.0, 0.0]),
            Err(RatingError::NonFiniteFeature)
        ));
        assert!(matches!(
            model.predict(100.0, 50.0, 0.0),
            Err(RatingError::NonFiniteFeature)
        ));
    }

    #[test]
    fn weighted_metric_from_config() {
        let mut config = RatingConfig::default();
        assert_eq!(DistanceMetric::from_config(&config), DistanceMetric::Euclidean);

        config.weighted_distance = true;
        match DistanceMetric::from_config(&config) {
            DistanceMetric::Weighted {
                weights,
                overtime_scale,
            } => {
                assert_eq!(weights, [0.4, 0.5, 0.1]);
                assert_eq!(overtime_scale, 2.5);
            }
            other => panic!("expected weighted metric, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn prediction_is_always_a_valid_rating(
            a in 0.0f64..=100.0,
            k_pct in 0.0f64..=100.0,
            o in 0.0f64..=80.0,
            k in 1usize..12,
        ) {
            let rating = seed_model(k).predict(a, k_pct, o).unwrap();
            prop_assert!((1..=3).contains(&rating.value()));
        }
    }
}
