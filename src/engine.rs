//! Batch rating: aggregate, train, classify, fall back.
//!
//! Every run fits its own classifier. A run never fails because of the
//! classifier; records it cannot classify get the heuristic rating.

use crate::aggregate;
use crate::config::RatingConfig;
use crate::error::RatingError;
use crate::heuristic;
use crate::knn::{self, DistanceMetric, KnnModel};
use crate::models::{DailyRecord, MonthlyAggregate, RatingSource};
use crate::training::{self, TrainingSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Aggregating,
    BuildingTrainingSet,
    Trained,
    Untrainable,
    Rated,
}

/// Previously stored records, read before the batch is saved.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub daily: Vec<DailyRecord>,
    pub monthly: Vec<MonthlyAggregate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingPath {
    Trained { source: TrainingSource },
    Untrainable,
}

#[derive(Debug, Clone)]
pub struct RatingOutcome {
    pub path: RatingPath,
    pub records: Vec<MonthlyAggregate>,
    /// Records the classifier could not rate
    pub fallbacks: usize,
}

pub struct RatingEngine {
    config: RatingConfig,
    state: EngineState,
}

impl RatingEngine {
    pub fn new(config: RatingConfig) -> Self {
        Self {
            config,
            state: EngineState::Aggregating,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn transition(&mut self, next: EngineState) {
        tracing::debug!(from = ?self.state, to = ?next, "rating engine transition");
        self.state = next;
    }

    pub fn run(
        &mut self,
        batch: &[DailyRecord],
        history: &History,
    ) -> Result<RatingOutcome, RatingError> {
        self.state = EngineState::Aggregating;
        if batch.is_empty() {
            return Err(RatingError::EmptyBatch);
        }
        let mut records = aggregate::aggregate(batch);

        self.transition(EngineState::BuildingTrainingSet);
        let model = self.train(history);

        let (path, fallbacks) = match model {
            Some((source, model)) => {
                self.transition(EngineState::Trained);
                let fallbacks = classify_all(Some(&model), &mut records);
                (RatingPath::Trained { source }, fallbacks)
            }
            None => {
                self.transition(EngineState::Untrainable);
                rate_with_heuristic(&mut records);
                (RatingPath::Untrainable, 0)
            }
        };

        self.transition(EngineState::Rated);
        tracing::info!(
            records = records.len(),
            fallbacks,
            path = ?path,
            "rated batch"
        );
        Ok(RatingOutcome {
            path,
            records,
            fallbacks,
        })
    }

    fn train(&self, history: &History) -> Option<(TrainingSource, KnnModel)> {
        let set = training::build(&history.daily, &history.monthly, self.config.synthetic_seed)?;
        tracing::info!(
            source = %set.source,
            samples = set.samples.len(),
            k = self.config.k,
            "training rating classifier"
        );

        let metric = DistanceMetric::from_config(&self.config);
        match KnnModel::fit(set.samples, self.config.k, metric) {
            Ok(model) => Some((set.source, model)),
            Err(err) => {
                tracing::warn!(error = %err, "classifier fit failed");
                None
            }
        }
    }
}

/// Rates every unrated record with the model, substituting the heuristic
/// for any record the model rejects. Returns the number of substitutions.
pub fn classify_all(model: Option<&KnnModel>, records: &mut [MonthlyAggregate]) -> usize {
    let mut fallbacks = 0;
    for record in records.iter_mut().filter(|r| !r.is_rated()) {
        match knn::predict(model, &record.metrics) {
            Ok(rating) => record.assign_rating(rating, RatingSource::Classifier),
            Err(err) => {
                let rating = heuristic::rate_metrics(&record.metrics);
                tracing::warn!(
                    employee_id = %record.employee_id,
                    month = %record.year_month,
                    error = %err,
                    rating = rating.value(),
                    "classifier failed, using heuristic rating"
                );
                record.assign_rating(rating, RatingSource::Heuristic);
                fallbacks += 1;
            }
        }
    }
    fallbacks
}

fn rate_with_heuristic(records: &mut [MonthlyAggregate]) {
    for record in records.iter_mut().filter(|r| !r.is_rated()) {
        let rating = heuristic::rate_metrics(&record.metrics);
        record.assign_rating(rating, RatingSource::Heuristic);
    }
}
