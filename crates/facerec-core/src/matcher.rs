//! Identity matching policies.
//!
//! Two interchangeable ways to turn a per-face score into an identity:
//! a plurality vote over enrolled embeddings within a distance tolerance,
//! and a single classifier prediction accepted below a distance threshold.

use crate::lbph::Prediction;
use crate::store::{FeatureDatabase, LabelMap};
use crate::types::{Embedding, MatchResult};

/// Default maximum embedding distance for a stored feature to count as a match.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Default LBPH distance below which a prediction is accepted.
pub const DEFAULT_LBPH_THRESHOLD: f32 = 140.0;

/// Strategy for comparing a probe embedding against the enrolled database.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, database: &FeatureDatabase) -> MatchResult;
}

/// Plurality vote over every stored feature within `tolerance`.
///
/// Ties go to the label whose first match came earliest in database order.
/// The reported score is the smallest distance among the winning label's
/// matches; when nothing matches it is the nearest distance overall.
#[derive(Debug, Clone, Copy)]
pub struct VoteMatcher {
    pub tolerance: f32,
}

impl VoteMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    /// Number of stored features within tolerance of `probe`.
    pub fn matching_count(&self, probe: &Embedding, database: &FeatureDatabase) -> usize {
        database
            .records()
            .filter(|(_, feature)| probe.euclidean_distance(feature) <= self.tolerance)
            .count()
    }
}

impl Default for VoteMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

/// Running tally entry: label, match count, closest matching distance.
struct Vote<'a> {
    label: &'a str,
    count: usize,
    best_distance: f32,
}

impl Matcher for VoteMatcher {
    fn compare(&self, probe: &Embedding, database: &FeatureDatabase) -> MatchResult {
        if database.is_empty() {
            return MatchResult::unknown(0.0);
        }

        let mut votes: Vec<Vote<'_>> = Vec::new();
        let mut nearest = f32::INFINITY;

        for (label, feature) in database.records() {
            let distance = probe.euclidean_distance(feature);
            nearest = nearest.min(distance);

            if distance <= self.tolerance {
                match votes.iter_mut().find(|v| v.label == label) {
                    Some(vote) => {
                        vote.count += 1;
                        vote.best_distance = vote.best_distance.min(distance);
                    }
                    None => votes.push(Vote {
                        label,
                        count: 1,
                        best_distance: distance,
                    }),
                }
            }
        }

        let mut winner: Option<&Vote<'_>> = None;
        for vote in &votes {
            if winner.map_or(true, |w| vote.count > w.count) {
                winner = Some(vote);
            }
        }

        match winner {
            Some(vote) => MatchResult::known(vote.label, vote.best_distance),
            None => MatchResult::unknown(nearest),
        }
    }
}

/// Accepts a classifier prediction when its distance is strictly below
/// `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdMatcher {
    pub threshold: f32,
}

impl ThresholdMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Resolve a prediction to a display identity. The score is the
    /// predicted distance, unchanged.
    pub fn resolve(&self, prediction: Prediction, labels: &LabelMap) -> MatchResult {
        if prediction.distance < self.threshold {
            if let Some(label) = labels.get(prediction.label) {
                return MatchResult::known(label, prediction.distance);
            }
            tracing::debug!(label = prediction.label, "predicted label missing from label map");
        }
        MatchResult::unknown(prediction.distance)
    }
}

impl Default for ThresholdMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_LBPH_THRESHOLD)
    }
}
