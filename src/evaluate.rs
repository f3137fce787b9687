//! Offline accuracy check for a trained classifier

use crate::classifier::PostureClassifier;
use crate::dataset::Dataset;
use crate::normalizer::Normalizer;
use crate::types::PostureLabel;
use serde::Serialize;

/// Prediction counts, with good posture as the positive class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_good: usize,
    pub false_good: usize,
    pub true_bad: usize,
    pub false_bad: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub threshold: f32,
    pub confusion: ConfusionMatrix,
}

/// Score every dataset row and compare the label against the truth.
///
/// Truth labels above 0.5 count as good posture.
pub fn evaluate<M: PostureClassifier>(
    classifier: &M,
    normalizer: &Normalizer,
    dataset: &Dataset,
    threshold: f32,
) -> EvaluationReport {
    let mut confusion = ConfusionMatrix::default();

    for (features, label) in dataset.features.iter().zip(&dataset.labels) {
        let score = classifier.score(&normalizer.normalize(features));
        let predicted = PostureLabel::from_score(score, threshold);
        let actual = if *label > 0.5 {
            PostureLabel::Good
        } else {
            PostureLabel::Bad
        };

        match (predicted, actual) {
            (PostureLabel::Good, PostureLabel::Good) => confusion.true_good += 1,
            (PostureLabel::Good, PostureLabel::Bad) => confusion.false_good += 1,
            (PostureLabel::Bad, PostureLabel::Bad) => confusion.true_bad += 1,
            (PostureLabel::Bad, PostureLabel::Good) => confusion.false_bad += 1,
        }
    }

    let total = dataset.len();
    let correct = confusion.true_good + confusion.true_bad;
    let accuracy = if total > 0 {
        correct as f64 / total as f64
    } else {
        0.0
    };

    EvaluationReport {
        total,
        correct,
        accuracy,
        threshold,
        confusion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::NormalizationStats;
    use crate::types::{FeatureVector, FEATURE_COUNT};
    use pretty_assertions::assert_eq;

    fn row(first: f64) -> FeatureVector {
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = first;
        FeatureVector::new(values).unwrap()
    }

    #[test]
    fn test_confusion_counts() {
        let dataset = Dataset {
            features: vec![row(1.0), row(2.0), row(-1.0), row(-2.0), row(3.0)],
            labels: vec![1.0, 0.0, 0.0, 1.0, 1.0],
            dropped_rows: 0,
        };
        let stats =
            NormalizationStats::new(vec![0.0; FEATURE_COUNT], vec![1.0; FEATURE_COUNT]).unwrap();
        let normalizer = Normalizer::new(stats);
        let classifier = |f: &FeatureVector| if f.values()[0] > 0.0 { 0.8f32 } else { 0.2 };

        let report = evaluate(&classifier, &normalizer, &dataset, 0.5);

        assert_eq!(
            report.confusion,
            ConfusionMatrix {
                true_good: 2,
                false_good: 1,
                true_bad: 1,
                false_bad: 1,
            }
        );
        assert_eq!(report.total, 5);
        assert_eq!(report.correct, 3);
        assert!((report.accuracy - 0.6).abs() < 1e-12);
    }
}
