//! Unsupervised outlier scoring.
//!
//! `OutlierModel` is the capability the anomaly scorer depends on: fit on a
//! sample matrix (rows = observations, columns = features), then score a
//! single point. Scores are in `[0, 1]`, higher = more anomalous.
//!
//! Two implementations ship here:
//! - [`IsolationForest`]: random axis-aligned partitioning; anomalies are
//!   isolated in fewer splits than inliers.
//! - [`RobustZScore`]: distance from the per-feature median in units of the
//!   scaled MAD, squashed into `[0, 1)`.
//!
//! Models are refit per call and hold no state between calls.

use ndarray::{ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::descriptive::{median, median_absolute_deviation, min_max, sample_std, MAD_SCALE};
use crate::math::{average_path_length, mix_seed};
use crate::thresholds::{IFOREST_MAX_SAMPLES, IFOREST_N_ESTIMATORS, IFOREST_RANDOM_STATE};

/// Spread below which a feature is treated as constant.
const SPREAD_FLOOR: f64 = 1e-9;

/// A fit-then-score outlier model.
pub trait OutlierModel: Send + Sync {
    /// The fitted state produced by [`OutlierModel::fit`].
    type Fitted: Send + Sync;

    /// Fewest rows `fit` accepts. Callers score 0.0 below this.
    fn min_samples(&self) -> usize;

    /// Fit on `samples` (n_rows >= `min_samples`).
    fn fit(&self, samples: ArrayView2<f64>) -> Self::Fitted;

    /// Score `point` (same column count as the samples) against a fit.
    fn score(&self, fitted: &Self::Fitted, point: ArrayView1<f64>) -> f64;

    /// Returns a stable name for logging.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Score `point` against a model fit on `samples` plus the point itself,
/// absorbing degenerate input.
///
/// The point joins the fit set so that a value beyond the sampled range is
/// isolated on its own instead of riding along with the most extreme sample.
/// Returns 0.0 when `samples` has fewer rows than the model needs, when every
/// feature is constant across `samples`, when the point's width does not
/// match the sample columns, or when any value or the score is not finite.
pub fn fit_and_score<M: OutlierModel>(
    model: &M,
    samples: ArrayView2<f64>,
    point: ArrayView1<f64>,
) -> f64 {
    let needed = model.min_samples().max(2);
    if samples.nrows() < needed {
        log::debug!(
            "model={} rows={} below min_samples={}, neutral score",
            model.name(),
            samples.nrows(),
            needed
        );
        return 0.0;
    }
    let has_spread = samples.axis_iter(Axis(1)).any(|column| {
        min_max(column)
            .map(|(lo, hi)| hi - lo > SPREAD_FLOOR)
            .unwrap_or(false)
    });
    if !has_spread {
        log::debug!("model={} zero-variance samples, neutral score", model.name());
        return 0.0;
    }
    let mut augmented = samples.to_owned();
    if augmented.push_row(point).is_err() {
        log::debug!(
            "model={} point width {} does not match {} sample columns",
            model.name(),
            point.len(),
            samples.ncols()
        );
        return 0.0;
    }
    if augmented.iter().any(|v| !v.is_finite()) {
        log::debug!("model={} non-finite features, neutral score", model.name());
        return 0.0;
    }
    let fitted = model.fit(augmented.view());
    let score = model.score(&fitted, point);
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        log::debug!("model={} non-finite score, neutral score", model.name());
        0.0
    }
}

// ---------------------------------------------------------------------------
// Isolation forest
// ---------------------------------------------------------------------------

/// Isolation forest configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
    pub min_samples: usize,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            n_estimators: IFOREST_N_ESTIMATORS,
            max_samples: IFOREST_MAX_SAMPLES,
            seed: IFOREST_RANDOM_STATE,
            min_samples: crate::thresholds::MIN_ANOMALY_SAMPLES,
        }
    }
}

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A fitted forest: one tree per estimator plus the sub-sample size used
/// for normalization.
#[derive(Clone, Debug)]
pub struct IsolationForestModel {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForestModel {
    /// Number of trees in the forest.
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Mean isolation depth of `point` across all trees.
    pub fn mean_path_length(&self, point: ArrayView1<f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| path_length(t, point, 0)).sum();
        total / self.trees.len() as f64
    }
}

impl OutlierModel for IsolationForest {
    type Fitted = IsolationForestModel;

    fn min_samples(&self) -> usize {
        self.min_samples
    }

    fn fit(&self, samples: ArrayView2<f64>) -> IsolationForestModel {
        let n = samples.nrows();
        let psi = self.max_samples.min(n).max(1);
        let height_limit = (psi as f64).log2().ceil() as usize;

        // Each tree owns an RNG derived from (seed, tree index), so the
        // forest is identical however rayon schedules the work.
        let trees = (0..self.n_estimators.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(mix_seed(self.seed, t));
                let indices = rand::seq::index::sample(&mut rng, n, psi).into_vec();
                build_tree(samples, &indices, 0, height_limit, &mut rng)
            })
            .collect();

        IsolationForestModel {
            trees,
            sample_size: psi,
        }
    }

    fn score(&self, fitted: &IsolationForestModel, point: ArrayView1<f64>) -> f64 {
        let c = average_path_length(fitted.sample_size);
        if c <= 0.0 || fitted.is_empty() {
            return 0.0;
        }
        2f64.powf(-fitted.mean_path_length(point) / c)
    }
}

fn build_tree(
    samples: ArrayView2<f64>,
    indices: &[usize],
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // Only features that still vary inside this node can split it.
    let splittable: Vec<(usize, f64, f64)> = (0..samples.ncols())
        .filter_map(|f| {
            let (lo, hi) = indices.iter().map(|&i| samples[[i, f]]).fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), v| (lo.min(v), hi.max(v)),
            );
            // A width that overflows cannot be sampled uniformly.
            let width = hi - lo;
            (width.is_finite() && width > SPREAD_FLOOR).then_some((f, lo, hi))
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| samples[[i, feature]] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(samples, &left, depth + 1, height_limit, rng)),
        right: Box::new(build_tree(samples, &right, depth + 1, height_limit, rng)),
    }
}

fn path_length(node: &Node, point: ArrayView1<f64>, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] < *threshold {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Robust z-score
// ---------------------------------------------------------------------------

/// Median/MAD outlier model.
///
/// The per-feature robust z is `|x - median| / (1.4826 * MAD)`, falling back
/// to the sample std when the MAD is zero. The largest feature z is mapped
/// to `z / (z + scale)`, so `z == scale` scores 0.5.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobustZScore {
    pub scale: f64,
    pub min_samples: usize,
}

impl Default for RobustZScore {
    fn default() -> Self {
        Self {
            scale: 3.5,
            min_samples: crate::thresholds::MIN_ANOMALY_SAMPLES,
        }
    }
}

/// Per-feature center and spread.
#[derive(Clone, Debug)]
pub struct RobustZScoreModel {
    centers: Vec<f64>,
    spreads: Vec<f64>,
}

impl OutlierModel for RobustZScore {
    type Fitted = RobustZScoreModel;

    fn min_samples(&self) -> usize {
        self.min_samples
    }

    fn fit(&self, samples: ArrayView2<f64>) -> RobustZScoreModel {
        let (centers, spreads) = samples
            .axis_iter(Axis(1))
            .map(|column| {
                let center = median(column).unwrap_or(0.0);
                let mad = median_absolute_deviation(column).unwrap_or(0.0) * MAD_SCALE;
                let spread = if mad > SPREAD_FLOOR {
                    mad
                } else {
                    sample_std(column).max(SPREAD_FLOOR)
                };
                (center, spread)
            })
            .unzip();
        RobustZScoreModel { centers, spreads }
    }

    fn score(&self, fitted: &RobustZScoreModel, point: ArrayView1<f64>) -> f64 {
        let z = point
            .iter()
            .zip(fitted.centers.iter().zip(&fitted.spreads))
            .map(|(x, (c, s))| (x - c).abs() / s)
            .fold(0.0, f64::max);
        if z.is_infinite() {
            return 1.0;
        }
        z / (z + self.scale.max(SPREAD_FLOOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn column(values: &[f64]) -> Array2<f64> {
        Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap()
    }

    fn noisy_prices(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + ((i * 7) % 11) as f64 - 5.0).collect()
    }

    #[test]
    fn forest_scores_outlier_above_inlier() {
        let samples = column(&noisy_prices(60));
        let forest = IsolationForest::default();
        let inlier = fit_and_score(&forest, samples.view(), array![100.0].view());
        let outlier = fit_and_score(&forest, samples.view(), array![400.0].view());
        assert!(outlier > inlier, "outlier {} <= inlier {}", outlier, inlier);
        assert!(outlier > 0.6, "outlier score was {}", outlier);
        assert!((0.0..=1.0).contains(&inlier));
    }

    #[test]
    fn forest_is_deterministic_for_same_seed() {
        let samples = column(&noisy_prices(40));
        let forest = IsolationForest::default();
        let a = fit_and_score(&forest, samples.view(), array![130.0].view());
        let b = fit_and_score(&forest, samples.view(), array![130.0].view());
        assert_eq!(a, b);
    }

    #[test]
    fn forest_builds_requested_tree_count() {
        let samples = column(&noisy_prices(20));
        let forest = IsolationForest {
            n_estimators: 17,
            ..IsolationForest::default()
        };
        assert_eq!(forest.fit(samples.view()).len(), 17);
    }

    #[test]
    fn too_few_samples_score_neutral() {
        let samples = column(&[100.0, 200.0, 300.0]);
        let score = fit_and_score(&IsolationForest::default(), samples.view(), array![900.0].view());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn constant_samples_score_neutral() {
        let samples = column(&[50.0; 30]);
        let score = fit_and_score(&IsolationForest::default(), samples.view(), array![500.0].view());
        assert_eq!(score, 0.0);
        let score = fit_and_score(&RobustZScore::default(), samples.view(), array![500.0].view());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn robust_zscore_scale_point_scores_half() {
        // median 10, MAD 1 -> spread 1.4826
        let samples = column(&[9.0, 10.0, 10.0, 11.0, 10.0, 9.0, 11.0]);
        let model = RobustZScore::default();
        let fitted = model.fit(samples.view());
        let at_scale = 10.0 + 3.5 * 1.4826;
        let s = model.score(&fitted, array![at_scale].view());
        assert!((s - 0.5).abs() < 1e-9, "score was {}", s);
        assert_eq!(model.score(&fitted, array![10.0].view()), 0.0);
    }

    #[test]
    fn robust_zscore_uses_worst_feature() {
        let samples = Array2::from_shape_vec(
            (6, 2),
            vec![
                10.0, 0.0, 11.0, 1.0, 9.0, -1.0, 10.0, 0.0, 12.0, 2.0, 8.0, -2.0,
            ],
        )
        .unwrap();
        let model = RobustZScore::default();
        let fitted = model.fit(samples.view());
        let calm = model.score(&fitted, array![10.0, 0.0].view());
        let jumpy = model.score(&fitted, array![10.0, 40.0].view());
        assert!(jumpy > calm);
    }

    #[test]
    fn mismatched_point_width_scores_neutral() {
        let samples = column(&noisy_prices(20));
        let score = fit_and_score(&RobustZScore::default(), samples.view(), array![1.0, 2.0].view());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn overflowing_feature_range_does_not_panic() {
        let samples = column(&[1e308, -1e308, 1e308, -1e308, 1e308, -1e308, 0.0]);
        let model = IsolationForest::default();
        let fitted = model.fit(samples.view());
        let s = model.score(&fitted, array![0.0].view());
        assert!(s.is_finite());

        let alternating = column(&[1e308, 1.0, 1e308, 1.0, 1e308, 1.0, 1e308, 1.0]);
        let s = fit_and_score(&model, alternating.view(), array![1.0].view());
        assert!((0.0..=1.0).contains(&s), "score was {}", s);
    }

    #[test]
    fn non_finite_inputs_score_neutral() {
        let samples = column(&[1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0]);
        let score = fit_and_score(&IsolationForest::default(), samples.view(), array![3.0].view());
        assert_eq!(score, 0.0);
        let samples = column(&noisy_prices(20));
        let score = fit_and_score(&RobustZScore::default(), samples.view(), array![f64::INFINITY].view());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn model_names_are_short() {
        assert_eq!(IsolationForest::default().name(), "IsolationForest");
        assert_eq!(RobustZScore::default().name(), "RobustZScore");
    }
}
