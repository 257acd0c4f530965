use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Version of the serialized artifact layout. Bump on any field change so
/// stale artifacts fail loudly at load time instead of mispredicting.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// Canonical hyperparameters for the tree ensembles. One place, named
/// fields; call sites must not restate these as literals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub forest_trees: usize,
    pub forest_max_depth: usize,
    pub boost_rounds: usize,
    pub boost_learning_rate: f64,
    pub boost_max_depth: usize,
    pub subsample: f64,
    pub colsample: f64,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            forest_trees: 300,
            forest_max_depth: 6,
            boost_rounds: 300,
            boost_learning_rate: 0.05,
            boost_max_depth: 4,
            subsample: 0.8,
            colsample: 0.8,
            seed: 42,
        }
    }
}

/// Common prediction contract across the three regressors.
pub trait Regressor {
    fn predict(&self, features: &[f64]) -> f64;

    fn predict_batch(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict(row)).collect()
    }
}

/// Reject empty, mismatched, or ragged training input before fitting.
/// Returns the feature count shared by every row.
fn validate_shapes(x: &[Vec<f64>], y: &[f64]) -> Result<usize, FitError> {
    if x.is_empty() || y.is_empty() {
        return Err(FitError::EmptyTrainingSet);
    }
    if x.len() != y.len() {
        return Err(FitError::ShapeMismatch {
            message: format!("{} feature rows vs {} targets", x.len(), y.len()),
        });
    }

    let n_features = x[0].len();
    if n_features == 0 {
        return Err(FitError::ShapeMismatch {
            message: "feature rows are empty".to_string(),
        });
    }
    for (i, row) in x.iter().enumerate() {
        if row.len() != n_features {
            return Err(FitError::ShapeMismatch {
                message: format!(
                    "row {i} has {} features, expected {n_features}",
                    row.len()
                ),
            });
        }
    }

    Ok(n_features)
}

// ---------------------------------------------------------------------------
// Linear baseline
// ---------------------------------------------------------------------------

/// Ordinary least squares, fitted via the normal equations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    pub fn fit(x: &[Vec<f64>], y: &[f64]) -> Result<Self, FitError> {
        let n_features = validate_shapes(x, y)?;
        let dim = n_features + 1; // trailing column for the intercept

        // Normal equations: (A^T A) beta = A^T y, with A = [x | 1].
        let mut ata = vec![vec![0.0; dim]; dim];
        let mut aty = vec![0.0; dim];

        for (row, &target) in x.iter().zip(y.iter()) {
            for i in 0..dim {
                let ai = if i < n_features { row[i] } else { 1.0 };
                aty[i] += ai * target;
                for j in 0..dim {
                    let aj = if j < n_features { row[j] } else { 1.0 };
                    ata[i][j] += ai * aj;
                }
            }
        }

        let beta = solve_linear_system(&mut ata, &mut aty)?;
        let intercept = beta[n_features];
        let coefficients = beta[..n_features].to_vec();

        Ok(Self {
            coefficients,
            intercept,
        })
    }
}

impl Regressor for LinearModel {
    fn predict(&self, features: &[f64]) -> f64 {
        let dot: f64 = self
            .coefficients
            .iter()
            .zip(features.iter())
            .map(|(c, v)| c * v)
            .sum();
        dot + self.intercept
    }
}

/// Gaussian elimination with partial pivoting. A vanishing pivot means the
/// design matrix is singular and the fit has no unique solution.
fn solve_linear_system(a: &mut [Vec<f64>], b: &mut [f64]) -> Result<Vec<f64>, FitError> {
    let n = b.len();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot_row][col].abs() < 1e-12 {
            return Err(FitError::SingularMatrix);
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * solution[k]).sum();
        solution[row] = (b[row] - tail) / a[row][row];
    }

    Ok(solution)
}

// ---------------------------------------------------------------------------
// Regression tree (shared by forest and boosting)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Binary regression tree, split on squared-error reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

const MIN_SAMPLES_SPLIT: usize = 2;

impl RegressionTree {
    /// Fit on the rows named by `indices`, considering only `features` as
    /// split candidates. Ensemble callers own the sampling; the tree just
    /// grows greedily to `max_depth`.
    fn grow(
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        features: &[usize],
        max_depth: usize,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(x, y, indices, features, max_depth);
        tree
    }

    fn grow_node(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        features: &[usize],
        depth_left: usize,
    ) -> usize {
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64;

        if depth_left == 0 || indices.len() < MIN_SAMPLES_SPLIT {
            self.nodes.push(TreeNode::Leaf { value: mean });
            return self.nodes.len() - 1;
        }

        let Some((feature, threshold)) = best_split(x, y, indices, features) else {
            self.nodes.push(TreeNode::Leaf { value: mean });
            return self.nodes.len() - 1;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| x[i][feature] < threshold);

        // Reserve the split slot before recursing so child indices are known.
        let node_id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: mean });
        let left = self.grow_node(x, y, &left_idx, features, depth_left - 1);
        let right = self.grow_node(x, y, &right_idx, features, depth_left - 1);
        self.nodes[node_id] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };

        node_id
    }
}

impl Regressor for RegressionTree {
    fn predict(&self, features: &[f64]) -> f64 {
        let mut node = self.nodes.first();
        loop {
            match node {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = features.get(*feature).copied().unwrap_or(0.0);
                    let next = if value < *threshold { *left } else { *right };
                    node = self.nodes.get(next);
                }
                None => return 0.0,
            }
        }
    }
}

/// Exhaustive split search: for each candidate feature, try midpoints
/// between consecutive distinct values and keep the split with the lowest
/// total squared error. Returns None when no split separates the rows.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    features: &[usize],
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64, f64)> = None;

    for &feature in features {
        let mut ordered: Vec<(f64, f64)> =
            indices.iter().map(|&i| (x[i][feature], y[i])).collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total_sum: f64 = ordered.iter().map(|(_, t)| t).sum();
        let total_sq: f64 = ordered.iter().map(|(_, t)| t * t).sum();
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for split_at in 1..ordered.len() {
            left_sum += ordered[split_at - 1].1;
            left_sq += ordered[split_at - 1].1 * ordered[split_at - 1].1;

            if ordered[split_at].0 <= ordered[split_at - 1].0 {
                continue; // no boundary between equal feature values
            }

            let left_n = split_at as f64;
            let right_n = (ordered.len() - split_at) as f64;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);

            if best.map_or(true, |(_, _, best_sse)| sse < best_sse) {
                let threshold = (ordered[split_at - 1].0 + ordered[split_at].0) / 2.0;
                best = Some((feature, threshold, sse));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

// ---------------------------------------------------------------------------
// Random forest
// ---------------------------------------------------------------------------

/// Bagged ensemble of regression trees; prediction is the tree mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestModel {
    trees: Vec<RegressionTree>,
}

impl RandomForestModel {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ModelConfig) -> Result<Self, FitError> {
        let n_features = validate_shapes(x, y)?;
        let all_features: Vec<usize> = (0..n_features).collect();
        let mut rng = fastrand::Rng::with_seed(config.seed);

        let trees = (0..config.forest_trees)
            .map(|_| {
                let bootstrap: Vec<usize> =
                    (0..x.len()).map(|_| rng.usize(0..x.len())).collect();
                RegressionTree::grow(x, y, &bootstrap, &all_features, config.forest_max_depth)
            })
            .collect();

        Ok(Self { trees })
    }
}

impl Regressor for RandomForestModel {
    fn predict(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        sum / self.trees.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Gradient-boosted trees
// ---------------------------------------------------------------------------

/// Squared-error gradient boosting: each round fits a shallow tree to the
/// current residuals on a row/feature subsample and shrinks it by the
/// learning rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedModel {
    base_prediction: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedModel {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ModelConfig) -> Result<Self, FitError> {
        let n_features = validate_shapes(x, y)?;
        let mut rng = fastrand::Rng::with_seed(config.seed);

        let base_prediction = y.iter().sum::<f64>() / y.len() as f64;
        let mut predictions = vec![base_prediction; y.len()];
        let mut trees = Vec::with_capacity(config.boost_rounds);

        for _ in 0..config.boost_rounds {
            let residuals: Vec<f64> = y
                .iter()
                .zip(predictions.iter())
                .map(|(target, pred)| target - pred)
                .collect();

            let rows = sample_rows(x.len(), config.subsample, &mut rng);
            let features = sample_features(n_features, config.colsample, &mut rng);
            let tree = RegressionTree::grow(x, &residuals, &rows, &features, config.boost_max_depth);

            for (pred, row) in predictions.iter_mut().zip(x.iter()) {
                *pred += config.boost_learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            base_prediction,
            learning_rate: config.boost_learning_rate,
            trees,
        })
    }
}

impl Regressor for GradientBoostedModel {
    fn predict(&self, features: &[f64]) -> f64 {
        let boost: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        self.base_prediction + self.learning_rate * boost
    }
}

/// Row subsample without replacement. Falls back to the full index set when
/// the draw comes up empty so every round trains on something.
fn sample_rows(n: usize, fraction: f64, rng: &mut fastrand::Rng) -> Vec<usize> {
    let rows: Vec<usize> = (0..n).filter(|_| rng.f64() < fraction).collect();
    if rows.is_empty() {
        (0..n).collect()
    } else {
        rows
    }
}

/// Feature subsample: a fixed-size draw of ceil(fraction * n) features.
fn sample_features(n: usize, fraction: f64, rng: &mut fastrand::Rng) -> Vec<usize> {
    let keep = ((n as f64 * fraction).ceil() as usize).clamp(1, n);
    let mut features: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut features);
    features.truncate(keep);
    features.sort_unstable();
    features
}

// ---------------------------------------------------------------------------
// Artifacts and metrics
// ---------------------------------------------------------------------------

/// One of the three fitted regressors, tagged for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Linear(LinearModel),
    Forest(RandomForestModel),
    Boosted(GradientBoostedModel),
}

impl FittedModel {
    pub fn kind(&self) -> &'static str {
        match self {
            FittedModel::Linear(_) => "linear",
            FittedModel::Forest(_) => "forest",
            FittedModel::Boosted(_) => "boosted",
        }
    }
}

impl Regressor for FittedModel {
    fn predict(&self, features: &[f64]) -> f64 {
        match self {
            FittedModel::Linear(m) => m.predict(features),
            FittedModel::Forest(m) => m.predict(features),
            FittedModel::Boosted(m) => m.predict(features),
        }
    }
}

/// Versioned, JSON-serialized model. Loading rejects artifacts written
/// under a different schema version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub model: FittedModel,
}

impl ModelArtifact {
    pub fn new(model: FittedModel) -> Self {
        Self {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            model,
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write model artifact to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model artifact from {}", path.display()))?;
        let artifact: Self = serde_json::from_str(&json)?;
        if artifact.schema_version != ARTIFACT_SCHEMA_VERSION {
            anyhow::bail!(
                "model artifact schema version {} does not match expected {}",
                artifact.schema_version,
                ARTIFACT_SCHEMA_VERSION
            );
        }
        Ok(artifact)
    }
}

/// Coefficient of determination against the mean baseline.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean) * (a - mean)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p) * (a - p))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { f64::NAN };
    }
    1.0 - ss_res / ss_tot
}
