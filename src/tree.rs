//! CART decision trees: fitting and inference.
//!
//! Nodes are stored as a flat pre-order array. A node with `feature == -1` is
//! a leaf and carries a `value`:
//!
//! - classification (Gini): `[p_negative, p_positive]`
//! - regression (MSE): `[mean]`
//!
//! Traversal starts at node 0. `features[node.feature] <= threshold` (or NaN)
//! goes to `left`, everything else to `right`.

use crate::errors::ModelError;
use crate::features::{FeatureVector, N_FEATURES};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Split quality measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Gini,
    Mse,
}

impl Criterion {
    fn leaf_len(self) -> usize {
        match self {
            Criterion::Gini => 2,
            Criterion::Mse => 1,
        }
    }
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split. `None` considers all of them.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
        }
    }
}

/// A single node in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Feature index to split on (-1 for leaf nodes).
    pub feature: i32,
    /// Threshold value for the split.
    pub threshold: f64,
    /// Index of left child (-1 for leaf nodes).
    pub left: i32,
    /// Index of right child (-1 for leaf nodes).
    pub right: i32,
    /// Leaf output (None for internal nodes).
    pub value: Option<Vec<f64>>,
}

impl TreeNode {
    fn leaf(value: Vec<f64>) -> Self {
        Self {
            feature: -1,
            threshold: 0.0,
            left: -1,
            right: -1,
            value: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature == -1
    }
}

/// Fitted tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
    /// Impurity-decrease importances, normalised to sum to 1 (all zero for a stump).
    pub feature_importances: Vec<f64>,
}

/// Running sums over a set of targets.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    n: f64,
    sum: f64,
    sum_sq: f64,
}

impl Accumulator {
    fn push(&mut self, y: f64) {
        self.n += 1.0;
        self.sum += y;
        self.sum_sq += y * y;
    }

    fn minus(&self, other: &Accumulator) -> Accumulator {
        Accumulator {
            n: self.n - other.n,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    fn mean(&self) -> f64 {
        if self.n == 0.0 {
            0.0
        } else {
            self.sum / self.n
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.n == 0.0 {
            return 0.0;
        }
        match criterion {
            // Binary 0/1 targets: 1 - p^2 - (1-p)^2
            Criterion::Gini => {
                let p = self.mean();
                2.0 * p * (1.0 - p)
            }
            Criterion::Mse => {
                let mean = self.mean();
                (self.sum_sq / self.n - mean * mean).max(0.0)
            }
        }
    }

    fn leaf_value(&self, criterion: Criterion) -> Vec<f64> {
        match criterion {
            Criterion::Gini => {
                let p = self.mean();
                vec![1.0 - p, p]
            }
            Criterion::Mse => vec![self.mean()],
        }
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
    decrease: f64,
}

struct Builder<'a, R: Rng + ?Sized> {
    x: &'a [FeatureVector],
    y: &'a [f64],
    criterion: Criterion,
    params: TreeParams,
    rng: &'a mut R,
    nodes: Vec<TreeNode>,
    importances: [f64; N_FEATURES],
}

impl<R: Rng + ?Sized> Builder<'_, R> {
    fn accumulate(&self, samples: &[usize]) -> Accumulator {
        let mut acc = Accumulator::default();
        for &i in samples {
            acc.push(self.y[i]);
        }
        acc
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        match self.params.max_features {
            Some(m) if m > 0 && m < N_FEATURES => {
                rand::seq::index::sample(&mut *self.rng, N_FEATURES, m).into_vec()
            }
            _ => (0..N_FEATURES).collect(),
        }
    }

    fn best_split(&mut self, samples: &[usize], parent: &Accumulator) -> Option<Split> {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent_impurity = parent.impurity(self.criterion);
        let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, child impurity)

        for feature in self.candidate_features() {
            let mut order = samples.to_vec();
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left = Accumulator::default();
            for pos in 0..n - 1 {
                left.push(self.y[order[pos]]);
                let n_left = pos + 1;
                if n_left < min_leaf || n - n_left < min_leaf {
                    continue;
                }
                let lo = self.x[order[pos]][feature];
                let hi = self.x[order[pos + 1]][feature];
                if lo >= hi {
                    continue;
                }
                let right = parent.minus(&left);
                let child = (left.n * left.impurity(self.criterion)
                    + right.n * right.impurity(self.criterion))
                    / parent.n;
                if best.map_or(true, |(_, _, b)| child < b) {
                    let mid = lo + (hi - lo) / 2.0;
                    let threshold = if mid >= hi { lo } else { mid };
                    best = Some((feature, threshold, child));
                }
            }
        }

        let (feature, threshold, child) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.x[i][feature] <= threshold);
        Some(Split {
            feature,
            threshold,
            left,
            right,
            decrease: parent.n * (parent_impurity - child),
        })
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        let acc = self.accumulate(&samples);
        self.nodes.push(TreeNode::leaf(acc.leaf_value(self.criterion)));

        let splittable = depth < self.params.max_depth
            && samples.len() >= self.params.min_samples_split.max(2)
            && acc.impurity(self.criterion) > 0.0;
        if !splittable {
            return idx;
        }
        let Some(split) = self.best_split(&samples, &acc) else {
            return idx;
        };

        self.importances[split.feature] += split.decrease.max(0.0);
        let left = self.build(split.left, depth + 1);
        let right = self.build(split.right, depth + 1);
        self.nodes[idx] = TreeNode {
            feature: split.feature as i32,
            threshold: split.threshold,
            left: left as i32,
            right: right as i32,
            value: None,
        };
        idx
    }
}

impl DecisionTree {
    /// Grows a tree on the rows of `x` listed in `samples` (duplicates allowed).
    pub fn fit<R: Rng + ?Sized>(
        x: &[FeatureVector],
        y: &[f64],
        samples: Vec<usize>,
        criterion: Criterion,
        params: TreeParams,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        if x.len() != y.len() {
            return Err(ModelError::Training(format!(
                "{} feature rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        if samples.is_empty() {
            return Err(ModelError::Training("cannot fit a tree on no samples".into()));
        }
        if let Some(&bad) = samples.iter().find(|&&i| i >= x.len()) {
            return Err(ModelError::Training(format!("sample index {} out of range", bad)));
        }
        if criterion == Criterion::Gini && samples.iter().any(|&i| y[i] != 0.0 && y[i] != 1.0) {
            return Err(ModelError::Training(
                "classification targets must be 0 or 1".into(),
            ));
        }

        let mut builder = Builder {
            x,
            y,
            criterion,
            params,
            rng,
            nodes: Vec::new(),
            importances: [0.0; N_FEATURES],
        };
        builder.build(samples, 0);

        Ok(Self {
            nodes: builder.nodes,
            feature_importances: normalise(&builder.importances),
        })
    }

    /// Builds a tree from explicit nodes, validating its structure.
    pub fn from_nodes(criterion: Criterion, nodes: Vec<TreeNode>) -> Result<Self, ModelError> {
        let tree = Self {
            nodes,
            feature_importances: vec![0.0; N_FEATURES],
        };
        tree.validate(criterion)?;
        Ok(tree)
    }

    /// Checks that traversal always terminates on a well-formed leaf.
    pub fn validate(&self, criterion: Criterion) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidModel("tree has no nodes".into()));
        }
        if self.feature_importances.len() != N_FEATURES {
            return Err(ModelError::InvalidModel(format!(
                "tree has {} importances, expected {}",
                self.feature_importances.len(),
                N_FEATURES
            )));
        }
        let n_nodes = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match &node.value {
                    Some(v) if v.len() == criterion.leaf_len() => {}
                    Some(v) => {
                        return Err(ModelError::InvalidModel(format!(
                            "leaf node {} has {} values, expected {}",
                            i,
                            v.len(),
                            criterion.leaf_len()
                        )));
                    }
                    None => {
                        return Err(ModelError::InvalidModel(format!(
                            "leaf node {} missing value array",
                            i
                        )));
                    }
                }
                continue;
            }
            if node.feature < 0 || node.feature as usize >= N_FEATURES {
                return Err(ModelError::InvalidModel(format!(
                    "node {} has invalid feature index {}",
                    i, node.feature
                )));
            }
            // Children after their parent rules out cycles.
            for child in [node.left, node.right] {
                if child <= i as i32 || child as usize >= n_nodes {
                    return Err(ModelError::InvalidModel(format!(
                        "node {} has invalid child {}",
                        i, child
                    )));
                }
            }
        }
        Ok(())
    }

    /// Leaf output for `features`.
    pub fn leaf_value(&self, features: &[f64]) -> &[f64] {
        let mut node_idx = 0usize;
        loop {
            let node = &self.nodes[node_idx];
            if node.is_leaf() {
                return node.value.as_deref().unwrap_or(&[]);
            }

            let feature_val = features
                .get(node.feature as usize)
                .copied()
                .unwrap_or(f64::NAN);

            if feature_val.is_nan() || feature_val <= node.threshold {
                node_idx = node.left as usize;
            } else {
                node_idx = node.right as usize;
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            let node = &nodes[idx];
            if node.is_leaf() {
                0
            } else {
                1 + walk(nodes, node.left as usize).max(walk(nodes, node.right as usize))
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Scales `values` to sum to 1. All-zero input stays all zero.
pub fn normalise(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![0.0; values.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn row(v0: f64, v1: f64) -> FeatureVector {
        [v0, v1, 0.0, 0.0, 0.0, 0.0]
    }

    fn sample_nodes() -> Vec<TreeNode> {
        vec![
            TreeNode {
                feature: 0,
                threshold: 50.0,
                left: 1,
                right: 2,
                value: None,
            },
            TreeNode::leaf(vec![0.8, 0.2]),
            TreeNode {
                feature: 1,
                threshold: 0.5,
                left: 3,
                right: 4,
                value: None,
            },
            TreeNode::leaf(vec![0.6, 0.4]),
            TreeNode::leaf(vec![0.1, 0.9]),
        ]
    }

    #[test]
    fn test_traversal() {
        let tree = DecisionTree::from_nodes(Criterion::Gini, sample_nodes()).unwrap();
        assert_eq!(tree.leaf_value(&row(30.0, 0.0)), &[0.8, 0.2]);
        assert_eq!(tree.leaf_value(&row(60.0, 0.3)), &[0.6, 0.4]);
        assert_eq!(tree.leaf_value(&row(60.0, 0.8)), &[0.1, 0.9]);
        // Equal to threshold goes left
        assert_eq!(tree.leaf_value(&row(50.0, 0.8)), &[0.8, 0.2]);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_nan_goes_left() {
        let tree = DecisionTree::from_nodes(Criterion::Gini, sample_nodes()).unwrap();
        assert_eq!(tree.leaf_value(&row(f64::NAN, 0.8)), &[0.8, 0.2]);
    }

    #[test]
    fn test_validation_rejects_bad_structure() {
        let mut nodes = sample_nodes();
        nodes[2].left = 0;
        assert!(DecisionTree::from_nodes(Criterion::Gini, nodes).is_err());

        let mut nodes = sample_nodes();
        nodes[0].feature = 6;
        assert!(DecisionTree::from_nodes(Criterion::Gini, nodes).is_err());

        // Classification leaves cannot be used for regression
        assert!(DecisionTree::from_nodes(Criterion::Mse, sample_nodes()).is_err());
        assert!(DecisionTree::from_nodes(Criterion::Gini, vec![]).is_err());
    }

    #[test]
    fn test_fit_separable_classification() {
        let x: Vec<FeatureVector> = (0..20).map(|i| row(i as f64, 0.0)).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let tree = DecisionTree::fit(
            &x,
            &y,
            (0..20).collect(),
            Criterion::Gini,
            TreeParams::default(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(tree.nodes[0].feature, 0);
        assert_eq!(tree.nodes[0].threshold, 9.5);
        assert_eq!(tree.leaf_value(&row(3.0, 0.0)), &[1.0, 0.0]);
        assert_eq!(tree.leaf_value(&row(15.0, 0.0)), &[0.0, 1.0]);
        assert_eq!(tree.feature_importances[0], 1.0);
        assert!(tree.validate(Criterion::Gini).is_ok());
    }

    #[test]
    fn test_fit_respects_limits() {
        let x: Vec<FeatureVector> = (0..64).map(|i| row(i as f64, (i % 7) as f64)).collect();
        let y: Vec<f64> = (0..64).map(|i| ((i * 31) % 17) as f64).collect();
        let params = TreeParams {
            max_depth: 3,
            ..TreeParams::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let tree =
            DecisionTree::fit(&x, &y, (0..64).collect(), Criterion::Mse, params, &mut rng).unwrap();

        assert!(tree.depth() <= 3);
        let sum: f64 = tree.feature_importances.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(tree.nodes.len() <= 15);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x: Vec<FeatureVector> = (0..10).map(|i| row(i as f64, 0.0)).collect();
        let y = vec![42.0; 10];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(
            &x,
            &y,
            (0..10).collect(),
            Criterion::Mse,
            TreeParams::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.leaf_value(&row(100.0, 0.0)), &[42.0]);
        assert!(tree.feature_importances.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_fit_rejects_non_binary_classes() {
        let x: Vec<FeatureVector> = (0..4).map(|i| row(i as f64, 0.0)).collect();
        let y = vec![0.0, 1.0, 2.0, 1.0];
        let mut rng = StdRng::seed_from_u64(0);
        let result = DecisionTree::fit(
            &x,
            &y,
            (0..4).collect(),
            Criterion::Gini,
            TreeParams::default(),
            &mut rng,
        );
        assert!(matches!(result, Err(ModelError::Training(_))));
    }
}
