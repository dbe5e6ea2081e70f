//! Random forests over the six-feature vector.
//!
//! Both forests bootstrap-sample the training rows for every tree and average
//! the tree outputs. The classifier averages leaf class probabilities, the
//! regressor averages leaf means.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "model_type": "random_forest_classifier",
//!   "feature_names": ["median_home_value", "...", "price_to_rent"],
//!   "n_features": 6,
//!   "n_estimators": 50,
//!   "params": { "n_estimators": 50, "seed": 42, "bootstrap": true, "tree": { "...": 0 } },
//!   "feature_importances": [0.1, 0.2, 0.1, 0.1, 0.2, 0.3],
//!   "trees": [ { "nodes": [...], "feature_importances": [...] } ]
//! }
//! ```

use crate::errors::ModelError;
use crate::features::{self, FeatureVector, N_FEATURES};
use crate::tree::{self, Criterion, DecisionTree, TreeParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Ensemble hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub tree: TreeParams,
    pub seed: u64,
    pub bootstrap: bool,
}

impl ForestParams {
    /// 50 trees, depth 5, sqrt(6) = 2 features per split.
    pub fn classifier() -> Self {
        Self {
            n_estimators: 50,
            tree: TreeParams {
                max_features: Some(2),
                ..TreeParams::default()
            },
            seed: 42,
            bootstrap: true,
        }
    }

    /// 50 trees, depth 5, every feature at every split.
    pub fn regressor() -> Self {
        Self {
            n_estimators: 50,
            tree: TreeParams::default(),
            seed: 42,
            bootstrap: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ForestJson {
    model_type: String,
    feature_names: Vec<String>,
    n_features: usize,
    n_estimators: usize,
    params: ForestParams,
    feature_importances: Vec<f64>,
    trees: Vec<DecisionTree>,
}

/// State shared by both forest kinds.
#[derive(Debug, Clone, PartialEq)]
struct Forest {
    feature_names: Vec<String>,
    params: ForestParams,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl Forest {
    fn fit(
        x: &[FeatureVector],
        y: &[f64],
        criterion: Criterion,
        params: ForestParams,
    ) -> Result<Self, ModelError> {
        if x.is_empty() {
            return Err(ModelError::Training("cannot fit a forest on no rows".into()));
        }
        if params.n_estimators == 0 {
            return Err(ModelError::Training("n_estimators must be at least 1".into()));
        }

        let n = x.len();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let samples: Vec<usize> = if params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            trees.push(DecisionTree::fit(x, y, samples, criterion, params.tree, &mut rng)?);
        }

        Ok(Self::from_parts(features::feature_names(), params, trees))
    }

    fn from_parts(feature_names: Vec<String>, params: ForestParams, trees: Vec<DecisionTree>) -> Self {
        let mut summed = vec![0.0; N_FEATURES];
        for t in &trees {
            for (acc, v) in summed.iter_mut().zip(&t.feature_importances) {
                *acc += v;
            }
        }
        let feature_importances = tree::normalise(&summed);
        Self {
            feature_names,
            params,
            trees,
            feature_importances,
        }
    }

    fn validate(&self, model_type: &str, criterion: Criterion) -> Result<(), ModelError> {
        let expected = features::feature_names();
        if self.feature_names != expected {
            return Err(ModelError::FeatureMismatch {
                artifact: model_type.to_string(),
                expected,
                actual: self.feature_names.clone(),
            });
        }
        if self.trees.is_empty() {
            return Err(ModelError::InvalidModel(format!("{} has no trees", model_type)));
        }
        if self.feature_importances.len() != N_FEATURES {
            return Err(ModelError::InvalidModel(format!(
                "{} has {} importances, expected {}",
                model_type,
                self.feature_importances.len(),
                N_FEATURES
            )));
        }
        for t in &self.trees {
            t.validate(criterion)?;
        }
        Ok(())
    }

    fn from_json_str(json: &str, model_type: &str, criterion: Criterion) -> Result<Self, ModelError> {
        let raw: ForestJson = serde_json::from_str(json).map_err(|source| ModelError::Parse {
            artifact: model_type.to_string(),
            source,
        })?;

        if raw.model_type != model_type {
            return Err(ModelError::InvalidModel(format!(
                "expected model_type '{}', got '{}'",
                model_type, raw.model_type
            )));
        }
        if raw.n_features != N_FEATURES || raw.feature_names.len() != N_FEATURES {
            return Err(ModelError::FeatureMismatch {
                artifact: model_type.to_string(),
                expected: features::feature_names(),
                actual: raw.feature_names,
            });
        }
        if raw.trees.len() != raw.n_estimators {
            return Err(ModelError::InvalidModel(format!(
                "n_estimators ({}) doesn't match trees count ({})",
                raw.n_estimators,
                raw.trees.len()
            )));
        }

        let forest = Self {
            feature_names: raw.feature_names,
            params: raw.params,
            trees: raw.trees,
            feature_importances: raw.feature_importances,
        };
        forest.validate(model_type, criterion)?;
        Ok(forest)
    }

    fn to_json_string(&self, model_type: &str) -> Result<String, ModelError> {
        let raw = ForestJson {
            model_type: model_type.to_string(),
            feature_names: self.feature_names.clone(),
            n_features: N_FEATURES,
            n_estimators: self.trees.len(),
            params: self.params,
            feature_importances: self.feature_importances.clone(),
            trees: self.trees.clone(),
        };
        serde_json::to_string(&raw).map_err(|source| ModelError::Parse {
            artifact: model_type.to_string(),
            source,
        })
    }

    /// Mean of `pick(leaf)` over all trees.
    fn average(&self, features: &FeatureVector, pick: impl Fn(&[f64]) -> f64) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| pick(t.leaf_value(features))).sum();
        sum / self.trees.len() as f64
    }
}

/// Binary "good investment" classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForestClassifier {
    inner: Forest,
}

impl RandomForestClassifier {
    pub const MODEL_TYPE: &'static str = "random_forest_classifier";

    /// Fits on scaled features and boolean labels.
    pub fn fit(x: &[FeatureVector], labels: &[bool], params: ForestParams) -> Result<Self, ModelError> {
        let y: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let inner = Forest::fit(x, &y, Criterion::Gini, params)?;
        tracing::debug!(
            "Fitted classifier with {} trees on {} rows",
            inner.trees.len(),
            x.len()
        );
        Ok(Self { inner })
    }

    /// Builds a classifier from prepared trees. Importances are averaged from the trees.
    pub fn from_trees(params: ForestParams, trees: Vec<DecisionTree>) -> Result<Self, ModelError> {
        let inner = Forest::from_parts(features::feature_names(), params, trees);
        inner.validate(Self::MODEL_TYPE, Criterion::Gini)?;
        Ok(Self { inner })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        Forest::from_json_str(json, Self::MODEL_TYPE, Criterion::Gini).map(|inner| Self { inner })
    }

    pub fn to_json_string(&self) -> Result<String, ModelError> {
        self.inner.to_json_string(Self::MODEL_TYPE)
    }

    /// Probability of the positive class, in [0, 1].
    pub fn predict_probability(&self, features: &FeatureVector) -> f64 {
        self.inner
            .average(features, |leaf| leaf.get(1).copied().unwrap_or(0.0))
            .clamp(0.0, 1.0)
    }

    /// Positive-class vs negative-class probabilities, `[p0, p1]`.
    pub fn predict_proba(&self, features: &FeatureVector) -> [f64; 2] {
        let p1 = self.predict_probability(features);
        [1.0 - p1, p1]
    }

    pub fn predict(&self, features: &FeatureVector) -> bool {
        self.predict_probability(features) > 0.5
    }

    /// Share of rows whose predicted label matches.
    pub fn accuracy(&self, x: &[FeatureVector], labels: &[bool]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let correct = x
            .iter()
            .zip(labels)
            .filter(|&(f, &l)| self.predict(f) == l)
            .count();
        correct as f64 / x.len() as f64
    }

    pub fn feature_names(&self) -> &[String] {
        &self.inner.feature_names
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.inner.feature_importances
    }

    pub fn params(&self) -> &ForestParams {
        &self.inner.params
    }

    pub fn n_estimators(&self) -> usize {
        self.inner.trees.len()
    }
}

/// Regressor predicting the composite investment score.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForestRegressor {
    inner: Forest,
}

impl RandomForestRegressor {
    pub const MODEL_TYPE: &'static str = "random_forest_regressor";

    pub fn fit(x: &[FeatureVector], y: &[f64], params: ForestParams) -> Result<Self, ModelError> {
        if let Some(bad) = y.iter().find(|v| !v.is_finite()) {
            return Err(ModelError::Training(format!("non-finite regression target {}", bad)));
        }
        let inner = Forest::fit(x, y, Criterion::Mse, params)?;
        tracing::debug!(
            "Fitted regressor with {} trees on {} rows",
            inner.trees.len(),
            x.len()
        );
        Ok(Self { inner })
    }

    pub fn from_trees(params: ForestParams, trees: Vec<DecisionTree>) -> Result<Self, ModelError> {
        let inner = Forest::from_parts(features::feature_names(), params, trees);
        inner.validate(Self::MODEL_TYPE, Criterion::Mse)?;
        Ok(Self { inner })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        Forest::from_json_str(json, Self::MODEL_TYPE, Criterion::Mse).map(|inner| Self { inner })
    }

    pub fn to_json_string(&self) -> Result<String, ModelError> {
        self.inner.to_json_string(Self::MODEL_TYPE)
    }

    pub fn predict(&self, features: &FeatureVector) -> f64 {
        self.inner
            .average(features, |leaf| leaf.first().copied().unwrap_or(0.0))
    }

    /// Coefficient of determination on `(x, y)`.
    pub fn r2_score(&self, x: &[FeatureVector], y: &[f64]) -> f64 {
        let predictions: Vec<f64> = x.iter().map(|f| self.predict(f)).collect();
        r2(y, &predictions)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.inner.feature_names
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.inner.feature_importances
    }

    pub fn params(&self) -> &ForestParams {
        &self.inner.params
    }

    pub fn n_estimators(&self) -> usize {
        self.inner.trees.len()
    }
}

/// R² of `predicted` against `actual`. A constant target scores 0 unless matched exactly.
pub fn r2(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize) -> (Vec<FeatureVector>, Vec<bool>, Vec<f64>) {
        let x: Vec<FeatureVector> = (0..n)
            .map(|i| {
                let a = i as f64 / n as f64;
                let b = ((i * 37) % n) as f64 / n as f64;
                [a, b, 1.0 - a, b * 0.5, a * b, (a + b) / 2.0]
            })
            .collect();
        let labels: Vec<bool> = x.iter().map(|f| f[0] + f[1] > 1.0).collect();
        let y: Vec<f64> = x.iter().map(|f| 100.0 * f[0] + 20.0 * f[1]).collect();
        (x, labels, y)
    }

    fn small_params(base: ForestParams) -> ForestParams {
        ForestParams {
            n_estimators: 10,
            ..base
        }
    }

    #[test]
    fn test_classifier_learns_and_bounds_probability() {
        let (x, labels, _) = data(200);
        let clf = RandomForestClassifier::fit(&x, &labels, small_params(ForestParams::classifier()))
            .unwrap();
        assert!(clf.accuracy(&x, &labels) > 0.85);
        for f in &x {
            let p = clf.predict_probability(f);
            assert!((0.0..=1.0).contains(&p));
            let [p0, p1] = clf.predict_proba(f);
            assert!((p0 + p1 - 1.0).abs() < 1e-12);
        }
        let sum: f64 = clf.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_regressor_fits_linear_target() {
        let (x, _, y) = data(200);
        let reg = RandomForestRegressor::fit(&x, &y, small_params(ForestParams::regressor())).unwrap();
        assert!(reg.r2_score(&x, &y) > 0.8);
        // feature 0 drives the target
        let imp = reg.feature_importances();
        assert!(imp[0] > imp[3]);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, labels, _) = data(120);
        let params = small_params(ForestParams::classifier());
        let a = RandomForestClassifier::fit(&x, &labels, params).unwrap();
        let b = RandomForestClassifier::fit(&x, &labels, params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_json_round_trip() {
        let (x, _, y) = data(100);
        let reg = RandomForestRegressor::fit(&x, &y, small_params(ForestParams::regressor())).unwrap();
        let json = reg.to_json_string().unwrap();
        let loaded = RandomForestRegressor::from_json_str(&json).unwrap();
        for f in x.iter().take(10) {
            assert_eq!(reg.predict(f).to_bits(), loaded.predict(f).to_bits());
        }
    }

    #[test]
    fn test_wrong_model_type_rejected() {
        let (x, _, y) = data(50);
        let reg = RandomForestRegressor::fit(&x, &y, small_params(ForestParams::regressor())).unwrap();
        let json = reg.to_json_string().unwrap();
        let err = RandomForestClassifier::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("random_forest_classifier"));
    }

    #[test]
    fn test_feature_order_mismatch_rejected() {
        let (x, _, y) = data(50);
        let reg = RandomForestRegressor::fit(&x, &y, small_params(ForestParams::regressor())).unwrap();
        let json = reg
            .to_json_string()
            .unwrap()
            .replacen("\"median_home_value\",\"median_rent\"", "\"median_rent\",\"median_home_value\"", 1);
        assert!(matches!(
            RandomForestRegressor::from_json_str(&json),
            Err(ModelError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn test_r2_edge_cases() {
        assert_eq!(r2(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
        assert_eq!(r2(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r2(&[5.0, 5.0], &[4.0, 6.0]), 0.0);
        assert_eq!(r2(&[], &[]), 0.0);
    }
}
