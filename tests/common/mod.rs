//! Hand-built models and fixtures shared by the integration tests.
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use uuid::Uuid;

use zipscore_api::artifacts::{ModelBundle, ModelInfo, TargetThresholds, TrainingMetrics};
use zipscore_api::features;
use zipscore_api::forest::{ForestParams, RandomForestClassifier, RandomForestRegressor};
use zipscore_api::models::RegionMetrics;
use zipscore_api::scaler::StandardScaler;
use zipscore_api::store::InMemoryStore;
use zipscore_api::tree::{Criterion, DecisionTree, TreeNode};

fn split(feature: i32, threshold: f64, left: i32, right: i32) -> TreeNode {
    TreeNode {
        feature,
        threshold,
        left,
        right,
        value: None,
    }
}

fn leaf(value: Vec<f64>) -> TreeNode {
    TreeNode {
        feature: -1,
        threshold: 0.0,
        left: -1,
        right: -1,
        value: Some(value),
    }
}

/// Ranker: home value <= 150k -> 10, <= 250k -> 50, otherwise 30.
/// Classifier: market heat <= 50 -> 0.2, otherwise 0.7.
/// Both scalers are identities, so raw metrics reach the trees unchanged.
pub fn bundle() -> ModelBundle {
    let ranker_tree = DecisionTree::from_nodes(
        Criterion::Mse,
        vec![
            split(0, 150_000.0, 1, 2),
            leaf(vec![10.0]),
            split(0, 250_000.0, 3, 4),
            leaf(vec![50.0]),
            leaf(vec![30.0]),
        ],
    )
    .unwrap();
    let classifier_tree = DecisionTree::from_nodes(
        Criterion::Gini,
        vec![
            split(4, 50.0, 1, 2),
            leaf(vec![0.8, 0.2]),
            leaf(vec![0.3, 0.7]),
        ],
    )
    .unwrap();

    let classifier =
        RandomForestClassifier::from_trees(ForestParams::classifier(), vec![classifier_tree]).unwrap();
    let ranker =
        RandomForestRegressor::from_trees(ForestParams::regressor(), vec![ranker_tree]).unwrap();

    ModelBundle::new(
        classifier,
        ranker,
        StandardScaler::identity(),
        StandardScaler::identity(),
        model_info(),
    )
    .unwrap()
}

pub fn model_info() -> ModelInfo {
    ModelInfo {
        feature_names: features::feature_names(),
        target_thresholds: TargetThresholds {
            price_to_rent_median: 14.0,
            market_heat_median: 55.0,
            days_pending_median: 30.0,
        },
        run_id: Uuid::nil(),
        trained_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        metrics: TrainingMetrics {
            classifier_accuracy: 0.9,
            ranker_r2: 0.8,
            n_train: 80,
            n_test: 20,
            label_threshold: 55.0,
            positive_rate: 0.4,
        },
        artifact_digests: Default::default(),
    }
}

pub fn region(zip: &str, state: &str, region_id: &str, home: f64, heat: f64) -> RegionMetrics {
    RegionMetrics {
        zip_code: zip.to_string(),
        region_id: region_id.to_string(),
        city: "Testville".to_string(),
        state: state.to_string(),
        msa_name: format!("Metro {}", region_id),
        median_home_value: home,
        median_rent: 1_500.0,
        days_pending: 30.0,
        price_cuts_percent: 10.0,
        market_heat: heat,
        price_to_rent: None,
    }
}

/// MA ranking scores in storage order: 50, 10, 30, 10. One NH ZIP scoring 30.
pub fn sample_records() -> Vec<RegionMetrics> {
    vec![
        region("02134", "MA", "394404", 200_000.0, 70.0),
        region("02135", "MA", "394404", 100_000.0, 40.0),
        region("02130", "MA", "394404", 300_000.0, 60.0),
        region("01001", "MA", "394390", 120_000.0, 55.0),
        region("03101", "NH", "394830", 280_000.0, 45.0),
    ]
}

pub fn sample_store() -> InMemoryStore {
    InMemoryStore::new(sample_records()).unwrap()
}

/// Fresh, not yet created directory under the system temp dir.
pub fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("zipscore-{}-{}", label, Uuid::new_v4()))
}

/// `n` independent synthetic ZIPs across three states, reproducible per `seed`.
pub fn population(n: usize, seed: u64) -> Vec<RegionMetrics> {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let states = ["MA", "NH", "CT"];
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| RegionMetrics {
            zip_code: format!("{:05}", 10_000 + i),
            region_id: format!("{}", 394_000 + i % 7),
            city: format!("Town {}", i),
            state: states[i % states.len()].to_string(),
            msa_name: format!("Metro {}", i % 7),
            median_home_value: rng.gen_range(80_000.0..900_000.0),
            median_rent: rng.gen_range(800.0..4_000.0),
            days_pending: rng.gen_range(5.0..90.0),
            price_cuts_percent: rng.gen_range(1.0..40.0),
            market_heat: rng.gen_range(10.0..95.0),
            price_to_rent: None,
        })
        .collect()
}
