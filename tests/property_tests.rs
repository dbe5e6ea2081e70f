/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
mod common;

use proptest::prelude::*;
use zipscore_api::composer::{self, percentile_rank};
use zipscore_api::features::price_to_rent;
use zipscore_api::proximity::find_nearby_zips;
use zipscore_api::services::ScoringService;
use zipscore_api::store::InMemoryStore;
use zipscore_api::weights::ScoreWeights;

fn metric_record(zip: u32, home: f64, rent: f64, heat: f64) -> zipscore_api::models::RegionMetrics {
    let mut record = common::region(&format!("{:05}", zip), "MA", "394404", home, heat);
    record.median_rent = rent;
    record
}

proptest! {
    #[test]
    fn price_to_rent_is_annualised_ratio(home in 1_000.0f64..5_000_000.0, rent in 100.0f64..20_000.0) {
        let ratio = price_to_rent(home, rent).unwrap();
        prop_assert_eq!(ratio, home / (rent * 12.0));
        prop_assert!(ratio > 0.0);
    }

    #[test]
    fn non_positive_rent_is_rejected(home in 1_000.0f64..5_000_000.0, rent in -1_000.0f64..=0.0) {
        prop_assert!(price_to_rent(home, rent).is_err());
    }

    #[test]
    fn percentile_ranks_are_bounded(values in prop::collection::vec(-1e6f64..1e6, 1..200)) {
        let ranks = percentile_rank(&values);
        prop_assert_eq!(ranks.len(), values.len());
        for &r in &ranks {
            prop_assert!(r > 0.0 && r <= 100.0);
        }
        // Larger values never rank lower
        for i in 0..values.len() {
            for j in 0..values.len() {
                if values[i] < values[j] {
                    prop_assert!(ranks[i] < ranks[j]);
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn composite_components_stay_in_range(
        rows in prop::collection::vec(
            (50_000.0f64..2_000_000.0, 500.0f64..6_000.0, 1.0f64..120.0, 0.0f64..60.0, 1.0f64..100.0),
            1..60
        )
    ) {
        let records: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(i, &(home, rent, days, cuts, heat))| {
                let mut r = metric_record(10_000 + i as u32, home, rent, heat);
                r.days_pending = days;
                r.price_cuts_percent = cuts;
                r
            })
            .collect();

        let composition = composer::compose(&records, &ScoreWeights::default()).unwrap();
        prop_assert_eq!(composition.scores.len(), records.len());
        for (c, &s) in composition.components.iter().zip(&composition.scores) {
            for v in c.as_array() {
                prop_assert!((0.0..=100.0).contains(&v));
            }
            prop_assert!((0.0..=100.0 + 1e-9).contains(&s));
        }
        prop_assert!(composition.labels.iter().any(|&l| l));
    }

    #[test]
    fn nearby_zips_are_sorted_and_exclude_target(
        target in 0u32..99_999,
        known in prop::collection::vec(0u32..99_999, 0..50),
        k in 1usize..10
    ) {
        let target = format!("{:05}", target);
        let known: Vec<String> = known.iter().map(|z| format!("{:05}", z)).collect();
        let nearby = find_nearby_zips(&target, &known, k);

        prop_assert!(nearby.len() <= k);
        prop_assert!(!nearby.contains(&target));
        let t: i64 = target.parse().unwrap();
        let distances: Vec<i64> = nearby
            .iter()
            .map(|z| (z.parse::<i64>().unwrap() - t).abs())
            .collect();
        prop_assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn non_numeric_target_has_no_neighbours(target in "[A-Za-z]{1,5}") {
        let nearby = find_nearby_zips(&target, &["02134", "02135"], 3);
        prop_assert!(nearby.is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn investment_scores_are_probabilities(
        home in 50_000.0f64..2_000_000.0,
        rent in 500.0f64..6_000.0,
        heat in 1.0f64..100.0
    ) {
        let bundle = common::bundle();
        let features = metric_record(2134, home, rent, heat).features().unwrap();
        let scores = bundle.score(&features);
        prop_assert!((0.0..=1.0).contains(&scores.investment_score));
        let [p0, p1] = bundle.classifier().predict_proba(&features);
        prop_assert!((p0 + p1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn state_recommendations_are_sorted(
        homes in prop::collection::vec(50_000.0f64..500_000.0, 0..40)
    ) {
        let records: Vec<_> = homes
            .iter()
            .enumerate()
            .map(|(i, &home)| metric_record(20_000 + i as u32, home, 1_500.0, 60.0))
            .collect();
        let store = InMemoryStore::new(records).unwrap();
        let bundle = common::bundle();
        let service = ScoringService::new(&bundle, &store);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let recs = runtime.block_on(service.score_state("ma")).unwrap();

        prop_assert_eq!(recs.len(), homes.len());
        prop_assert!(recs.windows(2).all(|w| w[0].ranking_score >= w[1].ranking_score));
    }
}
