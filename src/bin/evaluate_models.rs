//! Evaluates the saved bundle on its persisted holdout split.
//!
//! Usage: `evaluate_models [model_dir]`

use std::path::PathBuf;

use zipscore_api::artifacts::ModelBundle;
use zipscore_api::evaluation;
use zipscore_api::obs;
use zipscore_api::training::HoldoutSet;

fn main() -> anyhow::Result<()> {
    obs::init_tracing("zipscore_api=info,evaluate_models=info");
    dotenvy::dotenv().ok();

    let model_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MODEL_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("model"));

    let bundle = ModelBundle::load(&model_dir).map_err(|e| anyhow::anyhow!(e))?;
    let holdout = HoldoutSet::load(&model_dir).map_err(|e| anyhow::anyhow!(e))?;

    let (report, rows) = evaluation::evaluate(&bundle, &holdout).map_err(|e| anyhow::anyhow!(e))?;
    evaluation::save_report(&report, &rows, &model_dir).map_err(|e| anyhow::anyhow!(e))?;

    let cm = &report.confusion_matrix;
    println!("\nConfusion Matrix:");
    println!("  [[{:>4} {:>4}]", cm.true_negative, cm.false_positive);
    println!("   [{:>4} {:>4}]]", cm.false_negative, cm.true_positive);

    println!("\nClassification Report:");
    println!("{:>8} {:>10} {:>8} {:>8} {:>8}", "", "precision", "recall", "f1", "support");
    for class in &report.classes {
        println!(
            "{:>8} {:>10.2} {:>8.2} {:>8.2} {:>8}",
            class.label, class.precision, class.recall, class.f1, class.support
        );
    }
    println!("accuracy: {:.2}", report.accuracy);

    println!("\nConfidence Score Analysis:");
    println!("Average confidence: {:.2}", report.confidence_mean);
    println!("Median confidence: {:.2}", report.confidence_median);

    println!("\nInvestment Score Analysis:");
    println!("Average predicted score: {:.2}", report.predicted_score_mean);
    println!("Average true score: {:.2}", report.true_score_mean);
    match report.score_correlation {
        Some(r) => println!("Score correlation: {:.2}", r),
        None => println!("Score correlation: undefined"),
    }

    println!("\nFeature Importances:");
    for fi in &report.feature_importances {
        println!("  {:<20} {:.3}", fi.feature, fi.importance);
    }

    println!(
        "\nReport written to {}",
        evaluation::results_dir(&model_dir).display()
    );
    Ok(())
}
