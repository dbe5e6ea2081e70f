//! ZIP Investment Scoring API Library
//!
//! Scores ZIP codes as real-estate investment candidates from housing-market
//! metrics. A random-forest classifier and regressor, each with its own
//! standard scaler, are trained offline on composite percentile scores and
//! served read-only through a small HTTP API.
//!
//! # Modules
//!
//! - `api`: Route table and app assembly.
//! - `core`: Scoring domain re-exports.
//! - `data`: Storage and artifact re-exports.
//! - `obs`: Observability and logging.
//! - `artifacts`: Model artifact persistence and the loaded bundle.
//! - `composer`: Composite investment score and labels (training only).
//! - `config`: Configuration management.
//! - `db`: Database connection and schema.
//! - `db_storage`: Postgres-backed metric store.
//! - `errors`: Error handling types.
//! - `evaluation`: Holdout evaluation reports.
//! - `features`: Feature derivation shared by training and serving.
//! - `forest`: Random-forest classifier and regressor.
//! - `handlers`: HTTP request handlers.
//! - `integrity`: Artifact checksums.
//! - `models`: Core data models.
//! - `proximity`: Nearby-ZIP fallback.
//! - `scaler`: Feature standardisation.
//! - `services`: Scoring service.
//! - `store`: Storage contract and in-memory store.
//! - `training`: Offline training pipeline.
//! - `tree`: CART decision trees.
//! - `weights`: Composite score weights.

pub mod api;
pub mod core;
pub mod data;
pub mod obs;

pub mod artifacts;
pub mod composer;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod evaluation;
pub mod features;
pub mod forest;
pub mod handlers;
pub mod integrity;
pub mod models;
pub mod proximity;
pub mod scaler;
pub mod services;
pub mod store;
pub mod training;
pub mod tree;
pub mod weights;
