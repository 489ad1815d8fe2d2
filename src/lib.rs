//! # Jerez Telemetry: Synthetic MotoGP Gearing Case Study
//!
//! **Version**: 0.4.0
//!
//! Generates a seeded, synthetic 35-channel telemetry dataset for two gearing
//! setups (baseline and optimized) over the Jerez circuit, then derives the
//! case-study artefacts from it: metric tables, hypothesis tests on the
//! Glicko volatility proxy σ, publication figures and an MDF4 4.10 export.
//! Secondary H1/H2 tables (skill-atom segmentation, MQTT latency, sector
//! time loss) come from [`h1h2`].
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Genchi Genbutsu**: every table is recomputed from the dataset on disk,
//!   never from cached numbers
//! - **Poka-Yoke safety**: channel bounds are enforced at generation time and
//!   re-checked by the verifier
//! - **Jidoka**: a critical verification failure fails the run
//! - **Heijunka**: one fixed seed, one reproducible dataset
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use jerez_telemetry::config::StudyConfig;
//! use jerez_telemetry::pipeline::{Pipeline, RunFlags, RunOptions};
//!
//! let config = StudyConfig::builder().output_dir("output").build();
//! let options = RunOptions::from_flags(&RunFlags::default());
//! let summary = Pipeline::new(config, options)?.run()?;
//! println!("{}", summary.render());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod circuit;
pub mod config;
pub mod error;
pub mod figures;
pub mod glicko;
pub mod h1h2;
pub mod mdf4;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod storage;
pub mod telemetry;
pub mod verify;

pub use error::{Error, Result};
