//! Statistics for the baseline vs optimized comparison
//!
//! Pure functions over `&[f64]`, no allocation beyond sorting copies.
//! Degenerate inputs (too few observations, zero variance) surface as
//! `Error::InsufficientData` / `Error::InvalidInput` instead of NaN.

pub mod descriptive;
pub mod hypothesis;
pub mod interpret;
pub mod special;

pub use descriptive::{mean, median, std_dev, Summary};
pub use hypothesis::{cohens_d, ks_two_sample, levene_test, welch_t_test, TestResult};
