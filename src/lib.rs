// src/lib.rs

//! Adaptive drill assignment and progression.
//!
//! [`assignment`] and [`progression`] are pure: they take plain state and return plain
//! results. [`service`] is the request layer that reads and writes the SQLite store
//! around them.

pub mod assignment;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod models;
pub mod progression;
pub mod random;
pub mod repository;
pub mod service;

pub use assignment::assign;
pub use config::{AssignParams, FreezePolicy, ProgressionParams, TrainerConfig};
pub use error::{TrainerError, TrainerResult};
pub use progression::complete_session;
pub use random::{FixedDraw, RandomSource, RngSource, SequenceDraw};
