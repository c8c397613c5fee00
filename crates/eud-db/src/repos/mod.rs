//! Repository modules for all Eudaimonia records.
//!
//! Each module adds methods to `EudService` via `impl EudService` blocks.

pub mod audit;
pub mod catalog;
pub mod import;
pub mod mastery;
pub mod practice;
pub mod profile;
pub mod stage;
pub mod tech_tree;
