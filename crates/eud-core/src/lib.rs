//! # eud-core
//!
//! Core types and pure progression logic for the Eudaimonia art-mastery engine.
//!
//! This crate provides the foundational types shared across all Eudaimonia crates:
//! - Entity structs for the catalog (taxonomies, arts, parts, stages, tech tree nodes)
//!   and per-user progress records (mastery, practice sessions, stage and node progress)
//! - Enums with their SQL string forms
//! - ID prefix constants
//! - Cross-cutting error types
//! - Mastery, stage, milestone, streak and virtue-reward math
//! - Cycle-safe traversal of the tech tree and taxonomy graphs
//! - Cascade effects produced by tech tree unlocks
//! - The TOML catalog file format used for seeding
//! - JSONL trail operation envelope

pub mod audit_detail;
pub mod cascade;
pub mod catalog_file;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod graph;
pub mod ids;
pub mod progression;
pub mod responses;
pub mod trail;
pub mod virtues;
