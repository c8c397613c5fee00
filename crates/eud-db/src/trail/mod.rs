//! JSONL trail writer.
//!
//! Per-user JSONL files in the configured trail directory mirror every
//! committed mutation.

pub mod writer;
