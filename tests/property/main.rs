//! Property-based invariant tests.
//!
//! Run with: `cargo test --test property`

mod emit_json;
mod merge_equivalence;
mod partition_coverage;
