//! Relationships between tasks.
//!
//! ## Submodules
//!
//! - [`deps`]: dependency graph built from `depends_on`/`blocks`.
//! - [`cycles`]: loop detection for the validator and for edits.

pub mod cycles;
pub mod deps;

pub use cycles::{Cycle, detect_cycle_on_add, find_all_cycles, has_cycles};
pub use deps::DependencyGraph;
