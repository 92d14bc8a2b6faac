//! Streaming transform execution engine.
//!
//! A pipeline is a tree of [`transform::Transform`] instances; each
//! non-leaf transform pulls rows from its upstream, applies its logic, and
//! exposes the same pull contract to its own consumer. Each pipeline
//! instance is single-threaded and cooperative; cancellation is polled
//! between row productions.

pub mod config;
pub mod functions;
pub mod logging;
pub mod pipeline;
pub mod reader_memory;
pub mod transform;

pub use functions::{
    FunctionRegistry, GeneratorMapping, RowGenerator, RuleOutcome, ValidationMapping,
    ValidationRule,
};
pub use pipeline::build_pipeline;
pub use reader_memory::ReaderMemory;
pub use transform::rows::{ColumnPair, TransformRows};
pub use transform::sort::TransformSort;
pub use transform::validation::TransformValidation;
pub use transform::{BoxedTransform, StageCounters, Transform};
