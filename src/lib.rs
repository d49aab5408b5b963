pub mod compiler;
pub mod conditions;
pub mod constants;
pub mod description;
pub mod emit;
pub mod error;
pub mod generator;
pub mod names;
pub mod offsets;
pub mod types;
pub mod values;

pub use description::Description;
pub use error::{GeneratorError, Result};
pub use generator::{print_stats, print_warnings, run, RunOutput, Stats};
