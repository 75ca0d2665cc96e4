//! SQL builder for the JSONB document store: identifiers from schemas only, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
