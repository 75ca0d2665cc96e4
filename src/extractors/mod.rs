//! Request extractors shared by generated and hand-written handlers.

mod body;
mod meta;

pub use body::JsonBody;
