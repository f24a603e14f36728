//! The ordered filter pipeline readings stream through on their way to
//! storage.

mod pipeline;

pub use pipeline::{Filter, FilterOutput, FilterPipeline};
