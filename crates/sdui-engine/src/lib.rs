pub mod pipeline;

pub use pipeline::PlaceholderPipeline;
