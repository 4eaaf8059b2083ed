//! Soil photo and nutrient readings in, soil texture and crop recommendation out.

pub mod config;
pub mod conversion;
pub mod error;
pub mod fetch;
pub mod inference;
pub mod pipeline;
pub mod prefilter;
pub mod relationships;
pub mod sink;

pub use config::{load_layered, InferenceConfig, RangeLimits};
pub use error::{PipelineError, Result};
pub use fetch::{AnyImageSource, FileImageSource, HttpImageFetcher, ImageSource};
pub use pipeline::Pipeline;
pub use sink::{LogSink, ResultSink};
