pub mod config;
pub mod pattern;
pub mod normalize;
pub mod tokenizer;
pub mod distance;
pub mod align;
pub mod cluster;
pub mod source;
pub mod pipeline;
pub mod report;
