pub mod aggregator;
pub mod comparator;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod harness;
pub mod interpreter;
pub mod normalizer;
pub mod pipeline;
pub mod traits;
