//! Adaptive threshold derivation
//!
//! - `sampler`: sliding window metric samples
//! - `cluster`: normal / elevated regime split
//! - `evt`: GPD tail model over the normal regime
//! - `engine`: hybrid engine with percentile fallbacks

pub mod cluster;
pub mod engine;
pub mod evt;
pub mod sampler;

pub use cluster::{BaselineClusterSplitter, RegimeSplit};
pub use engine::{
    HybridThresholdEngine, Precision, Strategy, Threshold, ThresholdConfig, ThresholdSource,
};
pub use evt::{EvtTailModel, GpdFit, TailEstimate, TailQuantileMode};
pub use sampler::SlidingWindowSampler;
