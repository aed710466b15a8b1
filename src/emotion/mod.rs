pub mod aggregator;

pub use aggregator::{AggregatedEmotion, EmotionAggregator, EmotionSample};
