use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inference::Expressions;

/// Dominant expression picked from one detection tick.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionSample {
    pub label: String,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl EmotionSample {
    /// Picks the strictly highest confidence; on ties the first label wins.
    ///
    /// Non-finite confidences are ignored. Returns `None` when nothing usable is left.
    pub fn from_expressions(expressions: &Expressions) -> Option<Self> {
        let mut best: Option<(&String, f32)> = None;
        for (label, &confidence) in expressions {
            if !confidence.is_finite() {
                continue;
            }
            match best {
                Some((_, best_confidence)) if confidence <= best_confidence => {}
                _ => best = Some((label, confidence)),
            }
        }
        best.map(|(label, confidence)| Self {
            label: label.clone(),
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEmotion {
    pub label: String,
    pub confidence: f32,
}

impl AggregatedEmotion {
    pub const DEFAULT_LABEL: &'static str = "Normal";

    /// Caption drawn over the face box, e.g. `happy: 80%`.
    pub fn display_label(&self) -> String {
        format!("{}: {:.0}%", self.label, self.confidence * 100.0)
    }
}

impl Default for AggregatedEmotion {
    fn default() -> Self {
        Self {
            label: Self::DEFAULT_LABEL.to_string(),
            confidence: 0.0,
        }
    }
}

impl From<&EmotionSample> for AggregatedEmotion {
    fn from(sample: &EmotionSample) -> Self {
        Self {
            label: sample.label.clone(),
            confidence: sample.confidence,
        }
    }
}

/// Holds the best-known emotion; frames without a usable reading never clear it.
#[derive(Debug, Clone, Default)]
pub struct EmotionAggregator {
    current: AggregatedEmotion,
    last_sample: Option<EmotionSample>,
}

impl EmotionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues from a previously published value instead of the "Normal" default.
    pub fn resume(current: AggregatedEmotion) -> Self {
        Self {
            current,
            last_sample: None,
        }
    }

    pub fn current(&self) -> &AggregatedEmotion {
        &self.current
    }

    pub fn last_sample(&self) -> Option<&EmotionSample> {
        self.last_sample.as_ref()
    }

    /// Folds one classifier result in. Returns whether the current value changed.
    pub fn update(&mut self, expressions: Option<&Expressions>) -> bool {
        let Some(sample) = expressions.and_then(EmotionSample::from_expressions) else {
            return false;
        };
        let next = AggregatedEmotion::from(&sample);
        self.last_sample = Some(sample);
        if next == self.current {
            return false;
        }
        self.current = next;
        true
    }
}
