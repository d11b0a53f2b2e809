use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Confidence for a single expression category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionScore {
    pub key: String,
    /// Confidence in [0, 1].
    pub score: f32,
}

/// Classification scores for one face, in the classifier's natural key order.
///
/// Order matters: it decides ties when picking the dominant category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionScores {
    entries: Vec<ExpressionScore>,
}

impl ExpressionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (key, score) pairs, keeping their order.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f32)>,
        K: Into<String>,
    {
        let mut scores = Self::new();
        for (key, score) in pairs {
            scores.insert(key, score);
        }
        scores
    }

    /// Set the score for `key`. A repeated key keeps its original position.
    ///
    /// Scores are clamped to [0, 1]; non-finite values become 0.
    pub fn insert(&mut self, key: impl Into<String>, score: f32) {
        let key = key.into();
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.score = score,
            None => self.entries.push(ExpressionScore { key, score }),
        }
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.score)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpressionScore> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The highest-scoring category. Ties go to the first key encountered.
    pub fn dominant(&self) -> Option<&ExpressionScore> {
        let mut best: Option<&ExpressionScore> = None;
        for entry in &self.entries {
            match best {
                Some(b) if entry.score <= b.score => {}
                _ => best = Some(entry),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_is_max() {
        let scores = ExpressionScores::from_pairs([
            ("neutral", 0.15),
            ("happy", 0.82),
            ("sad", 0.03),
        ]);
        assert_eq!(scores.dominant().unwrap().key, "happy");
    }

    #[test]
    fn test_dominant_tie_prefers_first_key() {
        let scores = ExpressionScores::from_pairs([
            ("neutral", 0.1),
            ("sad", 0.45),
            ("angry", 0.45),
        ]);
        assert_eq!(scores.dominant().unwrap().key, "sad");
    }

    #[test]
    fn test_dominant_empty() {
        assert!(ExpressionScores::new().dominant().is_none());
    }

    #[test]
    fn test_dominant_all_zero_takes_first() {
        let scores = ExpressionScores::from_pairs([("fearful", 0.0), ("happy", 0.0)]);
        assert_eq!(scores.dominant().unwrap().key, "fearful");
    }

    #[test]
    fn test_insert_clamps_and_sanitizes() {
        let mut scores = ExpressionScores::new();
        scores.insert("happy", 1.7);
        scores.insert("sad", -0.2);
        scores.insert("angry", f32::NAN);
        assert_eq!(scores.get("happy"), Some(1.0));
        assert_eq!(scores.get("sad"), Some(0.0));
        assert_eq!(scores.get("angry"), Some(0.0));
    }

    #[test]
    fn test_repeated_key_keeps_position() {
        let scores = ExpressionScores::from_pairs([("a", 0.1), ("b", 0.2), ("a", 0.9)]);
        let keys: Vec<&str> = scores.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(scores.get("a"), Some(0.9));
    }

    #[test]
    fn test_face_area_ignores_negative_extent() {
        let face = FaceBox {
            x: 0.0, y: 0.0, width: -4.0, height: 10.0, confidence: 0.9, landmarks: None,
        };
        assert_eq!(face.area(), 0.0);
    }
}
