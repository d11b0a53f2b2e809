//! Results view construction.

use emoscope_core::{build_chart, descriptor, ChartBar, ExpressionScores};
use image::{ImageFormat, RgbImage};
use serde::Serialize;
use std::io::Cursor;
use std::path::PathBuf;

/// Completed analyses in this process. Never decreases.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionCounter(u64);

impl SessionCounter {
    pub fn get(&self) -> u64 {
        self.0
    }

    fn increment(&mut self) -> u64 {
        self.0 = self.0.saturating_add(1);
        self.0
    }
}

/// The image shown next to the results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResultImage {
    /// An uploaded image, shown from its original file.
    File { path: PathBuf },
    /// A captured frame, re-encoded as JPEG.
    Snapshot {
        width: u32,
        height: u32,
        #[serde(skip)]
        jpeg: Vec<u8>,
    },
}

impl ResultImage {
    pub fn snapshot(image: &RgbImage) -> Result<Self, image::ImageError> {
        let mut jpeg = Vec::new();
        image.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;
        Ok(ResultImage::Snapshot {
            width: image.width(),
            height: image.height(),
            jpeg,
        })
    }
}

/// Everything the results screen displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsView {
    pub session_count: u64,
    pub image: ResultImage,
    pub dominant: String,
    pub icon: String,
    pub label: String,
    pub tip: String,
    pub chart: Vec<ChartBar>,
}

/// Count the analysis and build its results view.
///
/// Unknown dominant keys borrow the neutral descriptor; unknown chart keys
/// keep their raw key as label.
pub fn render(
    counter: &mut SessionCounter,
    image: ResultImage,
    dominant: &str,
    scores: &ExpressionScores,
) -> ResultsView {
    let session_count = counter.increment();
    let (icon, label, tip) = match descriptor::lookup_or_fallback(dominant) {
        Some(d) => (d.icon.clone(), d.label.clone(), d.tip.clone()),
        None => (String::new(), dominant.to_string(), String::new()),
    };

    tracing::info!(session_count, dominant, "results rendered");

    ResultsView {
        session_count,
        image,
        dominant: dominant.to_string(),
        icon,
        label,
        tip,
        chart: build_chart(scores),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_image() -> ResultImage {
        ResultImage::File { path: PathBuf::from("/tmp/face.jpg") }
    }

    #[test]
    fn test_counter_increments_per_render() {
        let mut counter = SessionCounter::default();
        let scores = ExpressionScores::from_pairs([("happy", 1.0)]);
        for n in 1..=3 {
            let view = render(&mut counter, file_image(), "happy", &scores);
            assert_eq!(view.session_count, n);
        }
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn test_happy_upload_view() {
        let mut counter = SessionCounter::default();
        let scores = ExpressionScores::from_pairs([("neutral", 0.15), ("happy", 0.82)]);
        let view = render(&mut counter, file_image(), "happy", &scores);
        let happy = descriptor::lookup("happy").unwrap();
        assert_eq!(view.label, happy.label);
        assert_eq!(view.icon, happy.icon);
        assert_eq!(view.tip, happy.tip);
        let percents: Vec<u8> = view.chart.iter().map(|b| b.percent).collect();
        assert_eq!(percents, [82, 15]);
    }

    #[test]
    fn test_unknown_dominant_uses_neutral() {
        let mut counter = SessionCounter::default();
        let scores = ExpressionScores::from_pairs([("contempt", 0.7), ("sad", 0.3)]);
        let view = render(&mut counter, file_image(), "contempt", &scores);
        let neutral = descriptor::lookup("neutral").unwrap();
        assert_eq!(view.icon, neutral.icon);
        assert_eq!(view.tip, neutral.tip);
        assert_eq!(view.dominant, "contempt");
        // The chart still names the raw key.
        assert_eq!(view.chart[0].label, "contempt");
        assert_eq!(view.chart[0].icon, None);
    }

    #[test]
    fn test_snapshot_encodes_jpeg() {
        let image = RgbImage::from_pixel(16, 12, image::Rgb([120, 80, 40]));
        match ResultImage::snapshot(&image).unwrap() {
            ResultImage::Snapshot { width, height, jpeg } => {
                assert_eq!((width, height), (16, 12));
                assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
