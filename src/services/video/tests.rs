use super::*;
use crate::domain::types::{CrowdCategory, GenderCount};
use parking_lot::Mutex;

/// Extractor that encodes the capture offset into the frame bytes
struct StubExtractor {
    duration: anyhow::Result<f64>,
    fail_at: Vec<usize>,
    captured_at: Mutex<Vec<f64>>,
}

impl StubExtractor {
    fn new(duration: f64) -> Self {
        Self { duration: Ok(duration), fail_at: Vec::new(), captured_at: Mutex::new(Vec::new()) }
    }

    fn failing_probe() -> Self {
        Self {
            duration: Err(anyhow::anyhow!("moov atom not found")),
            fail_at: Vec::new(),
            captured_at: Mutex::new(Vec::new()),
        }
    }

    fn fail_captures(mut self, indices: &[usize]) -> Self {
        self.fail_at = indices.to_vec();
        self
    }
}

#[async_trait]
impl FrameExtractor for StubExtractor {
    async fn probe_duration(&self, _path: &Path) -> anyhow::Result<f64> {
        match &self.duration {
            Ok(d) => Ok(*d),
            Err(e) => Err(anyhow::anyhow!("{e}")),
        }
    }

    async fn capture_frame(&self, _path: &Path, at_secs: f64) -> anyhow::Result<Vec<u8>> {
        let idx = {
            let mut captured = self.captured_at.lock();
            captured.push(at_secs);
            captured.len() - 1
        };
        if self.fail_at.contains(&idx) {
            anyhow::bail!("decode error at {at_secs}");
        }
        Ok(vec![idx as u8])
    }
}

/// Inference returning a scripted observation per frame index
struct StubInference {
    per_frame: Vec<anyhow::Result<FrameObservation>>,
}

impl StubInference {
    fn new(per_frame: Vec<anyhow::Result<FrameObservation>>) -> Self {
        Self { per_frame }
    }
}

#[async_trait]
impl FrameInference for StubInference {
    async fn infer(&self, jpeg: &[u8]) -> anyhow::Result<FrameObservation> {
        let idx = jpeg.first().copied().unwrap_or(0) as usize;
        match self.per_frame.get(idx) {
            Some(Ok(obs)) => Ok(*obs),
            Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
            None => anyhow::bail!("no scripted frame {idx}"),
        }
    }
}

fn estimator(extractor: StubExtractor, inference: StubInference) -> (Arc<StubExtractor>, VideoCrowdEstimator) {
    let extractor = Arc::new(extractor);
    let estimator = VideoCrowdEstimator::new(extractor.clone(), Arc::new(inference), 3);
    (extractor, estimator)
}

fn clip() -> VideoAsset {
    VideoAsset::from_path("/data/clips/concourse.mp4").unwrap()
}

#[test]
fn test_asset_accepts_only_video() {
    assert!(VideoAsset::from_path("gate.mp4").is_ok());
    assert!(VideoAsset::from_path("GATE.MOV").is_ok());
    assert!(VideoAsset::from_path("notes.txt").is_err());
    assert!(VideoAsset::from_path("no_extension").is_err());

    let upload = VideoAsset::with_content_type("/tmp/upload-1", "video/webm").unwrap();
    assert_eq!(upload.content_type(), Some("video/webm"));
    assert!(VideoAsset::with_content_type("/tmp/upload-2", "image/png").is_err());
}

#[tokio::test]
async fn test_estimate_aggregates_frames() {
    let (extractor, estimator) = estimator(
        StubExtractor::new(40.0),
        StubInference::new(vec![
            Ok(FrameObservation::new(10, 4, 6)),
            Ok(FrameObservation::new(15, 7, 8)),
            Ok(FrameObservation::new(8, 3, 5)),
        ]),
    );

    let estimate = estimator.estimate(&clip()).await;
    assert!(!estimate.fallback);
    assert_eq!(estimate.frames_captured, 3);
    assert_eq!(estimate.frames_failed, 0);
    assert_eq!(estimate.result.total_people(), 15);
    assert_eq!(estimate.result.gender_breakdown(), GenderCount { boys: 7, girls: 8 });
    assert_eq!(estimate.result.category(), CrowdCategory::Average);

    assert_eq!(*extractor.captured_at.lock(), vec![10.0, 20.0, 30.0]);
}

#[tokio::test]
async fn test_failed_inference_contributes_zero() {
    let (_, estimator) = estimator(
        StubExtractor::new(40.0),
        StubInference::new(vec![
            Ok(FrameObservation::new(12, 6, 6)),
            Err(anyhow::anyhow!("503 from inference")),
            Ok(FrameObservation::new(9, 3, 3)),
        ]),
    );

    let estimate = estimator.estimate(&clip()).await;
    assert!(!estimate.fallback);
    assert_eq!(estimate.frames_failed, 1);
    // Means round(9/3)=3 and round(9/3)=3, rescaled to the busiest frame
    assert_eq!(estimate.result.total_people(), 12);
    assert_eq!(estimate.result.gender_breakdown(), GenderCount { boys: 6, girls: 6 });
}

#[tokio::test]
async fn test_capture_failures_are_skipped() {
    let (_, estimator) = estimator(
        StubExtractor::new(40.0).fail_captures(&[0, 2]),
        StubInference::new(vec![
            Ok(FrameObservation::new(99, 50, 49)),
            Ok(FrameObservation::new(20, 8, 12)),
            Ok(FrameObservation::new(99, 50, 49)),
        ]),
    );

    let estimate = estimator.estimate(&clip()).await;
    assert!(!estimate.fallback);
    assert_eq!(estimate.frames_captured, 1);
    assert_eq!(estimate.frames_failed, 2);
    assert_eq!(estimate.result.total_people(), 20);
}

#[tokio::test]
async fn test_probe_failure_falls_back() {
    let (_, estimator) = estimator(StubExtractor::failing_probe(), StubInference::new(vec![]));

    let estimate = estimator.estimate(&clip()).await;
    assert!(estimate.fallback);
    assert_eq!(estimate.frames_captured, 0);
    assert_eq!(estimate.result.total_people(), 13);
    assert_eq!(estimate.result.category(), CrowdCategory::Average);
    assert_eq!(estimate.result.gender_breakdown(), GenderCount { boys: 6, girls: 7 });
}

#[tokio::test]
async fn test_every_capture_failing_falls_back() {
    let (_, estimator) = estimator(
        StubExtractor::new(40.0).fail_captures(&[0, 1, 2]),
        StubInference::new(vec![]),
    );

    let estimate = estimator.estimate(&clip()).await;
    assert!(estimate.fallback);
    assert_eq!(estimate.frames_failed, 3);
    assert_eq!(estimate.result.category(), CrowdCategory::Average);
}

#[tokio::test]
async fn test_unreachable_inference_falls_back() {
    let (_, estimator) = estimator(
        StubExtractor::new(12.0),
        StubInference::new(vec![
            Err(anyhow::anyhow!("connection refused")),
            Err(anyhow::anyhow!("connection refused")),
            Err(anyhow::anyhow!("connection refused")),
        ]),
    );

    let estimate = estimator.estimate(&clip()).await;
    assert!(estimate.fallback);
    assert_eq!(estimate.frames_captured, 3);
    assert_eq!(estimate.result.total_people(), 13);
}

#[tokio::test]
async fn test_zero_duration_falls_back() {
    let (extractor, estimator) = estimator(StubExtractor::new(0.0), StubInference::new(vec![]));

    let estimate = estimator.estimate(&clip()).await;
    assert!(estimate.fallback);
    assert!(extractor.captured_at.lock().is_empty());
}
