//! The watermark-removal orchestrator.
//!
//! Sequences decode, per-frame detect/inpaint, encode, and audio remux
//! over injected collaborators, reporting per-frame progress along the
//! way. Detector and inpainter faults fail the run immediately; a frame
//! is never silently dropped from the output sequence.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::FrameCodec;
use crate::detect::WatermarkDetector;
use crate::error::{MediaError, MediaResult};
use crate::frame::VideoMeta;
use crate::inpaint::WatermarkInpainter;
use crate::mux::{AudioMuxOutcome, AudioMuxer};

/// Stages of one pipeline run. A run that returns an error halted in
/// whatever stage it had reached; nothing partial is advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Started,
    Decoded,
    FramesProcessed,
    Encoded,
    AudioMuxed,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Started => "started",
            PipelineStage::Decoded => "decoded",
            PipelineStage::FramesProcessed => "frames_processed",
            PipelineStage::Encoded => "encoded",
            PipelineStage::AudioMuxed => "audio_muxed",
            PipelineStage::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Total frames in the sequence
    pub frames_total: usize,
    /// Frames whose mask was non-empty and were inpainted
    pub frames_inpainted: usize,
    /// What happened to the audio track
    pub audio: AudioMuxOutcome,
    /// Stream metadata carried through decode and encode
    pub meta: VideoMeta,
}

/// Drives one video through detect/inpaint/re-encode/remux.
///
/// All four collaborators are injected, so detection and inpainting
/// strategies can be swapped (or faked in tests) without touching the
/// sequencing here.
pub struct RemovalPipeline {
    codec: Arc<dyn FrameCodec>,
    detector: Arc<dyn WatermarkDetector>,
    inpainter: Arc<dyn WatermarkInpainter>,
    muxer: Arc<dyn AudioMuxer>,
}

impl RemovalPipeline {
    pub fn new(
        codec: Arc<dyn FrameCodec>,
        detector: Arc<dyn WatermarkDetector>,
        inpainter: Arc<dyn WatermarkInpainter>,
        muxer: Arc<dyn AudioMuxer>,
    ) -> Self {
        Self {
            codec,
            detector,
            inpainter,
            muxer,
        }
    }

    /// Process `input` into `output`.
    ///
    /// `progress` is invoked after each frame with
    /// `(frames_done, frames_total, status)`; calls are monotonically
    /// non-decreasing in `frames_done`.
    pub async fn run<F>(
        &self,
        input: &Path,
        output: &Path,
        progress: F,
    ) -> MediaResult<PipelineReport>
    where
        F: Fn(usize, usize, &str) + Send + Sync,
    {
        let mut stage = PipelineStage::Started;
        debug!(stage = %stage, "pipeline run starting for {}", input.display());

        let (frames, meta) = self.codec.decode(input).await?;
        let total = frames.len();
        stage = PipelineStage::Decoded;
        debug!(stage = %stage, "decoded {} frames", total);
        progress(0, total, "removing watermarks");

        let mut processed = Vec::with_capacity(total);
        let mut inpainted = 0usize;
        for (index, frame) in frames.into_iter().enumerate() {
            let mask = self.detector.detect(&frame)?;
            if mask.width() != frame.width() || mask.height() != frame.height() {
                return Err(MediaError::detection_failed(format!(
                    "detector '{}' returned a {}x{} mask for a {}x{} frame",
                    self.detector.name(),
                    mask.width(),
                    mask.height(),
                    frame.width(),
                    frame.height()
                )));
            }

            // Clean frames pass through untouched; the inpainter only
            // ever sees a non-empty mask.
            let frame = if mask.any() {
                let filled = self.inpainter.inpaint(&frame, &mask)?;
                if filled.width() != frame.width() || filled.height() != frame.height() {
                    return Err(MediaError::inpaint_failed(format!(
                        "inpainter '{}' changed frame dimensions",
                        self.inpainter.name()
                    )));
                }
                inpainted += 1;
                filled
            } else {
                frame
            };

            processed.push(frame);
            progress(index + 1, total, "removing watermarks");
        }
        stage = PipelineStage::FramesProcessed;
        debug!(stage = %stage, "inpainted {} of {} frames", inpainted, total);

        self.codec.encode(&processed, &meta, output).await?;
        stage = PipelineStage::Encoded;
        debug!(stage = %stage, "wrote {}", output.display());

        let audio = self.muxer.copy_audio(input, output).await;
        match &audio {
            AudioMuxOutcome::Muxed => {}
            AudioMuxOutcome::NoAudioTrack => {
                debug!("original has no audio track, output stays video-only");
            }
            AudioMuxOutcome::Failed(reason) => {
                warn!("audio remux failed, output stays video-only: {}", reason);
            }
        }
        stage = PipelineStage::AudioMuxed;
        debug!(stage = %stage, "audio remux settled");

        progress(total, total, "finished");
        stage = PipelineStage::Done;
        info!(
            stage = %stage,
            "processed {} frames ({} inpainted) from {}",
            total,
            inpainted,
            input.display()
        );

        Ok(PipelineReport {
            frames_total: total,
            frames_inpainted: inpainted,
            audio,
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::detect::{CornerContrastDetector, DisabledDetector};
    use crate::frame::{Frame, Mask, Rect};
    use crate::inpaint::MedianFilterInpainter;

    /// Codec over an in-memory frame sequence; records what it encodes.
    struct MemoryCodec {
        frames: Vec<Frame>,
        meta: VideoMeta,
        encoded: Mutex<Option<Vec<Frame>>>,
    }

    impl MemoryCodec {
        fn new(frames: Vec<Frame>, meta: VideoMeta) -> Arc<Self> {
            Arc::new(Self {
                frames,
                meta,
                encoded: Mutex::new(None),
            })
        }

        fn encoded_frames(&self) -> Vec<Frame> {
            self.encoded.lock().unwrap().clone().expect("encode ran")
        }
    }

    #[async_trait]
    impl FrameCodec for MemoryCodec {
        async fn decode(&self, _input: &Path) -> MediaResult<(Vec<Frame>, VideoMeta)> {
            if self.frames.is_empty() {
                return Err(MediaError::decode_failed("input yielded zero frames"));
            }
            Ok((self.frames.clone(), self.meta))
        }

        async fn encode(
            &self,
            frames: &[Frame],
            _meta: &VideoMeta,
            _output: &Path,
        ) -> MediaResult<()> {
            *self.encoded.lock().unwrap() = Some(frames.to_vec());
            Ok(())
        }
    }

    /// Muxer scripted to a fixed outcome.
    struct ScriptedMuxer(AudioMuxOutcome);

    #[async_trait]
    impl AudioMuxer for ScriptedMuxer {
        async fn copy_audio(&self, _original: &Path, _video_only: &Path) -> AudioMuxOutcome {
            self.0.clone()
        }
    }

    /// Detector marking the top-left corner region of every frame.
    struct AlwaysCornerDetector;

    impl WatermarkDetector for AlwaysCornerDetector {
        fn detect(&self, frame: &Frame) -> MediaResult<Mask> {
            let mut mask = Mask::empty(frame.width(), frame.height());
            mask.mark_rect(Rect::new(0, 0, frame.width() / 4, frame.height() / 4));
            Ok(mask)
        }

        fn name(&self) -> &'static str {
            "always_corner"
        }
    }

    fn meta_16() -> VideoMeta {
        VideoMeta {
            fps: 30.0,
            width: 16,
            height: 16,
        }
    }

    fn clean_frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| Frame::filled(16, 16, [i as u8, 100, 100]))
            .collect()
    }

    fn pipeline(
        codec: Arc<dyn FrameCodec>,
        detector: Arc<dyn WatermarkDetector>,
        muxer: Arc<dyn AudioMuxer>,
    ) -> RemovalPipeline {
        RemovalPipeline::new(
            codec,
            detector,
            Arc::new(MedianFilterInpainter::default()),
            muxer,
        )
    }

    #[tokio::test]
    async fn test_clean_video_passes_through_unchanged() {
        let frames = clean_frames(10);
        let codec = MemoryCodec::new(frames.clone(), meta_16());
        let p = pipeline(
            codec.clone(),
            Arc::new(CornerContrastDetector::default()),
            Arc::new(ScriptedMuxer(AudioMuxOutcome::Muxed)),
        );

        let report = p
            .run(Path::new("in.mp4"), Path::new("out.mp4"), |_, _, _| {})
            .await
            .unwrap();

        assert_eq!(report.frames_total, 10);
        assert_eq!(report.frames_inpainted, 0);
        // Byte-identical pass-through, frame for frame.
        assert_eq!(codec.encoded_frames(), frames);
    }

    #[tokio::test]
    async fn test_marked_frames_are_inpainted_in_place() {
        let frames = clean_frames(4);
        let codec = MemoryCodec::new(frames.clone(), meta_16());
        let p = pipeline(
            codec.clone(),
            Arc::new(AlwaysCornerDetector),
            Arc::new(ScriptedMuxer(AudioMuxOutcome::Muxed)),
        );

        let report = p
            .run(Path::new("in.mp4"), Path::new("out.mp4"), |_, _, _| {})
            .await
            .unwrap();

        assert_eq!(report.frames_inpainted, 4);
        let encoded = codec.encoded_frames();
        assert_eq!(encoded.len(), 4);
        // Unmasked pixels survive byte-identical even on inpainted frames.
        for (before, after) in frames.iter().zip(&encoded) {
            assert_eq!(after.rgb_at(15, 15), before.rgb_at(15, 15));
        }
    }

    #[tokio::test]
    async fn test_decode_failure_aborts_run() {
        let codec = MemoryCodec::new(Vec::new(), meta_16());
        let p = pipeline(
            codec,
            Arc::new(DisabledDetector),
            Arc::new(ScriptedMuxer(AudioMuxOutcome::Muxed)),
        );

        let err = p
            .run(Path::new("in.mp4"), Path::new("out.mp4"), |_, _, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DecodeFailed(_)));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_complete() {
        let codec = MemoryCodec::new(clean_frames(5), meta_16());
        let p = pipeline(
            codec,
            Arc::new(DisabledDetector),
            Arc::new(ScriptedMuxer(AudioMuxOutcome::NoAudioTrack)),
        );

        let calls: Mutex<Vec<(usize, usize)>> = Mutex::new(Vec::new());
        p.run(Path::new("in.mp4"), Path::new("out.mp4"), |current, total, _| {
            calls.lock().unwrap().push((current, total));
        })
        .await
        .unwrap();

        let calls = calls.into_inner().unwrap();
        assert!(!calls.is_empty());
        assert!(calls.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(calls.last(), Some(&(5, 5)));
        assert!(calls.iter().all(|&(_, total)| total == 5));
    }

    #[tokio::test]
    async fn test_mux_failure_never_fails_the_run() {
        let codec = MemoryCodec::new(clean_frames(3), meta_16());
        let p = pipeline(
            codec,
            Arc::new(DisabledDetector),
            Arc::new(ScriptedMuxer(AudioMuxOutcome::Failed(
                "no audio muxer on this host".into(),
            ))),
        );

        let report = p
            .run(Path::new("in.mp4"), Path::new("out.mp4"), |_, _, _| {})
            .await
            .unwrap();

        assert!(matches!(report.audio, AudioMuxOutcome::Failed(_)));
        assert_eq!(report.frames_total, 3);
    }
}
