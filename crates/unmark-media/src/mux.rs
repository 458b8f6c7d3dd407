//! Lossless audio remux onto the processed output.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

use crate::command::FfmpegCommand;
use crate::fs_utils::move_file;
use crate::probe::probe_video;

/// Result of an audio copy attempt. None of these fail a job: when the
/// source has no audio, or the remux goes wrong for any reason, the
/// video-only output is left exactly as the encoder wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioMuxOutcome {
    /// Audio was stream-copied onto the output
    Muxed,
    /// The original has no audio track; output stays video-only
    NoAudioTrack,
    /// The remux failed; output stays video-only
    Failed(String),
}

impl AudioMuxOutcome {
    /// True when the output now carries the original audio.
    pub fn has_audio(&self) -> bool {
        matches!(self, AudioMuxOutcome::Muxed)
    }
}

/// Copies the original file's audio track onto a video-only output.
#[async_trait]
pub trait AudioMuxer: Send + Sync {
    /// Attempt the stream-copy remux, replacing `video_only` in place on
    /// success.
    async fn copy_audio(&self, original: &Path, video_only: &Path) -> AudioMuxOutcome;
}

/// FFmpeg stream-copy muxer. Writes the remux to a sibling temp file and
/// swaps it in only after ffmpeg exits cleanly, so a failed attempt can
/// never corrupt the encoder's output.
#[derive(Debug, Clone, Default)]
pub struct FfmpegAudioMuxer;

impl FfmpegAudioMuxer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioMuxer for FfmpegAudioMuxer {
    async fn copy_audio(&self, original: &Path, video_only: &Path) -> AudioMuxOutcome {
        let info = match probe_video(original).await {
            Ok(info) => info,
            Err(e) => {
                return AudioMuxOutcome::Failed(format!("could not probe original: {}", e));
            }
        };

        if !info.has_audio {
            debug!("{} has no audio track, skipping remux", original.display());
            return AudioMuxOutcome::NoAudioTrack;
        }

        let temp = video_only.with_extension("mux.mp4");

        let cmd = FfmpegCommand::new(video_only, &temp)
            .extra_input(original)
            .output_args(["-map", "0:v:0", "-map", "1:a:0", "-c", "copy"]);

        if let Err(reason) = cmd.run().await {
            let _ = tokio::fs::remove_file(&temp).await;
            return AudioMuxOutcome::Failed(reason);
        }

        match move_file(&temp, video_only).await {
            Ok(()) => {
                debug!("remuxed audio from {} onto {}", original.display(), video_only.display());
                AudioMuxOutcome::Muxed
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                warn!("failed to swap remuxed output into place: {}", e);
                AudioMuxOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreadable_original_is_nonfatal() {
        let muxer = FfmpegAudioMuxer::new();
        let outcome = muxer
            .copy_audio(
                Path::new("/nonexistent/original.mp4"),
                Path::new("/nonexistent/video.mp4"),
            )
            .await;

        assert!(matches!(outcome, AudioMuxOutcome::Failed(_)));
        assert!(!outcome.has_audio());
    }
}
