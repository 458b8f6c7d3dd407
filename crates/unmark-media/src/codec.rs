//! Frame decode/encode through piped FFmpeg rawvideo.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, VideoMeta, RGB_CHANNELS};
use crate::probe::probe_video;

/// Decodes a container into ordered frames and re-encodes a processed
/// sequence back into one.
#[async_trait]
pub trait FrameCodec: Send + Sync {
    /// Decode every frame of `input`, in order, together with the stream
    /// metadata the encoder must reuse.
    async fn decode(&self, input: &Path) -> MediaResult<(Vec<Frame>, VideoMeta)>;

    /// Encode `frames` in order at the fps and dimensions of `meta`.
    async fn encode(&self, frames: &[Frame], meta: &VideoMeta, output: &Path) -> MediaResult<()>;
}

/// FFmpeg-backed codec: frames move through rawvideo RGB24 pipes.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameCodec;

impl FfmpegFrameCodec {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameCodec for FfmpegFrameCodec {
    async fn decode(&self, input: &Path) -> MediaResult<(Vec<Frame>, VideoMeta)> {
        let info = probe_video(input)
            .await
            .map_err(|e| MediaError::decode_failed(format!("cannot open input: {}", e)))?;

        if info.width == 0 || info.height == 0 {
            return Err(MediaError::decode_failed(format!(
                "input reports invalid dimensions {}x{}",
                info.width, info.height
            )));
        }

        let meta = VideoMeta {
            fps: info.fps,
            width: info.width,
            height: info.height,
        };

        let cmd = FfmpegCommand::to_stdout(input)
            .output_args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24"]);

        let mut child = cmd.spawn(Stdio::null(), Stdio::piped())?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::decode_failed("failed to capture ffmpeg stdout"))?;

        let mut buffer = Vec::new();
        stdout
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| MediaError::decode_failed(format!("failed to read frames: {}", e)))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| MediaError::decode_failed(format!("ffmpeg process error: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::decode_failed(format!(
                "ffmpeg exited with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let frame_bytes = meta.width as usize * meta.height as usize * RGB_CHANNELS;
        let remainder = buffer.len() % frame_bytes;
        if remainder != 0 {
            // A torn tail means the stream ended mid-frame; drop it.
            warn!(
                "decoder produced {} trailing bytes, discarding partial frame",
                remainder
            );
            buffer.truncate(buffer.len() - remainder);
        }

        if buffer.is_empty() {
            return Err(MediaError::decode_failed(format!(
                "{} yielded zero frames",
                input.display()
            )));
        }

        let mut frames = Vec::with_capacity(buffer.len() / frame_bytes);
        for chunk in buffer.chunks_exact(frame_bytes) {
            frames.push(Frame::from_rgb24(meta.width, meta.height, chunk.to_vec())?);
        }

        debug!(
            "decoded {} frames at {}x{} @ {:.3} fps from {}",
            frames.len(),
            meta.width,
            meta.height,
            meta.fps,
            input.display()
        );

        Ok((frames, meta))
    }

    async fn encode(&self, frames: &[Frame], meta: &VideoMeta, output: &Path) -> MediaResult<()> {
        if frames.is_empty() {
            return Err(MediaError::encode_failed("no frames to encode"));
        }

        // Dimensions come from the stream metadata, not the frames; any
        // frame that disagrees is rejected before ffmpeg sees it.
        for (index, frame) in frames.iter().enumerate() {
            if !frame.matches(meta) {
                return Err(MediaError::encode_failed(format!(
                    "frame {} is {}x{}, stream is {}x{}",
                    index,
                    frame.width(),
                    frame.height(),
                    meta.width,
                    meta.height
                )));
            }
        }

        let size = format!("{}x{}", meta.width, meta.height);
        let rate = format!("{:.3}", meta.fps);
        let cmd = FfmpegCommand::from_stdin(output)
            .input_args([
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                size.as_str(),
                "-r",
                rate.as_str(),
            ])
            .output_args([
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]);

        let mut child = cmd.spawn(Stdio::piped(), Stdio::null())?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::encode_failed("failed to open ffmpeg stdin"))?;

        for frame in frames {
            stdin
                .write_all(frame.as_bytes())
                .await
                .map_err(|e| MediaError::encode_failed(format!("failed to feed frame: {}", e)))?;
        }
        stdin
            .shutdown()
            .await
            .map_err(|e| MediaError::encode_failed(format!("failed to close stdin: {}", e)))?;
        drop(stdin);

        let result = child
            .wait_with_output()
            .await
            .map_err(|e| MediaError::encode_failed(format!("ffmpeg process error: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(MediaError::encode_failed(format!(
                "ffmpeg exited with status {:?}: {}",
                result.status.code(),
                stderr.trim()
            )));
        }

        debug!("encoded {} frames to {}", frames.len(), output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_encode_rejects_dimension_mismatch() {
        let codec = FfmpegFrameCodec::new();
        let meta = VideoMeta {
            fps: 30.0,
            width: 8,
            height: 8,
        };
        let frames = vec![Frame::filled(8, 8, [0; 3]), Frame::filled(4, 4, [0; 3])];

        let err = codec
            .encode(&frames, &meta, Path::new("/tmp/never-written.mp4"))
            .await
            .unwrap_err();
        match err {
            MediaError::EncodeFailed(msg) => assert!(msg.contains("frame 1")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_encode_rejects_empty_sequence() {
        let codec = FfmpegFrameCodec::new();
        let meta = VideoMeta {
            fps: 30.0,
            width: 8,
            height: 8,
        };

        let err = codec
            .encode(&[], &meta, Path::new("/tmp/never-written.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EncodeFailed(_)));
    }

    #[tokio::test]
    async fn test_decode_missing_input_is_decode_error() {
        let codec = FfmpegFrameCodec::new();
        let err = codec
            .decode(Path::new("/nonexistent/input.mp4"))
            .await
            .unwrap_err();
        match err {
            MediaError::DecodeFailed(msg) => assert!(msg.contains("cannot open input")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
