//! FFmpeg-backed watermark-removal pipeline.
//!
//! This crate provides:
//! - Raster frame and mask types for RGB24 video
//! - Frame decode/encode through piped FFmpeg rawvideo
//! - Pluggable watermark detection and inpainting strategies
//! - Lossless audio remux onto the processed output
//! - The stage-machine orchestrator tying it all together

pub mod codec;
pub mod command;
pub mod detect;
pub mod error;
pub mod frame;
pub mod fs_utils;
pub mod inpaint;
pub mod mux;
pub mod pipeline;
pub mod probe;

pub use codec::{FfmpegFrameCodec, FrameCodec};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use detect::{
    build_detector, CornerContrastDetector, DetectorKind, DisabledDetector, EdgeDensityDetector,
    WatermarkDetector,
};
pub use error::{MediaError, MediaResult};
pub use frame::{Frame, Mask, Rect, VideoMeta};
pub use inpaint::{
    build_inpainter, BoxBlurInpainter, InpainterKind, MedianFilterInpainter, WatermarkInpainter,
};
pub use mux::{AudioMuxOutcome, AudioMuxer, FfmpegAudioMuxer};
pub use pipeline::{PipelineReport, PipelineStage, RemovalPipeline};
pub use probe::{probe_video, VideoInfo};
