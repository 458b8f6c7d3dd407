//! FFmpeg command builder and process plumbing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Builder for FFmpeg invocations.
///
/// Inputs and outputs may be files or stdio pipes (`pipe:0` / `pipe:1`),
/// which is how raw frames move between the codec and the ffmpeg child.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Primary input (file path or `pipe:0`)
    input: String,
    /// Additional inputs, each preceded by its own `-i`
    extra_inputs: Vec<PathBuf>,
    /// Output (file path or `pipe:1`)
    output: String,
    /// Arguments placed before the first `-i`
    input_args: Vec<String>,
    /// Arguments placed after the inputs
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a file-to-file command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_string_lossy().into_owned(),
            extra_inputs: Vec::new(),
            output: output.as_ref().to_string_lossy().into_owned(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Create a command reading its primary input from stdin.
    pub fn from_stdin(output: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new("pipe:0", "placeholder");
        cmd.output = output.as_ref().to_string_lossy().into_owned();
        cmd
    }

    /// Create a command writing its output to stdout.
    pub fn to_stdout(input: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new(input, "placeholder");
        cmd.output = "pipe:1".to_string();
        cmd
    }

    /// Add a secondary input file (e.g. the audio source for a remux).
    pub fn extra_input(mut self, input: impl AsRef<Path>) -> Self {
        self.extra_inputs.push(input.as_ref().to_path_buf());
        self
    }

    /// Add an argument before the first `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add multiple arguments before the first `-i`.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an argument after the inputs.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple arguments after the inputs.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the full argument list.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.clone());

        for extra in &self.extra_inputs {
            args.push("-i".to_string());
            args.push(extra.to_string_lossy().into_owned());
        }

        args.extend(self.output_args.clone());

        args.push(self.output.clone());

        args
    }

    /// Spawn the ffmpeg child with the given stdio configuration.
    pub fn spawn(&self, stdin: Stdio, stdout: Stdio) -> MediaResult<Child> {
        check_ffmpeg()?;

        let args = self.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()?;

        Ok(child)
    }

    /// Run to completion with no piped stdio. On a non-zero exit the
    /// collected stderr is returned as the error detail.
    pub async fn run(&self) -> Result<(), String> {
        let child = match self.spawn(Stdio::null(), Stdio::null()) {
            Ok(c) => c,
            Err(e) => return Err(e.to_string()),
        };

        let output = match child.wait_with_output().await {
            Ok(o) => o,
            Err(e) => return Err(format!("ffmpeg wait failed: {}", e)),
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!(
                "ffmpeg exited with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_file_to_file() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .output_arg("-c:v")
            .output_arg("libx264");

        let args = cmd.build_args();
        assert!(args.contains(&"-i".to_string()));
        assert!(args.contains(&"input.mp4".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last(), Some(&"output.mp4".to_string()));
    }

    #[test]
    fn test_command_builder_pipes() {
        let decode = FfmpegCommand::to_stdout("input.mp4");
        assert_eq!(decode.build_args().last(), Some(&"pipe:1".to_string()));

        let encode = FfmpegCommand::from_stdin("out.mp4")
            .input_args(["-f", "rawvideo", "-pix_fmt", "rgb24"]);
        let args = encode.build_args();
        assert!(args.contains(&"pipe:0".to_string()));
        // input args come before the -i for the pipe
        let raw_pos = args.iter().position(|a| a == "rawvideo").unwrap();
        let pipe_pos = args.iter().position(|a| a == "pipe:0").unwrap();
        assert!(raw_pos < pipe_pos);
    }

    #[test]
    fn test_command_builder_extra_input_order() {
        let cmd = FfmpegCommand::new("video.mp4", "muxed.mp4").extra_input("original.mp4");
        let args = cmd.build_args();

        let first = args.iter().position(|a| a == "video.mp4").unwrap();
        let second = args.iter().position(|a| a == "original.mp4").unwrap();
        assert!(first < second);
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
    }
}
