//! Thin async wrapper around the `ffmpeg` and `ffprobe` binaries.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

use crate::config::MediaConfig;

static RE_PTS_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pts_time:\s*([0-9]+(?:\.[0-9]+)?)").unwrap());

const STDERR_TAIL_CHARS: usize = 600;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to launch '{tool}': {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{tool}' exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Could not determine media duration: {0}")]
    Probe(String),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{tool}' produced no output")]
    EmptyOutput { tool: String },
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }

    async fn run(&self, tool: &Path, args: Vec<OsString>) -> Result<Output, MediaError> {
        let name = tool.display().to_string();
        tracing::trace!(tool = %name, args = ?args, "Running media tool");

        let output = Command::new(tool)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MediaError::Spawn {
                tool: name.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(MediaError::Failed {
                tool: name,
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(output)
    }

    /// Container duration in seconds.
    pub async fn probe_duration(&self, video: &Path) -> Result<f64, MediaError> {
        let output = self
            .run(
                &self.ffprobe,
                vec![
                    "-v".into(),
                    "error".into(),
                    "-show_entries".into(),
                    "format=duration".into(),
                    "-of".into(),
                    "json".into(),
                    video.into(),
                ],
            )
            .await?;

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| MediaError::Probe(format!("unreadable ffprobe output: {}", e)))?;
        let duration = parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.trim().parse::<f64>().ok())
            .ok_or_else(|| MediaError::Probe("no duration reported".to_string()))?;

        if !duration.is_finite() || duration <= 0.0 {
            return Err(MediaError::Probe(format!("invalid duration {}", duration)));
        }
        Ok(duration)
    }

    /// Timestamps (seconds) where the scene-change score exceeds `threshold`.
    pub async fn detect_cuts(&self, video: &Path, threshold: f64) -> Result<Vec<f64>, MediaError> {
        let output = self
            .run(
                &self.ffmpeg,
                vec![
                    "-hide_banner".into(),
                    "-nostats".into(),
                    "-i".into(),
                    video.into(),
                    "-vf".into(),
                    format!("select='gt(scene,{})',showinfo", threshold).into(),
                    "-an".into(),
                    "-f".into(),
                    "null".into(),
                    "-".into(),
                ],
            )
            .await?;

        Ok(parse_pts_times(&String::from_utf8_lossy(&output.stderr)))
    }

    /// One JPEG frame at `at` seconds.
    pub async fn extract_frame(&self, video: &Path, at: f64) -> Result<Vec<u8>, MediaError> {
        let output = self
            .run(
                &self.ffmpeg,
                vec![
                    "-v".into(),
                    "error".into(),
                    "-ss".into(),
                    format_seconds(at).into(),
                    "-i".into(),
                    video.into(),
                    "-frames:v".into(),
                    "1".into(),
                    "-f".into(),
                    "image2".into(),
                    "-c:v".into(),
                    "mjpeg".into(),
                    "pipe:1".into(),
                ],
            )
            .await?;

        if output.stdout.is_empty() {
            return Err(MediaError::EmptyOutput {
                tool: self.ffmpeg.display().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Writes `[start, end)` of `video` to `output`.
    pub async fn extract_clip(
        &self,
        video: &Path,
        start: f64,
        end: f64,
        output: &Path,
        reencode: bool,
    ) -> Result<(), MediaError> {
        let mut args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-y".into(),
            "-ss".into(),
            format_seconds(start).into(),
            "-i".into(),
            video.into(),
            "-t".into(),
            format_seconds(end - start).into(),
        ];
        if reencode {
            for arg in ["-c:v", "libx264", "-preset", "veryfast", "-c:a", "aac"] {
                args.push(arg.into());
            }
        } else {
            args.push("-c".into());
            args.push("copy".into());
        }
        args.push("-avoid_negative_ts".into());
        args.push("make_zero".into());
        args.push(output.into());

        self.run(&self.ffmpeg, args).await?;
        ensure_non_empty(output, &self.ffmpeg)
    }

    /// Joins clips with the concat demuxer into `output` without re-encoding.
    pub async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        let manifest_path = output.with_extension("concat.txt");
        tokio::fs::write(&manifest_path, concat_manifest(clips))
            .await
            .map_err(|e| MediaError::Io {
                path: manifest_path.clone(),
                source: e,
            })?;

        let result = self
            .run(
                &self.ffmpeg,
                vec![
                    "-v".into(),
                    "error".into(),
                    "-y".into(),
                    "-f".into(),
                    "concat".into(),
                    "-safe".into(),
                    "0".into(),
                    "-i".into(),
                    manifest_path.clone().into(),
                    "-c".into(),
                    "copy".into(),
                    output.into(),
                ],
            )
            .await;

        let _ = tokio::fs::remove_file(&manifest_path).await;
        result?;
        ensure_non_empty(output, &self.ffmpeg)
    }
}

/// Concat demuxer manifest: one `file '<path>'` line per clip.
pub fn concat_manifest(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|p| format!("file '{}'", p.to_string_lossy().replace('\'', r"'\''")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extracts every `pts_time:` value from `showinfo` output.
pub fn parse_pts_times(stderr: &str) -> Vec<f64> {
    RE_PTS_TIME
        .captures_iter(stderr)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<f64>().ok()))
        .collect()
}

fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}

fn ensure_non_empty(path: &Path, tool: &Path) -> Result<(), MediaError> {
    let len = std::fs::metadata(path)
        .map_err(|e| MediaError::Io {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();
    if len == 0 {
        return Err(MediaError::EmptyOutput {
            tool: tool.display().to_string(),
        });
    }
    Ok(())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    text.chars().skip(count - STDERR_TAIL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pts_times() {
        let stderr = "\
[Parsed_showinfo_1 @ 0x55] n:   0 pts:  61440 pts_time:4.8     duration:512
[Parsed_showinfo_1 @ 0x55] n:   1 pts: 153600 pts_time:12      duration:512
frame=  2 fps=0.0 q=-0.0 Lsize=N/A time=00:00:20.00
[Parsed_showinfo_1 @ 0x55] n:   2 pts: 230400 pts_time: 18.25 duration:512";
        assert_eq!(parse_pts_times(stderr), vec![4.8, 12.0, 18.25]);
        assert!(parse_pts_times("nothing here").is_empty());
    }

    #[test]
    fn test_concat_manifest() {
        let clips = vec![
            PathBuf::from("/tmp/clips/clip_000.mp4"),
            PathBuf::from("/tmp/it's/clip_001.mp4"),
        ];
        let manifest = concat_manifest(&clips);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines[0], "file '/tmp/clips/clip_000.mp4'");
        assert_eq!(lines[1], r"file '/tmp/it'\''s/clip_001.mp4'");
        assert!(concat_manifest(&[]).is_empty());
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(4.8), "4.800");
        assert_eq!(format_seconds(-1.0), "0.000");
    }

    #[test]
    fn test_stderr_tail_keeps_end() {
        let long = format!("{}END", "x".repeat(2000));
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.chars().count(), STDERR_TAIL_CHARS);
        assert!(tail.ends_with("END"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let tools = FfmpegTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let result = tools.probe_duration(Path::new("video.mp4")).await;
        assert!(matches!(result, Err(MediaError::Spawn { .. })));
    }
}
