//! Media inspection behind the [`Prober`] seam.
//!
//! The default implementation shells out to
//! `ffprobe -v error -print_format json -show_format` and reads the
//! `format` object, so the corrector never parses tool output itself.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use serde::Deserialize;

use crate::VideoSplitError;

/// Duration and size of a media file, as measured by a probe.
///
/// Recomputed fresh for every file inspected; a segment's local bitrate can
/// differ from the whole file's average, so these values are never cached
/// across repair passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaStats {
    /// Total playable duration in seconds. Strictly positive when produced
    /// by [`FfprobeProber`].
    pub duration_secs: f64,
    /// Container size in bytes.
    pub size_bytes: u64,
}

/// Queries a file for its duration and size.
///
/// Probing is read-only and must work for any file in the output directory,
/// not just the original input. All failure shapes (unreadable file,
/// unrecognized container, unparsable duration) surface as
/// [`VideoSplitError::Probe`].
pub trait Prober {
    fn probe(&self, path: &Path) -> Result<MediaStats, VideoSplitError>;
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    /// Create a prober using the given ffprobe binary.
    pub fn new<P: Into<PathBuf>>(ffprobe_path: P) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Create a prober that finds ffprobe on `PATH`.
    pub fn from_path() -> Option<Self> {
        which::which("ffprobe").ok().map(Self::new)
    }
}

impl Prober for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaStats, VideoSplitError> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()
            .map_err(|err| probe_error(path, format!("failed to spawn ffprobe: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(probe_error(
                path,
                format!("ffprobe exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (duration_secs, reported_size) = parse_probe_output(path, &stdout)?;
        let size_bytes = match reported_size {
            Some(size) => size,
            // Older ffprobe builds omit format.size for some containers.
            None => fs::metadata(path)
                .map_err(|err| probe_error(path, format!("failed to read metadata: {err}")))?
                .len(),
        };

        debug!(
            "probed '{}': {duration_secs:.3}s, {size_bytes} bytes",
            path.display()
        );
        Ok(MediaStats {
            duration_secs,
            size_bytes,
        })
    }
}

fn probe_error(path: &Path, message: String) -> VideoSplitError {
    VideoSplitError::Probe {
        path: path.to_path_buf(),
        message,
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

/// Extract `(duration, size)` from ffprobe's JSON output.
///
/// The duration must parse as a strictly positive, finite real. The size is
/// optional; the caller falls back to filesystem metadata when it is absent
/// or unparsable.
fn parse_probe_output(path: &Path, stdout: &str) -> Result<(f64, Option<u64>), VideoSplitError> {
    let parsed: FfprobeOutput = serde_json::from_str(stdout)
        .map_err(|err| probe_error(path, format!("unparsable ffprobe output: {err}")))?;
    let format = parsed
        .format
        .ok_or_else(|| probe_error(path, "ffprobe output has no format object".into()))?;

    let raw = format
        .duration
        .ok_or_else(|| probe_error(path, "ffprobe reported no duration".into()))?;
    let duration_secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| probe_error(path, format!("unparsable duration '{raw}'")))?;
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(probe_error(
            path,
            format!("duration must be positive, got {duration_secs}"),
        ));
    }

    let size = format.size.and_then(|s| s.trim().parse::<u64>().ok());
    Ok((duration_secs, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(stdout: &str) -> Result<(f64, Option<u64>), VideoSplitError> {
        parse_probe_output(Path::new("fixture.mp4"), stdout)
    }

    #[test]
    fn parses_duration_and_size() {
        let stdout = r#"{
            "format": {
                "filename": "fixture.mp4",
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "3600.000000",
                "size": "314572800"
            }
        }"#;
        let (duration_secs, size) = parse(stdout).unwrap();
        assert_eq!(duration_secs, 3600.0);
        assert_eq!(size, Some(314_572_800));
    }

    #[test]
    fn tolerates_a_missing_size() {
        let stdout = r#"{"format": {"duration": "12.5"}}"#;
        let (duration_secs, size) = parse(stdout).unwrap();
        assert_eq!(duration_secs, 12.5);
        assert_eq!(size, None);

        let stdout = r#"{"format": {"duration": "12.5", "size": "N/A"}}"#;
        let (_, size) = parse(stdout).unwrap();
        assert_eq!(size, None);
    }

    #[test]
    fn rejects_malformed_output() {
        assert!(matches!(parse(""), Err(VideoSplitError::Probe { .. })));
        assert!(matches!(
            parse("Invalid data found when processing input"),
            Err(VideoSplitError::Probe { .. })
        ));
        assert!(matches!(
            parse("{}"),
            Err(VideoSplitError::Probe { .. })
        ));
    }

    #[test]
    fn rejects_missing_or_unparsable_durations() {
        assert!(matches!(
            parse(r#"{"format": {"size": "100"}}"#),
            Err(VideoSplitError::Probe { .. })
        ));
        assert!(matches!(
            parse(r#"{"format": {"duration": "N/A", "size": "100"}}"#),
            Err(VideoSplitError::Probe { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_durations() {
        assert!(matches!(
            parse(r#"{"format": {"duration": "0.0"}}"#),
            Err(VideoSplitError::Probe { .. })
        ));
        assert!(matches!(
            parse(r#"{"format": {"duration": "-7.25"}}"#),
            Err(VideoSplitError::Probe { .. })
        ));
        assert!(matches!(
            parse(r#"{"format": {"duration": "inf"}}"#),
            Err(VideoSplitError::Probe { .. })
        ));
    }
}
