//! Lossless segmentation behind the [`Splitter`] seam.
//!
//! The default implementation drives ffmpeg's segment muxer with `-c copy`,
//! so re-splitting never re-encodes the streams.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::VideoSplitError;

/// Splits a media file into time-bounded segments.
///
/// Implementations must copy streams losslessly, write only under
/// `output_dir`, and name the produced files by the positional
/// `name_pattern` (printf-style `%03d` index).
pub trait Splitter {
    fn split(
        &self,
        input: &Path,
        segment_duration_secs: f64,
        output_dir: &Path,
        name_pattern: &str,
    ) -> Result<Vec<PathBuf>, VideoSplitError>;
}

/// A splitter backed by the `ffmpeg` CLI segment muxer.
#[derive(Debug, Clone)]
pub struct FfmpegSplitter {
    ffmpeg_path: PathBuf,
}

impl FfmpegSplitter {
    /// Create a splitter using the given ffmpeg binary.
    pub fn new<P: Into<PathBuf>>(ffmpeg_path: P) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Create a splitter that finds ffmpeg on `PATH`.
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }
}

impl Splitter for FfmpegSplitter {
    fn split(
        &self,
        input: &Path,
        segment_duration_secs: f64,
        output_dir: &Path,
        name_pattern: &str,
    ) -> Result<Vec<PathBuf>, VideoSplitError> {
        let before = snapshot(output_dir)?;
        let target = output_dir.join(name_pattern);

        debug!(
            "ffmpeg: segmenting '{}' every {segment_duration_secs}s into '{}'",
            input.display(),
            target.display()
        );
        let output = Command::new(&self.ffmpeg_path)
            .args(["-y", "-nostdin", "-v", "error", "-i"])
            .arg(input)
            .args(["-c", "copy", "-map", "0", "-f", "segment", "-segment_time"])
            .arg(segment_duration_secs.to_string())
            .args(["-reset_timestamps", "1"])
            .arg(&target)
            .output()
            .map_err(|err| segmentation_error(input, format!("failed to spawn ffmpeg: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(segmentation_error(
                input,
                format!("ffmpeg exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let mut created: Vec<PathBuf> = snapshot(output_dir)?
            .into_iter()
            .filter(|path| !before.contains(path))
            .collect();
        if created.is_empty() {
            return Err(segmentation_error(
                input,
                "ffmpeg produced no output segments".into(),
            ));
        }
        created.sort();
        Ok(created)
    }
}

fn segmentation_error(input: &Path, message: String) -> VideoSplitError {
    VideoSplitError::Segmentation {
        path: input.to_path_buf(),
        message,
    }
}

fn snapshot(dir: &Path) -> Result<HashSet<PathBuf>, VideoSplitError> {
    let mut files = HashSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.insert(path);
        }
    }
    Ok(files)
}

/// Build the `{stem}_{postfix}_%03d.{ext}` pattern for the initial split.
pub(crate) fn initial_pattern(input: &Path, postfix: &str) -> Result<String, VideoSplitError> {
    let (stem, extension) = stem_and_extension(input)?;
    Ok(format!("{stem}_{postfix}_%03d.{extension}"))
}

/// Build the `{stem}_%03d.{ext}` pattern used when re-splitting an oversized
/// segment. The parent's full name stays embedded, so repair rounds cannot
/// collide with sibling segments or with earlier rounds.
pub(crate) fn resplit_pattern(segment: &Path) -> Result<String, VideoSplitError> {
    let (stem, extension) = stem_and_extension(segment)?;
    Ok(format!("{stem}_%03d.{extension}"))
}

/// Substitute a concrete index into a `%03d` pattern.
pub(crate) fn render_pattern(pattern: &str, index: usize) -> String {
    pattern.replace("%03d", &format!("{index:03}"))
}

fn stem_and_extension(path: &Path) -> Result<(&str, &str), VideoSplitError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or(VideoSplitError::InvalidInputName)?;
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(VideoSplitError::InvalidInputName)?;
    Ok((stem, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_pattern_embeds_stem_and_postfix() {
        let pattern = initial_pattern(Path::new("/videos/holiday.mp4"), "part").unwrap();
        assert_eq!(pattern, "holiday_part_%03d.mp4");
    }

    #[test]
    fn resplit_pattern_extends_the_parent_name() {
        let pattern = resplit_pattern(Path::new("/out/holiday_part_001.mp4")).unwrap();
        assert_eq!(pattern, "holiday_part_001_%03d.mp4");
    }

    #[test]
    fn patterns_require_a_stem_and_extension() {
        assert!(matches!(
            initial_pattern(Path::new("/videos/holiday"), "part"),
            Err(VideoSplitError::InvalidInputName)
        ));
        assert!(matches!(
            resplit_pattern(Path::new(".mp4")),
            Err(VideoSplitError::InvalidInputName)
        ));
    }

    #[test]
    fn render_substitutes_the_index() {
        assert_eq!(
            render_pattern("holiday_part_%03d.mp4", 7),
            "holiday_part_007.mp4"
        );
        assert_eq!(
            render_pattern("holiday_part_%03d.mp4", 1234),
            "holiday_part_1234.mp4"
        );
    }
}
