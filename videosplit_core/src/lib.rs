use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

pub mod probe;
pub mod split;

pub use probe::{FfprobeProber, MediaStats, Prober};
pub use split::{FfmpegSplitter, Splitter};

/// Default cap on repair passes over the output directory.
pub const DEFAULT_REPAIR_PASSES: usize = 8;

/// Errors that can occur while splitting video files.
#[derive(Debug, Error)]
pub enum VideoSplitError {
    /// External inspection of a file failed or returned unusable data.
    #[error("failed to probe '{}': {message}", path.display())]
    Probe { path: PathBuf, message: String },

    /// Error returned when the input reports a size of zero bytes.
    #[error("media reports a size of zero bytes and cannot be split")]
    ZeroSizeInput,

    /// The requested maximum size cannot hold even one segment at the
    /// measured bitrate.
    #[error("a maximum size of {max_size_bytes} bytes is too low to hold any span of this media")]
    ConstraintTooLow { max_size_bytes: u64 },

    /// The external segmenting engine failed. The output directory may be
    /// left partially repaired; it is not rolled back.
    #[error("failed to segment '{}': {message}", path.display())]
    Segmentation { path: PathBuf, message: String },

    /// The input is already within the size limit; there is nothing to split.
    #[error("'{}' is {size_bytes} bytes, already within the {max_size_bytes} byte limit", path.display())]
    AlreadyUnderLimit {
        path: PathBuf,
        size_bytes: u64,
        max_size_bytes: u64,
    },

    /// Error returned when the maximum size is zero.
    #[error("maximum size must be greater than zero bytes")]
    InvalidMaxSize,

    /// Error returned when the output directory no longer exists.
    #[error("output directory '{}' does not exist", .0.display())]
    MissingOutputDirectory(PathBuf),

    /// Error produced when a segment name cannot be derived from a file path.
    #[error("failed to derive a segment name from the input file")]
    InvalidInputName,

    /// A required external tool is not installed.
    #[error("'{tool}' was not found on PATH")]
    ToolNotFound { tool: &'static str },

    /// Wrapper around IO errors encountered while managing the output directory.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Segment duration derived from a file's measured average bitrate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeEstimate {
    /// How many seconds of this media correspond to the size limit.
    pub segment_duration_secs: f64,
}

/// Derive a segment duration from measured duration, size, and a size limit.
///
/// The estimate is `(duration / size) * max_size`, assuming a constant
/// average bitrate across the file. Local bitrate variance makes this an
/// approximation; the repair loop compensates by re-estimating per segment.
///
/// # Errors
///
/// - [`VideoSplitError::ZeroSizeInput`] if `stats.size_bytes` is zero.
/// - [`VideoSplitError::ConstraintTooLow`] if the result is not a strictly
///   positive, finite number of seconds. This is never retried with a
///   different limit.
pub fn estimate(stats: MediaStats, max_size_bytes: u64) -> Result<SizeEstimate, VideoSplitError> {
    if stats.size_bytes == 0 {
        return Err(VideoSplitError::ZeroSizeInput);
    }

    let segment_duration_secs =
        (stats.duration_secs / stats.size_bytes as f64) * max_size_bytes as f64;
    if !segment_duration_secs.is_finite() || segment_duration_secs <= 0.0 {
        return Err(VideoSplitError::ConstraintTooLow { max_size_bytes });
    }

    // No upper clamp: an estimate longer than the whole file simply yields
    // a single output segment.
    Ok(SizeEstimate {
        segment_duration_secs,
    })
}

/// Configuration for the size-bounded splitting operation.
#[derive(Clone, Debug)]
pub struct Config {
    /// Canonicalized path of the source file to split.
    pub input_path: PathBuf,
    /// Canonicalized directory into which the segments will be written.
    pub output_dir: PathBuf,
    /// Upper bound, in bytes, that every final segment should not exceed.
    pub max_size_bytes: u64,
    /// Postfix inserted into the segment file names.
    pub postfix: String,
    /// Cap on repair passes; reaching it yields a best-effort result.
    pub max_repair_passes: usize,
    /// Explicit ffprobe binary, or `None` to look it up on `PATH`.
    pub ffprobe_path: Option<PathBuf>,
    /// Explicit ffmpeg binary, or `None` to look it up on `PATH`.
    pub ffmpeg_path: Option<PathBuf>,
}

impl Config {
    /// Construct a new [`Config`], canonicalizing the provided paths.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>, S: Into<String>>(
        input: P,
        output: Q,
        max_size_bytes: u64,
        postfix: S,
    ) -> Result<Self, VideoSplitError> {
        Self::builder(input, output, max_size_bytes, postfix).build()
    }

    /// Start building a [`Config`] with the optional knobs available.
    pub fn builder<P: AsRef<Path>, Q: AsRef<Path>, S: Into<String>>(
        input: P,
        output: Q,
        max_size_bytes: u64,
        postfix: S,
    ) -> ConfigBuilder {
        ConfigBuilder {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            max_size_bytes,
            postfix: postfix.into(),
            max_repair_passes: DEFAULT_REPAIR_PASSES,
            ffprobe_path: None,
            ffmpeg_path: None,
        }
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    input: PathBuf,
    output: PathBuf,
    max_size_bytes: u64,
    postfix: String,
    max_repair_passes: usize,
    ffprobe_path: Option<PathBuf>,
    ffmpeg_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Cap the number of repair passes. Zero disables the repair loop.
    pub fn max_repair_passes(mut self, passes: usize) -> Self {
        self.max_repair_passes = passes;
        self
    }

    /// Use an explicit ffprobe binary instead of searching `PATH`.
    pub fn ffprobe_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ffprobe_path = Some(path.into());
        self
    }

    /// Use an explicit ffmpeg binary instead of searching `PATH`.
    pub fn ffmpeg_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    /// Validate the options and produce a [`Config`].
    pub fn build(self) -> Result<Config, VideoSplitError> {
        if self.max_size_bytes == 0 {
            return Err(VideoSplitError::InvalidMaxSize);
        }

        let input_path = fs::canonicalize(&self.input)?;
        let output_dir = fs::canonicalize(&self.output)?;

        Ok(Config {
            input_path,
            output_dir,
            max_size_bytes: self.max_size_bytes,
            postfix: self.postfix,
            max_repair_passes: self.max_repair_passes,
            ffprobe_path: self.ffprobe_path,
            ffmpeg_path: self.ffmpeg_path,
        })
    }
}

/// Progress notifications emitted while splitting.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The input has been probed and the initial estimate computed.
    Start {
        stats: MediaStats,
        segment_duration_secs: f64,
    },
    /// An external split of `path` is about to run.
    SplitStarted {
        path: PathBuf,
        segment_duration_secs: f64,
    },
    /// A repair pass finished; `resplit` files were replaced.
    PassCompleted { pass: usize, resplit: usize },
    /// The operation finished with `segments` files in the output directory.
    Finish { segments: usize },
}

/// The output directory's final file set, as produced by one call.
#[derive(Debug, Clone)]
pub struct SegmentSet {
    /// Sorted paths of every file in the output directory.
    pub segments: Vec<PathBuf>,
    /// Number of repair passes that ran.
    pub repair_passes: usize,
    /// Whether a pass with zero re-splits was reached before the cap.
    pub converged: bool,
}

/// The initial estimate and the paths the first split pass would produce.
#[derive(Debug, Clone)]
pub struct SplitPlan {
    /// Estimated duration of each segment in seconds.
    pub segment_duration_secs: f64,
    /// Paths the first split pass is expected to create.
    pub segments: Vec<PathBuf>,
}

/// Split the configured input into size-bounded segments with ffmpeg.
pub fn run(config: Config) -> Result<SegmentSet, VideoSplitError> {
    run_with_progress(config, |_| {})
}

/// Like [`run`], reporting [`ProgressEvent`]s through the supplied callback.
pub fn run_with_progress<F>(config: Config, progress: F) -> Result<SegmentSet, VideoSplitError>
where
    F: FnMut(ProgressEvent),
{
    let prober = resolve_prober(&config)?;
    let splitter = resolve_splitter(&config)?;
    segment_to_size(&prober, &splitter, &config, progress)
}

/// Run only the repair loop against an existing output directory.
///
/// Useful to finish a directory left partially repaired by an earlier
/// failure, or to re-check one produced by other means. A repair of an
/// already-converged directory performs zero re-splits and leaves the file
/// set unchanged.
pub fn repair(config: Config) -> Result<SegmentSet, VideoSplitError> {
    repair_with_progress(config, |_| {})
}

/// Like [`repair`], reporting [`ProgressEvent`]s through the supplied callback.
pub fn repair_with_progress<F>(config: Config, progress: F) -> Result<SegmentSet, VideoSplitError>
where
    F: FnMut(ProgressEvent),
{
    let prober = resolve_prober(&config)?;
    let splitter = resolve_splitter(&config)?;
    repair_segments(&prober, &splitter, &config, progress)
}

/// Probe the input and report what the first split pass would produce,
/// without invoking the external engine.
pub fn plan_segments(config: &Config) -> Result<SplitPlan, VideoSplitError> {
    let prober = resolve_prober(config)?;
    plan_segments_with(&prober, config)
}

/// Like [`plan_segments`], with an explicit prober.
pub fn plan_segments_with<P>(prober: &P, config: &Config) -> Result<SplitPlan, VideoSplitError>
where
    P: Prober + ?Sized,
{
    let stats = probe_input(prober, config)?;
    let estimate = estimate(stats, config.max_size_bytes)?;

    let expected = (stats.duration_secs / estimate.segment_duration_secs).ceil() as usize;
    let pattern = split::initial_pattern(&config.input_path, &config.postfix)?;
    let segments = (0..expected.max(1))
        .map(|index| config.output_dir.join(split::render_pattern(&pattern, index)))
        .collect();

    Ok(SplitPlan {
        segment_duration_secs: estimate.segment_duration_secs,
        segments,
    })
}

/// Split `config.input_path` into segments no larger than
/// `config.max_size_bytes`, correcting the initial bitrate-derived estimate
/// by re-probing and re-splitting oversized segments.
///
/// Generic over the [`Prober`] and [`Splitter`] seams so the loop can be
/// exercised without the external binaries.
///
/// A single global estimate is unreliable because bitrate is rarely uniform
/// across a file; re-estimating locally on each oversized segment corrects
/// for local variance with the same formula at finer granularity. The loop
/// runs until a pass replaces nothing or the configured pass cap is hit;
/// hitting the cap is a best-effort success, not an error, since keyframe
/// granularity can make exact convergence impossible.
pub fn segment_to_size<P, S, F>(
    prober: &P,
    splitter: &S,
    config: &Config,
    mut progress: F,
) -> Result<SegmentSet, VideoSplitError>
where
    P: Prober + ?Sized,
    S: Splitter + ?Sized,
    F: FnMut(ProgressEvent),
{
    if !config.output_dir.is_dir() {
        return Err(VideoSplitError::MissingOutputDirectory(
            config.output_dir.clone(),
        ));
    }

    let stats = probe_input(prober, config)?;
    let estimate = estimate(stats, config.max_size_bytes)?;

    info!(
        "splitting '{}' ({} bytes, {:.1}s) into ~{:.1}s segments",
        config.input_path.display(),
        stats.size_bytes,
        stats.duration_secs,
        estimate.segment_duration_secs
    );
    progress(ProgressEvent::Start {
        stats,
        segment_duration_secs: estimate.segment_duration_secs,
    });

    let pattern = split::initial_pattern(&config.input_path, &config.postfix)?;
    progress(ProgressEvent::SplitStarted {
        path: config.input_path.clone(),
        segment_duration_secs: estimate.segment_duration_secs,
    });
    splitter.split(
        &config.input_path,
        estimate.segment_duration_secs,
        &config.output_dir,
        &pattern,
    )?;

    let (repair_passes, converged) = repair_loop(prober, splitter, config, &mut progress)?;
    finish(config, repair_passes, converged, &mut progress)
}

/// Run only the repair loop over `config.output_dir` with explicit
/// [`Prober`] and [`Splitter`] implementations.
pub fn repair_segments<P, S, F>(
    prober: &P,
    splitter: &S,
    config: &Config,
    mut progress: F,
) -> Result<SegmentSet, VideoSplitError>
where
    P: Prober + ?Sized,
    S: Splitter + ?Sized,
    F: FnMut(ProgressEvent),
{
    if !config.output_dir.is_dir() {
        return Err(VideoSplitError::MissingOutputDirectory(
            config.output_dir.clone(),
        ));
    }

    let (repair_passes, converged) = repair_loop(prober, splitter, config, &mut progress)?;
    finish(config, repair_passes, converged, &mut progress)
}

fn probe_input<P>(prober: &P, config: &Config) -> Result<MediaStats, VideoSplitError>
where
    P: Prober + ?Sized,
{
    let stats = prober.probe(&config.input_path)?;
    if stats.size_bytes == 0 {
        return Err(VideoSplitError::ZeroSizeInput);
    }
    if stats.size_bytes <= config.max_size_bytes {
        return Err(VideoSplitError::AlreadyUnderLimit {
            path: config.input_path.clone(),
            size_bytes: stats.size_bytes,
            max_size_bytes: config.max_size_bytes,
        });
    }
    Ok(stats)
}

fn repair_loop<P, S, F>(
    prober: &P,
    splitter: &S,
    config: &Config,
    progress: &mut F,
) -> Result<(usize, bool), VideoSplitError>
where
    P: Prober + ?Sized,
    S: Splitter + ?Sized,
    F: FnMut(ProgressEvent),
{
    let mut passes = 0;
    while passes < config.max_repair_passes {
        let resplit = repair_pass(prober, splitter, config, progress)?;
        passes += 1;
        progress(ProgressEvent::PassCompleted {
            pass: passes,
            resplit,
        });
        if resplit == 0 {
            return Ok((passes, true));
        }
    }

    warn!(
        "segment sizes did not settle within {} repair pass(es); keeping the best-effort result",
        config.max_repair_passes
    );
    Ok((passes, false))
}

/// One repair pass: probe every file currently in the output directory and
/// re-split each one still above the limit using an estimate derived from
/// that file's own duration and size. The oversized original is deleted;
/// its sub-segments replace it and are re-checked on the next pass.
///
/// A segment exactly at the limit is acceptable and is never re-split.
fn repair_pass<P, S, F>(
    prober: &P,
    splitter: &S,
    config: &Config,
    progress: &mut F,
) -> Result<usize, VideoSplitError>
where
    P: Prober + ?Sized,
    S: Splitter + ?Sized,
    F: FnMut(ProgressEvent),
{
    let files = list_output_files(&config.output_dir)?;
    let mut resplit = 0;

    for file in files {
        let stats = prober.probe(&file)?;
        if stats.size_bytes <= config.max_size_bytes {
            continue;
        }

        let fresh = estimate(stats, config.max_size_bytes)?;
        debug!(
            "'{}' is {} bytes over the limit, re-splitting into ~{:.1}s segments",
            file.display(),
            stats.size_bytes - config.max_size_bytes,
            fresh.segment_duration_secs
        );

        let pattern = split::resplit_pattern(&file)?;
        progress(ProgressEvent::SplitStarted {
            path: file.clone(),
            segment_duration_secs: fresh.segment_duration_secs,
        });
        splitter.split(
            &file,
            fresh.segment_duration_secs,
            &config.output_dir,
            &pattern,
        )?;
        fs::remove_file(&file)?;
        resplit += 1;
    }

    Ok(resplit)
}

fn finish<F>(
    config: &Config,
    repair_passes: usize,
    converged: bool,
    progress: &mut F,
) -> Result<SegmentSet, VideoSplitError>
where
    F: FnMut(ProgressEvent),
{
    let segments = list_output_files(&config.output_dir)?;
    info!(
        "'{}' holds {} segment(s) after {} repair pass(es)",
        config.output_dir.display(),
        segments.len(),
        repair_passes
    );
    progress(ProgressEvent::Finish {
        segments: segments.len(),
    });

    Ok(SegmentSet {
        segments,
        repair_passes,
        converged,
    })
}

fn list_output_files(dir: &Path) -> Result<Vec<PathBuf>, VideoSplitError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn resolve_prober(config: &Config) -> Result<FfprobeProber, VideoSplitError> {
    match &config.ffprobe_path {
        Some(path) => Ok(FfprobeProber::new(path.clone())),
        None => FfprobeProber::from_path().ok_or(VideoSplitError::ToolNotFound { tool: "ffprobe" }),
    }
}

fn resolve_splitter(config: &Config) -> Result<FfmpegSplitter, VideoSplitError> {
    match &config.ffmpeg_path {
        Some(path) => Ok(FfmpegSplitter::new(path.clone())),
        None => FfmpegSplitter::from_path().ok_or(VideoSplitError::ToolNotFound { tool: "ffmpeg" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn estimate_matches_the_bitrate_formula() {
        let stats = MediaStats {
            duration_secs: 3600.0,
            size_bytes: 300 * MB,
        };
        let estimate = estimate(stats, 100 * MB).unwrap();

        assert!((estimate.segment_duration_secs - 1200.0).abs() < 1e-9);
        let exact = (stats.duration_secs / stats.size_bytes as f64) * (100 * MB) as f64;
        assert_eq!(estimate.segment_duration_secs, exact);
    }

    #[test]
    fn estimate_rejects_zero_size_inputs() {
        let stats = MediaStats {
            duration_secs: 60.0,
            size_bytes: 0,
        };
        assert!(matches!(
            estimate(stats, 10 * MB),
            Err(VideoSplitError::ZeroSizeInput)
        ));
    }

    #[test]
    fn estimate_rejects_non_positive_results() {
        let zero = MediaStats {
            duration_secs: 0.0,
            size_bytes: 300 * MB,
        };
        assert!(matches!(
            estimate(zero, 10 * MB),
            Err(VideoSplitError::ConstraintTooLow {
                max_size_bytes
            }) if max_size_bytes == 10 * MB
        ));

        let negative = MediaStats {
            duration_secs: -5.0,
            size_bytes: 300 * MB,
        };
        assert!(matches!(
            estimate(negative, 10 * MB),
            Err(VideoSplitError::ConstraintTooLow { .. })
        ));
    }

    #[test]
    fn estimate_is_not_clamped_to_the_total_duration() {
        // A limit larger than the file means one segment, not an error.
        let stats = MediaStats {
            duration_secs: 60.0,
            size_bytes: 5 * MB,
        };
        let estimate = estimate(stats, 50 * MB).unwrap();
        assert!(estimate.segment_duration_secs > stats.duration_secs);
    }

    #[test]
    fn builder_rejects_a_zero_byte_limit() {
        let err = Config::builder("input.mp4", "out", 0, "part")
            .build()
            .expect_err("zero limit should be rejected");
        assert!(matches!(err, VideoSplitError::InvalidMaxSize));
    }
}
