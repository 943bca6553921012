mod cli;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use videosplit_core::{plan_segments, run_with_progress, Config, ProgressEvent};

use crate::cli::{build_cli, DEFAULT_POSTFIX};

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().try_get_matches().unwrap_or_else(|err| {
        let _ = err.print();
        // Argument errors exit 1 with the usage text; --help and
        // --version stay successful.
        std::process::exit(if err.use_stderr() { 1 } else { 0 });
    });

    let input_path = matches
        .get_one::<PathBuf>("file_path")
        .expect("required argument");
    if !input_path.is_file() {
        return Err(anyhow!(
            "input file does not exist: {}",
            input_path.display()
        ));
    }

    let max_size_mb = *matches
        .get_one::<u64>("max_size")
        .expect("required argument");
    let save_dir = matches
        .get_one::<PathBuf>("output")
        .expect("required argument");
    let postfix = matches
        .get_one::<String>("postfix")
        .cloned()
        .unwrap_or_else(|| DEFAULT_POSTFIX.to_owned());
    let dry_run = matches.get_flag("dry-run");

    // Segments land in a per-input subdirectory; a pre-existing one is
    // reused silently.
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            anyhow!(
                "cannot derive an output directory name from '{}'",
                input_path.display()
            )
        })?;
    let output_dir = save_dir.join(stem);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create output directory '{}'", output_dir.display()))?;

    let mut builder = Config::builder(
        input_path,
        &output_dir,
        max_size_mb * BYTES_PER_MEGABYTE,
        postfix,
    );
    if let Some(passes) = matches.get_one::<usize>("passes") {
        builder = builder.max_repair_passes(*passes);
    }
    let config = builder.build().with_context(|| {
        format!(
            "failed to create configuration for '{}'",
            input_path.display()
        )
    })?;

    if dry_run {
        let plan = plan_segments(&config)
            .with_context(|| format!("failed to plan segments for '{}'", input_path.display()))?;

        println!(
            "Dry run: would split into {} segment(s) of ~{:.1}s each:",
            plan.segments.len(),
            plan.segment_duration_secs
        );
        for path in plan.segments {
            println!("  {}", path.display());
        }

        return Ok(());
    }

    let progress = ProgressBar::new_spinner();
    progress.set_draw_target(ProgressDrawTarget::stderr());
    let spinner_style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    progress.set_style(spinner_style);
    progress.enable_steady_tick(Duration::from_millis(100));

    let progress_handle = progress.clone();
    let result = run_with_progress(config, move |event| match event {
        ProgressEvent::Start {
            stats,
            segment_duration_secs,
        } => {
            progress_handle.set_message(format!(
                "splitting {} bytes / {:.1}s into ~{:.1}s segments",
                stats.size_bytes, stats.duration_secs, segment_duration_secs
            ));
        }
        ProgressEvent::SplitStarted {
            path,
            segment_duration_secs,
        } => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            progress_handle.set_message(format!(
                "segmenting {name} into ~{segment_duration_secs:.1}s pieces"
            ));
        }
        ProgressEvent::PassCompleted { pass, resplit } => {
            progress_handle.set_message(format!("repair pass {pass}: {resplit} re-split"));
        }
        ProgressEvent::Finish { segments } => {
            progress_handle.set_message(format!("{segments} segment(s) ready"));
        }
    })
    .with_context(|| format!("failed to split '{}'", input_path.display()));

    progress.finish_and_clear();

    let outcome = result?;
    println!(
        "Wrote {} segment(s) to {}",
        outcome.segments.len(),
        output_dir.display()
    );
    if !outcome.converged {
        println!(
            "Note: sizes had not settled after {} repair pass(es); some files may still exceed {} MB",
            outcome.repair_passes, max_size_mb
        );
    }

    Ok(())
}
