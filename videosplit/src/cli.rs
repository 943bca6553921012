use std::path::PathBuf;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};

pub const DEFAULT_POSTFIX: &str = "part";

/// Parse the maximum segment size: a strictly positive whole number of
/// megabytes.
pub fn parse_max_size(value: &str) -> Result<u64, String> {
    let size: u64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid size '{value}'; expected a whole number of megabytes"))?;
    if size == 0 {
        return Err("size must be greater than zero megabytes".into());
    }
    Ok(size)
}

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Split a video file into size-bounded segments")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("file_path")
                .value_name("FILE_PATH")
                .help("Path to the input video file")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("max_size")
                .value_name("MAX_SIZE_MB")
                .help("Maximum size of each segment, in megabytes")
                .required(true)
                .value_parser(ValueParser::new(parse_max_size)),
        )
        .arg(
            Arg::new("output")
                .value_name("OUTPUT_DIR")
                .help("Directory under which the segments will be saved")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("postfix")
                .short('p')
                .long("postfix")
                .value_name("POSTFIX")
                .help("Postfix inserted into generated file names")
                .default_value(DEFAULT_POSTFIX),
        )
        .arg(
            Arg::new("passes")
                .long("passes")
                .value_name("COUNT")
                .help("Maximum number of repair passes over oversized segments")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Preview the initial segment plan without invoking ffmpeg")
                .action(ArgAction::SetTrue),
        )
}
