use std::{error::Error, path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::{error, info};

use ims_to_tiff::{
    ArgEndianess, BatchOptions, ConvertOptions, Coordinates, ExportMode, ImsFile,
    DEFAULT_SLICE_THRESHOLD, convert, convert_batch, inspect,
};

#[derive(Parser, Debug)]
#[command(version, about = "Convert Imaris .ims files to TIFF")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a single .ims file
    Convert {
        ims_path: PathBuf,
        /// Output file, or directory for `--mode slices`. Defaults to next to the input.
        dest_path: Option<PathBuf>,
        #[command(flatten)]
        options: ConvertArgs,
    },
    /// Convert every .ims file in a directory
    Batch {
        input_dir: PathBuf,
        /// Write outputs here instead of next to each input
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Also convert files in subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Number of files converted in parallel, defaults to the number of CPUs
        #[arg(short, long)]
        jobs: Option<usize>,
        #[command(flatten)]
        options: ConvertArgs,
    },
    /// Print the structure of an .ims file
    Info {
        ims_path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    #[arg(short, long, value_enum, default_value_t = ExportMode::Stack)]
    mode: ExportMode,
    /// Slices whose samples are all at or below this value are dropped
    #[arg(short, long, default_value_t = DEFAULT_SLICE_THRESHOLD)]
    threshold: f64,
    /// Keep empty slices
    #[arg(long)]
    keep_empty: bool,
    #[arg(short, long, default_value_t = 0)]
    channel: usize,
    #[arg(long, default_value_t = 0)]
    timepoint: usize,
    #[arg(long, default_value_t = 0)]
    resolution_level: usize,
    /// Export only this Z slice
    #[arg(short, long)]
    z_slice: Option<usize>,
    /// Byte order of stack and slices output
    #[arg(long, value_enum, default_value_t = ArgEndianess::Native)]
    endianess: ArgEndianess,
    /// Replace existing outputs
    #[arg(long)]
    overwrite: bool,
}

impl From<ConvertArgs> for ConvertOptions {
    fn from(args: ConvertArgs) -> Self {
        ConvertOptions {
            export_mode: args.mode,
            coordinates: Coordinates::new(args.resolution_level, args.timepoint, args.channel),
            filter_empty: !args.keep_empty,
            slice_threshold: args.threshold,
            z_slice: args.z_slice,
            endianess: args.endianess,
            overwrite: args.overwrite,
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn Error + Sync + Send>> {
    let multi = MultiProgress::new();
    let logger = env_logger::Builder::from_env(Env::default().default_filter_or("info")).build();
    let level = logger.filter();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(level);

    let cli = Cli::parse();

    match cli.command {
        Command::Convert {
            ims_path,
            dest_path,
            options,
        } => {
            let options = ConvertOptions::from(options);
            let dest_path =
                dest_path.unwrap_or_else(|| options.export_mode.default_output(&ims_path, None));
            let report = convert(&ims_path, &dest_path, &options, &multi)?;
            info!(
                "{} of {} slices written to {:?}",
                report.written_slices, report.input_slices, report.output
            );
        }
        Command::Batch {
            input_dir,
            output_dir,
            recursive,
            jobs,
            options,
        } => {
            let options = BatchOptions {
                recursive,
                jobs,
                output_dir,
                convert: options.into(),
            };
            let summary = convert_batch(&input_dir, &options, &multi)?;
            println!("{summary}");
            if summary.has_failures() {
                error!("{} files failed", summary.failed.len());
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Info { ims_path, json } => {
            let container = ImsFile::open(&ims_path)?;
            let info = inspect(&container)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print!("{info}");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
