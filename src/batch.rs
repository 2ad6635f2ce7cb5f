use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::Instant,
};

use indicatif::{MultiProgress, ParallelProgressIterator, ProgressBar};
use log::{debug, error, info, warn};
use rayon::{
    ThreadPoolBuilder,
    iter::{IntoParallelIterator, ParallelIterator},
};

use crate::{
    common::ConvertOptions,
    convert::{ConversionReport, convert, is_ims_file},
    error::{ConvertError, Result},
};

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Descend into subdirectories
    pub recursive: bool,
    /// Worker threads, one per CPU when `None`
    pub jobs: Option<usize>,
    /// Where outputs go, next to each input when `None`
    pub output_dir: Option<PathBuf>,
    pub convert: ConvertOptions,
}

/// Find `.ims` files below `root`, sorted by path.
pub fn discover(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_ims_files(root, recursive, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_ims_files(dir: &Path, recursive: bool, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_ims_files(&path, recursive, found)?;
            }
        } else if is_ims_file(&path) {
            found.push(path);
        }
    }
    Ok(())
}

/// Output path for `input`, found below `root`.
pub fn output_path(input: &Path, root: &Path, options: &BatchOptions) -> PathBuf {
    let mode = options.convert.export_mode;
    match &options.output_dir {
        None => mode.default_output(input, None),
        Some(output_dir) => {
            // mirror the source tree so equal file names in different folders don't collide
            let relative_dir = input
                .parent()
                .and_then(|parent| parent.strip_prefix(root).ok())
                .unwrap_or(Path::new(""));
            mode.default_output(input, Some(output_dir.join(relative_dir).as_path()))
        }
    }
}

/// Pair every input with its output. Inputs whose output was already taken
/// by an earlier input (e.g. `a.ims` next to `a.IMS`) get the collision
/// instead, so no two workers ever write the same path.
pub fn plan_outputs(
    inputs: &[PathBuf],
    root: &Path,
    options: &BatchOptions,
) -> Vec<std::result::Result<PathBuf, ConvertError>> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    inputs
        .iter()
        .map(|input| {
            let output = output_path(input, root, options);
            match claimed.get(&output) {
                Some(first) => Err(ConvertError::OutputCollision {
                    output,
                    claimed_by: first.to_path_buf(),
                }),
                None => {
                    claimed.insert(output.clone(), input.as_path());
                    Ok(output)
                }
            }
        })
        .collect()
}

#[derive(Debug)]
pub enum FileOutcome {
    Converted(ConversionReport),
    Skipped(PathBuf),
    Failed(ConvertError),
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub found: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    /// Percentage of files that were converted or already present.
    pub fn success_rate(&self) -> f64 {
        if self.found == 0 {
            return 100.0;
        }
        (self.successful + self.skipped) as f64 * 100.0 / self.found as f64
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn record(&mut self, input: &Path, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Converted(_) => self.successful += 1,
            FileOutcome::Skipped(_) => self.skipped += 1,
            FileOutcome::Failed(err) => self.failed.push((input.to_owned(), err.to_string())),
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "found:      {}", self.found)?;
        writeln!(f, "successful: {}", self.successful)?;
        writeln!(f, "skipped:    {}", self.skipped)?;
        writeln!(f, "failed:     {}", self.failed.len())?;
        write!(f, "success rate: {:.1}%", self.success_rate())?;
        for (path, reason) in &self.failed {
            write!(f, "\n  {path:?}: {reason}")?;
        }
        Ok(())
    }
}

fn convert_one(
    input: &Path,
    output: std::result::Result<PathBuf, ConvertError>,
    options: &BatchOptions,
    multi_progress: &MultiProgress,
) -> FileOutcome {
    let output = match output {
        Ok(output) => output,
        Err(err) => {
            warn!("{input:?}: {err}");
            return FileOutcome::Failed(err);
        }
    };
    if output.exists() && !options.convert.overwrite {
        info!("{output:?} exists, skipping {input:?}");
        return FileOutcome::Skipped(output);
    }

    match convert(input, &output, &options.convert, multi_progress) {
        Ok(report) => FileOutcome::Converted(report),
        Err(ConvertError::OutputExists(output)) => {
            info!("{output:?} appeared meanwhile, skipping {input:?}");
            FileOutcome::Skipped(output)
        }
        Err(err) => {
            if err.is_structural() {
                warn!("{input:?}: {err}");
            } else {
                error!("{input:?}: {err}");
            }
            FileOutcome::Failed(err)
        }
    }
}

/// Convert every `.ims` file below `root`. Per-file failures end up in the
/// summary; only discovery and pool setup errors are returned.
pub fn convert_batch(
    root: &Path,
    options: &BatchOptions,
    multi_progress: &MultiProgress,
) -> Result<BatchSummary> {
    let t0 = Instant::now();

    let inputs = discover(root, options.recursive)?;
    info!("found {} .ims files in {root:?}", inputs.len());

    let mut summary = BatchSummary {
        found: inputs.len(),
        ..BatchSummary::default()
    };
    if inputs.is_empty() {
        warn!("nothing to convert in {root:?}");
        return Ok(summary);
    }

    let mut pool = ThreadPoolBuilder::new();
    if let Some(jobs) = options.jobs {
        pool = pool.num_threads(jobs);
    }
    let pool = pool.build()?;

    let planned: Vec<(&PathBuf, _)> = inputs
        .iter()
        .zip(plan_outputs(&inputs, root, options))
        .collect();

    let progress = multi_progress.add(ProgressBar::new(inputs.len() as u64));
    let done = AtomicUsize::new(0);

    let outcomes: Vec<FileOutcome> = pool.install(|| {
        planned
            .into_par_iter()
            .progress_with(progress.clone())
            .map(|(input, output)| {
                let outcome = convert_one(input, output, options, multi_progress);
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("{finished}/{} files processed", inputs.len());
                outcome
            })
            .collect()
    });

    progress.finish();
    multi_progress.remove(&progress);

    for (input, outcome) in inputs.iter().zip(outcomes) {
        summary.record(input, outcome);
    }

    info!("batch done in {:?}", t0.elapsed());

    Ok(summary)
}
