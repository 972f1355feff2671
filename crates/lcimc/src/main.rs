use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{WrapErr, bail};

use lcimc::settings::{Overrides, load_dataset, load_method, load_run_config};
use lcimc::{ProcessLauncher, init_logging};
use lcimc_core::aggregate::{merge_across_jobs, merge_within_job};
use lcimc_core::config::RunConfig;
use lcimc_core::generate::{JobSummary, generate, resume};
use lcimc_core::lcia::score_results;
use lcimc_core::model::OutputSelection;
use lcimc_core::status::JobLog;
use lcimc_core::store::{JobPaths, jobs_dir, list_jobs, results_dir};
use lcimc_core::validate::{ValidationReport, clean, validate_jobs};
use lcimc_core::worker::{ThreadLauncher, WorkerLauncher, run_worker};

#[derive(Parser, Debug)]
#[command(name = "lcimc")]
#[command(about = "Correlated Monte Carlo sampling of life-cycle inventories")]
struct Cli {
    /// Root of all jobs and results (default: ~/.lcimc/)
    #[arg(short, long, global = true)]
    output_root: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Output kinds; when none is given the settings (or their default) apply
#[derive(Args, Debug, Clone, Copy)]
struct OutputArgs {
    #[arg(long)]
    inventory: bool,
    #[arg(long)]
    supply: bool,
    #[arg(long)]
    matrices: bool,
}

impl OutputArgs {
    fn selection(&self) -> Option<OutputSelection> {
        let selection = OutputSelection {
            inventory: self.inventory,
            supply: self.supply,
            matrices: self.matrices,
        };
        (!selection.is_empty()).then_some(selection)
    }

    fn or_default(&self) -> OutputSelection {
        self.selection().unwrap_or_default()
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample, correct and solve a dataset into a new job
    Generate {
        /// Dataset file (JSON or YAML)
        #[arg(short, long, required_unless_present = "resume")]
        dataset: Option<PathBuf>,
        /// YAML run settings; flags below override it
        #[arg(short, long)]
        settings: Option<PathBuf>,
        /// Re-run the workers of an existing job
        #[arg(long, conflicts_with_all = ["dataset", "settings"])]
        resume: Option<PathBuf>,
        #[arg(short, long)]
        iterations: Option<usize>,
        #[arg(short, long)]
        workers: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Run workers as threads instead of processes
        #[arg(long)]
        in_process: bool,
        #[command(flatten)]
        outputs: OutputArgs,
    },
    /// Run one worker of a job (started by `generate`)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        job_root: PathBuf,
        #[arg(long)]
        worker: usize,
    },
    /// Validate every job of a database and delete incomplete output
    Clean {
        #[arg(short, long)]
        database: String,
        /// Delete without asking
        #[arg(short, long)]
        yes: bool,
        #[command(flatten)]
        outputs: OutputArgs,
    },
    /// Concatenate the iterations of each cleaned job
    ConcatWithin {
        #[arg(short, long)]
        database: String,
        /// Only this job (directory name)
        #[arg(long)]
        job: Option<String>,
        /// Remove per-iteration arrays once merged
        #[arg(long)]
        delete_raw: bool,
        #[command(flatten)]
        outputs: OutputArgs,
    },
    /// Merge all jobs of a database into its results directory
    ConcatAcross {
        #[arg(short, long)]
        database: String,
        #[command(flatten)]
        outputs: OutputArgs,
    },
    /// Score merged inventories with a characterization method
    Lcia {
        #[arg(short, long)]
        database: String,
        /// Method file (JSON or YAML)
        #[arg(short, long)]
        method: PathBuf,
    },
    /// Show the stage of every job of a database
    Status {
        #[arg(short, long)]
        database: String,
    },
}

fn default_output_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lcimc")
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let output_root = cli.output_root.clone().unwrap_or_else(default_output_root);
    let is_worker = matches!(cli.command, Command::Worker { .. });
    init_logging(&output_root, &cli.log_level, !is_worker)?;

    match cli.command {
        Command::Generate {
            dataset,
            settings,
            resume: resume_job,
            iterations,
            workers,
            seed,
            in_process,
            outputs,
        } => {
            let launcher: Box<dyn WorkerLauncher> = if in_process {
                Box::new(ThreadLauncher)
            } else {
                Box::new(ProcessLauncher::current(&output_root, &cli.log_level)?)
            };
            let summary = match (resume_job, dataset) {
                (Some(job_root), _) => resume(&job_root, launcher.as_ref())?,
                (None, Some(dataset)) => {
                    let config = match settings {
                        Some(path) => load_run_config(&path)?,
                        None => RunConfig::default(),
                    };
                    let config = Overrides {
                        seed,
                        iterations,
                        workers,
                        outputs: outputs.selection(),
                    }
                    .apply(config);
                    let dataset = load_dataset(&dataset)?;
                    generate(&dataset, &config, &output_root, launcher.as_ref())?
                }
                (None, None) => bail!("either --dataset or --resume is required"),
            };
            report_generation(&summary)?;
        }
        Command::Worker { job_root, worker } => {
            let report = run_worker(&job_root, worker)
                .wrap_err_with(|| format!("worker {worker} of {}", job_root.display()))?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Clean {
            database,
            yes,
            outputs,
        } => {
            let report = validate_jobs(&jobs_dir(&output_root, &database), &outputs.or_default())?;
            let outcome = clean(&report, |report| yes || confirm_deletion(report))?;
            if !outcome.confirmed {
                println!("Nothing deleted.");
            } else {
                println!(
                    "Deleted {} jobs and {} iterations; {} jobs marked cleaned.",
                    outcome.deleted_jobs, outcome.deleted_iterations, outcome.cleaned_jobs
                );
            }
        }
        Command::ConcatWithin {
            database,
            job,
            delete_raw,
            outputs,
        } => {
            let jobs = jobs_dir(&output_root, &database);
            let targets = match job {
                Some(id) => vec![JobPaths::new(jobs.join(id))],
                None => list_jobs(&jobs)?,
            };
            for job in targets {
                let summary = merge_within_job(&job.root, &outputs.or_default(), delete_raw)?;
                println!(
                    "{}: {} iterations, {} files written, {} already present",
                    job.job_id(),
                    summary.iterations,
                    summary.written,
                    summary.skipped
                );
            }
        }
        Command::ConcatAcross { database, outputs } => {
            let summary = merge_across_jobs(
                &jobs_dir(&output_root, &database),
                &results_dir(&output_root, &database),
                &outputs.or_default(),
            )?;
            println!(
                "Merged {} jobs ({} iterations) against reference {}; {} files written.",
                summary.jobs.len(),
                summary.iterations,
                summary.reference_job,
                summary.written
            );
        }
        Command::Lcia { database, method } => {
            let method = load_method(&method)?;
            let summary = score_results(&results_dir(&output_root, &database), &method)?;
            println!(
                "{}: {} scores written, {} already present",
                summary.method_dir.display(),
                summary.written,
                summary.skipped
            );
        }
        Command::Status { database } => print_status(&jobs_dir(&output_root, &database))?,
    }
    Ok(())
}

fn report_generation(summary: &JobSummary) -> color_eyre::Result<()> {
    let written: usize = summary.reports.iter().map(|r| r.written).sum();
    println!(
        "Job {}: {} of {} iterations written by {} workers.",
        summary.job.root.display(),
        written,
        summary.manifest.iterations,
        summary.reports.len()
    );
    if !summary.is_complete() {
        for (worker, message) in &summary.failures {
            eprintln!("worker {worker} failed: {message}");
        }
        bail!(
            "{} workers failed; run `lcimc clean` then `lcimc generate --resume`",
            summary.failures.len()
        );
    }
    Ok(())
}

fn confirm_deletion(report: &ValidationReport) -> bool {
    for finding in &report.findings {
        println!("{}: {}", finding.path.display(), finding.error);
    }
    print!(
        "Delete {} jobs and {} iterations? [y/N] ",
        report.jobs_to_delete.len(),
        report.iterations_to_delete.len()
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim(), "y" | "Y" | "yes"),
        Err(_) => false,
    }
}

fn print_status(jobs: &Path) -> color_eyre::Result<()> {
    let jobs = list_jobs(jobs).wrap_err("cannot list jobs")?;
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    for job in jobs {
        let log = JobLog::load(&job.log_path())?;
        let iterations = job.iterations()?;
        let complete = iterations.iter().filter(|it| it.is_complete()).count();
        println!(
            "{:<40} {:<24} {}/{} iterations complete",
            job.job_id(),
            format!("{:?}", log.stage()),
            complete,
            iterations.len()
        );
    }
    Ok(())
}
