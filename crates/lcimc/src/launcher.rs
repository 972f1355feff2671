//! Worker processes: one child per worker, re-running this executable
//!
//! Each child runs the hidden `worker` sub-command, writes its report as JSON
//! on stdout and logs to stderr and the shared log file.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use lcimc_core::worker::{WorkerLauncher, WorkerOutcome, WorkerReport, WorkerTask};

#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    output_root: PathBuf,
    log_level: String,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf, output_root: &Path, log_level: &str) -> Self {
        Self {
            program,
            output_root: output_root.to_path_buf(),
            log_level: log_level.to_string(),
        }
    }

    /// Launch workers from the running executable
    pub fn current(output_root: &Path, log_level: &str) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, output_root, log_level))
    }

    fn command(&self, job_root: &Path, worker: usize) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--output-root")
            .arg(&self.output_root)
            .arg("--log-level")
            .arg(&self.log_level)
            .arg("worker")
            .arg("--job-root")
            .arg(job_root)
            .arg("--worker")
            .arg(worker.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        command
    }
}

impl WorkerLauncher for ProcessLauncher {
    /// All children are started before the first one is awaited
    fn launch(&self, job_root: &Path, tasks: &[WorkerTask]) -> Vec<WorkerOutcome> {
        let children: Vec<_> = tasks
            .iter()
            .map(|task| {
                tracing::debug!(worker = task.worker, iterations = task.iterations, "spawning worker");
                (task.worker, self.command(job_root, task.worker).spawn())
            })
            .collect();

        children
            .into_iter()
            .map(|(worker, child)| WorkerOutcome {
                worker,
                result: child
                    .and_then(|c| c.wait_with_output())
                    .map_err(|e| format!("could not run worker process: {e}"))
                    .and_then(|output| parse_report(&output)),
            })
            .collect()
    }
}

fn parse_report(output: &Output) -> Result<WorkerReport, String> {
    if !output.status.success() {
        return Err(format!("worker process exited with {}", output.status));
    }
    serde_json::from_slice(&output.stdout).map_err(|e| format!("unreadable worker report: {e}"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn output(code: i32, stdout: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    #[test]
    fn test_report_parsed_from_stdout() {
        let report = parse_report(&output(0, r#"{"worker": 1, "written": 3, "skipped": 2}"#)).unwrap();
        assert_eq!(
            report,
            WorkerReport {
                worker: 1,
                written: 3,
                skipped: 2
            }
        );
    }

    #[test]
    fn test_failed_exit_is_error() {
        assert!(parse_report(&output(1, "")).unwrap_err().contains("exited"));
        assert!(parse_report(&output(0, "not json")).is_err());
    }

    #[test]
    fn test_worker_command_line() {
        let launcher = ProcessLauncher::new("lcimc".into(), Path::new("/out"), "debug");
        let command = launcher.command(Path::new("/out/db/jobs/j"), 2);
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--output-root",
                "/out",
                "--log-level",
                "debug",
                "worker",
                "--job-root",
                "/out/db/jobs/j",
                "--worker",
                "2"
            ]
        );
    }
}
