// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, clap_styles},
};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use junit_spool::{
    AssembleOptions, AttemptEvent, HostProvider, MetadataEnricher, RUN_DIR_ENV, ReportAssembler,
    RunRoot, SpoolConfig, SpoolConfigBuilder, SpoolSession, StaticProvider, WorkerId,
    issue::{IssueLookup, JiraTracker},
};
use std::{
    io::{BufRead, Write},
    time::Duration,
};
use tracing::{info, warn};

/// Crash-safe, incremental JUnit XML reports for multi-process test runs.
#[derive(Debug, Parser)]
#[command(version, name = "junit-spool", styles = clap_styles::style())]
pub struct JunitSpoolApp {
    #[command(flatten)]
    output: OutputOpts,

    /// Config file [default: none]
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a run: create the run directory and record session properties
    ///
    /// Prints `JUNIT_SPOOL_RUN_DIR=<dir>` for the host runner to export to its workers.
    Init {
        #[command(flatten)]
        report: ReportOpts,

        /// Directory in which to create the run directory [default: the report's directory]
        #[arg(long, value_name = "DIR")]
        run_root: Option<Utf8PathBuf>,

        /// Add a session property, given as NAME=VALUE
        #[arg(long = "property", value_name = "NAME=VALUE")]
        properties: Vec<String>,
    },

    /// Record attempts, read as JSON lines from standard input
    Record {
        #[command(flatten)]
        run_dir: RunDirOpts,

        /// Worker id; each concurrently recording process needs its own
        #[arg(long, value_name = "ID", env = "JUNIT_SPOOL_WORKER")]
        worker: String,
    },

    /// Merge every worker's results into the final report
    ///
    /// This can also be used to recover a report from a run that was interrupted.
    Assemble {
        #[command(flatten)]
        run_dir: RunDirOpts,

        /// Publish the report here instead of the path chosen at init
        #[arg(long, value_name = "PATH")]
        report_xml: Option<Utf8PathBuf>,

        #[command(flatten)]
        issue_tracker: IssueTrackerOpts,

        /// Add a session property, given as NAME=VALUE
        #[arg(long = "property", value_name = "NAME=VALUE")]
        properties: Vec<String>,

        /// Keep the run directory after publishing
        #[arg(long)]
        keep_run_dir: bool,
    },
}

#[derive(Debug, Args)]
struct ReportOpts {
    /// Path to publish the JUnit XML report to
    #[arg(long, value_name = "PATH")]
    report_xml: Option<Utf8PathBuf>,

    /// Name of the report's test suite
    #[arg(long, value_name = "NAME")]
    report_name: Option<String>,
}

#[derive(Debug, Args)]
struct RunDirOpts {
    /// The run directory created by `init`
    #[arg(long, value_name = "DIR", env = RUN_DIR_ENV)]
    run_dir: Utf8PathBuf,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Issue tracker options")]
struct IssueTrackerOpts {
    /// Base URL of the JIRA server
    #[arg(long, value_name = "URL", env = "JIRA_URL")]
    jira_url: Option<String>,

    /// User name for the JIRA server
    #[arg(long, value_name = "USER", env = "JIRA_USERNAME")]
    jira_username: Option<String>,

    /// Password or API token for the JIRA server
    #[arg(long, value_name = "PASSWORD", env = "JIRA_PASSWORD", hide_env_values = true)]
    jira_password: Option<String>,

    /// Per-request timeout for issue lookups, e.g. `10s`
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    jira_timeout: Option<Duration>,

    /// Fail if the issue tracker is only partially configured
    #[arg(long)]
    strict_issue_tracker: bool,
}

impl IssueTrackerOpts {
    fn apply(self, builder: &mut SpoolConfigBuilder) {
        if let Some(url) = self.jira_url {
            builder.issue_tracker_url(url);
        }
        if let Some(username) = self.jira_username {
            builder.issue_tracker_username(username);
        }
        if let Some(password) = self.jira_password {
            builder.issue_tracker_password(password);
        }
        if let Some(timeout) = self.jira_timeout {
            builder.issue_tracker_timeout(timeout);
        }
        if self.strict_issue_tracker {
            builder.strict_issue_tracker(true);
        }
    }
}

impl JunitSpoolApp {
    /// Initializes logging and color output.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, reading attempt events from `stdin` and writing to `stdout`.
    pub fn exec(self, stdin: impl BufRead, stdout: &mut dyn Write) -> Result<i32> {
        let mut builder = match &self.config {
            Some(path) => SpoolConfigBuilder::from_toml_file(path)?,
            None => SpoolConfigBuilder::default(),
        };

        match self.command {
            Command::Init {
                report,
                run_root,
                properties,
            } => {
                if let Some(path) = report.report_xml {
                    builder.report_path(path);
                }
                if let Some(name) = report.report_name {
                    builder.report_name(name);
                }
                if let Some(dir) = run_root {
                    builder.run_root_parent(dir);
                }
                for property in &properties {
                    builder.parse_property(property)?;
                }
                exec_init(builder.build()?, stdout)
            }
            Command::Record { run_dir, worker } => {
                let run_root = RunRoot::open(run_dir.run_dir)?;
                builder.report_path(run_root.metadata().report_path.clone());
                exec_record(builder.build()?, run_root, WorkerId::new(worker), stdin)
            }
            Command::Assemble {
                run_dir,
                report_xml,
                issue_tracker,
                properties,
                keep_run_dir,
            } => {
                let run_root = RunRoot::open(run_dir.run_dir)?;
                builder.report_path(
                    report_xml.unwrap_or_else(|| run_root.metadata().report_path.clone()),
                );
                issue_tracker.apply(&mut builder);
                for property in &properties {
                    builder.parse_property(property)?;
                }
                exec_assemble(builder.build()?, run_root, keep_run_dir)
            }
        }
    }
}

fn exec_init(config: SpoolConfig, stdout: &mut dyn Write) -> Result<i32> {
    let mut enricher = MetadataEnricher::new();
    enricher.register(HostProvider);
    let session = SpoolSession::start_controller(config, enricher)?;
    let (name, value) = session.env_var();
    writeln!(stdout, "{name}={value}").map_err(ExpectedError::write_output)?;
    stdout.flush().map_err(ExpectedError::write_output)?;
    Ok(0)
}

fn exec_record(
    config: SpoolConfig,
    run_root: RunRoot,
    worker_id: WorkerId,
    stdin: impl BufRead,
) -> Result<i32> {
    let mut session =
        SpoolSession::join_worker_in(config, MetadataEnricher::new(), run_root, worker_id)?;
    let mut recorded = 0;
    for (index, line) in stdin.lines().enumerate() {
        let line = line.map_err(ExpectedError::read_events)?;
        if line.trim().is_empty() {
            continue;
        }
        let event: AttemptEvent = serde_json::from_str(&line)
            .map_err(|err| ExpectedError::invalid_event(index + 1, err))?;
        session.record_attempt(event)?;
        recorded += 1;
    }
    info!("recorded {recorded} attempts");
    Ok(0)
}

fn exec_assemble(config: SpoolConfig, run_root: RunRoot, keep_run_dir: bool) -> Result<i32> {
    // Host properties were recorded at init; only the explicitly given ones are added here.
    let mut enricher = MetadataEnricher::new();
    enricher.register(StaticProvider::new(config.static_properties().iter().cloned()));

    let mut assembler = ReportAssembler::new(&config, enricher);
    if let Some(tracker) = config.issue_tracker() {
        assembler = assembler.with_issue_lookup(IssueLookup::new(JiraTracker::new(tracker)));
    }
    let options = AssembleOptions {
        output_path: Some(config.report_path().to_owned()),
        remove_run_root: !keep_run_dir,
    };
    let summary = assembler.assemble(run_root, &options)?;

    info!(
        "{} tests ({} attempts) from {} stores, {} failing",
        summary.cases, summary.attempts, summary.stores, summary.failed_cases
    );
    if !summary.diagnostics.is_empty() {
        warn!(
            "{} problems were found while assembling {}",
            summary.diagnostics.len(),
            summary.report_path
        );
    }
    Ok(0)
}
