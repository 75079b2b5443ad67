//! Command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use driftfix_core::ledger::{FixDisposition, FixOutcome};

use crate::harness::Harness;
use crate::runner::run_script;

/// Deprecation-aware script runner: executes drift scripts, warns at
/// deprecated call sites, and collects the source edits that fix them.
#[derive(Parser)]
#[command(name = "driftfix")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script; recorded fixes go to a patch file beside it.
    Run {
        /// Script to execute
        script: PathBuf,

        /// Arguments exposed to the script as `argv`
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,

        /// Rewrite affected sources in place instead of writing a patch
        #[arg(long)]
        fix: bool,

        /// Print the recorded edits as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run test case files; with --fix, apply edits once all pass.
    Test {
        /// Case files to run
        #[arg(required = true)]
        cases: Vec<PathBuf>,

        /// Apply recorded fixes when every case passes
        #[arg(long)]
        fix: bool,
    },
}

pub fn execute(cli: Cli) -> ExitCode {
    match cli.command {
        Commands::Run {
            script,
            args,
            fix,
            json,
        } => match run_script(&script, &args, fix) {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    eprintln!("{warning}");
                }
                if json {
                    match serde_json::to_string_pretty(&outcome.edits) {
                        Ok(rendered) => println!("{rendered}"),
                        Err(err) => {
                            eprintln!("error: {err}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    if let Some(patch) = &outcome.patch_file {
                        println!("patch written to {}", patch.display());
                    }
                    print_fixes(&outcome.fixes);
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        Commands::Test { cases, fix } => {
            let mut harness = Harness::new(fix);
            for case in &cases {
                harness.run_case(case);
            }
            let report = harness.finish();
            for case in &report.cases {
                match &case.outcome {
                    crate::harness::CaseOutcome::Passed => {
                        println!("pass {}", case.file.display());
                    }
                    crate::harness::CaseOutcome::Failed(message) => {
                        println!("FAIL {} ({message})", case.file.display());
                    }
                }
            }
            for warning in &report.warnings {
                eprintln!("{warning}");
            }
            print_fixes(&report.fixes);
            if let Some(summary) = &report.summary {
                println!("{summary}");
            }
            if report.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn print_fixes(fixes: &[FixOutcome]) {
    for fix in fixes {
        match &fix.disposition {
            FixDisposition::Fixed => println!("fixed {}", fix.file.display()),
            FixDisposition::NoEdits => {}
            FixDisposition::Skipped(status) => {
                println!("skipped {}: {status}", fix.file.display());
            }
            FixDisposition::Failed(message) => {
                println!("failed {}: {message}", fix.file.display());
            }
        }
    }
}
