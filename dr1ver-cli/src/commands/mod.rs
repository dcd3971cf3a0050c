//! CLI surface

pub mod check;
pub mod cleanup;
pub mod run;

use clap::Parser;

#[derive(Debug, Parser)]
pub enum Command {
    /// Full pipeline: provision, deploy, test, verify, clean up
    Run(run::RunArgs),
    /// Environment prereq report only
    Check(check::CheckArgs),
    /// Tear down a previous run by its run id
    Cleanup(cleanup::CleanupArgs),
}
