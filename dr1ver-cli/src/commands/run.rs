//! `run` - the full pipeline

use crate::config::RunConfig;
use crate::exec::ProcessRunner;
use crate::pipeline;
use anyhow::Result;
use clap::Parser;

#[derive(Debug, Parser)]
pub struct RunArgs {
    #[clap(flatten)]
    pub config: RunConfig,
}

pub async fn handle(args: RunArgs) -> Result<i32> {
    pipeline::execute(&args.config, &ProcessRunner).await
}
