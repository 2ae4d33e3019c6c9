use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "xs-cli")]
#[command(about = "Run XML test scripts with concurrent workers")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Run(RunArgs),
    List(ListArgs),
    Size(SizeArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "test-case")]
    pub(crate) test_case: String,
    #[arg(long = "config")]
    pub(crate) config: Option<String>,
    #[arg(long = "workers", default_value_t = 1)]
    pub(crate) workers: usize,
    #[arg(long = "timeout-ms")]
    pub(crate) timeout_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub(crate) struct ListArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
}

#[derive(Debug, Args)]
pub(crate) struct SizeArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "test-case")]
    pub(crate) test_case: String,
}
