use std::ffi::OsString;

use clap::Parser;
use xs_api::{create_runtime_from_dir, CreateRuntimeOptions};
use xs_core::{LoadKind, ScriptError};

mod cli_args;
mod console;
mod error_map;
mod models;
mod runner;
mod source_loader;

pub(crate) use cli_args::{Cli, ListArgs, Mode, RunArgs, SizeArgs};
pub(crate) use error_map::{
    emit_error, map_cli_source_path, map_cli_source_read, map_cli_source_scan,
};
pub(crate) use source_loader::{list_test_cases, resolve_scripts_dir};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, ScriptError> {
    match cli.command {
        Mode::Run(args) => runner::run_load(args),
        Mode::List(args) => run_list(args),
        Mode::Size(args) => run_size(args),
    }
}

fn run_list(args: ListArgs) -> Result<i32, ScriptError> {
    let scripts_root = resolve_scripts_dir(&args.scripts_dir)?;
    let names = list_test_cases(&scripts_root)?;
    for name in &names {
        println!("TESTCASE:{}", name);
    }
    println!("RESULT:OK");
    Ok(0)
}

fn run_size(args: SizeArgs) -> Result<i32, ScriptError> {
    let scripts_root = resolve_scripts_dir(&args.scripts_dir)?;
    let runtime = create_runtime_from_dir(CreateRuntimeOptions::new(scripts_root))?;
    let size = runtime.script_size(LoadKind::TestCase, &args.test_case)?;
    println!("SIZE:{}", size);
    println!("RESULT:OK");
    Ok(0)
}
