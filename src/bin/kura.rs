//! The runtime host: imports a source file as a module and runs its
//! initializer.  Uncaught exceptions are printed with their stack traces.
//!
//! Run with `--help` for more info.

use std::path::PathBuf;

use clap::Parser;

use kura::runtime::loader;
use kura::runtime::options::{DebugLogSpec, ENV_DEBUG_LOG};
use kura::runtime::Context;
use kura::value::exception;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the source file to run
    file: PathBuf,
    /// extra directories for the module search path
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,
}

fn init_logging() {
    let mut builder = env_logger::Builder::new();
    match std::env::var(ENV_DEBUG_LOG).ok().and_then(|s| DebugLogSpec::parse(&s)) {
        Some(spec) => {
            builder.parse_filters(&spec.filter_directive());
            if let Some(path) = &spec.file {
                match std::fs::File::create(path) {
                    Ok(file) => {
                        builder.target(env_logger::Target::Pipe(Box::new(file)));
                    }
                    Err(err) => eprintln!("kura: cannot open log file {path}: {err}"),
                }
            }
        }
        None => {
            builder.filter_level(log::LevelFilter::Warn);
        }
    }
    builder.init();
}

fn main() {
    init_logging();
    let args = Args::parse();

    let mut z = Context::new();
    for dir in args.include {
        z.loader.add_search_path(dir);
    }

    let name = args
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string());

    if loader::import_file(&mut z, &name, &args.file).is_err() {
        let exc = z.reg0();
        let mut err = std::io::stderr();
        let _ = exception::print(&mut z, exc, &mut err);
        std::process::exit(1);
    }
}
