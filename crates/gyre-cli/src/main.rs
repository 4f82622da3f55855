//! Gyre back end driver
//!
//! Reads a resolved, typed program as JSON, runs the back end over it and
//! writes the lowered program back out, either as JSON or as a readable
//! disassembly.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gyre_backend::{CompileOptions, Compiler, PrettyPrint, Program};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gyre")]
#[command(about = "Gyre compiler back end", long_about = None)]
#[command(version)]
struct Cli {
    /// Compile options (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower a program to bytecode
    Lower {
        /// Input program (JSON)
        input: PathBuf,
        /// Output file; standard output when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print a disassembly instead of JSON
        #[arg(long)]
        text: bool,
    },

    /// Run every pass and report errors without writing output
    Check {
        /// Input program (JSON)
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = match &cli.config {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            CompileOptions::from_toml_str(&source)?
        }
        None => CompileOptions::default(),
    };
    let compiler = Compiler::new(options);

    match cli.command {
        Commands::Lower {
            input,
            output,
            text,
        } => {
            let program = compiler.compile(read_program(&input)?)?;
            let rendered = if text {
                program.pretty_print()
            } else {
                program.to_json()?
            };
            match output {
                Some(path) => {
                    fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(
                        output = %path.display(),
                        checksum = %program.checksum()?,
                        "wrote lowered program"
                    );
                }
                None => println!("{}", rendered),
            }
        }

        Commands::Check { input } => {
            let program = compiler.compile(read_program(&input)?)?;
            let lowered = program
                .functions
                .iter()
                .filter(|f| f.lowered.is_some())
                .count();
            println!(
                "{}: ok ({} classes, {} functions lowered)",
                input.display(),
                program.classes.len(),
                lowered
            );
        }
    }

    Ok(())
}

fn read_program(path: &Path) -> anyhow::Result<Program> {
    let source =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let program = Program::from_json(&source)
        .with_context(|| format!("{} is not a valid program", path.display()))?;
    Ok(program)
}
