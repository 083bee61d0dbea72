//! MineScript Compiler CLI
//!
//! Command-line interface for compiling .ms sources into datapacks.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use minescriptc::CompilerConfig;
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "minescriptc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MineScript compiler - compile .ms programs to datapacks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .ms file into a datapack and zip archive
    Build {
        /// Input .ms source file
        input: PathBuf,

        /// Pack namespace (defaults to the input filename)
        #[arg(short, long)]
        name: Option<String>,

        /// Description stamped into pack.mcmeta
        #[arg(short, long)]
        description: Option<String>,

        /// Directory receiving build/ and dist/ (defaults to the input's directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Parse and analyse a .ms file without writing output
    Check {
        /// Input .ms source file
        input: PathBuf,

        /// Pack namespace (defaults to the input filename)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            name,
            description,
            out_dir,
        } => {
            let mut config = CompilerConfig::new();
            if let Some(name) = name {
                config = config.with_pack_name(name);
            }
            if let Some(description) = description {
                config = config.with_description(description);
            }
            if let Some(out_dir) = out_dir {
                config = config.with_out_dir(out_dir);
            }
            match minescriptc::build_pack(&input, &config) {
                Ok(archive) => {
                    println!("Compiled {} -> {}", input.display(), archive.display());
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
        }
        Commands::Check { input, name } => {
            let mut config = CompilerConfig::new();
            if let Some(name) = name {
                config = config.with_pack_name(name);
            }
            match minescriptc::check_file(&input, &config) {
                Ok(()) => println!("{}: OK", input.display()),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "minescriptc", &mut io::stdout());
        }
    }
}
