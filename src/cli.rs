use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "golift",
    version,
    about = "Structural search and rewrite for Go source"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate .lift rule files
    Parse {
        /// Rule files to validate
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Parse a .lift file and dump its structure as JSON
    Inspect {
        /// Rule file to inspect
        file: PathBuf,
    },

    /// Find matches in Go source
    Match {
        /// Rule file
        rule: PathBuf,

        /// Go source file to match against
        #[arg(long)]
        source: PathBuf,
    },

    /// Print version information
    Version,

    /// Apply transformations to Go source
    Apply {
        /// Rule file
        rule: PathBuf,

        /// Go source file to transform
        #[arg(long)]
        source: PathBuf,

        /// Write the modified source to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite the source file in place
        #[arg(short, long)]
        write: bool,
    },
}
