use std::process;

use clap::Parser;

use golift::cli::Args;

fn main() {
    let args = Args::parse();
    match golift::run(args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}
