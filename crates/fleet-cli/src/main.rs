//! adb-fleet - bulk account operations over a pool of adb-connected devices
//!
//! Usage:
//!   adb-fleet devices                 List connected devices
//!   adb-fleet reset                   Run the password-reset flow
//!   adb-fleet login                   Run the security-question login flow
//!   adb-fleet probe [options]         Standalone matcher test harness
//!   adb-fleet rewrite-config <cmd>    Inspect or edit the proxy rewrite config
//!   adb-fleet --help                  Show help

use std::fs::File;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::FmtSubscriber;

mod cli;
mod probe;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    init_logging();

    match cli::parse_args(&args) {
        Ok(command) => cli::run(command),
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_help();
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("adb-fleet v{}", env!("CARGO_PKG_VERSION"));
    println!("Bulk account operations over a pool of adb-connected devices");
    println!();
    println!("USAGE:");
    println!("    adb-fleet <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    devices                     List connected devices");
    println!("    reset                       Run the password-reset flow over id.txt");
    println!("    login                       Run the security-question login flow");
    println!("    probe                       One-shot matcher test against the first device");
    println!("    rewrite-config <cmd>        show | set-field <name> <value> | toggle");
    println!();
    println!("PROBE OPTIONS:");
    println!("    --template <path>           Template image to search for");
    println!("    --text <string>             Text to find using OCR");
    println!("    --lang <code>               OCR language (default: eng)");
    println!("    --debug                     Save debug images next to the result");
    println!();
    println!("Input and output paths come from the run configuration");
    println!("(config.json under the platform config directory).");
}

fn init_logging() {
    // Progress is printed in-place on the console; logs go to a file so
    // they do not tear the status lines apart.
    if let Ok(log_file) = File::create("adb-fleet.log") {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_target(false)
            .with_ansi(false)
            .with_writer(log_file.with_max_level(Level::INFO))
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    }
    // If file creation fails, logging is simply disabled.
}
