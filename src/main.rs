use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tarzst::service::{self, CompressRequest, DecompressRequest, Response};
use tarzst::{EntryKind, list};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pack and unpack zstd-compressed tar archives", long_about = None)]
struct Args {
    /// More log output on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the result as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack files and directories into an archive
    #[command(alias = "c")]
    Pack {
        /// Files or directories to add
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Archive name; `.zst` is appended when missing
        #[arg(short, long)]
        output: Option<String>,

        /// zstd level (1-19); anything else falls back to 3
        #[arg(short, long)]
        level: Option<i32>,
    },

    /// Extract an archive into a directory under the working directory
    #[command(alias = "x")]
    Unpack {
        archive: String,

        /// Directory name; defaults to `<archive>_extracted`
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List the entries of an archive
    #[command(alias = "l")]
    List { archive: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let ok = match args.command {
        Commands::Pack { inputs, output, level } => {
            let request = CompressRequest {
                files: inputs,
                output: output.unwrap_or_default(),
                level: level.unwrap_or(service::DEFAULT_LEVEL),
            };
            let response = service::handle_compress(&request);
            if !args.json {
                if let Some(stats) = &response.data {
                    println!("{}", stats.output_file);
                    println!(
                        "  {} -> {} bytes ({:.1}%) in {}",
                        stats.original_size, stats.compressed_size, stats.compression_ratio, stats.duration
                    );
                }
            }
            report(&response, args.json)
        }
        Commands::Unpack { archive, output } => {
            let request = DecompressRequest {
                archive,
                output_dir: output.unwrap_or_default(),
            };
            report(&service::handle_decompress(&request), args.json)
        }
        Commands::List { archive } => match list(&archive) {
            Ok(headers) => {
                if args.json {
                    let names: Vec<_> = headers.iter().map(|h| &h.name).collect();
                    print_json(&names)
                } else {
                    println!("Files in {}:", archive.display());
                    println!("{:>10}  {:19}  {}", "Size", "Modified", "Name");
                    println!("{}", "-".repeat(60));
                    for header in &headers {
                        let name = match header.kind {
                            EntryKind::Directory => format!("{}/", header.name),
                            EntryKind::Regular => header.name.clone(),
                        };
                        println!("{:>10}  {:19}  {}", header.size, format_mtime(header.mtime), name);
                    }
                    println!("\nTotal: {} entries", headers.len());
                    true
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                false
            }
        },
    };

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints a service response; returns whether it succeeded.
fn report<T: Serialize>(response: &Response<T>, json: bool) -> bool {
    if json {
        return print_json(response) && response.success;
    }
    if response.success {
        println!("{}", response.message);
    } else {
        eprintln!("Error: {}", response.message);
    }
    response.success
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            true
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            false
        }
    }
}

fn format_mtime(mtime: u64) -> String {
    i64::try_from(mtime)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
