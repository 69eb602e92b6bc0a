//! CLI argument parsing for hookprof

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for resolved descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "hookprof")]
#[command(version)]
#[command(about = "Symbol tools for hookprof function identities", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve function addresses to name and source line using DWARF debug info
    Resolve {
        /// Binary whose debug info describes the addresses
        #[arg(short, long, value_name = "PATH")]
        binary: PathBuf,

        /// Load bias subtracted from every address (hex)
        #[arg(long, value_name = "HEX", value_parser = parse_address, default_value = "0")]
        bias: u64,

        /// Output format (text or json)
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,

        /// Function entry addresses (hex, `0x` prefix optional)
        #[arg(required = true, value_parser = parse_address)]
        addresses: Vec<u64>,
    },

    /// Print the display form of decorated symbol names
    Demangle {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
}

/// Parse a hexadecimal address, with or without a `0x` prefix
pub fn parse_address(text: &str) -> Result<u64, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid address '{}': {}", text, e))
}
