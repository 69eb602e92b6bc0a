use anyhow::Result;
use clap::Parser;
use hookprof::cli::{Cli, Command, OutputFormat};
use hookprof::symbols::{undecorate, DwarfProvider, FunctionDescriptor, SymbolCache};
use hookprof::FuncId;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Resolve each address through the binary's DWARF info and print the result
fn resolve(binary: &Path, bias: u64, format: OutputFormat, addresses: &[u64]) -> Result<()> {
    let provider = DwarfProvider::load(binary, bias)?;
    tracing::debug!("loaded debug info from {}", binary.display());
    let mut symbols = SymbolCache::with_provider(Arc::new(provider));

    let descriptors: Vec<FunctionDescriptor> = addresses
        .iter()
        .map(|&addr| symbols.resolve(FuncId::new(addr)).as_ref().clone())
        .collect();

    match format {
        OutputFormat::Text => {
            for d in &descriptors {
                println!("{}  {}  {}:{}", d.func, d.name, d.file, d.line);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&descriptors)?),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Resolve {
            binary,
            bias,
            format,
            addresses,
        } => resolve(&binary, bias, format, &addresses),
        Command::Demangle { symbols } => {
            for symbol in &symbols {
                println!("{}", undecorate(symbol));
            }
            Ok(())
        }
    }
}
