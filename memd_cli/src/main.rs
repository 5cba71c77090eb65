use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use memd_core::format::FLAG_GZIP;
use memd_core::{decode, decode_header, encode, MemorySeries};
use memd_stream::{export_streamed, ExportEvent, DEFAULT_BATCH_POINTS, DEFAULT_CHUNK_BYTES};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "memd",
    about = "MEMD memory-series containers — export, import, and inspect .mb files",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON series array into a .mb container
    Export {
        /// Source JSON file ("-" reads stdin)
        input: PathBuf,
        /// Destination .mb file
        output: PathBuf,
        /// Transfer the model through the batched worker protocol instead
        /// of one direct call (output bytes are identical either way)
        #[arg(long)]
        streamed: bool,
        /// Points per batch message when --streamed
        #[arg(long, default_value_t = DEFAULT_BATCH_POINTS)]
        batch_points: usize,
    },
    /// Decode a .mb container back to the JSON series array
    Import {
        /// Source .mb file
        input: PathBuf,
        /// Destination JSON file ("-" writes stdout)
        output: PathBuf,
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Print header metadata and per-series statistics
    Inspect {
        /// .mb file to inspect
        file: PathBuf,
        /// Print the per-series table
        #[arg(long)]
        series: bool,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn read_input(path: &PathBuf) -> anyhow::Result<Vec<u8>> {
    if path.to_str() == Some("-") {
        let mut buf = Vec::new();
        io::stdin().lock().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(path).with_context(|| format!("reading input file {:?}", path))
    }
}

fn point_count(series: &[MemorySeries]) -> usize {
    series.iter().map(|s| s.data.len()).sum()
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_export(
    input: PathBuf,
    output: PathBuf,
    streamed: bool,
    batch_points: usize,
) -> anyhow::Result<()> {
    let raw = read_input(&input)?;
    let series: Vec<MemorySeries> =
        serde_json::from_slice(&raw).with_context(|| format!("parsing JSON from {:?}", input))?;

    let t0 = Instant::now();
    let container = if streamed {
        let mut bytes = Vec::new();
        export_streamed(&series, batch_points, DEFAULT_CHUNK_BYTES, |event| {
            if let ExportEvent::Chunk(chunk) = event {
                bytes.extend_from_slice(&chunk);
            }
        })?;
        bytes
    } else {
        encode(&series)?
    };
    let elapsed = t0.elapsed();

    std::fs::write(&output, &container)
        .with_context(|| format!("writing output file {:?}", output))?;

    eprintln!("  series      : {}", series.len());
    eprintln!("  points      : {}", point_count(&series));
    eprintln!("  json size   : {}", human_bytes(raw.len() as u64));
    eprintln!("  container   : {}", human_bytes(container.len() as u64));
    eprintln!(
        "  ratio       : {:.2}x",
        raw.len() as f64 / container.len().max(1) as f64
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_import(input: PathBuf, output: PathBuf, pretty: bool) -> anyhow::Result<()> {
    let raw = read_input(&input)?;
    let t0 = Instant::now();
    let series =
        decode(&raw).with_context(|| format!("{:?} could not be imported", input))?;
    let elapsed = t0.elapsed();

    let json = if pretty {
        serde_json::to_string_pretty(&series)?
    } else {
        serde_json::to_string(&series)?
    };

    if output.to_str() == Some("-") {
        let mut out = io::stdout().lock();
        out.write_all(json.as_bytes())?;
        out.write_all(b"\n")?;
    } else {
        std::fs::write(&output, json.as_bytes())
            .with_context(|| format!("writing output file {:?}", output))?;
    }

    eprintln!("  series      : {}", series.len());
    eprintln!("  points      : {}", point_count(&series));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_series: bool) -> anyhow::Result<()> {
    let raw = read_input(&file)?;
    let header = decode_header(&raw)?;
    let series = decode(&raw).with_context(|| format!("{:?} could not be decoded", file))?;

    println!("=== MEMD container: {:?} ===", file);
    println!();
    println!("  format version : {}", header.version);
    println!(
        "  body           : {}",
        if header.has_flag(FLAG_GZIP) {
            "gzip"
        } else {
            "uncompressed"
        }
    );
    println!("  flags          : 0x{:04x}", header.flags);
    println!("  file size      : {}", human_bytes(raw.len() as u64));
    println!("  series         : {}", series.len());
    println!("  points         : {}", point_count(&series));

    if show_series {
        println!();
        println!(
            "  {:<38}  {:<20}  {:>8}  {:>8}",
            "id", "name", "points", "visible"
        );
        println!("  {}", "-".repeat(80));
        for s in &series {
            println!(
                "  {:<38}  {:<20}  {:>8}  {:>8}",
                s.id,
                s.name,
                s.data.len(),
                s.visible
            );
        }
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Export {
            input,
            output,
            streamed,
            batch_points,
        } => run_export(input, output, streamed, batch_points),
        Commands::Import {
            input,
            output,
            pretty,
        } => run_import(input, output, pretty),
        Commands::Inspect { file, series } => run_inspect(file, series),
    }
}
