use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pirwire_codecs::{codec_by_id, Bzip2Decoder};
use pirwire_core::chunks::deserialize_chunks;
use pirwire_core::frame::{self, KeyValueIter, Payload, Record};
use pirwire_core::{BloomFilter, ClientConfig, DecodeOptions};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pirwire",
    about = "Decode private-retrieval responses and work with pirwire frames and membership filters",
    version
)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompress a response stream back to raw bytes
    Decompress {
        /// Compressed input ("-" reads stdin)
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
        /// Skip block and stream CRC verification
        #[arg(long)]
        no_crc: bool,
        /// Client config (JSON) selecting the codec and CRC checking
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print stream header and block statistics
    Inspect {
        /// Compressed stream to inspect
        file: PathBuf,
        /// Print per-block details
        #[arg(long)]
        blocks: bool,
    },
    /// Build a membership filter from keys
    BloomBuild {
        /// Number of hash functions
        #[arg(short, long, default_value_t = 8)]
        k: u32,
        /// log2 of the filter size in bits (3..=32)
        #[arg(short, long, default_value_t = 20)]
        bits: u32,
        /// Destination filter file
        #[arg(short, long)]
        out: PathBuf,
        /// File with one key per line, added to any keys given inline
        #[arg(long)]
        keys_file: Option<PathBuf>,
        /// Keys to insert
        keys: Vec<String>,
    },
    /// Look keys up in a membership filter
    BloomCheck {
        /// Filter file as served by the bucket
        filter: PathBuf,
        /// Keys to test
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Decode a framed record, or a write batch of key/value pairs
    Frame {
        /// File holding the frame
        file: PathBuf,
        /// Treat the file as concatenated wrapped key/value pairs
        #[arg(long)]
        pairs: bool,
    },
    /// List the chunks of a request or response batch
    Chunks {
        /// File holding the chunk batch
        file: PathBuf,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

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

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path.to_str() == Some("-") {
        let mut buf = Vec::new();
        io::stdin().lock().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(path).with_context(|| format!("reading input file {:?}", path))
    }
}

/// Hex dump of at most `limit` bytes, 16 per row.
fn print_hex(bytes: &[u8], limit: usize) {
    let preview = &bytes[..bytes.len().min(limit)];
    for (i, chunk) in preview.chunks(16).enumerate() {
        print!("    {:04x}  ", i * 16);
        for b in chunk {
            print!("{:02x} ", b);
        }
        for _ in chunk.len()..16 {
            print!("   ");
        }
        print!("  |");
        for b in chunk {
            if b.is_ascii_graphic() || *b == b' ' {
                print!("{}", *b as char);
            } else {
                print!(".");
            }
        }
        println!("|");
    }
    if bytes.len() > limit {
        println!("    ... ({} bytes not shown)", bytes.len() - limit);
    }
}

fn print_record(record: &Record) -> anyhow::Result<()> {
    match &record.metadata {
        Some(meta) => println!("  metadata : {}", serde_json::to_string(meta)?),
        None => println!("  metadata : (none)"),
    }
    match &record.data {
        Payload::Json(value) => {
            println!("  payload  : JSON");
            for line in serde_json::to_string_pretty(value)?.lines() {
                println!("    {}", line);
            }
        }
        Payload::Bytes(bytes) => {
            println!("  payload  : {} raw", human_bytes(bytes.len() as u64));
            print_hex(bytes, 256);
        }
    }
    Ok(())
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_decompress(input: PathBuf, output: PathBuf, no_crc: bool, config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => ClientConfig::load(&path).with_context(|| format!("loading config {:?}", path))?,
        None => ClientConfig::default(),
    };
    let codec = codec_by_id(config.codec_id)?;
    let opts = DecodeOptions {
        check_crc: config.check_crc && !no_crc,
    };

    let compressed = read_input(&input)?;
    tracing::debug!(codec = codec.name(), bytes = compressed.len(), check_crc = opts.check_crc, "decompressing");

    let t0 = Instant::now();
    let raw = codec
        .decompress(&compressed, opts)
        .with_context(|| format!("decoding {:?} with {}", input, codec.name()))?;
    let elapsed = t0.elapsed();

    if output.to_str() == Some("-") {
        io::stdout().lock().write_all(&raw)?;
    } else {
        File::create(&output)
            .and_then(|mut f| f.write_all(&raw))
            .with_context(|| format!("writing output file {:?}", output))?;
    }

    eprintln!("  codec       : {}", codec.name());
    eprintln!("  crc checked : {}", opts.check_crc);
    eprintln!("  compressed  : {}", human_bytes(compressed.len() as u64));
    eprintln!("  raw size    : {}", human_bytes(raw.len() as u64));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((raw.len() as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_blocks: bool) -> anyhow::Result<()> {
    let compressed = read_input(&file)?;
    let mut decoder = Bzip2Decoder::new(&compressed, true)?;
    let header = decoder.header();

    let mut raw = Vec::new();
    let mut blocks = Vec::new();
    while let Some(block) = decoder.next_block(&mut raw)? {
        blocks.push(block);
    }
    let consumed = decoder.bytes_consumed();
    let ratio = if compressed.is_empty() {
        1.0
    } else {
        raw.len() as f64 / consumed as f64
    };

    println!("=== Stream: {:?} ===", file);
    println!();
    println!("  block level    : {} (max {} per block)", header.level, human_bytes(header.max_block_len() as u64));
    println!("  block count    : {}", blocks.len());
    println!("  raw size       : {}", human_bytes(raw.len() as u64));
    println!("  compressed     : {}", human_bytes(consumed as u64));
    println!("  ratio          : {:.2}x", ratio);
    println!("  stream crc     : {:08x}", decoder.stream_crc());
    if consumed < compressed.len() {
        println!("  trailing bytes : {} (ignored)", compressed.len() - consumed);
    }

    if show_blocks {
        println!();
        println!(
            "  {:>6}  {:>8}  {:>8}  {:>6}  {:>9}  {:>12}  {:>12}",
            "block", "crc", "origin", "used", "groups", "bwt", "raw"
        );
        println!("  {}", "-".repeat(74));
        for b in &blocks {
            println!(
                "  {:>6}  {:08x}  {:>8}  {:>6}  {:>3} / {:>3}  {:>12}  {:>12}",
                b.index,
                b.stored_crc,
                b.primary_index,
                b.symbols_in_use,
                b.huffman_groups,
                b.selectors,
                human_bytes(b.bwt_len as u64),
                human_bytes(b.output_len as u64)
            );
        }
    }
    Ok(())
}

fn run_bloom_build(k: u32, bits: u32, out: PathBuf, keys_file: Option<PathBuf>, mut keys: Vec<String>) -> anyhow::Result<()> {
    if let Some(path) = keys_file {
        let text = std::fs::read_to_string(&path).with_context(|| format!("reading keys file {:?}", path))?;
        keys.extend(text.lines().filter(|l| !l.is_empty()).map(str::to_string));
    }
    if keys.is_empty() {
        anyhow::bail!("no keys given; pass keys inline or with --keys-file");
    }

    let mut filter = BloomFilter::new(k, bits)?;
    filter.insert_all(&keys);
    std::fs::write(&out, filter.to_bytes()).with_context(|| format!("writing filter {:?}", out))?;

    let total_bits = (filter.len_bytes() as u64) * 8;
    eprintln!("  keys        : {}", keys.len());
    eprintln!("  hashes (k)  : {}", filter.k());
    eprintln!("  size        : 2^{} bits ({})", filter.bits(), human_bytes(filter.len_bytes() as u64));
    eprintln!(
        "  fill        : {:.4}%",
        filter.count_ones() as f64 * 100.0 / total_bits as f64
    );
    eprintln!("  written to  : {:?}", out);
    Ok(())
}

fn run_bloom_check(filter: PathBuf, keys: Vec<String>) -> anyhow::Result<()> {
    let raw = read_input(&filter)?;
    let filter = BloomFilter::from_bytes(&raw).with_context(|| format!("parsing filter {:?}", filter))?;

    let hits = filter.intersect(&keys);
    for key in &keys {
        let present = hits.contains(&key);
        println!("{}\t{}", if present { "maybe" } else { "absent" }, key);
    }
    eprintln!("  {} of {} keys may be present", hits.len(), keys.len());
    Ok(())
}

fn run_frame(file: PathBuf, pairs: bool) -> anyhow::Result<()> {
    let bytes = read_input(&file)?;

    if !pairs {
        let record = frame::deserialize(&bytes).with_context(|| format!("decoding frame {:?}", file))?;
        println!("=== Record: {:?} ({}) ===", file, human_bytes(bytes.len() as u64));
        return print_record(&record);
    }

    let mut count = 0;
    for pair in KeyValueIter::new(&bytes) {
        let (key, value) = pair.with_context(|| format!("pair {} of {:?}", count, file))?;
        println!("=== Key: {} ===", String::from_utf8_lossy(key));
        print_record(&frame::deserialize(value)?)?;
        count += 1;
    }
    eprintln!("  {} pairs", count);
    Ok(())
}

fn run_chunks(file: PathBuf) -> anyhow::Result<()> {
    let bytes = read_input(&file)?;
    let chunks = deserialize_chunks(&bytes).with_context(|| format!("decoding chunk batch {:?}", file))?;

    println!("=== Chunk batch: {:?} ({} chunks) ===", file, chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        println!("  chunk {:>4} : {}", i, human_bytes(chunk.len() as u64));
        print_hex(chunk, 64);
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Decompress {
            input,
            output,
            no_crc,
            config,
        } => run_decompress(input, output, no_crc, config),
        Commands::Inspect { file, blocks } => run_inspect(file, blocks),
        Commands::BloomBuild {
            k,
            bits,
            out,
            keys_file,
            keys,
        } => run_bloom_build(k, bits, out, keys_file, keys),
        Commands::BloomCheck { filter, keys } => run_bloom_check(filter, keys),
        Commands::Frame { file, pairs } => run_frame(file, pairs),
        Commands::Chunks { file } => run_chunks(file),
    }
}
