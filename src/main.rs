//! vmem-sim - TLB and demand-paging simulator
//!
//! Usage:
//!   vmem-sim tlb --size 8 --policy lru 0x1000 0x2000 0x1000
//!   vmem-sim paging --frames 4 --policy fifo 0x1000 0x2000 0x3000
//!   vmem-sim paging --frames 3 --vpn 1 2 3 4 1
//!   vmem-sim decode 0x7fffffffe123
//!   vmem-sim shell
//!
//! Addresses are hex with a `0x` prefix, decimal otherwise.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use vmem_sim::cache::CacheSnapshot;
use vmem_sim::constants::{DEFAULT_PAGING_FRAMES, DEFAULT_TLB_ENTRIES};
use vmem_sim::io::{self as vio, parse_address};
use vmem_sim::shell::{HELP, Reply, Shell};
use vmem_sim::translation::{self, PageIndices};
use vmem_sim::{EvictionPolicy, Result, Session, SimConfig};

#[derive(Parser)]
#[command(name = "vmem-sim")]
#[command(author, version, about = "TLB and demand-paging simulator", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Seed for the RANDOM policy
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Args)]
struct Workload {
    /// Replacement policy: LRU, FIFO, RANDOM or CLOCK
    #[arg(short, long, default_value = "LRU", value_parser = parse_policy)]
    policy: EvictionPolicy,

    /// Read addresses from a file (whitespace or comma separated)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Addresses to access, in order
    #[arg(value_name = "ADDR", value_parser = parse_address)]
    addresses: Vec<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run addresses through a TLB
    Tlb {
        /// Number of TLB entries
        #[arg(short, long, default_value_t = DEFAULT_TLB_ENTRIES)]
        size: usize,

        #[command(flatten)]
        workload: Workload,
    },

    /// Run a reference string through the physical frame table
    Paging {
        /// Number of physical frames
        #[arg(short, long, default_value_t = DEFAULT_PAGING_FRAMES)]
        frames: usize,

        /// Treat inputs as page numbers instead of addresses
        #[arg(long)]
        vpn: bool,

        #[command(flatten)]
        workload: Workload,
    },

    /// Break an address into its page-table indices
    Decode {
        #[arg(value_name = "ADDR", value_parser = parse_address)]
        address: u64,
    },

    /// Interactive simulator shell
    Shell,
}

fn parse_policy(raw: &str) -> std::result::Result<EvictionPolicy, String> {
    raw.parse().map_err(|e: vmem_sim::ConfigError| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Tlb { size, workload } => run_tlb(cli, *size, workload),
        Commands::Paging { frames, vpn, workload } => run_paging(cli, *frames, *vpn, workload),
        Commands::Decode { address } => run_decode(cli, *address),
        Commands::Shell => run_shell(cli),
    }
}

fn load_addresses(workload: &Workload) -> Result<Vec<u64>> {
    let mut addresses = match &workload.input {
        Some(path) => vio::read_addresses(path)?,
        None => Vec::new(),
    };
    addresses.extend_from_slice(&workload.addresses);
    log::debug!("{} addresses to access", addresses.len());
    Ok(addresses)
}

#[derive(Serialize)]
struct Report<'a, R, P> {
    config: SimConfig,
    results: &'a [R],
    state: &'a CacheSnapshot<P>,
}

fn run_tlb(cli: &Cli, size: usize, workload: &Workload) -> Result<()> {
    let config = SimConfig::new(size, workload.policy).with_seed(cli.seed);
    let mut session = Session::new();
    session.configure_tlb(config)?;

    let addresses = load_addresses(workload)?;
    let results = addresses
        .iter()
        .map(|&va| session.tlb_access(va, None))
        .collect::<Result<Vec<_>>>()?;
    let state = session.tlb_inspect()?;

    if cli.json {
        println!("{}", vio::to_json(&Report { config, results: &results, state: &state })?);
        return Ok(());
    }

    for r in &results {
        println!("{:#018x} {}", r.virtual_addr, r);
    }
    if !cli.quiet {
        println!();
        println!("TLB STATUS");
        println!("{}", state);
    }
    Ok(())
}

fn run_paging(cli: &Cli, frames: usize, raw_vpns: bool, workload: &Workload) -> Result<()> {
    let config = SimConfig::new(frames, workload.policy).with_seed(cli.seed);
    let mut session = Session::new();
    session.configure_paging(config)?;

    let inputs = load_addresses(workload)?;
    let vpns = if raw_vpns { inputs } else { vio::to_vpns(&inputs) };
    let results = session.paging_sequence(&vpns)?;
    let state = session.paging_inspect()?;

    if cli.json {
        println!("{}", vio::to_json(&Report { config, results: &results, state: &state })?);
        return Ok(());
    }

    for r in &results {
        println!("{}", r);
    }
    if !cli.quiet {
        println!();
        println!("PAGING SIMULATOR STATUS");
        println!("{}", state);
    }
    Ok(())
}

fn run_decode(cli: &Cli, va: u64) -> Result<()> {
    let indices = PageIndices::from_raw(va);
    if cli.json {
        println!("{}", vio::to_json(&indices)?);
        return Ok(());
    }

    println!("Virtual Address: {:#018x}", va);
    println!("Binary (48-bit): {}", translation::format_binary(va));
    println!("                 PML4      PDPT      PD        PT        Offset");
    println!("VPN: {:#x}  Offset: {:#05x}", translation::vpn(va), indices.offset);
    println!("Indices: {}", indices);
    Ok(())
}

fn run_shell(cli: &Cli) -> Result<()> {
    let mut shell = Shell::new(cli.json, cli.seed);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    if !cli.quiet {
        println!("Virtual memory simulator shell. Type 'help' for available commands.");
    }

    loop {
        write!(stdout, "vmem> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match shell.execute(&line) {
            Ok(Reply::Exit) => break,
            Ok(Reply::Text(text)) if text.is_empty() => {}
            Ok(Reply::Text(text)) => println!("{}", text),
            Err(e) => {
                println!("Error: {}", e);
                if matches!(e, vmem_sim::SimError::Parse(_)) {
                    println!("{}", HELP);
                }
            }
        }
    }
    Ok(())
}
