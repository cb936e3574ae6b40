use std::io::{self, BufRead, IsTerminal};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use roblox_avail::budget::RateBudget;
use roblox_avail::check::{self, CheckResult, Client, Status, bulk_resolve, validation};
use roblox_avail::history::{History, MemoryStore};
use roblox_avail::namegen::{self, Kind, Spec};

#[derive(Parser)]
#[command(
    name = "roblox-avail",
    about = "Check whether usernames are truly available on Roblox",
    after_help = "Checks name validity (3-20 characters, letters, digits, \
                  underscores, no edge or double underscores), then queries \
                  the public users API with a fallback chain (bulk lookup, \
                  keyword search, relayed search) until one answers.\n\n\
                  A name reported available could still be rejected at \
                  signup time (moderation, recently released names)."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether usernames are available (also reads from stdin)
    Check(CheckArgs),
    /// Generate candidate usernames, optionally checking them
    Gen(GenArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Usernames to check (also reads from stdin)
    names: Vec<String>,

    /// Suppress output, exit code only
    #[arg(short, long)]
    quiet: bool,

    /// Only print available names
    #[arg(short, long)]
    available_only: bool,

    /// Print results as a JSON array instead of lines
    #[arg(long)]
    json: bool,

    /// Include a profile-search link for taken names
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
struct GenArgs {
    /// Generation strategy: mixed, letters, numbers, pronounceable, leetspeak
    #[arg(short = 't', long = "type", value_parser = parse_kind, default_value = "mixed")]
    kind: Kind,

    /// Characters per name
    #[arg(short, long, default_value_t = 8)]
    length: usize,

    /// Number of distinct names to produce
    #[arg(short, long, default_value_t = 5)]
    count: usize,

    /// Shuffle the batch before printing
    #[arg(short, long)]
    shuffle: bool,

    /// Also check availability of the generated names
    #[arg(long)]
    check: bool,
}

fn parse_kind(s: &str) -> Result<Kind, String> {
    s.parse().map_err(|e: namegen::UnknownKind| e.to_string())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check(args) => run_check(args),
        Command::Gen(args) => run_gen(args),
    }
}

// Endpoint overrides, used by the integration tests to point the
// resolver at a stand-in server.
fn client_from_env() -> Client {
    let users_api =
        std::env::var("ROBLOX_AVAIL_USERS_API").unwrap_or_else(|_| check::USERS_API.to_string());
    let relay = std::env::var("ROBLOX_AVAIL_RELAY").unwrap_or_else(|_| check::RELAY.to_string());
    Client::with_endpoints(users_api, relay)
}

fn run_check(args: CheckArgs) -> ExitCode {
    let mut names: Vec<String> = args.names.clone();

    // Read from stdin if not a terminal
    if !io::stdin().is_terminal() {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(l) => {
                    let trimmed = l.trim().to_string();
                    if !trimmed.is_empty() {
                        names.push(trimmed);
                    }
                }
                Err(e) => {
                    eprintln!("error: reading stdin: {e}");
                    return ExitCode::from(2);
                }
            }
        }
    }

    if names.is_empty() {
        eprintln!("error: no usernames provided");
        eprintln!("usage: roblox-avail check [OPTIONS] [NAMES...]");
        return ExitCode::from(2);
    }

    // Deduplicate case-insensitively while preserving order
    let mut seen = std::collections::HashSet::new();
    names.retain(|n| seen.insert(n.to_lowercase()));

    for name in &names {
        if let Some(word) = validation::forbidden_word(name) {
            eprintln!("warning: `{name}` contains forbidden word `{word}`");
        }
    }

    let client = client_from_env();
    let budget = RateBudget::new();
    let history = History::new(MemoryStore::new());

    let results = bulk_resolve(&client, &budget, &names, |_, _, result| {
        history.record(result);
        if !args.json {
            print_result(result, &args);
        }
    });

    if args.json && !args.quiet {
        match serde_json::to_string_pretty(&results) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("error: encoding results: {e}");
                return ExitCode::from(2);
            }
        }
    }

    exit_code(&results)
}

fn run_gen(args: GenArgs) -> ExitCode {
    let spec = Spec {
        kind: args.kind,
        length: args.length,
        count: args.count,
        random_order: args.shuffle,
    };
    let names = match namegen::generate(&spec) {
        Ok(names) => names,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let history = History::new(MemoryStore::new());

    if args.check {
        let client = client_from_env();
        let budget = RateBudget::new();
        let results = bulk_resolve(&client, &budget, &names, |_, _, result| {
            history.record(result);
            print_line(result, false);
        });
        return exit_code(&results);
    }

    for name in names {
        println!("{name}");
        history.record(&CheckResult::generated(name));
    }
    ExitCode::SUCCESS
}

fn exit_code(results: &[CheckResult]) -> ExitCode {
    if results.iter().all(|r| r.status == Status::Available) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn print_result(result: &CheckResult, args: &CheckArgs) {
    if args.quiet {
        return;
    }
    if args.available_only && result.status != Status::Available {
        return;
    }
    print_line(result, args.verbose);
}

fn print_line(result: &CheckResult, verbose: bool) {
    let detail = match result.status {
        Status::Taken => match (&result.display_name, result.user_id) {
            (Some(display), Some(id)) => format!(": {display} (id {id})"),
            (None, Some(id)) => format!(": id {id}"),
            _ => String::new(),
        },
        Status::Error => match &result.error {
            Some(msg) => format!(": {msg}"),
            None => String::new(),
        },
        Status::Available | Status::Generated => String::new(),
    };
    println!("{}\t{}{detail}", result.username, result.status);

    if verbose && result.status == Status::Taken {
        println!(
            "\thttps://www.roblox.com/search/users?keyword={}",
            result.username
        );
    }
}
