use std::process::ExitCode;
use std::sync::Arc;

use jobtrack_core::models::{CoreError, CoreErrorKind, CoreResult, DataSet, SearchQuery};
use jobtrack_core::search::{SearchOptions, SearchPhase, SearchState, SettledOutcome};
use jobtrack_core::source::{HttpSearchSource, SearchSource};
use jobtrack_core::{QueryCoordinator, SearchClient, SearchConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage:
  jobtrack search [TERM] [--status S] [--follow-up] [--page N] [--page-size N] [--demo]
  jobtrack watch [--demo]

environment:
  JOBTRACK_API_BASE, JOBTRACK_DEBOUNCE_MS, JOBTRACK_CACHE_TTL_SECS,
  JOBTRACK_CACHE_CAPACITY, JOBTRACK_PAGE_SIZE, JOBTRACK_RELATEDNESS,
  JOBTRACK_REQUEST_TIMEOUT_SECS, RUST_LOG";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Search(SearchArgs),
    Watch { data_set: DataSet },
    Help,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SearchArgs {
    term: String,
    status: Option<String>,
    follow_up: bool,
    page: Option<u32>,
    page_size: Option<u32>,
    data_set: DataSet,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let outcome = match command {
        Command::Help => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Command::Search(args) => run_search(args).await,
        Command::Watch { data_set } => run_watch(data_set).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobtrack=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn http_source(config: &SearchConfig) -> CoreResult<Arc<dyn SearchSource>> {
    Ok(Arc::new(HttpSearchSource::new(config)?))
}

async fn run_search(args: SearchArgs) -> CoreResult<()> {
    let config = SearchConfig::from_env()?;
    let client = SearchClient::new(http_source(&config)?, &config);

    let query = SearchQuery::new(args.page_size.unwrap_or(config.default_page_size))
        .with_term(args.term)
        .with_status(args.status)
        .with_follow_up(args.follow_up.into())
        .with_page(args.page.unwrap_or(1))
        .with_data_set(args.data_set);

    let resolution = client.search(&query, SearchOptions::default()).await?;
    tracing::info!(
        query = %query.key(),
        total = resolution.page.total,
        origin = ?resolution.origin,
        "search settled"
    );

    let rendered = serde_json::to_string_pretty(&*resolution.page).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("failed to render results: {error}"),
        )
    })?;
    println!("{rendered}");
    Ok(())
}

/// Feed stdin lines through a coordinator as if they were typed, printing
/// every settled outcome. Exits once input is closed and the session is idle.
async fn run_watch(data_set: DataSet) -> CoreResult<()> {
    let config = SearchConfig::from_env()?;
    let coordinator = QueryCoordinator::new(http_source(&config)?, &config);
    let mut states = coordinator.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reported = Reported::default();
    let mut input_open = true;

    if data_set != DataSet::Live {
        coordinator.set_data_set(data_set);
    }

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                let line = line.map_err(|error| {
                    CoreError::new(CoreErrorKind::Internal, format!("failed to read stdin: {error}"))
                })?;
                match line {
                    Some(line) => coordinator.handle_search_change(line.trim()),
                    None => input_open = false,
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                reported.report(&state);
            }
        }

        if !input_open {
            let state = states.borrow_and_update().clone();
            reported.report(&state);
            if state.phase.is_idle() {
                break;
            }
        }
    }

    coordinator.shutdown();
    Ok(())
}

/// Last settled state printed, so focus-only or repeated updates stay quiet.
#[derive(Default)]
struct Reported {
    last: Option<(u64, SearchPhase)>,
}

impl Reported {
    fn report(&mut self, state: &SearchState) {
        let SearchPhase::Settled(outcome) = state.phase else {
            return;
        };
        let marker = (state.applied_sequence, state.phase);
        if self.last == Some(marker) {
            return;
        }
        self.last = Some(marker);

        match outcome {
            SettledOutcome::Success => {
                tracing::info!(
                    query = %state.query.key(),
                    sequence = state.applied_sequence,
                    total = state.results.total,
                    "search settled"
                );
                println!(
                    "{} of {} for \"{}\"",
                    state.results.records.len(),
                    state.results.total,
                    state.query.term()
                );
                for application in &state.results.records {
                    println!(
                        "  #{} {} | {} | {}",
                        application.id, application.company, application.role, application.status
                    );
                }
            }
            SettledOutcome::Error => {
                println!("error: {}", state.error.as_deref().unwrap_or("search failed"));
            }
            SettledOutcome::Canceled => {}
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command, String> {
    let Some(command) = args.next() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "search" => parse_search(args).map(Command::Search),
        "watch" => {
            let mut data_set = DataSet::Live;
            for arg in args {
                match arg.as_str() {
                    "--demo" => data_set = DataSet::Demo,
                    other => return Err(format!("unexpected argument '{other}' for watch")),
                }
            }
            Ok(Command::Watch { data_set })
        }
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn parse_search(mut args: impl Iterator<Item = String>) -> Result<SearchArgs, String> {
    let mut parsed = SearchArgs::default();
    let mut words = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--status" => parsed.status = Some(flag_value(&mut args, "--status")?),
            "--follow-up" => parsed.follow_up = true,
            "--page" => parsed.page = Some(flag_number(&mut args, "--page")?),
            "--page-size" => parsed.page_size = Some(flag_number(&mut args, "--page-size")?),
            "--demo" => parsed.data_set = DataSet::Demo,
            flag if flag.starts_with("--") => return Err(format!("unknown flag '{flag}'")),
            word => words.push(word.to_string()),
        }
    }

    parsed.term = words.join(" ");
    Ok(parsed)
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("{flag} needs a value"))
}

fn flag_number(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<u32, String> {
    let raw = flag_value(args, flag)?;
    match raw.parse::<u32>() {
        Ok(0) | Err(_) => Err(format!("{flag} expects a positive number, got '{raw}'")),
        Ok(number) => Ok(number),
    }
}
