use clap::{ArgAction, Parser, Subcommand};
use ingestwatch_engine::{
    IngestionAssessment, IngestionPolicy, IngestionPolicyConfig, IngestionState,
    IngestionStateResolver, RunRef, WatchConfig, watch_until_settled,
};
use ingestwatch_kusto::{
    HttpEndTimeProvider, KustoIngestionStore, KustoSettings, OrchestratorSettings,
    ReqwestKustoClient, StoreHealth,
};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type KustoStore = KustoIngestionStore<ReqwestKustoClient>;
type Resolver = IngestionStateResolver<HttpEndTimeProvider, KustoStore, KustoStore>;

#[derive(Parser, Debug)]
#[command(name = "ingestwatch")]
#[command(about = "Checks whether a simulation run's telemetry has fully landed in the analytical store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate the ingestion state once.
    State(StateArgs),
    /// Poll until the ingestion state is Successful or Failure.
    Watch(WatchArgs),
    /// Probe the analytical store's health.
    Health(HealthArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[arg(long)]
    organization_id: String,
    #[arg(long)]
    workspace_id: String,
    #[arg(long)]
    run_id: String,
    #[arg(long)]
    simulation_id: String,
}

#[derive(clap::Args, Debug)]
struct PolicyArgs {
    #[arg(long, allow_negative_numbers = true)]
    settle_delay_seconds: Option<i64>,
    #[arg(long, allow_negative_numbers = true)]
    no_data_timeout_seconds: Option<i64>,
    #[arg(long, allow_negative_numbers = true)]
    failure_window_minutes: Option<i64>,
}

#[derive(clap::Args, Debug)]
struct StateArgs {
    #[command(flatten)]
    run: RunArgs,
    #[command(flatten)]
    policy: PolicyArgs,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct WatchArgs {
    #[command(flatten)]
    run: RunArgs,
    #[command(flatten)]
    policy: PolicyArgs,
    #[arg(long, default_value_t = 10)]
    interval_seconds: u64,
    /// Zero polls until the verdict settles.
    #[arg(long, default_value_t = 0)]
    max_polls: usize,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct HealthArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::from(1);
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Commands::State(args) => state_command(args).await,
            Commands::Watch(args) => watch_command(args).await,
            Commands::Health(args) => health_command(args).await,
        }
    });

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

async fn state_command(args: StateArgs) -> Result<ExitCode, String> {
    let policy = load_policy(&args.policy)?;
    let resolver = build_resolver(policy)?;
    let run = run_ref(&args.run);

    let assessment = resolver
        .assess(&run, &args.run.simulation_id)
        .await
        .map_err(|error| error.to_string())?;

    print_assessment(&assessment, args.json)?;
    Ok(exit_code_for_state(assessment.state))
}

async fn watch_command(args: WatchArgs) -> Result<ExitCode, String> {
    let policy = load_policy(&args.policy)?;
    if args.interval_seconds == 0 {
        return Err("invalid configuration: --interval-seconds must be greater than zero".to_string());
    }
    let resolver = build_resolver(policy)?;
    let run = run_ref(&args.run);
    let config = WatchConfig {
        poll_interval: Duration::from_secs(args.interval_seconds),
        max_polls: args.max_polls,
        ..WatchConfig::default()
    };

    let json = args.json;
    let outcome = watch_until_settled(&resolver, &run, &args.run.simulation_id, &config, |assessment| {
        if json {
            if let Ok(line) = serde_json::to_string(assessment) {
                println!("{line}");
            }
        } else {
            println!(
                "[poll] {} state={} reason={}",
                assessment.evaluated_at.to_rfc3339(),
                assessment.state,
                assessment.reason.as_str()
            );
        }
    })
    .await
    .map_err(|error| error.to_string())?;

    if json {
        let line = serde_json::to_string(&outcome).map_err(|error| error.to_string())?;
        println!("{line}");
    } else {
        println!("polls: {}", outcome.polls);
        println!("settled: {}", outcome.settled);
        print_assessment(&outcome.assessment, false)?;
    }
    Ok(exit_code_for_state(outcome.assessment.state))
}

async fn health_command(args: HealthArgs) -> Result<ExitCode, String> {
    let settings = KustoSettings::from_env().map_err(|error| error.to_string())?;
    let client = ReqwestKustoClient::new(&settings).map_err(|error| error.to_string())?;
    let health = KustoIngestionStore::new(client).health().await;

    if args.json {
        let json = serde_json::to_string(&health).map_err(|error| error.to_string())?;
        println!("{json}");
    } else {
        match &health {
            StoreHealth::Up => println!("status: UP"),
            StoreHealth::Down { reason } => {
                println!("status: DOWN");
                println!("reason: {reason}");
            }
        }
    }

    Ok(if health.is_up() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Environment values first, then command-line overrides, validated before any client exists.
fn load_policy(args: &PolicyArgs) -> Result<IngestionPolicy, String> {
    let mut config = IngestionPolicyConfig::from_env().map_err(|error| error.to_string())?;
    if let Some(value) = args.settle_delay_seconds {
        config.settle_delay_seconds = value;
    }
    if let Some(value) = args.no_data_timeout_seconds {
        config.no_data_timeout_seconds = value;
    }
    if let Some(value) = args.failure_window_minutes {
        config.failure_observation_window_minutes = value;
    }
    config.validate().map_err(|error| error.to_string())
}

fn build_resolver(policy: IngestionPolicy) -> Result<Resolver, String> {
    let kusto = KustoSettings::from_env().map_err(|error| error.to_string())?;
    let orchestrator = OrchestratorSettings::from_env().map_err(|error| error.to_string())?;
    tracing::debug!(?kusto, ?orchestrator, "collaborators configured");

    let store = KustoIngestionStore::new(
        ReqwestKustoClient::new(&kusto).map_err(|error| error.to_string())?,
    );
    let end_times = HttpEndTimeProvider::new(orchestrator).map_err(|error| error.to_string())?;
    Ok(IngestionStateResolver::new(
        end_times,
        store.clone(),
        store,
        policy,
    ))
}

fn run_ref(args: &RunArgs) -> RunRef {
    RunRef::new(&args.organization_id, &args.workspace_id, &args.run_id)
}

fn print_assessment(assessment: &IngestionAssessment, json: bool) -> Result<(), String> {
    if json {
        let json = serde_json::to_string_pretty(assessment).map_err(|error| error.to_string())?;
        println!("{json}");
        return Ok(());
    }

    println!("run_id: {}", assessment.run.run_id);
    println!("simulation_id: {}", assessment.simulation_id);
    println!("state: {}", assessment.state);
    println!("reason: {}", assessment.reason.as_str());
    println!(
        "end_time: {}",
        assessment
            .end_time
            .map(|end_time| end_time.to_rfc3339())
            .unwrap_or_else(|| "<none>".to_string())
    );
    if let Some(elapsed) = assessment.elapsed_seconds {
        println!("elapsed_seconds: {elapsed}");
    }
    if let (Some(sent), Some(landed)) = (assessment.sent_count, assessment.landed_count) {
        println!("sent: {sent}");
        println!("landed: {landed}");
    }
    if let Some(found) = assessment.failure_logged {
        println!("failure_logged: {found}");
    }
    Ok(())
}

fn exit_code_for_state(state: IngestionState) -> ExitCode {
    match state {
        IngestionState::Successful => ExitCode::SUCCESS,
        IngestionState::Failure => ExitCode::from(2),
        IngestionState::InProgress | IngestionState::Unknown => ExitCode::from(3),
    }
}
