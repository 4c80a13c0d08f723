//! `restyle-sim` - drive the replacement engine against a simulated document

mod simulate;

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use restyle_core::EngineConfig;
use restyle_engine::ReplacementController;
use simulate::{render_text, FaultMode, Scenario};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn cli() -> Command {
    Command::new("restyle-sim")
        .version(restyle_engine::VERSION)
        .about("Bulk style and variable replacement simulator")
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a replacement against an in-memory document")
                .arg(
                    Arg::new("nodes")
                        .long("nodes")
                        .default_value("250")
                        .value_parser(value_parser!(usize))
                        .help("Number of affected nodes"),
                )
                .arg(
                    Arg::new("shared-styles")
                        .long("shared-styles")
                        .default_value("0")
                        .value_parser(value_parser!(usize))
                        .help("Remote styles binding the source variable (0 = direct style swap)"),
                )
                .arg(
                    Arg::new("fail-every")
                        .long("fail-every")
                        .value_parser(value_parser!(usize))
                        .help("Inject a fault into every Nth node"),
                )
                .arg(
                    Arg::new("fault")
                        .long("fault")
                        .default_value("locked")
                        .value_parser(["locked", "timeout", "denied"])
                        .help("Kind of injected fault"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .help("Engine configuration file (TOML)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the result as JSON"),
                ),
        )
        .subcommand(Command::new("config").about("Print the default engine configuration"))
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
            .context("failed to install JSON logger")?;
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init()
            .context("failed to install logger")?;
    }
    Ok(())
}

fn load_config(path: Option<&String>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let source =
        std::fs::read_to_string(path).with_context(|| format!("cannot read config {path}"))?;
    EngineConfig::from_toml_str(&source).with_context(|| format!("invalid config {path}"))
}

async fn simulate(args: &ArgMatches) -> anyhow::Result<bool> {
    let fault_name = args
        .get_one::<String>("fault")
        .map_or("locked", String::as_str);
    let Some(fault) = FaultMode::parse(fault_name) else {
        bail!("unknown fault mode {fault_name}");
    };
    let scenario = Scenario {
        nodes: args.get_one::<usize>("nodes").copied().unwrap_or(250),
        shared_styles: args.get_one::<usize>("shared-styles").copied().unwrap_or(0),
        fail_every: args.get_one::<usize>("fail-every").copied(),
        fault,
    };
    let config = load_config(args.get_one::<String>("config"))?;

    tracing::info!(?scenario, "building simulated document");
    let (host, request) = scenario.build();
    let controller = ReplacementController::new(Arc::new(host), config);
    let result = controller.run(request).await?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_text(&result)?);
    }
    Ok(result.success)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("json-logs"))?;

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let success = simulate(args).await?;
            std::process::exit(if success { 0 } else { 1 });
        }
        Some(("config", _)) => {
            print!("{}", toml::to_string_pretty(&EngineConfig::default())?);
        }
        _ => {
            cli().print_help()?;
        }
    }
    Ok(())
}
