//! pki-topology - plan the PKI for a Kubernetes control plane

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use pki_topology::cluster::ClusterConfiguration;
use pki_topology::pki::{KeysetFormat, Lifecycle, TaskSet};
use pki_topology::resolve::{NoLegacyTokens, Resolvers};
use pki_topology::telemetry::{init_logging, LogFormat};
use pki_topology::topology::{rules, TopologyBuilder};

/// pki-topology - compute the CA, keypair, secret and mirror tasks for a cluster
#[derive(Parser, Debug)]
#[command(name = "pki-topology", version, about, long_about = None)]
struct Cli {
    /// Log line encoding (text or json)
    #[arg(
        long,
        global = true,
        env = "PKI_TOPOLOGY_LOG_FORMAT",
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the task set for a cluster file
    Plan(PlanArgs),

    /// Print the JSON schema of the cluster file
    Schema,

    /// List the topology rules in evaluation order
    Rules,
}

/// Plan mode arguments
#[derive(Parser, Debug)]
struct PlanArgs {
    /// Path to the cluster configuration YAML
    #[arg(short = 'f', long = "config", env = "PKI_TOPOLOGY_CONFIG")]
    config_file: PathBuf,

    /// Output encoding
    #[arg(long, value_enum, env = "PKI_TOPOLOGY_OUTPUT", default_value_t = Output::Yaml)]
    output: Output,

    /// Lifecycle stamped on every task
    #[arg(long, env = "PKI_TOPOLOGY_LIFECYCLE", default_value_t = Lifecycle::Sync)]
    lifecycle: Lifecycle,

    /// Keyset format stamped on every CA and keypair (v1alpha2 or legacy)
    #[arg(long, env = "PKI_TOPOLOGY_FORMAT", default_value_t = KeysetFormat::V1Alpha2)]
    format: KeysetFormat,

    /// Skip the deprecated bearer-token secrets
    #[arg(long)]
    no_legacy_tokens: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Output {
    Yaml,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format).context("failed to initialize logging")?;

    match cli.command {
        Commands::Plan(args) => run_plan(args),
        Commands::Schema => print_schema(),
        Commands::Rules => {
            print_rules();
            Ok(())
        }
    }
}

/// Build and print the task set for a cluster file
fn run_plan(args: PlanArgs) -> anyhow::Result<()> {
    let config = ClusterConfiguration::from_file(&args.config_file).with_context(|| {
        format!(
            "failed to load cluster configuration {}",
            args.config_file.display()
        )
    })?;

    let mut resolvers = Resolvers::for_cluster(&config);
    if args.no_legacy_tokens {
        resolvers = resolvers.with_legacy_tokens(NoLegacyTokens);
    }

    let tasks = TopologyBuilder::new(resolvers)
        .with_lifecycle(args.lifecycle)
        .with_format(args.format)
        .build(&config)
        .with_context(|| format!("failed to build PKI topology for {}", config.name))?;

    println!("{}", render(&tasks, args.output)?);
    Ok(())
}

fn render(tasks: &TaskSet, output: Output) -> anyhow::Result<String> {
    let rendered = match output {
        Output::Yaml => tasks.to_yaml(),
        Output::Json => tasks.to_json(),
    };
    rendered.context("failed to serialize task set")
}

fn print_schema() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(ClusterConfiguration);
    let json = serde_json::to_string_pretty(&schema).context("failed to serialize schema")?;
    println!("{json}");
    Ok(())
}

fn print_rules() {
    let width = rules().iter().map(|r| r.name.len()).max().unwrap_or(0);
    for rule in rules() {
        println!("{:<width$}  {}", rule.name, rule.description);
    }
}
