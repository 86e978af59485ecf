//! LINSTOR Attach
//!
//! Command line front end to the orchestrator: attach volumes, query free
//! capacity, resolve locality constraints to nodes and normalize names
//! against a live LINSTOR controller.

use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use linstor_attach::{
    capacity::allocation_size_kib, volume::linstorify_resource_name, Error, LinstorClient,
    LinstorClientConfig, Orchestrator, OrchestratorConfig, RemoteAccessPolicy, RequestContext,
    Result, Segments, VolumeParameters,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// LINSTOR Attach - quorum-aware volume placement for LINSTOR clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// LINSTOR controller endpoint
    #[arg(long, env = "LS_CONTROLLERS", default_value = "http://localhost:3370")]
    endpoint: String,

    /// Bearer token for the controller
    #[arg(long, env = "LS_BEARER_TOKEN", hide_env_values = true)]
    bearer_token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "LS_REQUEST_TIMEOUT", default_value = "60")]
    request_timeout_secs: u64,

    /// Deadline for a whole operation in seconds (0 disables it)
    #[arg(long, env = "OPERATION_TIMEOUT", default_value = "120")]
    operation_timeout_secs: u64,

    /// Diskless storage pool for volumes that do not name one
    #[arg(long, env = "DISKLESS_STORAGE_POOL", default_value = "DfltDisklessStorPool")]
    diskless_storage_pool: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Volume parameters as `key=value` pairs
#[derive(ClapArgs, Debug)]
struct ParamArgs {
    /// Volume parameter, e.g. `storagePool=thin` (repeatable)
    #[arg(long = "param", value_parser = parse_pair)]
    params: Vec<(String, String)>,
}

impl ParamArgs {
    fn to_parameters(&self) -> Result<VolumeParameters> {
        let raw: BTreeMap<String, String> = self.params.iter().cloned().collect();
        VolumeParameters::parse(&raw)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make a volume usable on a node
    Attach {
        volume: String,
        node: String,
        #[command(flatten)]
        params: ParamArgs,
    },

    /// Free capacity in bytes under the given constraints
    Capacity {
        /// Locality segment `key=value` (repeatable)
        #[arg(long = "segment", value_parser = parse_pair)]
        segments: Vec<(String, String)>,
        #[command(flatten)]
        params: ParamArgs,
    },

    /// Allocation size in KiB for a requested size in bytes
    AllocationSize {
        bytes: u64,
        /// Upper limit in bytes (0: unlimited)
        #[arg(long, default_value = "0")]
        limit: u64,
    },

    /// Nodes satisfying locality requisites
    Nodes {
        /// Requisite as a JSON object of segments (repeatable)
        #[arg(long = "requisite", value_parser = parse_segments)]
        requisites: Vec<Segments>,
        /// Remote access policy: anywhere, local-only or JSON rules
        #[arg(long, default_value = "anywhere")]
        policy: String,
    },

    /// Segments from which a volume is accessible
    Topologies {
        volume: String,
        /// Remote access policy: anywhere, local-only or JSON rules
        #[arg(long, default_value = "anywhere")]
        policy: String,
    },

    /// Normalize a name into a valid resource name
    ResourceName { name: String },
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn parse_segments(s: &str) -> std::result::Result<Segments, String> {
    serde_json::from_str(s).map_err(|e| e.to_string())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    info!(
        version = linstor_attach::VERSION,
        endpoint = %args.endpoint,
        "Starting LINSTOR attach"
    );

    // Commands that need no controller
    match &args.command {
        Command::AllocationSize { bytes, limit } => {
            let kib = allocation_size_kib(*bytes, *limit)?;
            return print_json(&json!({ "requested_bytes": bytes, "allocation_kib": kib }));
        }
        Command::ResourceName { name } => {
            let normalized = linstorify_resource_name(name)?;
            return print_json(&json!({ "name": name, "resource_name": normalized }));
        }
        _ => {}
    }

    let client = LinstorClient::new(LinstorClientConfig {
        endpoint: args.endpoint.clone(),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        bearer_token: args.bearer_token.clone(),
    })?;

    let mut config = OrchestratorConfig::default();
    config.attach.diskless_storage_pool = args.diskless_storage_pool.clone();
    config.operation_timeout =
        (args.operation_timeout_secs > 0).then(|| Duration::from_secs(args.operation_timeout_secs));

    let orchestrator = Orchestrator::new(config, std::sync::Arc::new(client));

    // Ctrl-C cancels whatever is in flight
    let token = CancellationToken::new();
    let ctx = RequestContext::with_token(token.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });

    match args.command {
        Command::Attach {
            volume,
            node,
            params,
        } => {
            let params = params.to_parameters()?;
            let action = orchestrator.attach(&ctx, &volume, &params, &node).await?;
            print_json(&json!({ "volume": volume, "node": node, "result": action }))
        }
        Command::Capacity { segments, params } => {
            let params = params.to_parameters()?;
            let locality: Segments = segments.into_iter().collect();
            let bytes = orchestrator.capacity_bytes(&ctx, &params, &locality).await?;
            print_json(&json!({ "capacity_bytes": bytes }))
        }
        Command::Nodes { requisites, policy } => {
            let policy: RemoteAccessPolicy = policy.parse()?;
            let nodes = orchestrator
                .all_nodes_for_locality_requisites(&ctx, &policy, &requisites)
                .await?;
            print_json(&nodes)
        }
        Command::Topologies { volume, policy } => {
            let policy: RemoteAccessPolicy = policy.parse()?;
            let topologies = orchestrator
                .accessible_topologies(&ctx, &volume, &policy)
                .await?;
            print_json(&json!({ "volume": volume, "accessible_topologies": topologies }))
        }
        Command::AllocationSize { .. } | Command::ResourceName { .. } => Ok(()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let noisy = |directive: &str| {
        directive
            .parse::<Directive>()
            .map_err(|e| Error::Configuration(format!("Invalid log directive {}: {}", directive, e)))
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(noisy("hyper=warn")?)
        .add_directive(noisy("reqwest=info")?);

    // Logs go to stderr, results to stdout
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}
