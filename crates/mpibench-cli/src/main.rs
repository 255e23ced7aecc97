use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use mpibench_runner::{
    BenchConfig, ControlPlaneClient, ExperimentDriver, ExperimentRegistry, ExperimentSelection,
    Family, HttpTransport, JsonObject, KubectlShell, LabelAnchored, NativeRunner,
    ProcessSelection, RunPlan, RunSummary, StatExtractor,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mpibench", version = "0.3.0", about = "MPI benchmark runner")]
struct Cli {
    /// YAML configuration file; built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    #[value(name = "remote")]
    Remote,
    #[value(name = "native")]
    Native,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FamilyArg {
    #[value(name = "kernels")]
    Kernels,
    #[value(name = "lammps")]
    Lammps,
}

/// How statistics are read out of benchmark output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExtractorArg {
    /// Value following the last occurrence of the statistic label.
    #[value(name = "label")]
    Label,
    /// Output is a JSON object keyed by statistic label.
    #[value(name = "json")]
    Json,
}

impl ExtractorArg {
    fn strategy(self) -> &'static dyn StatExtractor {
        match self {
            ExtractorArg::Label => &LabelAnchored,
            ExtractorArg::Json => &JsonObject,
        }
    }
}

impl From<FamilyArg> for Family {
    fn from(value: FamilyArg) -> Self {
        match value {
            FamilyArg::Kernels => Family::Kernels,
            FamilyArg::Lammps => Family::Lammps,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(long, value_enum)]
        backend: BackendArg,
        #[arg(long, value_enum, default_value = "kernels")]
        family: FamilyArg,
        /// Run a single experiment instead of the whole family.
        #[arg(long)]
        experiment: Option<String>,
        #[arg(long, conflicts_with = "proc_range")]
        np: Option<u32>,
        /// Run every process count from 1 up to this value.
        #[arg(long)]
        proc_range: Option<u32>,
        #[arg(long, default_value_t = 1)]
        repeats: u32,
        #[arg(long)]
        results_dir: Option<PathBuf>,
        #[arg(long)]
        max_wait_secs: Option<u64>,
        #[arg(long, value_enum, default_value = "label")]
        extractor: ExtractorArg,
        #[arg(long)]
        json: bool,
    },
    List {
        #[arg(long, value_enum)]
        family: Option<FamilyArg>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.config.as_deref(), cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(config_path: Option<&Path>, command: Commands) -> Result<Option<Value>> {
    let mut config = match config_path {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    let registry = ExperimentRegistry::builtin();

    match command {
        Commands::Run {
            backend,
            family,
            experiment,
            np,
            proc_range,
            repeats,
            results_dir,
            max_wait_secs,
            extractor,
            json,
        } => {
            if let Some(dir) = results_dir {
                config.results_dir = dir;
            }
            if max_wait_secs.is_some() {
                config.control_plane.max_wait_secs = max_wait_secs;
            }
            let plan = RunPlan {
                experiments: match experiment {
                    Some(id) => ExperimentSelection::One(id),
                    None => ExperimentSelection::All(family.into()),
                },
                procs: match (np, proc_range) {
                    (Some(n), _) => ProcessSelection::Single(n),
                    (None, Some(n)) => ProcessSelection::Range(n),
                    (None, None) => ProcessSelection::Default,
                },
                repeats,
            };
            let strategy = extractor.strategy();
            let summary = match backend {
                BackendArg::Remote => run_remote(&registry, &config, &plan, strategy)?,
                BackendArg::Native => run_native(&registry, &config, &plan, strategy)?,
            };
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "plan": plan,
                    "summary": summary,
                })));
            }
            println!("cells: {}", summary.cells);
            println!("rows: {}", summary.rows);
            println!("misses: {}", summary.misses);
            for table in &summary.tables {
                println!("table: {}", table.display());
            }
        }
        Commands::List { family, json } => {
            let family: Option<Family> = family.map(Into::into);
            let specs: Vec<_> = registry
                .iter()
                .filter(|s| family.map_or(true, |f| s.family == f))
                .collect();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "list",
                    "experiments": specs,
                })));
            }
            for spec in specs {
                let stats = if spec.stats.is_empty() {
                    "-".to_string()
                } else {
                    spec.stats.join(", ")
                };
                println!(
                    "{}\t{}\t{}\t{}",
                    spec.family,
                    spec.id,
                    spec.cmdline(mpibench_runner::Backend::Remote),
                    stats
                );
            }
        }
    }
    Ok(None)
}

fn run_remote(
    registry: &ExperimentRegistry,
    config: &BenchConfig,
    plan: &RunPlan,
    extractor: &dyn StatExtractor,
) -> Result<RunSummary> {
    let cp = &config.control_plane;
    let transport = HttpTransport::new(&cp.host, cp.port)?;
    tracing::info!(url = transport.url(), "using control plane");
    let flush = plan
        .experiments
        .family(registry)
        .map_or(false, |family| cp.flush_before(family));
    let client =
        ControlPlaneClient::new(transport, cp.poll_policy()).with_flush_before_run(flush);
    let mut driver = ExperimentDriver::new(registry, extractor, client, &config.results_dir);
    Ok(driver.run(plan)?)
}

fn run_native(
    registry: &ExperimentRegistry,
    config: &BenchConfig,
    plan: &RunPlan,
    extractor: &dyn StatExtractor,
) -> Result<RunSummary> {
    let native = &config.native;
    let shell = KubectlShell {
        namespace: native.namespace.clone(),
        pod: native.pod.clone(),
    };
    let runner = NativeRunner::new(
        shell,
        native.hosts.clone(),
        native.cores_per_host,
        native.exec_user.clone(),
    );
    let mut driver = ExperimentDriver::new(registry, extractor, runner, &config.results_dir);
    Ok(driver.run(plan)?)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. } | Commands::List { json, .. } => *json,
    }
}
