use clap::{Parser, Subcommand};
use crucible::capability::CapabilitySet;
use crucible::config::Settings;
use crucible::cycle::{CycleResult, DevelopmentCycle};
use crucible::protocol::{ToolRequest, METHOD_TOOLS_LIST};
use crucible::spec::Specification;
use std::path::PathBuf;
use tracing::{debug, error};

/// Iterative development orchestration
#[derive(Parser)]
#[command(name = "crucible")]
#[command(about = "Generate, test, analyze, and refine code artifacts until a quality target is met", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a development cycle for a specification
    Run {
        /// Path to the YAML specification
        spec: PathBuf,

        /// Quality score at which the cycle succeeds (0-100)
        #[arg(long)]
        target: Option<u32>,

        /// Maximum number of iterations to run
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,

        /// Path to a TOML settings file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Render container artifacts after a successful cycle
        #[arg(long)]
        package: bool,

        /// Generation backend command (prompt on stdin, reply on stdout)
        #[arg(long)]
        backend: Option<String>,
    },
    /// List the tools every capability provider exposes
    Tools {
        /// Path to a TOML settings file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("crucible started with verbosity level: {}", cli.verbose);

    let result = match cli.command {
        Commands::Run {
            spec,
            target,
            max_iterations,
            config,
            package,
            backend,
        } => run_cycle(spec, target, max_iterations, config, package, backend).await,
        Commands::Tools { config } => list_tools(config).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_cycle(
    spec_path: PathBuf,
    target: Option<u32>,
    max_iterations: Option<u32>,
    config: Option<PathBuf>,
    package: bool,
    backend: Option<String>,
) -> anyhow::Result<()> {
    let mut settings = Settings::load(config.as_deref())?;
    if let Some(target) = target {
        settings.cycle.target_score = target;
    }
    if let Some(max_iterations) = max_iterations {
        settings.cycle.max_iterations = max_iterations;
    }
    if package {
        settings.cycle.package_artifacts = true;
    }
    if let Some(backend) = backend {
        settings.generation.command = Some(backend);
    }
    settings.validate()?;

    let spec = Specification::load(&spec_path)?;
    println!(
        "🔄 Running development cycle for '{}' (target {}, up to {} iterations)...",
        spec.name, settings.cycle.target_score, settings.cycle.max_iterations
    );

    let capabilities = CapabilitySet::with_defaults(&settings)?;
    let cycle = DevelopmentCycle::new(capabilities, settings);
    let result = cycle.run(&spec).await?;

    print_result(&result);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_result(result: &CycleResult) {
    if result.success {
        println!(
            "✅ Target reached: {}/100 after {} iteration(s)",
            result.final_score.total, result.summary.total_iterations
        );
    } else {
        println!(
            "⚠️ Target not reached: best score {}/100 after {} iteration(s)",
            result.summary.best_score, result.summary.total_iterations
        );
    }

    println!(
        "Score: {} → {} (test {}, static {}, performance {})",
        result.summary.initial_score,
        result.summary.final_score,
        result.final_score.test_component,
        result.final_score.static_component,
        result.final_score.performance_component
    );

    for improvement in &result.summary.key_improvements {
        println!("  + {improvement}");
    }
    for issue in &result.summary.remaining_issues {
        println!("  - {issue}");
    }
    for record in result.iterations.iter().filter(|r| r.error.is_some()) {
        println!(
            "  ! iteration {}: {}",
            record.index,
            record.error.as_deref().unwrap_or("")
        );
    }

    if let Some(artifact) = &result.final_artifact {
        println!(
            "Final artifact: service '{}' ({} dependencies, tests: {})",
            artifact.service_name,
            artifact.dependencies.len(),
            if artifact.has_tests() { "yes" } else { "no" }
        );
    }

    if let Some(packaging) = &result.packaging {
        println!(
            "Packaging: Dockerfile ({} lines), compose ({} lines)",
            packaging.dockerfile.lines().count(),
            packaging.compose.lines().count()
        );
    }
}

async fn list_tools(config: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = Settings::load(config.as_deref())?;
    let capabilities = CapabilitySet::with_defaults(&settings)?;

    for host in capabilities.hosts() {
        let response = host
            .handle_request(ToolRequest::method(METHOD_TOOLS_LIST))
            .await;
        println!("{}:", host.name());
        let tools = response
            .result
            .as_ref()
            .and_then(|r| r.get("tools"))
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();
        for tool in tools {
            println!(
                "  {} - {}",
                tool.get("name").and_then(|v| v.as_str()).unwrap_or("?"),
                tool.get("description").and_then(|v| v.as_str()).unwrap_or("")
            );
        }
    }
    Ok(())
}
