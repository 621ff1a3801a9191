//! crossbridge CLI - execution orchestration and sidecar runtime for test execution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use crossbridge::adapter::build_registry;
use crossbridge::classifier::Classifier;
use crossbridge::config::{self, Config};
use crossbridge::error::ExitKind;
use crossbridge::model::{
    Category, Classification, ExecutionContext, ExecutionPlan, ExecutionRequest, ExecutionResult,
};
use crossbridge::orchestrator::Orchestrator;
use crossbridge::persistence::sqlite::SqlitePersistence;
use crossbridge::strategy::StrategyRegistry;

#[derive(Parser)]
#[command(name = "crossbridge")]
#[command(about = "Execution orchestration and sidecar runtime for test execution", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "crossbridge.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and/or execute a slice of tests
    Exec {
        #[command(subcommand)]
        action: ExecAction,
    },
    /// Run or probe the sidecar observer
    Sidecar {
        #[command(subcommand)]
        action: SidecarAction,
    },
    /// Classify failures from existing report files, outside of a run
    Analyze {
        #[command(subcommand)]
        action: AnalyzeAction,
    },
    /// Inspect and validate classifier rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(Subcommand)]
enum ExecAction {
    /// Plan and execute
    Run(ExecArgs),
    /// Plan only, never executes
    Plan(ExecArgs),
}

#[derive(Parser)]
struct ExecArgs {
    /// Framework tags to consider; repeatable. Empty means all configured frameworks.
    #[arg(long = "framework")]
    frameworks: Vec<String>,

    /// Selection strategy
    #[arg(long, default_value = "smoke")]
    strategy: String,

    /// Base branch to diff against for impacted/risk strategies
    #[arg(long)]
    base_branch: Option<String>,

    /// Environment label, carried through to the persisted run
    #[arg(long)]
    env: Option<String>,

    /// Mark this run as CI-originated
    #[arg(long)]
    ci: bool,

    /// Echo selections without spawning adapters (exec run only; exec plan is always dry)
    #[arg(long)]
    dry_run: bool,

    /// Cap the number of selected tests
    #[arg(long)]
    max_tests: Option<usize>,

    /// Wall-clock budget in minutes; 0 cancels before any adapter spawns
    #[arg(long)]
    max_duration: Option<u64>,

    /// Comma-separated tags; only tests carrying at least one are eligible
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Comma-separated tags; tests carrying any of these are excluded
    #[arg(long = "exclude-tags", value_delimiter = ',')]
    exclude_tags: Vec<String>,

    /// Don't filter out tests above the flaky-cache threshold
    #[arg(long)]
    include_flaky: bool,

    /// Run adapters one at a time regardless of max_parallel
    #[arg(long)]
    no_parallel: bool,

    /// Source branch, recorded in plan metadata
    #[arg(long)]
    branch: Option<String>,

    /// Source commit, recorded in plan metadata
    #[arg(long)]
    commit: Option<String>,

    /// CI build id, recorded in plan metadata
    #[arg(long)]
    build_id: Option<String>,

    /// Machine-readable output
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum SidecarAction {
    /// Run the long-lived sidecar observer
    Start {
        /// Sidecar mode; only "observer" is supported
        #[arg(long, default_value = "observer")]
        mode: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Probe a running sidecar's /health endpoint
    TestConnection {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 7878)]
        port: u16,
    },
}

#[derive(Subcommand)]
enum AnalyzeAction {
    /// Classify a single test's error log
    Logs {
        #[arg(long)]
        log_file: PathBuf,
        #[arg(long)]
        test_name: String,
        #[arg(long)]
        framework: String,
        /// Enable bounded AI enrichment for this classification
        #[arg(long)]
        enable_ai: bool,
        /// Which categories should cause a non-zero exit: product, automation, all, none
        #[arg(long, default_value = "none")]
        fail_on: String,
        #[arg(long)]
        json: bool,
    },
    /// Classify every failing test in a directory of reports
    Directory {
        #[arg(long)]
        log_dir: PathBuf,
        #[arg(long, default_value = "**/*")]
        pattern: String,
        #[arg(long)]
        framework: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RulesAction {
    /// List the loaded classifier rules
    List {
        #[arg(long)]
        rules_path: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show which rule a signature would match
    Test {
        #[arg(long)]
        rules_path: Option<PathBuf>,
        #[arg(long)]
        signature: String,
        #[arg(long)]
        json: bool,
    },
    /// Parse the rules file and report errors, if any
    Validate {
        #[arg(long)]
        rules_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let exit_code = match cli.command {
        Commands::Exec { action } => match action {
            ExecAction::Run(args) => exec_run(&cli.config, args).await?,
            ExecAction::Plan(args) => exec_plan(&cli.config, args).await?,
        },
        Commands::Sidecar { action } => match action {
            SidecarAction::Start { mode, host, port } => sidecar_start(&cli.config, &mode, host, port).await?,
            SidecarAction::TestConnection { host, port } => sidecar_test_connection(&host, port).await?,
        },
        Commands::Analyze { action } => match action {
            AnalyzeAction::Logs {
                log_file,
                test_name,
                framework,
                enable_ai,
                fail_on,
                json,
            } => analyze_logs(&cli.config, &log_file, &test_name, &framework, enable_ai, &fail_on, json).await?,
            AnalyzeAction::Directory {
                log_dir,
                pattern,
                framework,
                json,
            } => analyze_directory(&cli.config, &log_dir, &pattern, framework.as_deref(), json).await?,
        },
        Commands::Rules { action } => match action {
            RulesAction::List { rules_path, json } => rules_list(&cli.config, rules_path, json)?,
            RulesAction::Test { rules_path, signature, json } => rules_test(&cli.config, rules_path, &signature, json)?,
            RulesAction::Validate { rules_path } => rules_validate(&cli.config, rules_path)?,
        },
    };

    std::process::exit(exit_code.code());
}

fn load_config(path: &Path) -> Result<Config> {
    config::load_config(path).with_context(|| format!("failed to load config from {}", path.display()))
}

fn build_request(run_id: String, strategy: &str, args: &ExecArgs, config: &Config, dry_run: bool) -> ExecutionRequest {
    let mut metadata = HashMap::new();
    if let Some(branch) = &args.branch {
        metadata.insert("branch".to_string(), branch.clone());
    }
    if let Some(commit) = &args.commit {
        metadata.insert("commit".to_string(), commit.clone());
    }
    if let Some(build_id) = &args.build_id {
        metadata.insert("build_id".to_string(), build_id.clone());
    }

    ExecutionRequest {
        run_id,
        strategy: strategy.to_string(),
        base_branch: args
            .base_branch
            .clone()
            .unwrap_or_else(|| config.orchestrator.base_branch.clone()),
        frameworks: args.frameworks.clone(),
        dry_run,
        environment: args.env.clone(),
        ci: args.ci,
        max_tests: args.max_tests,
        max_duration_minutes: args.max_duration,
        tags_include: args.tags.clone(),
        tags_exclude: args.exclude_tags.clone(),
        include_flaky: args.include_flaky,
        parallel: !args.no_parallel,
        metadata,
    }
}

fn new_run_id() -> String {
    let short = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"), &short[..8])
}

async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let adapters = build_registry(config);
    let strategies = StrategyRegistry::with_defaults();
    let classifier = Classifier::load(&config.classifier);
    let persistence = Arc::new(
        SqlitePersistence::open(&config.persistence.db_path, &config.persistence.spool_dir)
            .context("failed to open persistence backend")?,
    );
    Ok(Orchestrator::new(config.clone(), adapters, strategies, classifier, persistence))
}

async fn exec_plan(config_path: &Path, args: ExecArgs) -> Result<ExitKind> {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return Ok(ExitKind::ConfigError);
        }
    };
    let strategy = args.strategy.clone();
    let json = args.json;
    let request = build_request(new_run_id(), &strategy, &args, &config, true);

    let orchestrator = build_orchestrator(&config).await?;
    let plan = match orchestrator.plan(&request).await {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("execution error: {e:#}");
            return Ok(ExitKind::ExecutionError);
        }
    };

    print_plan(&plan, json);
    Ok(ExitKind::Success)
}

async fn exec_run(config_path: &Path, args: ExecArgs) -> Result<ExitKind> {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return Ok(ExitKind::ConfigError);
        }
    };
    let strategy = args.strategy.clone();
    let json = args.json;
    let dry_run = args.dry_run;
    let request = build_request(new_run_id(), &strategy, &args, &config, dry_run);

    let orchestrator = build_orchestrator(&config).await?;
    let (plan, result, classifications) = match orchestrator.execute(&request).await {
        Ok(triple) => triple,
        Err(e) => {
            eprintln!("execution error: {e:#}");
            return Ok(ExitKind::ExecutionError);
        }
    };

    print_run_summary(&plan, &result, &classifications, json);

    Ok(if result.exit_code() == 0 {
        ExitKind::Success
    } else {
        ExitKind::TestFailures
    })
}

fn print_plan(plan: &ExecutionPlan, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(plan).unwrap_or_default());
        return;
    }
    println!("plan {} (strategy: {})", plan.run_id, plan.strategy);
    if let Some(reason) = &plan.fallback_reason {
        println!("  fallback: {reason}");
    }
    println!(
        "  selected {} of {} available tests ({:.1}% reduction)",
        plan.selected.len(),
        plan.available_count,
        plan.reduction_fraction() * 100.0
    );
    for selected in &plan.selected {
        println!("  [{}] {} ({})", selected.priority, selected.test.id, selected.reason);
    }
}

fn print_run_summary(plan: &ExecutionPlan, result: &ExecutionResult, classifications: &[Classification], json: bool) {
    if json {
        #[derive(serde::Serialize)]
        struct Summary<'a> {
            plan: &'a ExecutionPlan,
            result: &'a ExecutionResult,
            classifications: &'a [Classification],
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&Summary { plan, result, classifications }).unwrap_or_default()
        );
        return;
    }

    let passed = result.results.iter().filter(|r| r.outcome.is_success()).count();
    let failed = result.results.len().saturating_sub(passed);
    println!(
        "run {} status={:?} {} {} duration={:.1}s ({:.1}% reduction vs {} available)",
        result.run_id,
        result.status,
        console::style(format!("passed={passed}")).green(),
        if failed > 0 {
            console::style(format!("failed={failed}")).red().bold()
        } else {
            console::style(format!("failed={failed}"))
        },
        result.duration.as_secs_f64(),
        plan.reduction_fraction() * 100.0,
        plan.available_count
    );

    let mut top: Vec<&Classification> = classifications.iter().collect();
    top.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    for classification in top.into_iter().take(5) {
        println!(
            "  {} -> {} (confidence {:.2})",
            classification.test_id,
            classification.category.as_str(),
            classification.confidence
        );
    }
}

async fn sidecar_start(config_path: &Path, mode: &str, host: Option<String>, port: Option<u16>) -> Result<ExitKind> {
    if mode != "observer" {
        eprintln!("unsupported sidecar mode '{mode}', only 'observer' is implemented");
        return Ok(ExitKind::ConfigError);
    }

    let mut config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return Ok(ExitKind::ConfigError);
        }
    };

    if host.is_some() || port.is_some() {
        let current: std::net::SocketAddr = config
            .sidecar
            .bind_addr
            .parse()
            .context("configured sidecar.bind_addr is not a valid socket address")?;
        let new_host = host.unwrap_or_else(|| current.ip().to_string());
        let new_port = port.unwrap_or(current.port());
        config.sidecar.bind_addr = format!("{new_host}:{new_port}");
    }

    let persistence = Arc::new(
        SqlitePersistence::open(&config.persistence.db_path, &config.persistence.spool_dir)
            .context("failed to open persistence backend")?,
    );

    let sidecar = crossbridge::Sidecar::start(config.sidecar.clone(), config.health.clone(), persistence, Vec::new())
        .await
        .context("failed to start sidecar")?;

    info!(bind_addr = %sidecar.bound_addr(), "sidecar listening, press ctrl-c to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received, draining");
    sidecar.stop(Duration::from_secs(10)).await;

    Ok(ExitKind::Success)
}

async fn sidecar_test_connection(host: &str, port: u16) -> Result<ExitKind> {
    let url = format!("http://{host}:{port}/health");
    match reqwest::get(&url).await {
        Ok(response) if response.status().is_success() => {
            let body = response.text().await.unwrap_or_default();
            println!("reachable: {body}");
            Ok(ExitKind::Success)
        }
        Ok(response) => {
            eprintln!("sidecar responded with status {}", response.status());
            Ok(ExitKind::ExecutionError)
        }
        Err(e) => {
            eprintln!("sidecar unreachable at {url}: {e}");
            Ok(ExitKind::ExecutionError)
        }
    }
}

async fn analyze_logs(
    config_path: &Path,
    log_file: &Path,
    test_name: &str,
    framework: &str,
    enable_ai: bool,
    fail_on: &str,
    json: bool,
) -> Result<ExitKind> {
    let mut config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return Ok(ExitKind::ConfigError);
        }
    };
    config.classifier.ai_enrichment_enabled = enable_ai && config.classifier.ai_provider_url.is_some();
    if enable_ai && config.classifier.ai_provider_url.is_none() {
        warn!("--enable-ai requested but no classifier.ai_provider_url is configured, falling back to deterministic classification");
    }

    let signature = std::fs::read_to_string(log_file)
        .with_context(|| format!("failed to read {}", log_file.display()))?;

    let result = crossbridge::model::TestRunResult::new(test_name.to_string(), crossbridge::model::TestOutcome::Failed)
        .with_error_signature(signature);

    let classifier = Classifier::load(&config.classifier);
    let context = ExecutionContext::default();
    let classifications = classifier.classify_results(std::slice::from_ref(&result), &context).await;
    let classification = classifications.into_iter().next();

    match &classification {
        Some(c) if json => println!("{}", serde_json::to_string_pretty(c).unwrap_or_default()),
        Some(c) => println!(
            "{} [{}] -> {} (confidence {:.2}, rule: {})",
            test_name,
            framework,
            c.category.as_str(),
            c.confidence,
            c.matched_rule.as_deref().unwrap_or("none")
        ),
        None => println!("{test_name} [{framework}] produced no classification (unexpected: failed outcome always classifies)"),
    }

    let exit_kind = match (classification.as_ref().map(|c| c.category), fail_on) {
        (_, "none") | (None, _) => ExitKind::Success,
        (Some(Category::ProductDefect), "product" | "all") => ExitKind::TestFailures,
        (Some(Category::AutomationDefect), "automation" | "all") => ExitKind::TestFailures,
        (Some(_), "all") => ExitKind::TestFailures,
        _ => ExitKind::Success,
    };
    Ok(exit_kind)
}

async fn analyze_directory(
    config_path: &Path,
    log_dir: &Path,
    pattern: &str,
    framework_override: Option<&str>,
    json: bool,
) -> Result<ExitKind> {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return Ok(ExitKind::ConfigError);
        }
    };

    let full_pattern = log_dir.join(pattern);
    let full_pattern = full_pattern.to_string_lossy().into_owned();
    let entries = glob::glob(&full_pattern).with_context(|| format!("invalid glob pattern '{pattern}'"))?;

    let mut all_results = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let framework = framework_override
            .map(str::to_string)
            .or_else(|| guess_framework(&path))
            .unwrap_or_else(|| "pytest".to_string());
        let body = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read report file");
                continue;
            }
        };
        match crossbridge::adapter::common::parse_framework_report(&framework, &body) {
            Ok(results) => all_results.extend(results),
            Err(e) => warn!(path = %path.display(), framework = %framework, error = %e, "failed to parse report"),
        }
    }

    let classifier = Classifier::load(&config.classifier);
    let context = ExecutionContext::default();
    let classifications = classifier.classify_results(&all_results, &context).await;
    let failed = failed_count(&all_results);

    if json {
        #[derive(serde::Serialize)]
        struct DirSummary<'a> {
            total: usize,
            failed: usize,
            classifications: &'a [Classification],
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&DirSummary { total: all_results.len(), failed, classifications: &classifications })
                .unwrap_or_default()
        );
    } else {
        println!("parsed {} results from {}, {failed} failing", all_results.len(), log_dir.display());
        for classification in &classifications {
            println!(
                "  {} -> {} (confidence {:.2})",
                classification.test_id,
                classification.category.as_str(),
                classification.confidence
            );
        }
    }

    Ok(if failed > 0 { ExitKind::TestFailures } else { ExitKind::Success })
}

fn failed_count(results: &[crossbridge::model::TestRunResult]) -> usize {
    results.iter().filter(|r| !r.outcome.is_success()).count()
}

fn guess_framework(path: &Path) -> Option<String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xml") => Some("junit".to_string()),
        Some("json") => Some("jest".to_string()),
        _ => None,
    }
}

fn resolve_rules_path(config: &Config, override_path: Option<PathBuf>) -> PathBuf {
    override_path.unwrap_or_else(|| config.classifier.rules_path.clone())
}

fn rules_list(config_path: &Path, rules_path: Option<PathBuf>, json: bool) -> Result<ExitKind> {
    let config = load_config(config_path)?;
    let path = resolve_rules_path(&config, rules_path);
    let rules = match crossbridge::classifier::rules::load_rules(&path) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("failed to load rules from {}: {e}", path.display());
            return Ok(ExitKind::ConfigError);
        }
    };

    if json {
        #[derive(serde::Serialize)]
        struct RuleSummary<'a> {
            name: &'a str,
            category: &'static str,
            priority: i32,
            confidence: f64,
        }
        let summaries: Vec<_> = rules
            .rules()
            .iter()
            .map(|r| RuleSummary { name: &r.name, category: r.category.as_str(), priority: r.priority, confidence: r.confidence })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summaries).unwrap_or_default());
    } else {
        println!("{} rules loaded from {}", rules.len(), path.display());
        for rule in rules.rules() {
            println!("  [{}] {} -> {} (confidence {:.2})", rule.priority, rule.name, rule.category.as_str(), rule.confidence);
        }
    }
    Ok(ExitKind::Success)
}

fn rules_test(config_path: &Path, rules_path: Option<PathBuf>, signature: &str, json: bool) -> Result<ExitKind> {
    let config = load_config(config_path)?;
    let path = resolve_rules_path(&config, rules_path);
    let rules = match crossbridge::classifier::rules::load_rules(&path) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("failed to load rules from {}: {e}", path.display());
            return Ok(ExitKind::ConfigError);
        }
    };

    match rules.first_match(signature) {
        Some(rule) if json => {
            #[derive(serde::Serialize)]
            struct Matched<'a> {
                name: &'a str,
                category: &'static str,
                evidence: Vec<String>,
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&Matched {
                    name: &rule.name,
                    category: rule.category.as_str(),
                    evidence: rule.matched_evidence(signature),
                })
                .unwrap_or_default()
            );
        }
        Some(rule) => println!("matched rule '{}' -> {}", rule.name, rule.category.as_str()),
        None if json => println!("null"),
        None => println!("no rule matched; classification would fall back to history/UNKNOWN"),
    }
    Ok(ExitKind::Success)
}

fn rules_validate(config_path: &Path, rules_path: Option<PathBuf>) -> Result<ExitKind> {
    let config = load_config(config_path)?;
    let path = resolve_rules_path(&config, rules_path);
    match crossbridge::classifier::rules::load_rules(&path) {
        Ok(rules) => {
            println!("{} is valid: {} rules", path.display(), rules.len());
            Ok(ExitKind::Success)
        }
        Err(e) => {
            eprintln!("{} is invalid: {e}", path.display());
            Ok(ExitKind::ConfigError)
        }
    }
}
