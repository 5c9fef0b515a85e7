//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use colgen_core::{CancellationToken, Engine, GenerationJob, RunState};
use colgen_provider::{DEFAULT_LOCAL_MODELS, ProviderAdapter};
use colgen_shared::dataset;
use colgen_shared::{
    AppConfig, BackendKind, FailurePolicy, ProviderConfig, RunConfig, init_config, load_config,
    load_config_from,
};
use colgen_template::{
    REFERENCE_VAR, REFERENCE_VAR_ALIAS, TemplateEngine, TemplateOrigin, TemplateRegistry,
    TemplateSource, VariableSet, load_user_library, variables,
};
use tracing::{info, warn};

use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// colgen: generate a dataset column with a language model.
#[derive(Parser)]
#[command(
    name = "colgen",
    version,
    about = "Fill a dataset column with AI-generated text, one prompt per row.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.colgen/colgen.toml.
    #[arg(long, global = true, env = "COLGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON file with extra templates (overrides `templates.user_library`).
    #[arg(long, global = true)]
    pub templates_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a column for every row of a dataset.
    Generate(GenerateArgs),

    /// Run the template and provider on a single row without writing anything.
    Preview {
        #[command(flatten)]
        job: JobArgs,

        /// Row index to preview.
        #[arg(long, default_value_t = 0)]
        row: usize,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// List the models the backend offers.
    Models {
        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Check that the backend is reachable.
    Ping {
        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Inspect and try out prompt templates.
    Templates {
        #[command(subcommand)]
        action: TemplatesAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Dataset, template, and column selection shared by `generate` and `preview`.
#[derive(Args, Debug, Clone)]
pub(crate) struct JobArgs {
    /// Input dataset: a JSON array of objects, or JSON Lines (.jsonl).
    pub input: PathBuf,

    /// Reference column(s) fed to the template (repeat or comma-separate).
    #[arg(short = 'c', long = "column", required = true, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Name of a built-in or user template.
    #[arg(short, long, conflicts_with = "prompt", required_unless_present = "prompt")]
    pub template: Option<String>,

    /// Inline prompt template, e.g. "Summarize:\n{reference}".
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Column that receives the generated text.
    #[arg(long, default_value = "generated")]
    pub target: String,
}

impl JobArgs {
    fn generation_job(&self) -> GenerationJob {
        GenerationJob {
            template: template_source(self.template.as_deref(), self.prompt.as_deref()),
            reference_columns: self.columns.clone(),
            target_column: self.target.clone(),
        }
    }
}

/// `generate` options.
#[derive(Args, Debug)]
pub(crate) struct GenerateArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Where to write the result (defaults to `<input>.generated.<ext>`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Parallel workers (1-8).
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Update progress every N rows.
    #[arg(long)]
    pub report_every: Option<usize>,

    /// Pause between calls within a worker (remote backend only).
    #[arg(long)]
    pub delay: bool,

    /// Pause length in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Abort the whole run on the first failed row and write nothing.
    #[arg(long)]
    pub fail_fast: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

/// Backend selection overrides.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct ProviderArgs {
    /// Backend: remote (OpenAI-compatible) or local (Ollama-compatible).
    #[arg(short, long)]
    pub backend: Option<BackendKind>,

    /// Model identifier.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Base URL of the selected backend.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Per-call timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Template subcommands.
#[derive(Subcommand)]
pub(crate) enum TemplatesAction {
    /// List built-in and user templates.
    List,
    /// Print a template and the variables it uses.
    Show {
        /// Template name.
        name: String,
    },
    /// Render a template with the given variables.
    Render {
        /// Template name.
        #[arg(conflicts_with = "prompt", required_unless_present = "prompt")]
        name: Option<String>,

        /// Inline template text instead of a named one.
        #[arg(short, long)]
        prompt: Option<String>,

        /// Reference content (sets both `reference` and `引用内容`).
        #[arg(short, long)]
        reference: Option<String>,

        /// Extra variables as key=value (repeatable).
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "colgen=info",
        1 => "colgen=debug",
        _ => "colgen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let Cli {
        config,
        templates_file,
        command,
        ..
    } = cli;
    let config_path = config.as_deref();
    let templates_file = templates_file.as_deref();

    match command {
        Command::Generate(args) => cmd_generate(args, config_path, templates_file).await,
        Command::Preview { job, row, provider } => {
            cmd_preview(&job, row, &provider, config_path, templates_file).await
        }
        Command::Models { provider } => cmd_models(&provider, config_path).await,
        Command::Ping { provider } => cmd_ping(&provider, config_path).await,
        Command::Templates { action } => match action {
            TemplatesAction::List => cmd_templates_list(config_path, templates_file),
            TemplatesAction::Show { name } => cmd_templates_show(&name, config_path, templates_file),
            TemplatesAction::Render {
                name,
                prompt,
                reference,
                vars,
            } => cmd_templates_render(
                name.as_deref(),
                prompt.as_deref(),
                reference.as_deref(),
                vars,
                config_path,
                templates_file,
            ),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Apply CLI overrides on top of the file config.
fn provider_config(config: &AppConfig, args: &ProviderArgs) -> Result<ProviderConfig> {
    let mut config = config.clone();
    let backend = args.backend.unwrap_or(config.provider.backend);

    if let Some(url) = &args.base_url {
        match backend {
            BackendKind::Remote => config.provider.remote_base_url = url.clone(),
            BackendKind::Local => config.provider.local_url = url.clone(),
        }
    }
    if let Some(secs) = args.timeout_secs {
        config.provider.timeout_secs = secs;
    }

    let resolved = ProviderConfig::from_app(&config, backend)?;
    Ok(match &args.model {
        Some(model) => resolved.with_model(model.clone()),
        None => resolved,
    })
}

fn run_config(config: &AppConfig, args: &GenerateArgs) -> RunConfig {
    let mut run = RunConfig::from(config);
    if let Some(workers) = args.workers {
        run.workers = workers;
    }
    if let Some(every) = args.report_every {
        run.report_every = every;
    }
    if args.delay {
        run.inter_call_delay = true;
    }
    if let Some(ms) = args.delay_ms {
        run.delay = std::time::Duration::from_millis(ms);
    }
    if args.fail_fast {
        run.failure_policy = FailurePolicy::FailFast;
    }
    run
}

/// Presets plus the user library, if one is configured.
fn template_registry(config: &AppConfig, override_path: Option<&Path>) -> Result<TemplateRegistry> {
    let registry = TemplateRegistry::presets();
    let path = override_path
        .map(Path::to_path_buf)
        .or_else(|| config.templates.user_library.as_ref().map(PathBuf::from));

    Ok(match path {
        Some(path) => registry.with_entries(load_user_library(&path)?),
        None => registry,
    })
}

fn build_engine(
    config: &AppConfig,
    templates_file: Option<&Path>,
    provider: &ProviderConfig,
) -> Result<Engine> {
    let templates = TemplateEngine::new(Arc::new(template_registry(config, templates_file)?));
    Ok(Engine::new(templates, ProviderAdapter::from_config(provider)?))
}

fn template_source(name: Option<&str>, prompt: Option<&str>) -> TemplateSource {
    match (name, prompt) {
        (_, Some(text)) => TemplateSource::Inline(text.to_string()),
        (Some(name), None) => TemplateSource::Named(name.to_string()),
        (None, None) => TemplateSource::Inline(format!("{{{REFERENCE_VAR}}}")),
    }
}

/// `data/notes.json` → `data/notes.generated.json`.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "json".to_string());
    input.with_file_name(format!("{stem}.generated.{ext}"))
}

fn parse_var(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    args: GenerateArgs,
    config_path: Option<&Path>,
    templates_file: Option<&Path>,
) -> Result<()> {
    let config = load_app_config(config_path)?;
    let provider = provider_config(&config, &args.provider)?;
    let run = run_config(&config, &args);
    run.validate()?;

    let engine = build_engine(&config, templates_file, &provider)?;
    let mut data = dataset::read_path(&args.job.input)?;
    let job = args.job.generation_job();
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.job.input));

    info!(
        input = %args.job.input.display(),
        rows = data.len(),
        backend = %provider.backend,
        model = %provider.model,
        workers = run.workers,
        "generating column"
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let progress = CliProgress::new(data.len());
    let report = engine
        .generate(&mut data, &job, &run, &progress, cancel)
        .await?;

    if report.is_success() {
        dataset::write_path(&data, &output)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("  Run:     {}", report.run_id);
        println!("  State:   {}", report.state);
        println!("  Rows:    {}/{}", report.rows_written, report.total);
        println!("  Column:  {}", job.target_column);
        if report.is_success() {
            println!("  Output:  {}", output.display());
        }
        println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
        if !report.failed_rows.is_empty() {
            println!("  Failed rows:");
            for (row, reason) in &report.failed_rows {
                println!("    {row}: {reason}");
            }
        }
        println!();
    }

    match report.state {
        RunState::Completed | RunState::CompletedWithErrors => Ok(()),
        state => Err(eyre!(
            "generation {state}: {}",
            report.failure.as_deref().unwrap_or("no reason given")
        )),
    }
}

async fn cmd_preview(
    job: &JobArgs,
    row: usize,
    provider: &ProviderArgs,
    config_path: Option<&Path>,
    templates_file: Option<&Path>,
) -> Result<()> {
    let config = load_app_config(config_path)?;
    let provider = provider_config(&config, provider)?;
    let engine = build_engine(&config, templates_file, &provider)?;
    let data = dataset::read_path(&job.input)?;

    let preview = engine
        .preview_row(&data, row, &job.generation_job())
        .await?;

    println!("── Reference (row {}) ──", preview.row);
    println!("{}", preview.reference);
    println!("── Prompt ──");
    println!("{}", preview.prompt);
    println!("── Output ──");
    println!("{}", preview.output);
    Ok(())
}

async fn cmd_models(provider: &ProviderArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let provider = provider_config(&config, provider)?;
    let adapter = ProviderAdapter::from_config(&provider)?;

    let models = match adapter.backend().list_models().await {
        Ok(models) => models,
        Err(e) if provider.backend == BackendKind::Local => {
            warn!(error = %e, "could not list local models, showing defaults");
            DEFAULT_LOCAL_MODELS.iter().map(|m| m.to_string()).collect()
        }
        Err(e) => return Err(e.into()),
    };

    for model in models {
        let marker = if model == provider.model { "*" } else { " " };
        println!("{marker} {model}");
    }
    Ok(())
}

async fn cmd_ping(provider: &ProviderArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let provider = provider_config(&config, provider)?;
    let adapter = ProviderAdapter::from_config(&provider)?;

    adapter.backend().ping().await?;
    println!("{} backend at {} is reachable", provider.backend, provider.base_url);
    Ok(())
}

fn cmd_templates_list(config_path: Option<&Path>, templates_file: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let registry = template_registry(&config, templates_file)?;

    let width = registry.iter().map(|t| t.name.chars().count()).max().unwrap_or(0);
    for entry in registry.iter() {
        let origin = match entry.origin {
            TemplateOrigin::Preset => "preset",
            TemplateOrigin::User => "user",
        };
        println!(
            "{:<width$}  {origin:<6}  {}",
            entry.name,
            entry.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn cmd_templates_show(
    name: &str,
    config_path: Option<&Path>,
    templates_file: Option<&Path>,
) -> Result<()> {
    let config = load_app_config(config_path)?;
    let registry = template_registry(&config, templates_file)?;
    let entry = registry
        .get(name)
        .ok_or_else(|| eyre!("unknown template '{name}'"))?;

    println!("{}", entry.content);
    println!();
    println!("variables: {}", variables(&entry.content).join(", "));
    Ok(())
}

fn cmd_templates_render(
    name: Option<&str>,
    prompt: Option<&str>,
    reference: Option<&str>,
    vars: Vec<(String, String)>,
    config_path: Option<&Path>,
    templates_file: Option<&Path>,
) -> Result<()> {
    let config = load_app_config(config_path)?;
    let engine = TemplateEngine::new(Arc::new(template_registry(&config, templates_file)?));

    let mut variables: VariableSet = vars.into_iter().collect();
    if let Some(reference) = reference {
        variables.insert(REFERENCE_VAR.to_string(), reference.to_string());
        variables.insert(REFERENCE_VAR_ALIAS.to_string(), reference.to_string());
    }

    println!("{}", engine.render(&template_source(name, prompt), &variables)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generate_with_overrides() {
        let cli = Cli::try_parse_from([
            "colgen", "generate", "notes.jsonl", "-c", "note,age", "--template", "summary",
            "--target", "summary", "-w", "3", "--fail-fast", "--backend", "local",
        ])
        .unwrap();

        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.job.columns, vec!["note", "age"]);
        assert_eq!(args.provider.backend, Some(BackendKind::Local));

        let run = run_config(&AppConfig::default(), &args);
        assert_eq!(run.workers, 3);
        assert_eq!(run.failure_policy, FailurePolicy::FailFast);

        let job = args.job.generation_job();
        assert_eq!(job.template, TemplateSource::Named("summary".into()));
        assert_eq!(job.target_column, "summary");
    }

    #[test]
    fn template_and_prompt_are_exclusive() {
        let parsed = Cli::try_parse_from([
            "colgen", "preview", "a.json", "-c", "x", "-t", "summary", "-p", "{reference}",
        ]);
        assert!(parsed.is_err());
        assert!(Cli::try_parse_from(["colgen", "preview", "a.json", "-c", "x"]).is_err());
    }

    #[test]
    fn local_overrides_apply_to_local_url() {
        let args = ProviderArgs {
            backend: Some(BackendKind::Local),
            model: Some("mistral".into()),
            base_url: Some("http://gpu-box:11434".into()),
            timeout_secs: Some(30),
        };
        let resolved = provider_config(&AppConfig::default(), &args).unwrap();
        assert_eq!(resolved.backend, BackendKind::Local);
        assert_eq!(resolved.model, "mistral");
        assert_eq!(resolved.base_url.as_str(), "http://gpu-box:11434/");
        assert_eq!(resolved.timeout.as_secs(), 30);
    }

    #[test]
    fn output_path_defaults_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("data/notes.jsonl")),
            PathBuf::from("data/notes.generated.jsonl")
        );
        assert_eq!(
            default_output_path(Path::new("notes")),
            PathBuf::from("notes.generated.json")
        );
    }

    #[test]
    fn vars_parse_as_key_value() {
        assert_eq!(parse_var("question=why?").unwrap(), ("question".into(), "why?".into()));
        assert_eq!(parse_var("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }
}
