//! CLI for TimeLens - render a street scene across the eras.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use timelens::credential::resolve_credential;
use timelens::{
    ChannelNotifier, Credential, CredentialStore, Era, FileCredentialStore, GeneratedImage,
    GenerationOutcome, ImageProvider, ImageProviderKind, Notification, ProviderService,
    SceneOrchestrator, SessionState, Settings, Severity, SkipReason, TimeLensError, ERAS,
    EXAMPLE_PROMPTS,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "timelens")]
#[command(about = "Render a street scene across the eras, from the 1900s to the 2050s")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Image service to use (gemini, openai)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Provider-specific model name
    #[arg(long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// List the available eras
    Eras,

    /// List example scene descriptions
    Examples,

    /// Render a scene in one era and save it
    Generate(GenerateArgs),

    /// Render a scene in every era and save one file per era
    Travel(TravelArgs),

    /// Start an interactive session
    Shell,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store an API key
    Set {
        /// The key to store
        key: String,
    },

    /// Remove the stored API key
    Clear,

    /// Show whether a key is configured
    Status {
        /// Make a request to check the key is accepted
        #[arg(long)]
        verify: bool,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Scene description
    prompt: String,

    /// Target era: label (1950s), year (1950) or index (3)
    #[arg(short, long, default_value = "modern")]
    era: String,

    /// Directory the image is written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct TravelArgs {
    /// Scene description
    prompt: String,

    /// Directory the images are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

type Session = SceneOrchestrator<ProviderService, ChannelNotifier>;

struct App {
    settings: Settings,
    store: Arc<FileCredentialStore>,
    json: bool,
}

impl App {
    fn kind(&self) -> ImageProviderKind {
        self.settings.provider
    }

    fn session(&self) -> anyhow::Result<(Session, UnboundedReceiver<Notification>)> {
        let mut service = ProviderService::new(self.kind());
        if let Some(ref model) = self.settings.model {
            service = service.with_model(model);
        }
        if let Some(ref quality) = self.settings.quality {
            service = service.with_quality(quality);
        }
        let kind = self.kind();
        // A key from the environment is used for this session but never stored.
        let credential = resolve_credential(&*self.store, kind.credential_key(), kind.env_var())
            .context("failed to read stored API key")?;
        let (notifier, rx) = ChannelNotifier::new();
        let store: Arc<dyn CredentialStore> = self.store.clone();
        let session = SceneOrchestrator::new(service, notifier)
            .with_credential_store(store, kind.credential_key())
            .context("failed to read stored API key")?
            .with_credential(credential)
            .with_request_timeout(self.settings.request_timeout);
        Ok((session, rx))
    }

    fn output_dir(&self, arg: Option<PathBuf>) -> PathBuf {
        arg.unwrap_or_else(|| self.settings.output_dir.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::load()?;
    if let Some(ref provider) = cli.provider {
        settings.provider = provider.parse()?;
    }
    if cli.model.is_some() {
        settings.model = cli.model.clone();
    }
    let app = App {
        settings,
        store: Arc::new(FileCredentialStore::default_location()?),
        json: cli.json,
    };

    match cli.command {
        Commands::Key { action } => manage_key(&app, action).await?,
        Commands::Eras => list_eras(app.json)?,
        Commands::Examples => list_examples(app.json)?,
        Commands::Generate(args) => generate(&app, args).await?,
        Commands::Travel(args) => travel(&app, args).await?,
        Commands::Shell => run_shell(&app).await?,
    }

    Ok(())
}

async fn manage_key(app: &App, action: KeyAction) -> anyhow::Result<()> {
    let kind = app.kind();
    let key = kind.credential_key();
    match action {
        KeyAction::Set { key: value } => {
            let credential = Credential::new(&value).context("API key is empty")?;
            app.store.store(key, &credential)?;
            if app.json {
                let result = serde_json::json!({
                    "provider": kind.to_string(),
                    "stored": true,
                    "path": app.store.path().display().to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Saved {} API key to {}", kind, app.store.path().display());
            }
        }
        KeyAction::Clear => {
            app.store.remove(key)?;
            if app.json {
                let result = serde_json::json!({ "provider": kind.to_string(), "stored": false });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Removed stored {} API key", kind);
            }
        }
        KeyAction::Status { verify } => {
            let stored = app.store.load(key)?.is_some();
            let resolved = resolve_credential(&*app.store, key, kind.env_var())?;
            let from_env = !stored && resolved.is_some();
            let verified = match (verify, resolved.as_ref()) {
                (true, Some(credential)) => {
                    let service = ProviderService::new(kind);
                    let provider = service.provider(credential)?;
                    Some(provider.health_check().await.is_ok())
                }
                (true, None) => Some(false),
                (false, _) => None,
            };

            if app.json {
                let result = serde_json::json!({
                    "provider": kind.to_string(),
                    "stored": stored,
                    "env": from_env,
                    "env_var": kind.env_var(),
                    "path": app.store.path().display().to_string(),
                    "verified": verified,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let source = match (stored, from_env) {
                    (true, _) => format!("stored in {}", app.store.path().display()),
                    (false, true) => format!("from {}", kind.env_var()),
                    (false, false) => "not configured".to_string(),
                };
                println!("{} API key: {}", kind, source);
                match verified {
                    Some(true) => println!("Key accepted by the service"),
                    Some(false) => println!("Key could not be verified"),
                    None => {}
                }
            }
        }
    }
    Ok(())
}

fn list_eras(json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(&ERAS[..])?);
        return Ok(());
    }
    for era in ERAS.iter() {
        let marker = if era.is_modern() { " (start)" } else { "" };
        println!("{}  {:<7} {}{}", era.index, era.label, era.description, marker);
    }
    Ok(())
}

fn list_examples(json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(&EXAMPLE_PROMPTS)?);
        return Ok(());
    }
    for (n, prompt) in EXAMPLE_PROMPTS.iter().enumerate() {
        println!("{}. {}", n + 1, prompt);
    }
    Ok(())
}

async fn generate(app: &App, args: GenerateArgs) -> anyhow::Result<()> {
    let target =
        Era::find(&args.era).with_context(|| format!("unknown era: {}", args.era))?;
    let dir = app.output_dir(args.output_dir);
    let (session, mut rx) = app.session()?;

    session.set_prompt(&args.prompt);
    let outcome = session.generate().await;
    drain(&mut rx, app.json);
    let mut shown = completed(app.kind(), outcome)?;

    if !target.is_modern() {
        let outcome = session.change_era(target.index).await;
        drain(&mut rx, app.json);
        shown = completed(app.kind(), outcome)?;
    }

    let path = session.download(&dir)?;
    print_saved(&[(shown.0, shown.1, path)], app.json)
}

async fn travel(app: &App, args: TravelArgs) -> anyhow::Result<()> {
    let dir = app.output_dir(args.output_dir);
    let (session, mut rx) = app.session()?;

    session.set_prompt(&args.prompt);
    let outcome = session.generate().await;
    drain(&mut rx, app.json);
    let (era, image) = completed(app.kind(), outcome)?;
    let mut saved = vec![(era, image, session.download(&dir)?)];

    let mut failures = 0;
    for era in ERAS.iter().filter(|era| !era.is_modern()) {
        let outcome = session.change_era(era.index).await;
        drain(&mut rx, app.json);
        match completed(app.kind(), outcome) {
            Ok((era, image)) => saved.push((era, image, session.download(&dir)?)),
            Err(e) => {
                tracing::warn!(era = era.label, "skipping era: {e:#}");
                failures += 1;
            }
        }
    }

    print_saved(&saved, app.json)?;
    if failures > 0 {
        anyhow::bail!("{failures} era(s) could not be rendered");
    }
    Ok(())
}

fn completed(
    kind: ImageProviderKind,
    outcome: GenerationOutcome,
) -> anyhow::Result<(&'static Era, Arc<GeneratedImage>)> {
    match outcome {
        GenerationOutcome::Completed { era, image } => Ok((era, image)),
        GenerationOutcome::Failed(TimeLensError::MissingCredential) => anyhow::bail!(
            "no API key configured; run `timelens key set <KEY>` or set {}",
            kind.env_var()
        ),
        GenerationOutcome::Failed(e) => Err(e.into()),
        GenerationOutcome::Skipped(reason) => anyhow::bail!("{}", skip_message(reason)),
        GenerationOutcome::Superseded => anyhow::bail!("request was superseded"),
    }
}

fn print_saved(
    saved: &[(&'static Era, Arc<GeneratedImage>, PathBuf)],
    json_output: bool,
) -> anyhow::Result<()> {
    if json_output {
        let results: Vec<_> = saved
            .iter()
            .map(|(era, image, path)| {
                serde_json::json!({
                    "type": "scene",
                    "success": true,
                    "era": era.label,
                    "year": era.year,
                    "output": path.display().to_string(),
                    "size_bytes": image.size(),
                    "format": image.format.extension(),
                    "provider": image.provider.to_string(),
                    "model": image.metadata.model,
                    "duration_ms": image.metadata.duration_ms,
                })
            })
            .collect();
        let value = match results.as_slice() {
            [single] => single.clone(),
            _ => serde_json::Value::Array(results),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        for (era, image, path) in saved {
            println!(
                "Saved {} scene: {} ({} bytes)",
                era.label,
                path.display(),
                image.size()
            );
        }
    }
    Ok(())
}

fn drain(rx: &mut UnboundedReceiver<Notification>, json_output: bool) {
    while let Ok(notification) = rx.try_recv() {
        if json_output {
            continue;
        }
        match notification.severity {
            Severity::Success => println!("{notification}"),
            Severity::Failure => eprintln!("{notification}"),
        }
    }
}

fn skip_message(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::EmptyPrompt => "enter a scene description first",
        SkipReason::Busy => "a generation is already running",
        SkipReason::NoScene => "generate a modern scene first to travel through time",
        SkipReason::UnknownEra => "no such era",
    }
}

const SHELL_HELP: &str = "\
Commands:
  prompt <text>    set the scene description
  example <n>      use example prompt n
  era <era>        travel to an era (label, year or index)
  generate         render the prompt in the selected era
  regenerate       render the current prompt and era again
  download [dir]   save the displayed image
  status           show the session state
  key <KEY>        set the API key
  key clear        remove the API key
  quit             leave the shell";

async fn run_shell(app: &App) -> anyhow::Result<()> {
    let (session, mut rx) = app.session()?;
    println!("TimeLens shell. Type `help` for commands.");
    if !session.has_credential() {
        println!("No API key configured; use `key <KEY>` to add one.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let lock = if session.controls_disabled() { ", locked" } else { "" };
        print!("timelens [{}{}]> ", session.selected_era().label, lock);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        let (command, rest) = line
            .split_once(char::is_whitespace)
            .map(|(command, rest)| (command, rest.trim()))
            .unwrap_or((line, ""));

        let edits_scene = matches!(
            command,
            "prompt" | "example" | "era" | "generate" | "regenerate"
        );
        if edits_scene && session.controls_disabled() {
            println!("Add an API key with `key <KEY>` first.");
            continue;
        }

        match command {
            "" => continue,
            "help" => println!("{SHELL_HELP}"),
            "quit" | "exit" => break,
            "prompt" => session.set_prompt(rest),
            "example" => match rest.parse::<usize>().ok().and_then(|n| {
                n.checked_sub(1).and_then(|i| EXAMPLE_PROMPTS.get(i))
            }) {
                Some(prompt) => {
                    session.set_prompt(*prompt);
                    println!("Prompt: {prompt}");
                }
                None => println!("choose an example between 1 and {}", EXAMPLE_PROMPTS.len()),
            },
            "era" => match Era::find(rest) {
                Some(era) => report(&session, session.change_era(era.index).await),
                None => println!("unknown era: {rest}"),
            },
            "generate" => report(&session, session.generate().await),
            "regenerate" => report(&session, session.regenerate().await),
            "download" => {
                let dir = if rest.is_empty() {
                    app.settings.output_dir.clone()
                } else {
                    PathBuf::from(rest)
                };
                download(&session, &dir);
            }
            "status" => print_status(&session.snapshot()),
            "key" if rest == "clear" => {
                session.set_credential("");
                println!("API key removed");
            }
            "key" if !rest.is_empty() => {
                session.set_credential(rest);
                println!("API key saved");
            }
            "key" => println!("usage: key <KEY> | key clear"),
            other => println!("unknown command: {other} (try `help`)"),
        }
        drain(&mut rx, false);
    }
    Ok(())
}

fn report(session: &Session, outcome: GenerationOutcome) {
    match outcome {
        GenerationOutcome::Completed { era, image } => {
            println!("Showing {} ({} bytes)", era, image.size());
        }
        GenerationOutcome::Skipped(SkipReason::NoScene) => {
            println!("Selected {}", session.selected_era());
        }
        GenerationOutcome::Skipped(reason) => println!("{}", skip_message(reason)),
        // Failures arrive as notifications.
        GenerationOutcome::Failed(_) | GenerationOutcome::Superseded => {}
    }
}

fn download(session: &Session, dir: &Path) {
    match session.download(dir) {
        Ok(path) => println!("Saved {}", path.display()),
        Err(TimeLensError::MissingImage) => println!("nothing to download yet"),
        Err(e) => eprintln!("download failed: {e}"),
    }
}

fn print_status(state: &SessionState) {
    let prompt = if state.has_prompt() {
        state.prompt.trim()
    } else {
        "(none)"
    };
    let displayed = state
        .displayed_era
        .and_then(Era::get)
        .map_or_else(|| "(nothing)".to_string(), |era| era.to_string());
    println!("Prompt:     {prompt}");
    println!("Era:        {}", state.era());
    println!("Showing:    {displayed}");
    println!("Base scene: {}", if state.base_image.is_some() { "yes" } else { "no" });
    println!("API key:    {}", if state.has_credential() { "set" } else { "missing" });
    println!("Phase:      {:?}", state.phase());
}
