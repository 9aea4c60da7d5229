//! CLI for Dekoviz - AI furniture visualization.

use clap::{Args, Parser, Subcommand, ValueEnum};
use dekoviz::progress::ProgressTicker;
use dekoviz::{
    GeminiModel, GeminiService, ImageFile, ImagePayload, ImageService, Mode, RunOutcome,
    SessionController,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dekoviz")]
#[command(about = "Visualize, generate, edit and analyze furniture images with Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Gemini image model
    #[arg(long, value_enum, global = true, default_value = "nano-banana")]
    model: ModelArg,
}

#[derive(Subcommand)]
enum Commands {
    /// Place a piece of furniture into a room photo
    Visualize(VisualizeArgs),

    /// Generate an image from a text prompt
    Generate(GenerateArgs),

    /// Edit an image; several prompts are applied one after another
    Edit(EditArgs),

    /// Ask a question about an image
    Analyze(AnalyzeArgs),

    /// Interactive session reading commands from stdin
    Session(SessionArgs),

    /// Check that the API key and model are usable
    Check,
}

#[derive(Args)]
struct VisualizeArgs {
    /// Photo of the room
    #[arg(short, long)]
    environment: PathBuf,

    /// Photo of the furniture model
    #[arg(short = 'm', long = "furniture")]
    furniture: PathBuf,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the image
    prompt: String,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args)]
struct EditArgs {
    /// Edit instructions, applied in order
    #[arg(required = true)]
    prompts: Vec<String>,

    /// Image to edit
    #[arg(short, long)]
    input: PathBuf,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// The question to ask about the image
    prompt: String,

    /// Image to analyze
    #[arg(short, long)]
    image: PathBuf,
}

#[derive(Args)]
struct SessionArgs {
    /// Mode to start in
    #[arg(long, value_enum, default_value = "visualize")]
    mode: ModeArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    NanoBanana,
    NanoBananaPro,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::NanoBanana => GeminiModel::NanoBanana,
            ModelArg::NanoBananaPro => GeminiModel::NanoBananaPro,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Visualize,
    Generate,
    Edit,
    Analyze,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Visualize => Mode::Visualize,
            ModeArg::Generate => Mode::Generate,
            ModeArg::Edit => Mode::Edit,
            ModeArg::Analyze => Mode::Analyze,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let service = Arc::new(GeminiService::builder().model(cli.model.into()).build()?);

    match cli.command {
        Commands::Visualize(args) => visualize(service, args, cli.json).await?,
        Commands::Generate(args) => generate(service, args, cli.json).await?,
        Commands::Edit(args) => edit(service, args, cli.json).await?,
        Commands::Analyze(args) => analyze(service, args, cli.json).await?,
        Commands::Session(args) => run_session(service, args.mode.into()).await?,
        Commands::Check => check(service.as_ref(), cli.json).await?,
    }

    Ok(())
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Runs the controller once, showing progress messages unless output is JSON.
async fn run_with_progress(
    controller: &mut SessionController,
    quiet: bool,
) -> dekoviz::Result<RunOutcome> {
    let _ticker = (!quiet).then(|| ProgressTicker::start(|m| eprintln!("{m}")));
    controller.run().await
}

async fn visualize(
    service: Arc<GeminiService>,
    args: VisualizeArgs,
    json_output: bool,
) -> anyhow::Result<()> {
    let mut controller = SessionController::new(service, Mode::Visualize);
    controller.set_primary_image(ImageFile::load(&args.environment)?);
    controller.set_secondary_image(ImageFile::load(&args.furniture)?);

    let outcome = run_with_progress(&mut controller, json_output).await?;
    write_image(outcome, &args.output, Mode::Visualize, json_output)
}

async fn generate(
    service: Arc<GeminiService>,
    args: GenerateArgs,
    json_output: bool,
) -> anyhow::Result<()> {
    let mut controller = SessionController::new(service, Mode::Generate);
    controller.set_prompt(args.prompt);

    let outcome = run_with_progress(&mut controller, json_output).await?;
    write_image(outcome, &args.output, Mode::Generate, json_output)
}

async fn edit(service: Arc<GeminiService>, args: EditArgs, json_output: bool) -> anyhow::Result<()> {
    let mut controller = SessionController::new(service, Mode::Edit);
    controller.set_primary_image(ImageFile::load(&args.input)?);

    let mut outcome = RunOutcome::Discarded;
    for prompt in args.prompts {
        if !json_output {
            eprintln!("Editing: {prompt}");
        }
        controller.set_prompt(prompt);
        outcome = run_with_progress(&mut controller, json_output).await?;
    }

    write_image(outcome, &args.output, Mode::Edit, json_output)
}

async fn analyze(
    service: Arc<GeminiService>,
    args: AnalyzeArgs,
    json_output: bool,
) -> anyhow::Result<()> {
    let mut controller = SessionController::new(service, Mode::Analyze);
    controller.set_primary_image(ImageFile::load(&args.image)?);
    controller.set_prompt(args.prompt);

    let RunOutcome::Analysis(text) = run_with_progress(&mut controller, json_output).await? else {
        anyhow::bail!("analysis returned no text");
    };

    if json_output {
        let result = serde_json::json!({
            "mode": Mode::Analyze,
            "success": true,
            "analysis": text,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Analysis Result:\n\n{text}");
    }
    Ok(())
}

fn write_image(
    outcome: RunOutcome,
    output: &Path,
    mode: Mode,
    json_output: bool,
) -> anyhow::Result<()> {
    let RunOutcome::Image(payload) = outcome else {
        anyhow::bail!("{mode} returned no image");
    };
    let image = save_payload(&payload, output)?;

    if json_output {
        let result = serde_json::json!({
            "mode": mode,
            "success": true,
            "output": output.display().to_string(),
            "size_bytes": image.size(),
            "mime_type": image.mime_type,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Saved image: {} ({} bytes, {})",
            output.display(),
            image.size(),
            image.mime_type
        );
    }
    Ok(())
}

fn save_payload(payload: &ImagePayload, output: &Path) -> dekoviz::Result<ImageFile> {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.png".to_string());
    let image = payload.to_file(name)?;
    image.save(output)?;
    Ok(image)
}

async fn check(service: &GeminiService, json_output: bool) -> anyhow::Result<()> {
    service.health_check().await?;
    if json_output {
        let result = serde_json::json!({
            "service": service.name(),
            "model": service.model().as_str(),
            "healthy": true,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{} is reachable ({})", service.name(), service.model().as_str());
    }
    Ok(())
}

/// A line typed into the interactive session.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Mode(Mode),
    Environment(PathBuf),
    Furniture(PathBuf),
    Prompt(String),
    Run,
    Save(PathBuf),
    Status,
    StartOver,
    Help,
    Quit,
}

impl ReplCommand {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        let path = |what: &str| {
            if rest.is_empty() {
                Err(format!("usage: {word} <{what}>"))
            } else {
                Ok(PathBuf::from(rest))
            }
        };

        match word.to_lowercase().as_str() {
            "mode" => match rest.to_lowercase().as_str() {
                "visualize" => Ok(Self::Mode(Mode::Visualize)),
                "generate" => Ok(Self::Mode(Mode::Generate)),
                "edit" => Ok(Self::Mode(Mode::Edit)),
                "analyze" => Ok(Self::Mode(Mode::Analyze)),
                _ => Err("usage: mode <visualize|generate|edit|analyze>".to_string()),
            },
            "image" | "env" | "environment" => path("path").map(Self::Environment),
            "model" | "furniture" => path("path").map(Self::Furniture),
            "prompt" => Ok(Self::Prompt(rest.to_string())),
            "run" => Ok(Self::Run),
            "save" => path("path").map(Self::Save),
            "status" => Ok(Self::Status),
            "start-over" | "reset" => Ok(Self::StartOver),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command: {other} (try 'help')")),
        }
    }
}

const REPL_HELP: &str = "\
commands:
  mode <visualize|generate|edit|analyze>  switch mode (resets the session)
  image <path>                            set the room / image to edit or analyze
  model <path>                            set the furniture image (visualize)
  prompt <text>                           set the prompt
  run                                     run the current mode
  save <path>                             write the current image to disk
  status                                  show the session
  start-over                              clear everything, keep the mode
  quit";

async fn run_session(service: Arc<GeminiService>, mode: Mode) -> anyhow::Result<()> {
    let mut controller = SessionController::new(service, mode);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{REPL_HELP}\n");
    print_status(&controller);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match ReplCommand::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            ReplCommand::Mode(mode) => {
                controller.select_mode(mode);
                print_status(&controller);
            }
            ReplCommand::Environment(path) => match ImageFile::load(&path) {
                Ok(image) => controller.set_primary_image(image),
                Err(e) => println!("{e}"),
            },
            ReplCommand::Furniture(path) => match ImageFile::load(&path) {
                Ok(image) => controller.set_secondary_image(image),
                Err(e) => println!("{e}"),
            },
            ReplCommand::Prompt(text) => controller.set_prompt(text),
            ReplCommand::Run => match run_with_progress(&mut controller, false).await {
                Ok(RunOutcome::Image(_)) => println!("Image ready. Use 'save <path>' to keep it."),
                Ok(RunOutcome::Analysis(text)) => println!("Analysis Result:\n\n{text}"),
                Ok(RunOutcome::Discarded) => {}
                Err(e) => println!("{}", e.user_message()),
            },
            ReplCommand::Save(path) => match controller.session().produced_image() {
                Some(payload) => match save_payload(payload, &path) {
                    Ok(image) => println!("Saved {} ({} bytes)", path.display(), image.size()),
                    Err(e) => println!("{e}"),
                },
                None => println!("Nothing to save yet."),
            },
            ReplCommand::Status => print_status(&controller),
            ReplCommand::StartOver => {
                controller.start_over();
                print_status(&controller);
            }
            ReplCommand::Help => println!("{REPL_HELP}"),
            ReplCommand::Quit => break,
        }
    }

    Ok(())
}

fn print_status(controller: &SessionController) {
    let session = controller.session();
    let name = |image: Option<&ImageFile>| {
        image
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("[{}] session {}", session.mode(), session.id());
    println!("  image:  {}", name(session.primary_image()));
    if session.mode() == Mode::Visualize {
        println!("  model:  {}", name(session.secondary_image()));
    }
    println!("  prompt: {}", session.prompt());
    if session.produced_image().is_some() {
        println!("  result: ready");
    }
    if let Some(error) = session.error() {
        println!("  error:  {error}");
    }
    println!("  next:   {}", controller.run_label());
}
