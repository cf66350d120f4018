use std::path::PathBuf;

use acme_infra::config::{find_config_file, InfraConfig};
use acme_infra::{build_app, synthesize, Context, InfraError, TemplateFormat};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "acme-infra",
    version,
    about = "Synthesizes the acme hosting and deployment stacks"
)]
struct Cli {
    #[command(flatten)]
    context: ContextArgs,
    /// Path to the config file. By default infra.toml is searched for
    /// from the current directory upwards.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Load context values from a dotenv file
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

// accepted both before and after the subcommand
#[derive(Args, Debug, Default)]
struct ContextArgs {
    /// Context value such as environment=dev. Can be repeated.
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE")]
    context: Vec<String>,
}

impl Cli {
    /// `-c` values from before the subcommand, then the ones after it.
    /// later values win when a key repeats.
    fn context_args(&self) -> Vec<String> {
        let sub = match &self.command {
            Commands::Synth { context, .. } | Commands::List { context } => context,
        };
        self.context.context.iter().chain(sub.context.iter()).cloned().collect()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write every stack's template, a manifest and a deploy script.
    /// If a stack is named, its template is also printed to stdout.
    Synth {
        stack: Option<String>,
        /// Output directory (default: infra.out)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// json or yaml (default: json)
        #[arg(long)]
        format: Option<TemplateFormat>,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Print the stack names in deploy order
    List {
        #[command(flatten)]
        context: ContextArgs,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<InfraConfig, InfraError> {
    let path = match &cli.config {
        Some(p) => Some(p.clone()),
        None => {
            let currdir = std::env::current_dir().map_err(|source| InfraError::Read {
                path: PathBuf::from("."),
                source,
            })?;
            find_config_file(currdir)
        }
    };
    match path {
        Some(p) => InfraConfig::from_file(p),
        None => {
            tracing::debug!("no {} found, using defaults", acme_infra::config::CONFIG_FILE_NAME);
            Ok(InfraConfig::default())
        }
    }
}

/// config file, then dotenv, then command line. later sources win.
fn load_context(cli: &Cli, config: &InfraConfig) -> Result<Context, InfraError> {
    let mut ctx = config.context();
    if let Some(dotenv) = &cli.dotenv {
        ctx.load_dot_env(dotenv)?;
    }
    ctx.apply_args(cli.context_args().as_slice())?;
    Ok(ctx)
}

fn run(cli: Cli) -> Result<(), InfraError> {
    let config = load_config(&cli)?;
    let ctx = load_context(&cli, &config)?;
    match cli.command {
        Commands::Synth { stack, out, format, .. } => {
            let out_dir = out.unwrap_or(config.output.dir);
            let format = format.unwrap_or(config.output.format);
            let assembly = synthesize(ctx)?;
            // an unknown stack name must fail before anything is written
            let selected = match &stack {
                Some(name) => Some(assembly.get_stack(name)?),
                None => None,
            };
            let written = assembly.write_to(&out_dir, format)?;
            match selected {
                Some(stack) => {
                    println!("{}", stack.render(format)?);
                }
                None => {
                    println!("Synthesized {} stacks to {:?}", assembly.stacks.len(), out_dir);
                    for path in written {
                        println!("  {}", path.display());
                    }
                }
            }
        }
        Commands::List { .. } => {
            let app = build_app(ctx)?;
            for stack in app.stacks() {
                println!("{}", stack.stack_name);
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
