//! AgenticMicroformats CLI — entry point.

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use agentic_microformats_cli::commands;
use agentic_microformats_cli::config::{
    resolve_file, resolve_format, resolve_log_level, FILE_ENV,
};
use agentic_microformats_cli::Page;

#[derive(Parser)]
#[command(
    name = "amf",
    about = "Inspect agent-readable HTML: resources, actions, trust and live changes",
    version
)]
struct Cli {
    /// HTML file to inspect. Also reads AMF_FILE.
    #[arg(short, long, global = true)]
    file: Option<String>,

    /// Log level (trace, debug, info, warn, error). Also reads AMF_LOG_LEVEL.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output format (json, text). Also reads AMF_FORMAT.
    #[arg(long, global = true)]
    format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print page meta, resources and standalone actions.
    Extract {
        /// HTML file (overrides --file).
        file: Option<String>,
    },

    /// Print the resource tree.
    Resources {
        /// HTML file (overrides --file).
        file: Option<String>,
    },

    /// Print one resource, searched depth-first by id.
    Resource {
        /// Resource id.
        id: String,

        /// HTML file (overrides --file).
        file: Option<String>,
    },

    /// Print one action by name.
    Action {
        /// Action name.
        name: String,

        /// Only match actions bound to this resource id.
        #[arg(long)]
        target: Option<String>,

        /// HTML file (overrides --file).
        file: Option<String>,
    },

    /// Build the HTTP request an agent would send for an action.
    Prepare {
        /// Action name.
        name: String,

        /// Only match actions bound to this resource id.
        #[arg(long)]
        target: Option<String>,

        /// JSON object used as the request body instead of the form values.
        #[arg(long)]
        values: Option<String>,

        /// HTML file (overrides --file).
        file: Option<String>,
    },

    /// List the changes that turn one page into another.
    Diff {
        /// Earlier version of the page.
        before: String,

        /// Later version of the page.
        after: String,
    },

    /// Show how trust resolves for the first element matching a selector.
    Trust {
        /// CSS selector, e.g. `#price` or `article > .reviews p`.
        selector: String,

        /// HTML file (overrides --file).
        file: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   amf completions bash > ~/.local/share/bash-completion/completions/amf
    ///   amf completions zsh > ~/.zfunc/_amf
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

fn load(positional: Option<String>, global: Option<&str>) -> anyhow::Result<Page> {
    let path = resolve_file(positional.as_deref().or(global))
        .with_context(|| format!("No input file: pass a path or set {FILE_ENV}"))?;
    Page::open(&path)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(resolve_log_level(cli.log_level.as_deref())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = resolve_format(cli.format.as_deref())?;
    let global = cli.file.as_deref();

    let output = match cli.command {
        Commands::Extract { file } => commands::extract(&load(file, global)?, format)?,
        Commands::Resources { file } => commands::resources(&load(file, global)?, format)?,
        Commands::Resource { id, file } => commands::resource(&load(file, global)?, &id, format)?,
        Commands::Action { name, target, file } => {
            commands::action(&load(file, global)?, &name, target.as_deref(), format)?
        }
        Commands::Prepare {
            name,
            target,
            values,
            file,
        } => commands::prepare(
            &load(file, global)?,
            &name,
            target.as_deref(),
            values.as_deref(),
            format,
        )?,
        Commands::Diff { before, after } => {
            commands::diff(&Page::open(&before)?, &Page::open(&after)?, format)?
        }
        Commands::Trust { selector, file } => {
            commands::trust(&load(file, global)?, &selector, format)?
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "amf", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Repl => {
            agentic_microformats_cli::repl::run(global, format)?;
            return Ok(());
        }
    };

    println!("{output}");
    Ok(())
}
