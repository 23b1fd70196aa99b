//! Interactive REPL for inspecting agent-readable pages.
//!
//! Launch with `amf repl` to enter interactive mode.
//! Type `/help` for available commands, Tab for completion.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use agentic_microformats::{AgentMutation, Observer};

use crate::commands::{self, event_line, Page};
use crate::config::{history_path, resolve_file, OutputFormat};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/load", "Load an HTML file"),
    ("/reload", "Re-read the current file"),
    ("/summary", "Show the extraction summary"),
    ("/resources", "Show the resource tree"),
    ("/resource", "Show one resource: /resource <id>"),
    ("/action", "Show one action: /action <name> [target]"),
    ("/prepare", "Prepare a request: /prepare <name> [target]"),
    ("/trust", "Trust of the first match: /trust <selector>"),
    ("/watch", "Toggle live change reporting"),
    ("/set", "Set an attribute: /set <selector> <name> <value>"),
    ("/text", "Replace text: /text <selector> <text>"),
    ("/format", "Switch output: /format json|text"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion.
#[derive(Default)]
struct PageHelper;

impl Completer for PageHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        // HTML file completion
        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        if cmd == "/load" {
            let mut files = Vec::new();
            if let Ok(entries) = std::fs::read_dir(".") {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|e| e == "html" || e == "htm") {
                        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                            files.push(name.to_string());
                        }
                    }
                }
            }
            files.sort();
            let prefix_start = input.len() - args.len();
            let matches: Vec<Pair> = files
                .iter()
                .filter(|f| f.starts_with(args.trim()))
                .map(|f| Pair {
                    display: f.clone(),
                    replacement: format!("{f} "),
                })
                .collect();
            return Ok((prefix_start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for PageHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for PageHelper {}
impl Validator for PageHelper {}
impl Helper for PageHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Session state.
struct ReplState {
    page: Option<Page>,
    observer: Option<Observer>,
    format: OutputFormat,
}

impl ReplState {
    fn page(&self) -> Option<&Page> {
        if self.page.is_none() {
            eprintln!("  No page loaded. Use /load <file.html>.");
        }
        self.page.as_ref()
    }

    fn stop_watching(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.disconnect();
        }
    }
}

/// Run the interactive REPL.
pub fn run(file: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mamf v{}\x1b[0m \x1b[90m\u{2014} Agent-readable page inspector\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<PageHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(PageHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = history_path();
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut state = ReplState {
        page: None,
        observer: None,
        format,
    };
    if let Some(path) = resolve_file(file) {
        cmd_load(&path, &mut state);
    }
    let prompt = " \x1b[36mamf>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let args = args.trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "load" => cmd_load(args, &mut state),
                    "reload" => cmd_reload(&mut state),
                    "summary" => show(&state, |page, format| commands::extract(page, format)),
                    "resources" => show(&state, commands::resources),
                    "resource" => show(&state, |page, format| commands::resource(page, args, format)),
                    "action" | "prepare" => {
                        let mut words = args.split_whitespace();
                        let Some(name) = words.next() else {
                            eprintln!("  Usage: /{cmd} <name> [target]");
                            continue;
                        };
                        let target = words.next();
                        if cmd == "action" {
                            show(&state, |page, format| commands::action(page, name, target, format));
                        } else {
                            show(&state, |page, format| {
                                commands::prepare(page, name, target, None, format)
                            });
                        }
                    }
                    "trust" => show(&state, |page, format| commands::trust(page, args, format)),
                    "watch" => cmd_watch(&mut state),
                    "set" => cmd_set(args, &state),
                    "text" => cmd_text(args, &state),
                    "format" => match args.parse::<OutputFormat>() {
                        Ok(format) => {
                            state.format = format;
                            eprintln!("  Output format: {format}");
                        }
                        Err(e) => eprintln!("  {e}"),
                    },
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    state.stop_watching();
    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or(std::path::Path::new(".")));
    let _ = rl.save_history(&hist_path);

    Ok(())
}

/// Run a page command and print its output.
fn show<F>(state: &ReplState, command: F)
where
    F: FnOnce(&Page, OutputFormat) -> anyhow::Result<String>,
{
    let Some(page) = state.page() else {
        return;
    };
    match command(page, state.format) {
        Ok(output) => {
            eprintln!();
            for line in output.lines() {
                eprintln!("  {line}");
            }
            eprintln!();
        }
        Err(e) => eprintln!("  {e:#}"),
    }
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completion works for commands and .html files.");
    eprintln!();
}

fn cmd_load(args: &str, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Usage: /load <file.html>");
        return;
    }
    let path = args.split_whitespace().next().unwrap_or(args);
    match Page::open(path) {
        Ok(page) => {
            let result = page.agent.snapshot();
            eprintln!(
                "  Loaded: {path} ({} resources, {} standalone actions)",
                result.resources.len(),
                result.actions.len()
            );
            state.stop_watching();
            state.page = Some(page);
        }
        Err(e) => {
            eprintln!("  Failed to load: {e:#}");
        }
    }
}

fn cmd_reload(state: &mut ReplState) {
    let Some(path) = state.page().map(|p| p.path.clone()) else {
        return;
    };
    cmd_load(&path, state);
}

fn cmd_watch(state: &mut ReplState) {
    if state.observer.is_some() {
        state.stop_watching();
        eprintln!("  Stopped watching.");
        return;
    }
    let Some(page) = state.page() else {
        return;
    };
    let observer = page.agent.observe(|events: &[AgentMutation]| {
        for event in events {
            eprintln!("  \x1b[33m\u{25b8}\x1b[0m {}", event_line(event));
        }
    });
    match observer {
        Ok(observer) => {
            eprintln!("  Watching {}. Edits made with /set and /text are reported.", page.path);
            state.observer = Some(observer);
        }
        Err(e) => eprintln!("  Cannot watch: {e}"),
    }
}

fn cmd_set(args: &str, state: &ReplState) {
    let mut parts = args.splitn(3, ' ');
    let (Some(selector), Some(name), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        eprintln!("  Usage: /set <selector> <name> <value>");
        return;
    };
    let Some(page) = state.page() else {
        return;
    };
    let result = page
        .select(selector)
        .and_then(|node| Ok(page.doc.set_attribute(&node, name, value.trim())?));
    finish_edit(page, result);
}

fn cmd_text(args: &str, state: &ReplState) {
    let Some((selector, text)) = args.split_once(' ') else {
        eprintln!("  Usage: /text <selector> <text>");
        return;
    };
    let Some(page) = state.page() else {
        return;
    };
    let result = page
        .select(selector)
        .and_then(|node| Ok(page.doc.set_text(&node, text.trim())?));
    finish_edit(page, result);
}

/// Deliver the edit to observers, or report why it failed.
fn finish_edit(page: &Page, result: anyhow::Result<()>) {
    match result {
        Ok(()) => {
            let delivered = page.doc.flush();
            tracing::debug!("Flushed {delivered} mutation records");
        }
        Err(e) => eprintln!("  {e:#}"),
    }
}
