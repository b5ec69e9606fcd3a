//! canopy process CLI
//!
//! `canopy` with no arguments opens the interactive shell. `--command` runs
//! shell lines in order and exits, failing on the first command that fails.

use clap::Parser;
use colored::*;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::session::Session;
use crate::shell::{self, Reply, Repl};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

pub(crate) fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
pub(crate) fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
pub(crate) fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
pub(crate) fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
pub(crate) fn warn(s: &str) -> ColoredString   { s.truecolor(230, 190, 90) }
pub(crate) fn error(s: &str) -> ColoredString  { s.truecolor(235, 100, 100) }

pub(crate) fn box_top() -> String    { format!("  {}", dim(&format!("┌{}┐", "─".repeat(W + 1)))) }
pub(crate) fn box_bottom() -> String { format!("  {}", dim(&format!("└{}┘", "─".repeat(W + 1)))) }
pub(crate) fn box_sep() -> String    { format!("  {}", dim(&format!("├{}┤", "─".repeat(W + 1)))) }

pub(crate) fn box_line(content: &str) -> String {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    format!("  {}  {}{}{}", dim("│"), content, " ".repeat(pad.saturating_sub(1)), dim("│"))
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

pub(crate) fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<18}", key)), val.white())
}

pub(crate) fn step_ok(msg: &str) -> String {
    format!("  {} {}", ok("✓"), msg)
}

pub(crate) fn section(title: &str) -> String {
    format!("\n  {}\n  {}", title.white().bold(), dim(&"─".repeat(56)))
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Interactive shell for configuring, training and tracking tabular classifiers")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON file with the initial session configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run a shell command non-interactively (repeatable)
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    pub commands: Vec<String>,
}

impl Cli {
    pub fn session(&self) -> Result<Session> {
        let config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        Ok(Session::new(config))
    }
}

/// Run the CLI: batch commands if any were given, the shell otherwise.
pub fn run(cli: Cli) -> Result<()> {
    let mut session = cli.session()?;

    if cli.commands.is_empty() {
        return Repl::new(session)?.run();
    }

    for line in &cli.commands {
        println!("{} {}", accent("›"), line);
        match shell::execute_line(&mut session, line) {
            Ok(Reply::Output(text)) => {
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
            Ok(Reply::Quit) => break,
            Err(err) => {
                eprintln!("{}", error(&err.to_string()));
                return Err(err);
            }
        }
    }
    Ok(())
}
