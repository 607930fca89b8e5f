use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};
use crate::view::Filter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "taskdeck: a small interactive to-do list"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    /// Keep everything in memory; nothing is written to disk.
    #[arg(long = "ephemeral")]
    pub ephemeral: bool,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// One line typed into the interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Add {
        title: String,
        description: String,
        due: Option<String>,
    },
    List,
    Filter(Filter),
    Toggle(String),
    Delete(String),
    Undo,
    Theme,
    Wait(u64),
    Help,
    Quit,
}

impl ShellCommand {
    /// Parses a line. Blank lines yield `None`; unknown or ambiguous command
    /// words are errors.
    #[tracing::instrument]
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let lowered = word.to_ascii_lowercase();
        let command = expand_command_abbrev(&lowered, &known_command_names())
            .ok_or_else(|| anyhow!("unknown or ambiguous command: {word}"))?;
        debug!(token = %word, expanded = %command, "resolved command token");

        let parsed = match command {
            "add" => parse_add(rest)?,
            "list" => ShellCommand::List,
            "filter" => ShellCommand::Filter(rest.parse()?),
            "toggle" => ShellCommand::Toggle(require_arg(command, rest)?),
            "delete" => ShellCommand::Delete(require_arg(command, rest)?),
            "undo" => ShellCommand::Undo,
            "theme" => ShellCommand::Theme,
            "wait" => {
                let millis = require_arg(command, rest)?
                    .parse::<u64>()
                    .map_err(|e| anyhow!("wait expects milliseconds: {e}"))?;
                ShellCommand::Wait(millis)
            }
            "help" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            other => return Err(anyhow!("unhandled command: {other}")),
        };

        Ok(Some(parsed))
    }
}

fn require_arg(command: &str, rest: &str) -> anyhow::Result<String> {
    if rest.is_empty() {
        return Err(anyhow!("{command} requires an argument"));
    }
    Ok(rest.to_string())
}

/// `add <title> [| <description>] [due:<date>]`; the `due:` token may appear
/// anywhere among the words.
fn parse_add(rest: &str) -> anyhow::Result<ShellCommand> {
    let mut due = None;
    let mut words = Vec::new();
    for word in rest.split_whitespace() {
        if let Some(value) = word.strip_prefix("due:") {
            due = Some(value.to_string());
        } else {
            words.push(word);
        }
    }
    let text = words.join(" ");

    let (title, description) = match text.split_once('|') {
        Some((title, description)) => (title.trim(), description.trim()),
        None => (text.trim(), ""),
    };
    if title.is_empty() {
        return Err(anyhow!("add requires a title"));
    }

    Ok(ShellCommand::Add {
        title: title.to_string(),
        description: description.to_string(),
        due,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::{ShellCommand, preprocess_args};
    use crate::view::Filter;

    #[test]
    fn parses_add_with_description_and_due() {
        let cmd = ShellCommand::parse("add Buy milk due:tomorrow | two litres")
            .expect("parse")
            .expect("command");
        assert_eq!(
            cmd,
            ShellCommand::Add {
                title: "Buy milk".to_string(),
                description: "two litres".to_string(),
                due: Some("tomorrow".to_string()),
            }
        );
        assert!(ShellCommand::parse("add   ").is_err());
        assert!(ShellCommand::parse("add due:today").is_err());
    }

    #[test]
    fn expands_abbreviations() {
        assert_eq!(
            ShellCommand::parse("del 2").expect("parse"),
            Some(ShellCommand::Delete("2".to_string()))
        );
        assert_eq!(
            ShellCommand::parse("f completed").expect("parse"),
            Some(ShellCommand::Filter(Filter::Completed))
        );
        assert_eq!(ShellCommand::parse("UNDO").expect("parse"), Some(ShellCommand::Undo));
        assert_eq!(ShellCommand::parse("   ").expect("parse"), None);
        assert!(ShellCommand::parse("t 1").is_err());
        assert!(ShellCommand::parse("frobnicate").is_err());
        assert!(ShellCommand::parse("wait soon").is_err());
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let raw: Vec<OsString> = ["taskdeck", "rc.color=off", "-v", "rc.timezone:UTC"]
            .into_iter()
            .map(OsString::from)
            .collect();
        let pre = preprocess_args(&raw).expect("preprocess");
        assert_eq!(
            pre.cleaned_args,
            vec![OsString::from("taskdeck"), OsString::from("-v")]
        );
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.timezone".to_string(), "UTC".to_string()),
            ]
        );
    }
}
