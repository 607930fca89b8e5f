use std::io::{BufRead, Write};
use std::time::Duration as StdDuration;

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::app::App;
use crate::cli::ShellCommand;
use crate::clock::Clock;
use crate::datetime::parse_due_input;
use crate::render::Renderer;
use crate::store::KeyValueStore;
use crate::undo::DeletionState;

const MAX_DRAIN_STEPS: usize = 8;

const HELP: &str = "\
commands:
  add <title> [| description] [due:<date>]   create a task (date: YYYY-MM-DD, today, tomorrow, +Nd, +Nw)
  list                                       show the current view
  filter <all|active|completed>              change the view
  toggle <n|id>                              flip completion
  delete <n|id>                              delete (undo stays available)
  undo                                       restore the last deleted task
  theme                                      switch light/dark mode
  wait <ms>                                  let time pass
  help                                       this text
  quit                                       leave";

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "list", "filter", "toggle", "delete", "undo", "theme", "wait", "help", "quit",
        "exit",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Wait(StdDuration),
    Quit,
}

#[instrument(skip(app, renderer, out))]
pub fn dispatch<S, C, W>(
    app: &mut App<S, C>,
    renderer: &Renderer,
    out: &mut W,
    command: ShellCommand,
) -> anyhow::Result<Flow>
where
    S: KeyValueStore,
    C: Clock,
    W: Write,
{
    app.tick();
    match command {
        ShellCommand::Add {
            title,
            description,
            due,
        } => {
            let due = match due {
                Some(raw) => parse_due_input(&raw, app.today())?,
                None => None,
            };
            let task = app
                .add_task(&title, &description, due)
                .ok_or_else(|| anyhow!("a task needs a non-empty title"))?;
            info!(id = %task.id, "task created");
        }
        ShellCommand::List => {}
        ShellCommand::Filter(filter) => app.set_filter(filter),
        ShellCommand::Toggle(target) => {
            let id = resolve_target(app, &target)?;
            app.toggle_task(&id);
        }
        ShellCommand::Delete(target) => {
            let id = resolve_target(app, &target)?;
            app.request_delete(&id);
        }
        ShellCommand::Undo => {
            if !app.undo() {
                writeln!(out, "Nothing to restore.")?;
            }
        }
        ShellCommand::Theme => {
            app.toggle_theme();
        }
        ShellCommand::Wait(millis) => return Ok(Flow::Wait(StdDuration::from_millis(millis))),
        ShellCommand::Help => {
            writeln!(out, "{HELP}")?;
            return Ok(Flow::Continue);
        }
        ShellCommand::Quit => return Ok(Flow::Quit),
    }

    app.tick();
    renderer.print_session(out, app)?;
    Ok(Flow::Continue)
}

/// Resolves a 1-based row number in the current view, or a literal task id.
fn resolve_target<S: KeyValueStore, C: Clock>(
    app: &App<S, C>,
    target: &str,
) -> anyhow::Result<String> {
    let visible = app.visible_tasks();
    if let Ok(row) = target.parse::<usize>()
        && row >= 1
        && let Some(task) = visible.get(row - 1)
    {
        return Ok(task.id.clone());
    }

    if app.repository().contains(target) {
        return Ok(target.to_string());
    }

    Err(anyhow!("no task matches {target}"))
}

/// Reads commands until end of input or `quit`. Errors from a single
/// command are reported and the session continues.
#[instrument(skip_all)]
pub fn run_session<S, C, R, W, F>(
    app: &mut App<S, C>,
    renderer: &Renderer,
    input: R,
    out: &mut W,
    mut wait: F,
) -> anyhow::Result<()>
where
    S: KeyValueStore,
    C: Clock,
    R: BufRead,
    W: Write,
    F: FnMut(StdDuration),
{
    renderer.print_session(out, app)?;

    for line in input.lines() {
        let line = line.context("failed reading input")?;
        let command = match ShellCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                warn!(error = %err, "rejected input");
                writeln!(out, "error: {err:#}")?;
                continue;
            }
        };

        match dispatch(app, renderer, out, command) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Wait(duration)) => {
                debug!(?duration, "waiting");
                wait(duration);
                app.tick();
                renderer.print_session(out, app)?;
            }
            Ok(Flow::Quit) => break,
            Err(err) => {
                warn!(error = %err, "command failed");
                writeln!(out, "error: {err:#}")?;
            }
        }
        out.flush()?;
    }

    // Let a pending removal land before the process exits.
    for _ in 0..MAX_DRAIN_STEPS {
        if app.deletion_state() == DeletionState::Idle {
            break;
        }
        let Some(deadline) = app.next_deadline() else {
            break;
        };
        let remaining = (deadline - app.now()).to_std().unwrap_or_default();
        wait(remaining);
        app.tick();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::{Duration, TimeZone, Utc};

    use super::{expand_command_abbrev, known_command_names, run_session};
    use crate::app::App;
    use crate::clock::ManualClock;
    use crate::render::Renderer;
    use crate::repository::load;
    use crate::store::MemoryStore;

    #[test]
    fn abbreviation_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("li", &known), Some("list"));
        assert_eq!(expand_command_abbrev("th", &known), Some("theme"));
        assert_eq!(expand_command_abbrev("t", &known), None);
        assert_eq!(expand_command_abbrev("zzz", &known), None);
    }

    #[test]
    fn scripted_session_deletes_and_undoes() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
                .single()
                .expect("valid now"),
        );
        let mut app = App::new(&store, &clock);
        let script = "\
add Write report due:+3d
add Buy bread
delete 2
undo
wait 500
toggle 1
filter completed
bogus
delete 1
";
        let mut out = Vec::new();
        run_session(
            &mut app,
            &Renderer::plain(),
            Cursor::new(script),
            &mut out,
            |d| clock.advance(Duration::from_std(d).expect("duration in range")),
        )
        .expect("session");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("error: unknown or ambiguous command: bogus"));

        let stored = load(&store);
        let titles: Vec<&str> = stored.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Buy bread"]);
        assert!(!stored[0].completed);
    }
}
