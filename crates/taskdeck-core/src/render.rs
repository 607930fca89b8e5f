use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::clock::Clock;
use crate::config::Config;
use crate::store::KeyValueStore;
use crate::view::{DueBadge, Theme};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_session<W, S, C>(&self, out: &mut W, app: &App<S, C>) -> anyhow::Result<()>
    where
        W: Write,
        S: KeyValueStore,
        C: Clock,
    {
        let theme = app.theme();
        writeln!(out, "To-Do List [{} mode]", theme)?;
        writeln!(out, "{}", tagline(theme))?;
        if let Some(banner) = app.banner() {
            writeln!(out, "{}", self.paint(&format!("! {banner}"), "35"))?;
        }
        writeln!(out, "Filter: {} ({})", app.filter(), app.summary())?;
        writeln!(out)?;

        let visible = app.visible_tasks();
        if visible.is_empty() {
            writeln!(out, "{}", app.empty_message())?;
        } else {
            let today = app.today();
            let headers = vec![
                "#".to_string(),
                "Done".to_string(),
                "Title".to_string(),
                "Due".to_string(),
                "Description".to_string(),
            ];

            let rows = visible
                .iter()
                .enumerate()
                .map(|(idx, task)| {
                    let done = if task.completed { "[x]" } else { "[ ]" };
                    let badge = match DueBadge::for_task(task, today) {
                        Some(DueBadge::Overdue) => self.paint("Overdue", "31"),
                        Some(DueBadge::Today) => self.paint("Due today", "33"),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    };
                    let mut title = task.title.clone();
                    if app.is_exiting(&task.id) {
                        title = self.paint(&format!("{title} (deleting)"), "2");
                    }
                    vec![
                        self.paint(&(idx + 1).to_string(), "33"),
                        done.to_string(),
                        title,
                        badge,
                        task.description.clone(),
                    ]
                })
                .collect();

            write_table(&mut *out, headers, rows)?;
        }

        if let Some(toast) = app.toast() {
            writeln!(out)?;
            writeln!(out, "Deleted \"{}\". Type `undo` to restore it.", toast.title)?;
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn tagline(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "Capture tasks. Set dates. Ship life faster.",
        Theme::Dark => "Build in the dark. Ship in the light.",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{:width$} ", header, width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
