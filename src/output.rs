// Output sink: every component prints through an `Output` handed to it
// instead of writing to stdout directly. `Console` is the real terminal,
// `Capture` records lines so tests can assert on what the user would see.

use std::io::{stdout, Write};
use std::sync::{Arc, Mutex};

use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};

/// Shared handle passed to the wrapper and the orchestrator.
pub type Sink = Arc<dyn Output>;

/// How a line should look. The console maps these to colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Dim,
    Info,
    Heading,
    Success,
    Warning,
    Error,
}

pub trait Output: Send + Sync {
    fn print(&self, tone: Tone, text: &str);

    /// Two columns: dim keys, bright values, keys padded to the widest one.
    fn table(&self, rows: &[(&str, &str)]);

    fn clear(&self);

    fn blank(&self) {
        self.print(Tone::Plain, "");
    }
}

/// Writes styled text to the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Console {
    pub fn sink() -> Sink {
        Arc::new(Console)
    }
}

impl Output for Console {
    fn print(&self, tone: Tone, text: &str) {
        match tone {
            Tone::Plain => println!("{}", text),
            Tone::Dim => println!("{}", text.dim()),
            Tone::Info => println!("{}", text.cyan()),
            Tone::Heading => println!("{}", text.cyan().bold()),
            Tone::Success => println!("{}", text.green()),
            Tone::Warning => println!("{}", text.yellow()),
            Tone::Error => println!("{}", text.red()),
        }
    }

    fn table(&self, rows: &[(&str, &str)]) {
        let width = key_width(rows);
        for (key, value) in rows {
            println!(
                "  {}  {}",
                format!("{:<width$}", key).dim(),
                (*value).white().bold()
            );
        }
    }

    fn clear(&self) {
        let mut out = stdout();
        // Not being able to clear is cosmetic.
        let _ = execute!(out, Clear(ClearType::All), MoveTo(0, 0));
        let _ = out.flush();
    }
}

/// One recorded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Text(Tone, String),
    Row(String, String),
    Cleared,
}

/// Records everything instead of printing it.
#[derive(Debug, Default)]
pub struct Capture {
    lines: Mutex<Vec<Line>>,
}

impl Capture {
    pub fn new() -> Arc<Self> {
        Arc::new(Capture::default())
    }

    pub fn lines(&self) -> Vec<Line> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// All table rows printed so far, in order.
    pub fn rows(&self) -> Vec<(String, String)> {
        self.lines()
            .into_iter()
            .filter_map(|l| match l {
                Line::Row(k, v) => Some((k, v)),
                _ => None,
            })
            .collect()
    }

    /// True if any text line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| match l {
            Line::Text(_, text) => text.contains(needle),
            _ => false,
        })
    }

    pub fn contains_tone(&self, tone: Tone, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|l| matches!(l, Line::Text(t, text) if *t == tone && text.contains(needle)))
    }

    fn push(&self, line: Line) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl Output for Capture {
    fn print(&self, tone: Tone, text: &str) {
        self.push(Line::Text(tone, text.to_string()));
    }

    fn table(&self, rows: &[(&str, &str)]) {
        for (k, v) in rows {
            self.push(Line::Row(k.to_string(), v.to_string()));
        }
    }

    fn clear(&self) {
        self.push(Line::Cleared);
    }
}

fn key_width(rows: &[(&str, &str)]) -> usize {
    rows.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0)
}
