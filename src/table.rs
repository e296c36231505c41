use std::{borrow::Cow, fmt::Write as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    caption: Option<String>,
}

impl TextTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn alignments(&self) -> Vec<Align> {
        (0..self.headers.len())
            .map(|idx| {
                let mut cells = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(idx))
                    .filter(|cell| !cell.trim().is_empty())
                    .peekable();
                if cells.peek().is_some() && cells.all(|cell| cell.trim().parse::<f64>().is_ok()) {
                    Align::Right
                } else {
                    Align::Left
                }
            })
            .collect()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths = self
            .headers
            .iter()
            .map(|h| display_width(h).max(3))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (idx, cell) in row.iter().enumerate().take(widths.len()) {
                widths[idx] = widths[idx].max(display_width(&flatten(cell)));
            }
        }
        widths
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let aligns = self.alignments();
        let mut output = String::new();
        if let Some(caption) = &self.caption {
            let _ = writeln!(output, "{caption}");
        }
        let _ = writeln!(output, "{}", line(&self.headers, &widths, &aligns));
        let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", line(&rule, &widths, &aligns));
        for row in &self.rows {
            let _ = writeln!(output, "{}", line(row, &widths, &aligns));
        }
        output
    }
}

fn line(cells: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let mut parts = Vec::with_capacity(widths.len());
    for (idx, width) in widths.iter().enumerate() {
        let cell = cells.get(idx).map(|c| flatten(c)).unwrap_or_default();
        let pad = " ".repeat(width.saturating_sub(display_width(&cell)));
        match aligns.get(idx).copied().unwrap_or(Align::Left) {
            Align::Left => parts.push(format!("{cell}{pad}")),
            Align::Right => parts.push(format!("{pad}{cell}")),
        }
    }
    parts.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
