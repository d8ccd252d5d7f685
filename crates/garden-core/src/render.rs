use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::classify::{Bucket, SortedTasks};
use crate::config::Config;
use crate::task::{Schedule, TaskGroup, TaskItem};
use crate::text::{TaskText, format_task_text};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    show_start: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color,
            show_start: cfg.show_start(),
        })
    }

    /// Renderer without color, for captured output.
    pub fn plain(show_start: bool) -> Self {
        Self {
            color: false,
            show_start,
        }
    }

    #[tracing::instrument(skip(self, sorted, today))]
    pub fn print_board(&mut self, sorted: &SortedTasks<'_, TaskItem>, today: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_board(&mut out, sorted, today)
    }

    #[tracing::instrument(skip(self, sorted, today))]
    pub fn print_bucket(
        &mut self,
        sorted: &SortedTasks<'_, TaskItem>,
        bucket: Bucket,
        today: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_bucket(&mut out, bucket, sorted.bucket(bucket), today)
    }

    pub fn write_board<W: Write>(
        &self,
        mut out: W,
        sorted: &SortedTasks<'_, TaskItem>,
        today: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if sorted.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        for (idx, bucket) in Bucket::ALL.into_iter().enumerate() {
            if idx > 0 {
                writeln!(out)?;
            }
            self.write_bucket(&mut out, bucket, sorted.bucket(bucket), today)?;
        }
        Ok(())
    }

    pub fn write_bucket<W: Write>(
        &self,
        mut out: W,
        bucket: Bucket,
        items: &[&TaskItem],
        today: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        writeln!(out, "{} ({})", self.paint(bucket.label(), bucket_color(bucket)), items.len())?;
        if items.is_empty() {
            writeln!(out, "  none")?;
            return Ok(());
        }

        let headers = vec![
            "Task".to_string(),
            "Type".to_string(),
            "Text".to_string(),
            "When".to_string(),
        ];

        let rows = items
            .iter()
            .map(|item| {
                let TaskText { primary, secondary } = format_task_text(*item, today, self.show_start);
                vec![
                    self.paint(&item_label(item), "33"),
                    item.kind().to_string(),
                    primary,
                    secondary,
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, items))]
    pub fn print_groups(&mut self, items: &[TaskItem]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_groups(&mut out, items)
    }

    pub fn write_groups<W: Write>(&self, mut out: W, items: &[TaskItem]) -> anyhow::Result<()> {
        let headers = vec![
            "Key".to_string(),
            "Type".to_string(),
            "Text".to_string(),
            "Path".to_string(),
            "Tasks".to_string(),
        ];

        let rows = items
            .iter()
            .map(|item| {
                let members = match item {
                    TaskItem::Single(task) => task.id.clone(),
                    TaskItem::Group(group) => group_members(group),
                };
                vec![
                    self.paint(item.key(), "33"),
                    item.kind().to_string(),
                    item.text().to_string(),
                    item.path().unwrap_or_default().to_string(),
                    members,
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    pub fn print_task_text(&mut self, id: &str, text: &TaskText) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "id        {id}")?;
        writeln!(out, "primary   {}", text.primary)?;
        writeln!(out, "secondary {}", text.secondary)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn bucket_color(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Overdue => "31",
        Bucket::ThisWeek => "33",
        Bucket::Active => "32",
        Bucket::Next => "36",
        Bucket::Completed => "2",
    }
}

fn item_label(item: &TaskItem) -> String {
    match item {
        TaskItem::Single(task) => task.id.clone(),
        TaskItem::Group(group) if group.instances.len() == 1 => group.instances[0].id.clone(),
        TaskItem::Group(group) => format!("{} tasks", group.instances.len()),
    }
}

fn group_members(group: &TaskGroup) -> String {
    group
        .instances
        .iter()
        .map(|instance| match &instance.plant_instance_id {
            Some(plant) => format!("{}@{plant}", instance.id),
            None => instance.id.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
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

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
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
