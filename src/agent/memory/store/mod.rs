use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const HEADER: &str = "user,content";

/// A durable user-attributed fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    pub user: String,
    pub content: String,
}

impl MemoryRecord {
    pub fn new(user: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            content: content.into(),
        }
    }

    /// Text that gets embedded and returned on recall.
    pub fn document(&self) -> String {
        format!("{} {}", self.user, self.content)
    }
}

/// Append-only two-column CSV table (`user,content`).
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new or empty.
    pub fn append(&self, record: &MemoryRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open memory file {}", self.path.display()))?;

        let mut row = String::new();
        if file.metadata()?.len() == 0 {
            row.push_str(HEADER);
            row.push_str("\r\n");
        }
        row.push_str(&quote_field(&record.user));
        row.push(',');
        row.push_str(&quote_field(&record.content));
        row.push_str("\r\n");

        file.write_all(row.as_bytes())
            .with_context(|| format!("Failed to write memory file {}", self.path.display()))?;
        debug!("memory row appended for {}", record.user);
        Ok(())
    }

    /// Every stored record, in insertion order. A missing file is empty.
    pub fn read_all(&self) -> Result<Vec<MemoryRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        let mut rows = parse_rows(&content).into_iter();
        // Header row
        rows.next();
        Ok(rows
            .filter_map(|mut fields| {
                if fields.len() < 2 {
                    return None;
                }
                let content = fields.swap_remove(1);
                let user = fields.swap_remove(0);
                Some(MemoryRecord { user, content })
            })
            .collect())
    }
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Minimal RFC 4180 reader: quoted fields may hold commas, newlines and
/// doubled quotes. Blank lines are skipped.
fn parse_rows(input: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(std::mem::take(&mut row));
                }
                row.clear();
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
