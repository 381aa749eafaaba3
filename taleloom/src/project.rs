//! Game-project content hook: manifest loading and the lore seed read at
//! run creation.
//!
//! Content loading beyond this hook (corpus indexing, seed tables) belongs
//! to the game project tooling; the router only needs the manifest JSON and
//! the two lore seed files.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::contracts::LoreEntry;
use crate::modules::{ModuleRole, Registry};

/// Manifest file name inside a game project directory.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Markdown lore seed, stored under subject `world_context`.
pub const WORLD_LORE_FILE: &str = "lore/world.md";
/// CSV lore seed with headers `subject` and one of `data`, `description`,
/// `entry`.
pub const LORE_CSV_FILE: &str = "lore/default_lore_entries.csv";

#[derive(Debug, Error, Diagnostic)]
pub enum ProjectError {
    #[error("game project not found: {id}")]
    #[diagnostic(code(taleloom::project::not_found))]
    NotFound { id: String },

    #[error("I/O error reading game project: {0}")]
    #[diagnostic(code(taleloom::project::io))]
    Io(#[from] std::io::Error),

    #[error("manifest is not valid JSON: {source}")]
    #[diagnostic(
        code(taleloom::project::manifest),
        help("Check manifest.json in the game project directory.")
    )]
    Manifest {
        #[from]
        source: serde_json::Error,
    },
}

/// A located game project directory.
#[derive(Debug, Clone)]
pub struct GameProject {
    id: String,
    dir: PathBuf,
}

impl GameProject {
    /// Locate a project under the game projects root.
    pub fn locate(root: &Path, id: &str) -> Result<Self, ProjectError> {
        let dir = root.join(id);
        if !dir.is_dir() {
            return Err(ProjectError::NotFound { id: id.to_string() });
        }
        Ok(Self {
            id: id.to_string(),
            dir,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the manifest JSON verbatim.
    pub fn manifest(&self) -> Result<Value, ProjectError> {
        let raw = std::fs::read_to_string(self.dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Module bindings declared by the manifest, for registry resolution.
    pub fn module_bindings(&self) -> FxHashMap<ModuleRole, String> {
        self.manifest()
            .map(|manifest| Registry::bindings_from_manifest(&manifest))
            .unwrap_or_default()
    }

    /// Collect the lore seed for a new run. Missing seed files are fine;
    /// the seed is optional content.
    pub fn lore_seed(&self) -> Vec<LoreEntry> {
        let mut entries = Vec::new();

        if let Ok(world) = std::fs::read_to_string(self.dir.join(WORLD_LORE_FILE)) {
            if !world.trim().is_empty() {
                entries.push(LoreEntry {
                    subject: "world_context".to_string(),
                    data: world,
                    source: WORLD_LORE_FILE.to_string(),
                });
            }
        }

        if let Ok(csv) = std::fs::read_to_string(self.dir.join(LORE_CSV_FILE)) {
            entries.extend(parse_lore_csv(&csv, LORE_CSV_FILE));
        }

        entries
    }
}

/// Parse the lore CSV: header row names the columns, `subject` is required,
/// and the data column is the first present of `data`, `description`,
/// `entry`. Rows missing either value are dropped.
fn parse_lore_csv(text: &str, source: &str) -> Vec<LoreEntry> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns: Vec<String> = split_csv_line(header)
        .into_iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .collect();
    let Some(subject_idx) = columns.iter().position(|c| c == "subject") else {
        return Vec::new();
    };
    let Some(data_idx) = ["data", "description", "entry"]
        .iter()
        .find_map(|name| columns.iter().position(|c| c == name))
    else {
        return Vec::new();
    };

    lines
        .filter_map(|line| {
            let fields = split_csv_line(line);
            let subject = fields.get(subject_idx)?.trim();
            let data = fields.get(data_idx)?.trim();
            if subject.is_empty() || data.is_empty() {
                return None;
            }
            Some(LoreEntry {
                subject: subject.to_string(),
                data: data.to_string(),
                source: source.to_string(),
            })
        })
        .collect()
}

/// Split one CSV line, honoring double-quoted fields with `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
