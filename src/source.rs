//! Bundle source files: discovery and record parsing.
//!
//! Source data is newline-delimited JSON, one bundle per line, in files
//! whose names match `bundles-*.jsonl` inside the data directory. Each
//! record nests its charities (`charity_data.charity_items`) and items
//! (`tier_item_data`) as maps keyed by machine name.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use globset::Glob;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use bundle_search_core::models::{Bundle, Entry, EntryKind};

/// One line of a bundle source file.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleRecord {
    pub machine_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub author: String,
    pub basic_data: BasicData,
    pub from_bundle: FromBundle,
    #[serde(default)]
    pub charity_data: CharityData,
    #[serde(default)]
    pub tier_item_data: BTreeMap<String, EntryRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicData {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub human_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub detailed_marketing_blurb: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub short_marketing_blurb: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub media_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FromBundle {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tile_short_name: String,
    #[serde(rename = "start_date|datetime")]
    pub start_date: String,
    #[serde(rename = "end_date|datetime")]
    pub end_date: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub product_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharityData {
    #[serde(default)]
    pub charity_items: BTreeMap<String, EntryRecord>,
}

/// A nested item or charity.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub human_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description_text: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl EntryRecord {
    pub fn to_entry(&self, kind: EntryKind, machine_name: &str, embedding: Vec<f32>) -> Entry {
        Entry {
            kind,
            machine_name: machine_name.to_string(),
            human_name: self.human_name.clone(),
            description: self.description_text.clone(),
            description_embedding: embedding,
        }
    }
}

impl BundleRecord {
    /// Parse one JSON line.
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn charities(&self) -> &BTreeMap<String, EntryRecord> {
        &self.charity_data.charity_items
    }

    pub fn items(&self) -> &BTreeMap<String, EntryRecord> {
        &self.tier_item_data
    }

    /// Start and end timestamps, parsed from the `|datetime` fields.
    pub fn dates(&self) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let start = parse_timestamp(&self.from_bundle.start_date)
            .with_context(|| format!("bad start date for bundle {}", self.machine_name))?;
        let end = parse_timestamp(&self.from_bundle.end_date)
            .with_context(|| format!("bad end date for bundle {}", self.machine_name))?;
        Ok((start, end))
    }

    /// Build the catalog row. Dates are validated before any embedding work
    /// so callers should call [`BundleRecord::dates`] first.
    pub fn to_bundle(
        &self,
        dates: (NaiveDateTime, NaiveDateTime),
        embedding: Vec<f32>,
    ) -> Bundle {
        Bundle {
            machine_name: self.machine_name.clone(),
            author: self.author.clone(),
            human_name: self.basic_data.human_name.clone(),
            description: self.basic_data.description.clone(),
            detailed_marketing_blurb: self.basic_data.detailed_marketing_blurb.clone(),
            short_marketing_blurb: self.basic_data.short_marketing_blurb.clone(),
            media_type: self.basic_data.media_type.clone(),
            name: self.from_bundle.tile_short_name.clone(),
            start_date: dates.0,
            end_date: dates.1,
            url: self.from_bundle.product_url.clone(),
            description_embedding: embedding,
        }
    }
}

/// Parse an ISO-8601 timestamp, with or without fraction and offset.
///
/// Offsets are converted to UTC; naive timestamps are taken as-is.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    bail!("unrecognized timestamp: '{}'", s)
}

/// Find source files directly inside `data_dir` whose names match `pattern`,
/// sorted by path.
pub fn discover_files(data_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !data_dir.is_dir() {
        bail!("data directory does not exist: {}", data_dir.display());
    }

    let matcher = Glob::new(pattern)?.compile_matcher();
    let mut files = Vec::new();

    for entry in WalkDir::new(data_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Streams `(line_number, record)` pairs from one source file, skipping
/// blank lines. Line numbers are 1-based.
pub struct RecordReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl RecordReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open source file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

impl Iterator for RecordReader {
    type Item = Result<(usize, BundleRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = self.line_no;
            let parsed = BundleRecord::parse(&line).with_context(|| {
                format!("{}:{}: invalid bundle record", self.path.display(), line_no)
            });
            return Some(parsed.map(|r| (line_no, r)));
        }
    }
}
