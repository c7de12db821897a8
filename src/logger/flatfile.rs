//! FlatFile - one delimited row per committed observation
//!
//! ## Layout
//!
//! One file per (suite, problem, dimension, instance), named from a
//! template. Each row holds, in order:
//!
//! ```text
//! [suite problem name instance direction dimension run]   (store_meta)
//! evaluations raw_y transformed_y y_best                  (always)
//! <watched properties, attachment order>
//! [x0 .. x{d-1}]                                          (store_positions)
//! ```
//!
//! The header is written once per file, or at every run start with
//! `repeat_header`. Rows are buffered and flushed at run end unless
//! `flush_each` is set.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::watcher::{Record, Sink, Watcher};
use crate::context::{EvaluationContext, ProblemMeta, RunId};
use crate::property::{Property, Value};
use crate::trigger::Trigger;
use crate::{Error, Result};

/// Default file-name template.
pub const DEFAULT_TEMPLATE: &str = "{suite}_f{problem_id}_{name}_DIM{dimension}_i{instance}.dat";

/// Columns written for every row, before the watched properties.
pub const FIXED_COLUMNS: [&str; 4] = ["evaluations", "raw_y", "transformed_y", "y_best"];

/// Columns written first when `store_meta` is set.
pub const META_COLUMNS: [&str; 7] = [
    "suite",
    "problem_id",
    "name",
    "instance",
    "direction",
    "dimension",
    "run",
];

/// Flat-file layout and buffering options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatFileOptions {
    directory: PathBuf,
    template: String,
    separator: char,
    missing: String,
    repeat_header: bool,
    flush_each: bool,
    store_positions: bool,
    store_meta: bool,
}

impl Default for FlatFileOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            template: DEFAULT_TEMPLATE.to_string(),
            separator: '\t',
            missing: "None".to_string(),
            repeat_header: false,
            flush_each: false,
            store_positions: false,
            store_meta: false,
        }
    }
}

impl FlatFileOptions {
    /// Default options writing into `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Create a builder starting from the defaults.
    #[must_use]
    pub fn builder(directory: impl Into<PathBuf>) -> FlatFileOptionsBuilder {
        FlatFileOptionsBuilder::new(directory)
    }

    /// Output directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Column separator.
    #[must_use]
    pub const fn separator(&self) -> char {
        self.separator
    }

    /// Token written for missing fields.
    #[must_use]
    pub fn missing(&self) -> &str {
        &self.missing
    }

    /// Whether the header is repeated at every run start.
    #[must_use]
    pub const fn repeat_header(&self) -> bool {
        self.repeat_header
    }

    /// Whether decision vectors are written.
    #[must_use]
    pub const fn store_positions(&self) -> bool {
        self.store_positions
    }

    /// Whether meta-data columns are written.
    #[must_use]
    pub const fn store_meta(&self) -> bool {
        self.store_meta
    }

    /// Path of the file holding rows of `meta`.
    #[must_use]
    pub fn path_for(&self, meta: &ProblemMeta) -> PathBuf {
        let name = self
            .template
            .replace("{suite}", &meta.suite)
            .replace("{problem_id}", &meta.problem_id.to_string())
            .replace("{name}", &meta.name)
            .replace("{dimension}", &meta.dimension.to_string())
            .replace("{instance}", &meta.instance.to_string());
        self.directory.join(name)
    }

    /// Check the options.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for an empty template, a non-ASCII
    /// or line-breaking separator, or a missing token containing the
    /// separator.
    pub fn validate(&self) -> Result<()> {
        if self.template.trim().is_empty() {
            return Err(Error::Configuration("file-name template is empty".to_string()));
        }
        if !self.separator.is_ascii() || matches!(self.separator, '\n' | '\r' | '"') {
            return Err(Error::Configuration(format!(
                "unusable separator {:?}",
                self.separator
            )));
        }
        if self.missing.is_empty() || self.missing.contains(self.separator) {
            return Err(Error::Configuration(format!(
                "missing-value token {:?} is empty or contains the separator",
                self.missing
            )));
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn delimiter(&self) -> u8 {
        // Validated as ASCII.
        self.separator as u8
    }
}

/// Builder for [`FlatFileOptions`].
#[derive(Debug, Clone)]
pub struct FlatFileOptionsBuilder {
    options: FlatFileOptions,
}

impl FlatFileOptionsBuilder {
    /// Start from the defaults.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            options: FlatFileOptions::new(directory),
        }
    }

    /// File-name template; `{suite}`, `{problem_id}`, `{name}`,
    /// `{dimension}` and `{instance}` are substituted. May contain `/`.
    #[must_use]
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.options.template = template.into();
        self
    }

    /// Column separator (default tab).
    #[must_use]
    pub const fn separator(mut self, separator: char) -> Self {
        self.options.separator = separator;
        self
    }

    /// Token for missing fields (default `None`).
    #[must_use]
    pub fn missing(mut self, token: impl Into<String>) -> Self {
        self.options.missing = token.into();
        self
    }

    /// Repeat the header at every run start.
    #[must_use]
    pub const fn repeat_header(mut self, repeat: bool) -> Self {
        self.options.repeat_header = repeat;
        self
    }

    /// Flush after every row instead of at run end.
    #[must_use]
    pub const fn flush_each(mut self, flush: bool) -> Self {
        self.options.flush_each = flush;
        self
    }

    /// Write the decision vector as `x0..x{d-1}`.
    #[must_use]
    pub const fn store_positions(mut self, store: bool) -> Self {
        self.options.store_positions = store;
        self
    }

    /// Prefix every row with problem and run meta-data.
    #[must_use]
    pub const fn store_meta(mut self, store: bool) -> Self {
        self.options.store_meta = store;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// See [`FlatFileOptions::validate`].
    pub fn build(self) -> Result<FlatFileOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// One open output file.
struct OpenFile {
    writer: csv::Writer<BufWriter<File>>,
    header: Vec<String>,
}

/// Capture strategy writing delimited rows.
pub struct FlatFileSink {
    options: FlatFileOptions,
    files: FxHashMap<PathBuf, OpenFile>,
    current: Option<Current>,
}

struct Current {
    run: RunId,
    meta: ProblemMeta,
    path: PathBuf,
}

impl FlatFileSink {
    /// Create a sink; no file is opened before the first run.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for invalid options.
    pub fn new(options: FlatFileOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            files: FxHashMap::default(),
            current: None,
        })
    }

    /// Layout options.
    #[must_use]
    pub const fn options(&self) -> &FlatFileOptions {
        &self.options
    }

    /// Paths of every file opened so far.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn header(&self, meta: &ProblemMeta, properties: &[Arc<dyn Property>]) -> Vec<String> {
        let mut header = Vec::new();
        if self.options.store_meta {
            header.extend(META_COLUMNS.iter().map(ToString::to_string));
        }
        header.extend(FIXED_COLUMNS.iter().map(ToString::to_string));
        header.extend(properties.iter().map(|p| p.name().to_string()));
        if self.options.store_positions {
            header.extend((0..meta.dimension).map(|i| format!("x{i}")));
        }
        header
    }

    fn open(&mut self, path: &Path) -> Result<()> {
        if self.files.contains_key(path) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let writer = csv::WriterBuilder::new()
            .delimiter(self.options.delimiter())
            .has_headers(false)
            .flexible(true)
            .from_writer(BufWriter::new(file));
        debug!(path = %path.display(), "flat file opened");
        self.files.insert(
            path.to_path_buf(),
            OpenFile {
                writer,
                header: Vec::new(),
            },
        );
        Ok(())
    }

    fn row(
        &self,
        current: &Current,
        ctx: &EvaluationContext<'_>,
        properties: &[Arc<dyn Property>],
        record: &Record,
    ) -> Vec<String> {
        let meta = &current.meta;
        let mut row = Vec::with_capacity(FIXED_COLUMNS.len() + record.values().len());
        if self.options.store_meta {
            row.extend([
                meta.suite.clone(),
                meta.problem_id.to_string(),
                meta.name.clone(),
                meta.instance.to_string(),
                meta.direction.label().to_string(),
                meta.dimension.to_string(),
                current.run.to_string(),
            ]);
        }
        row.push(record.evaluations().to_string());
        row.extend(
            [ctx.raw_y(), ctx.transformed_y(), ctx.transformed_y_best()]
                .map(|y| Value::Real(y).to_string()),
        );
        row.extend(properties.iter().zip(record.values()).map(|(p, v)| {
            v.as_ref()
                .map_or_else(|| self.options.missing.clone(), |v| p.format(v))
        }));
        if self.options.store_positions {
            let x = ctx.x();
            row.extend((0..meta.dimension).map(|i| {
                x.get(i).map_or_else(
                    || self.options.missing.clone(),
                    |xi| Value::Real(*xi).to_string(),
                )
            }));
        }
        row
    }

    fn flush_all(&mut self) -> Result<()> {
        for file in self.files.values_mut() {
            file.writer.flush()?;
        }
        Ok(())
    }
}

impl Sink for FlatFileSink {
    fn begin_run(
        &mut self,
        run: RunId,
        meta: &ProblemMeta,
        properties: &[Arc<dyn Property>],
    ) -> Result<()> {
        let path = self.options.path_for(meta);
        self.open(&path)?;
        let header = self.header(meta, properties);
        let repeat = self.options.repeat_header;
        if let Some(file) = self.files.get_mut(&path) {
            if repeat || file.header != header {
                file.writer.write_record(&header)?;
                file.header = header;
            }
        }
        self.current = Some(Current {
            run,
            meta: meta.clone(),
            path,
        });
        Ok(())
    }

    fn commit(
        &mut self,
        ctx: &EvaluationContext<'_>,
        properties: &[Arc<dyn Property>],
        record: Record,
    ) -> Result<()> {
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| Error::RunState("commit outside of any run".to_string()))?;
        let row = self.row(current, ctx, properties, &record);
        let flush = self.options.flush_each;
        let file = self
            .files
            .get_mut(&current.path)
            .ok_or_else(|| Error::RunState(format!("no open file for run {}", current.run)))?;
        file.writer.write_record(&row)?;
        if flush {
            file.writer.flush()?;
        }
        trace!(evaluations = record.evaluations(), "row written");
        Ok(())
    }

    fn end_run(&mut self, run: RunId) -> Result<()> {
        if let Some(current) = self.current.take() {
            if let Some(file) = self.files.get_mut(&current.path) {
                file.writer.flush()?;
            }
            debug!(run = run.0, path = %current.path.display(), "flat file flushed");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush_all()?;
        self.files.clear();
        Ok(())
    }
}

/// Logger writing one row per committed observation.
pub type FlatFile = Watcher<FlatFileSink>;

impl Watcher<FlatFileSink> {
    /// Create a flat-file logger.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for invalid options.
    pub fn new(trigger: impl Trigger + 'static, options: FlatFileOptions) -> Result<Self> {
        Ok(Self::with_sink(trigger, FlatFileSink::new(options)?))
    }
}

/// Rows parsed back from a flat file.
///
/// Every row keeps the header it was written under, so files whose
/// property set changed between runs read back column by column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatTable {
    rows: Vec<(Arc<[String]>, Vec<String>)>,
    last_header: Arc<[String]>,
    missing: String,
}

impl FlatTable {
    /// Column names of the last header read.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.last_header
    }

    /// Column names `row` was written under.
    #[must_use]
    pub fn columns_of(&self, row: usize) -> Option<&[String]> {
        self.rows.get(row).map(|(header, _)| &header[..])
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw field text.
    #[must_use]
    pub fn field(&self, row: usize, column: &str) -> Option<&str> {
        let (header, fields) = self.rows.get(row)?;
        let col = header.iter().position(|c| c == column)?;
        fields.get(col).map(String::as_str)
    }

    /// Parsed numeric field; `Ok(None)` for a missing-value token.
    ///
    /// # Errors
    ///
    /// Returns `Error::Other` if the column is unknown or the field is not
    /// numeric.
    pub fn value(&self, row: usize, column: &str) -> Result<Option<Value>> {
        let text = self
            .field(row, column)
            .ok_or_else(|| Error::Other(format!("no field {column:?} in row {row}")))?;
        if text == self.missing {
            return Ok(None);
        }
        text.parse().map(Some)
    }
}

/// Whether `fields` is a header line for files written with `options`.
fn is_header(fields: &[String], options: &FlatFileOptions) -> bool {
    let (meta, rest) = if options.store_meta {
        if fields.len() < META_COLUMNS.len() {
            return false;
        }
        fields.split_at(META_COLUMNS.len())
    } else {
        (&fields[..0], fields)
    };
    let meta_matches = !options.store_meta || meta.iter().zip(META_COLUMNS).all(|(f, c)| f == c);
    meta_matches
        && rest.len() >= FIXED_COLUMNS.len()
        && rest.iter().zip(FIXED_COLUMNS).all(|(f, c)| f == c)
}

/// Read a file written by [`FlatFile`] back.
///
/// A header line is recognized by its fixed columns. Every later header
/// (repeated with `repeat_header`, or changed between runs) applies to the
/// rows that follow it.
///
/// # Errors
///
/// Returns IO and CSV errors, or `Error::Other` for a file that does not
/// start with a header.
pub fn read_records(path: impl AsRef<Path>, options: &FlatFileOptions) -> Result<FlatTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter())
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_ref())?;

    let mut header: Option<Arc<[String]>> = None;
    let mut rows = Vec::new();
    for result in reader.records() {
        let fields: Vec<String> = result?.iter().map(ToString::to_string).collect();
        if is_header(&fields, options) {
            header = Some(fields.into());
            continue;
        }
        let current = header.as_ref().ok_or_else(|| {
            Error::Other(format!("{} does not start with a header", path.as_ref().display()))
        })?;
        rows.push((Arc::clone(current), fields));
    }

    let last_header = header
        .ok_or_else(|| Error::Other(format!("{} has no header", path.as_ref().display())))?;
    Ok(FlatTable {
        rows,
        last_header,
        missing: options.missing.clone(),
    })
}
