//! Analyzer - flat rows plus per-problem JSON experiment summaries
//!
//! ## Layout
//!
//! ```text
//! <root>/<folder>/
//!   IOHprofiler_f{id}_{name}.json                     one per problem
//!   data_f{id}_{name}/IOHprofiler_f{id}_DIM{d}.dat    rows, header per run
//! ```
//!
//! The JSON summary holds the experiment (suite, function, direction,
//! algorithm, attributes), one scenario per dimension, and one entry per
//! run with its best point and degraded-observation count. It is rewritten
//! at every run end, so an interrupted experiment still leaves a readable
//! summary behind.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::flatfile::{FlatFileOptions, FlatFileSink};
use super::watcher::{Record, Sink, Watcher};
use crate::context::{EvaluationContext, ProblemMeta, RunId};
use crate::property::{Property, Value};
use crate::trigger::Trigger;
use crate::{Error, Result};

/// Summary format version.
pub const VERSION: &str = "0.3.5";

const DATA_TEMPLATE: &str = "data_f{problem_id}_{name}/IOHprofiler_f{problem_id}_DIM{dimension}.dat";

/// Analyzer output options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerOptions {
    root: PathBuf,
    folder: String,
    algorithm_name: String,
    algorithm_info: String,
    store_positions: bool,
    experiment_attributes: BTreeMap<String, String>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            folder: "ioh_data".to_string(),
            algorithm_name: "algorithm_name".to_string(),
            algorithm_info: "algorithm_info".to_string(),
            store_positions: false,
            experiment_attributes: BTreeMap::new(),
        }
    }
}

impl AnalyzerOptions {
    /// Create a builder writing below `root`.
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>) -> AnalyzerOptionsBuilder {
        AnalyzerOptionsBuilder::new(root)
    }

    /// Algorithm name written into summaries.
    #[must_use]
    pub fn algorithm_name(&self) -> &str {
        &self.algorithm_name
    }
}

/// Builder for [`AnalyzerOptions`].
#[derive(Debug, Clone)]
pub struct AnalyzerOptionsBuilder {
    options: AnalyzerOptions,
}

impl AnalyzerOptionsBuilder {
    /// Start from the defaults.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            options: AnalyzerOptions {
                root: root.into(),
                ..AnalyzerOptions::default()
            },
        }
    }

    /// Experiment folder name below the root.
    #[must_use]
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.options.folder = folder.into();
        self
    }

    /// Algorithm name and free-form description.
    #[must_use]
    pub fn algorithm(mut self, name: impl Into<String>, info: impl Into<String>) -> Self {
        self.options.algorithm_name = name.into();
        self.options.algorithm_info = info.into();
        self
    }

    /// Write decision vectors into the data files.
    #[must_use]
    pub const fn store_positions(mut self, store: bool) -> Self {
        self.options.store_positions = store;
        self
    }

    /// Add a constant experiment attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.experiment_attributes.insert(key.into(), value.into());
        self
    }

    /// Build the options.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for an empty folder name.
    pub fn build(self) -> Result<AnalyzerOptions> {
        if self.options.folder.trim().is_empty() {
            return Err(Error::Configuration("analyzer folder name is empty".to_string()));
        }
        Ok(self.options)
    }
}

/// Algorithm description in a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmInfo {
    /// Algorithm name.
    pub name: String,
    /// Free-form description.
    pub info: String,
}

/// Best point reached during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPoint {
    /// Evaluation count at which it was found.
    pub evals: u64,
    /// Transformed objective value.
    pub y: f64,
    /// Decision vector.
    pub x: Vec<f64>,
}

/// One run entry of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Problem instance.
    pub instance: u32,
    /// Evaluations performed.
    pub evals: u64,
    /// Best point, absent if nothing was evaluated.
    pub best: Option<BestPoint>,
    /// Last value of each run attribute.
    pub run_attributes: BTreeMap<String, Option<Value>>,
    /// Committed observations with missing fields.
    pub degraded: u64,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub ended_at: Option<DateTime<Utc>>,
}

/// All runs on one dimension of a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Problem dimension.
    pub dimension: usize,
    /// Data file, relative to the experiment folder.
    pub path: String,
    /// Runs, in start order.
    pub runs: Vec<RunSummary>,
}

/// JSON summary of every run on one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    /// Format version.
    pub version: String,
    /// Suite name.
    pub suite: String,
    /// Problem id.
    pub function_id: u32,
    /// Problem name.
    pub function_name: String,
    /// Whether larger values are better.
    pub maximization: bool,
    /// Algorithm under test.
    pub algorithm: AlgorithmInfo,
    /// Constant attributes of the experiment.
    pub experiment_attributes: BTreeMap<String, String>,
    /// Names of the per-run attributes.
    pub run_attributes: Vec<String>,
    /// Names of the watched properties (data columns).
    pub attributes: Vec<String>,
    /// One scenario per dimension.
    pub scenarios: Vec<Scenario>,
}

impl ExperimentSummary {
    /// Load a summary written by [`Analyzer`].
    ///
    /// # Errors
    ///
    /// Returns IO or JSON errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// File name of the summary of `meta`.
    #[must_use]
    pub fn file_name(meta: &ProblemMeta) -> String {
        format!("IOHprofiler_f{}_{}.json", meta.problem_id, meta.name)
    }
}

struct OpenRun {
    key: (u32, String),
    dimension: usize,
    summary: RunSummary,
}

/// Capture strategy producing analyzer output.
pub struct AnalyzerSink {
    options: AnalyzerOptions,
    output: PathBuf,
    rows: FlatFileSink,
    run_attributes: Vec<Arc<dyn Property>>,
    summaries: BTreeMap<(u32, String), ExperimentSummary>,
    current: Option<OpenRun>,
    started: bool,
}

impl AnalyzerSink {
    /// Create the experiment folder (first free `<folder>`, `<folder>-1`, ...).
    ///
    /// # Errors
    ///
    /// Returns IO errors when the folder cannot be created.
    pub fn new(options: AnalyzerOptions) -> Result<Self> {
        let output = free_folder(&options.root, &options.folder);
        fs::create_dir_all(&output)?;
        debug!(path = %output.display(), "analyzer folder created");

        let rows = FlatFileSink::new(
            FlatFileOptions::builder(&output)
                .template(DATA_TEMPLATE)
                .separator(' ')
                .repeat_header(true)
                .store_positions(options.store_positions)
                .build()?,
        )?;
        Ok(Self {
            options,
            output,
            rows,
            run_attributes: Vec::new(),
            summaries: BTreeMap::new(),
            current: None,
            started: false,
        })
    }

    /// Experiment folder actually used.
    #[must_use]
    pub fn output_directory(&self) -> &Path {
        &self.output
    }

    /// Path of the JSON summary of `meta`.
    #[must_use]
    pub fn summary_path(&self, meta: &ProblemMeta) -> PathBuf {
        self.output.join(ExperimentSummary::file_name(meta))
    }

    /// Summary kept in memory for `meta`.
    #[must_use]
    pub fn summary(&self, meta: &ProblemMeta) -> Option<&ExperimentSummary> {
        self.summaries.get(&(meta.problem_id, meta.name.clone()))
    }

    /// Add a constant experiment attribute.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` once logging has started.
    pub fn add_experiment_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.ensure_not_started("experiment attributes")?;
        self.options
            .experiment_attributes
            .insert(key.into(), value.into());
        Ok(())
    }

    /// Record the last value of `property` in every run entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` once logging has started and
    /// `Error::DuplicateName` for a second attribute with the same name.
    pub fn add_run_attribute(&mut self, property: impl Property + 'static) -> Result<()> {
        self.ensure_not_started("run attributes")?;
        if self.run_attributes.iter().any(|p| p.name() == property.name()) {
            return Err(Error::DuplicateName(property.name().to_string()));
        }
        self.run_attributes.push(Arc::new(property));
        Ok(())
    }

    fn ensure_not_started(&self, what: &str) -> Result<()> {
        if self.started {
            return Err(Error::Configuration(format!(
                "{what} cannot change once logging has started"
            )));
        }
        Ok(())
    }

    fn write_summary(&self, key: &(u32, String)) -> Result<()> {
        let Some(summary) = self.summaries.get(key) else {
            return Ok(());
        };
        let path = self
            .output
            .join(format!("IOHprofiler_f{}_{}.json", key.0, key.1));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, summary)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        debug!(path = %path.display(), "summary written");
        Ok(())
    }

    fn new_summary(&self, meta: &ProblemMeta, properties: &[Arc<dyn Property>]) -> ExperimentSummary {
        ExperimentSummary {
            version: VERSION.to_string(),
            suite: meta.suite.clone(),
            function_id: meta.problem_id,
            function_name: meta.name.clone(),
            maximization: meta.direction == crate::context::Direction::Maximize,
            algorithm: AlgorithmInfo {
                name: self.options.algorithm_name.clone(),
                info: self.options.algorithm_info.clone(),
            },
            experiment_attributes: self.options.experiment_attributes.clone(),
            run_attributes: self
                .run_attributes
                .iter()
                .map(|p| p.name().to_string())
                .collect(),
            attributes: properties.iter().map(|p| p.name().to_string()).collect(),
            scenarios: Vec::new(),
        }
    }
}

fn free_folder(root: &Path, folder: &str) -> PathBuf {
    let mut candidate = root.join(folder);
    let mut suffix = 0_u32;
    while candidate.exists() {
        suffix += 1;
        candidate = root.join(format!("{folder}-{suffix}"));
    }
    candidate
}

impl Sink for AnalyzerSink {
    fn begin_run(
        &mut self,
        run: RunId,
        meta: &ProblemMeta,
        properties: &[Arc<dyn Property>],
    ) -> Result<()> {
        self.started = true;
        self.rows.begin_run(run, meta, properties)?;

        let key = (meta.problem_id, meta.name.clone());
        if !self.summaries.contains_key(&key) {
            let summary = self.new_summary(meta, properties);
            self.summaries.insert(key.clone(), summary);
        }
        self.current = Some(OpenRun {
            key,
            dimension: meta.dimension,
            summary: RunSummary {
                instance: meta.instance,
                evals: 0,
                best: None,
                run_attributes: self
                    .run_attributes
                    .iter()
                    .map(|p| (p.name().to_string(), None))
                    .collect(),
                degraded: 0,
                started_at: Utc::now(),
                ended_at: None,
            },
        });
        Ok(())
    }

    fn observe(&mut self, ctx: &EvaluationContext<'_>) -> Result<()> {
        let Some(open) = self.current.as_mut() else {
            return Err(Error::RunState("observation outside of any run".to_string()));
        };
        let run = &mut open.summary;
        run.evals = ctx.evaluations();
        let improved = run
            .best
            .as_ref()
            .map_or(true, |best| ctx.direction().improves(ctx.transformed_y(), best.y));
        if improved && !ctx.transformed_y().is_nan() {
            run.best = Some(BestPoint {
                evals: ctx.evaluations(),
                y: ctx.transformed_y(),
                x: ctx.x().to_vec(),
            });
        }
        for property in &self.run_attributes {
            run.run_attributes
                .insert(property.name().to_string(), property.value(ctx).ok());
        }
        Ok(())
    }

    fn commit(
        &mut self,
        ctx: &EvaluationContext<'_>,
        properties: &[Arc<dyn Property>],
        record: Record,
    ) -> Result<()> {
        if record.is_degraded() {
            if let Some(open) = self.current.as_mut() {
                open.summary.degraded += 1;
            }
        }
        self.rows.commit(ctx, properties, record)
    }

    fn end_run(&mut self, run: RunId) -> Result<()> {
        self.rows.end_run(run)?;
        let Some(mut open) = self.current.take() else {
            return Ok(());
        };
        open.summary.ended_at = Some(Utc::now());

        let Some(summary) = self.summaries.get_mut(&open.key) else {
            warn!(run = run.0, "no summary for finished run");
            return Ok(());
        };
        let slot = match summary
            .scenarios
            .binary_search_by_key(&open.dimension, |s| s.dimension)
        {
            Ok(i) => i,
            Err(i) => {
                let path = format!(
                    "data_f{}_{}/IOHprofiler_f{}_DIM{}.dat",
                    open.key.0, open.key.1, open.key.0, open.dimension
                );
                summary.scenarios.insert(
                    i,
                    Scenario {
                        dimension: open.dimension,
                        path,
                        runs: Vec::new(),
                    },
                );
                i
            }
        };
        summary.scenarios[slot].runs.push(open.summary);
        self.write_summary(&open.key)
    }

    fn close(&mut self) -> Result<()> {
        self.rows.close()?;
        let keys: Vec<(u32, String)> = self.summaries.keys().cloned().collect();
        for key in &keys {
            self.write_summary(key)?;
        }
        Ok(())
    }
}

/// Logger producing IOHprofiler-style data folders.
pub type Analyzer = Watcher<AnalyzerSink>;

impl Watcher<AnalyzerSink> {
    /// Create an analyzer.
    ///
    /// # Errors
    ///
    /// Returns IO errors when the experiment folder cannot be created.
    pub fn new(trigger: impl Trigger + 'static, options: AnalyzerOptions) -> Result<Self> {
        Ok(Self::with_sink(trigger, AnalyzerSink::new(options)?))
    }

    /// See [`AnalyzerSink::add_experiment_attribute`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` once logging has started.
    pub fn add_experiment_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.sink_mut().add_experiment_attribute(key, value)
    }

    /// See [`AnalyzerSink::add_run_attribute`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` once logging has started.
    pub fn add_run_attribute(&mut self, property: impl Property + 'static) -> Result<()> {
        self.sink_mut().add_run_attribute(property)
    }
}
