use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

use crate::config::{Config, OutputFormat};
use crate::inventory::{group_rows, test_rows};
use crate::output::{self, export_records, CsvRecord, PhaseProgress};
use crate::registry::{Registry, RegistryStore};
use crate::results::{self, TaskReport};
use crate::schedule;
use crate::scm::GitCheckout;
use crate::sync::{sync_checkout, RepositoryIdentity};

#[derive(Parser)]
#[command(name = "tttt")]
#[command(author, version, about = "Test metadata tracker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./tttt.{toml,json,yaml,yml})
    #[arg(short, long, global = true, env = "TTTT_CONFIG")]
    config: Option<PathBuf>,

    /// Registry file (overrides the configured location)
    #[arg(short, long, global = true, env = "TTTT_REGISTRY")]
    registry: Option<PathBuf>,

    /// Write results to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull checkouts and merge their test Makefiles into the registry
    Sync {
        #[arg(required = true)]
        checkouts: Vec<PathBuf>,
    },

    /// Show which architectures a schedule expression selects
    Schedule {
        /// e.g. "i386: 1; s390x: 2; x86_64: !5"
        expression: String,

        /// Weekday 0-6, 0 = Sunday (defaults to today)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=6))]
        weekday: Option<u8>,

        /// Architectures declared by the recipe
        #[arg(short, long = "arch")]
        archs: Vec<String>,
    },

    /// Recompute recipe results from their tasks (all recipes when none given)
    Recount { recipes: Vec<String> },

    /// Waive a task and recount its recipe
    Waive { task: String },

    /// Record a task result and recount its recipe
    Report {
        #[arg(long)]
        recipe: String,

        #[arg(long, default_value = "")]
        whiteboard: String,

        #[arg(long)]
        task: String,

        /// Registered test name
        #[arg(long)]
        test: String,

        /// pass, fail, warn, new, ...
        #[arg(long)]
        result: String,
    },

    /// Register group tags matched against RunFor
    Group {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List registered tests
    Tests {
        #[arg(long)]
        repository: Option<String>,
    },
}

impl Cli {
    fn format(&self, config: &Config) -> OutputFormat {
        self.format.unwrap_or(config.output.format)
    }

    fn open_store(&self, config: &Config) -> Result<RegistryStore> {
        let path = self.registry.as_deref().or(config.registry.path.as_deref());
        let store = RegistryStore::open(path)
            .context("Failed to open registry")?
            .with_lock_timeout(config.registry.lock_timeout());
        info!("Using registry {}", store.path().display());
        Ok(store)
    }

    /// Writes records in the selected format; the summary format prints
    /// tables unless an output file was requested.
    fn emit<T: Serialize + CsvRecord>(
        &self,
        config: &Config,
        records: &[T],
        print_summary: impl FnOnce(&[T]),
    ) -> Result<()> {
        let format = self.format(config);
        let pretty = self.pretty || config.output.pretty;

        if let Some(output_path) = &self.output {
            let mut file = std::fs::File::create(output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?;
            export_records(records, format, pretty, &mut file)?;
            file.flush()?;
            info!("Results written to: {}", output_path.display());
        } else if format == OutputFormat::Summary {
            print_summary(records);
        } else {
            export_records(records, format, pretty, &mut std::io::stdout().lock())?;
        }

        Ok(())
    }

    async fn execute_sync(&self, config: &Config, checkouts: &[PathBuf]) -> Result<()> {
        let store = self.open_store(config)?;
        let mut reports = Vec::new();

        for path in checkouts {
            info!("Synchronizing checkout: {}", path.display());

            let scm = GitCheckout::open(path)?;
            let identity = RepositoryIdentity::detect(&scm).await?;
            let _lock = store.lock()?;

            let mut registry = store.load()?;
            let mut progress = if console::Term::stderr().is_term() {
                PhaseProgress::new(&format!("Sync {}", identity.name), 3)
            } else {
                PhaseProgress::hidden()
            };
            let report = sync_checkout(&mut registry, &scm, &identity, config, &mut progress)
                .await
                .with_context(|| format!("Failed to synchronize {}", path.display()))?;
            store.save(&registry)?;

            reports.push(report);
        }

        self.emit(config, &reports, output::print_sync_summary)
    }

    fn execute_schedule(
        &self,
        config: &Config,
        expression: &str,
        weekday: Option<u8>,
        archs: &[String],
    ) -> Result<()> {
        let weekday = weekday.unwrap_or_else(schedule::today);
        let selection = schedule::select(expression, weekday, archs)?;
        info!(
            "Weekday {weekday} selects: {}",
            selection.archs.join(", ")
        );

        self.emit(config, &[selection], |s| output::print_schedule(&s[0]))
    }

    fn execute_recount(&self, config: &Config, recipes: &[String]) -> Result<()> {
        let store = self.open_store(config)?;
        let _lock = store.lock()?;
        let mut registry = store.load()?;

        let ids = if recipes.is_empty() {
            registry.recipes().iter().map(|r| r.id).collect()
        } else {
            recipes
                .iter()
                .map(|uid| {
                    registry
                        .recipe_by_uid(uid)
                        .map(|r| r.id)
                        .with_context(|| format!("Unknown recipe {uid}"))
                })
                .collect::<Result<Vec<_>>>()?
        };

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            outcomes.push(results::recount_recipe(
                &mut registry,
                id,
                &config.results.reserve_test,
            )?);
        }
        store.save(&registry)?;

        self.emit(config, &outcomes, output::print_recounts)
    }

    fn execute_results_update(
        &self,
        config: &Config,
        update: impl FnOnce(&mut Registry, &str) -> crate::error::Result<results::RecountOutcome>,
    ) -> Result<()> {
        let store = self.open_store(config)?;
        let _lock = store.lock()?;
        let mut registry = store.load()?;

        let outcome = update(&mut registry, &config.results.reserve_test)?;
        store.save(&registry)?;

        info!(
            "Recipe {} is now {}",
            outcome.uid,
            output::styled_result(&outcome.result)
        );
        self.emit(config, &[outcome], output::print_recounts)
    }

    fn execute_group(&self, config: &Config, names: &[String]) -> Result<()> {
        let store = self.open_store(config)?;
        let _lock = store.lock()?;
        let mut registry = store.load()?;

        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            registry.get_or_create_group(name);
        }
        store.save(&registry)?;

        self.emit(config, &group_rows(&registry), output::print_groups)
    }

    fn execute_tests(&self, config: &Config, repository: Option<&str>) -> Result<()> {
        let store = self.open_store(config)?;
        let registry = store.load()?;
        let rows = test_rows(&registry, repository)?;

        self.emit(config, &rows, output::print_tests)
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Sync { checkouts } => self.execute_sync(&config, checkouts).await,
            Commands::Schedule {
                expression,
                weekday,
                archs,
            } => self.execute_schedule(&config, expression, *weekday, archs),
            Commands::Recount { recipes } => self.execute_recount(&config, recipes),
            Commands::Waive { task } => self.execute_results_update(&config, |registry, reserve| {
                results::waive_task(registry, task, reserve)
            }),
            Commands::Report {
                recipe,
                whiteboard,
                task,
                test,
                result,
            } => {
                let report = TaskReport {
                    recipe_uid: recipe,
                    whiteboard,
                    task_uid: task,
                    test_name: test,
                    result,
                };
                self.execute_results_update(&config, |registry, reserve| {
                    results::report_task(registry, &report, reserve)
                })
            }
            Commands::Group { names } => self.execute_group(&config, names),
            Commands::Tests { repository } => self.execute_tests(&config, repository.as_deref()),
        }
    }
}
