//! tdm command-line interface.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use itertools::Itertools;
use tracing::warn;

use crate::config::Config;
use crate::error::{Result, TdmError};
use crate::merge::MergeEngine;
use crate::model::ModelState;
use crate::provider::DirModelProvider;
use crate::rules::StaticRuleResolver;
use crate::store::{ModelLock, ModelStore};
use crate::validation::ValidationMessages;

#[derive(Debug, Parser)]
#[command(name = "tdm", version, about = "Technical-debt model merge engine")]
pub struct Cli {
    /// Model root directory (defaults to the current directory).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Explicit config file (otherwise TDM_CONFIG, then tdm.toml in root).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge the default model and all contributions into the store.
    Sync,
    /// Validate the default model and contributions without persisting.
    Check,
    /// Print the persisted model tree.
    Show,
}

struct Context {
    root: PathBuf,
    config: Config,
}

impl Context {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let root = match &cli.root {
            Some(root) => root.clone(),
            None => std::env::current_dir()?,
        };
        let config = Config::load(cli.config.as_deref(), &root)?;
        Ok(Self { root, config })
    }

    fn store(&self) -> Result<ModelStore> {
        ModelStore::open(Config::resolve(&self.root, &self.config.storage.db_path))
    }

    fn provider(&self) -> DirModelProvider {
        DirModelProvider::new(
            Config::resolve(&self.root, &self.config.model.default_model),
            Some(Config::resolve(&self.root, &self.config.model.contrib_dir)),
        )
    }

    fn resolver(&self) -> Result<StaticRuleResolver> {
        match &self.config.model.rules_file {
            Some(path) => StaticRuleResolver::from_file(&Config::resolve(&self.root, path)),
            None => {
                warn!("no rules file configured; every rule reference will be unresolvable");
                Ok(StaticRuleResolver::new())
            }
        }
    }
}

pub fn run(cli: &Cli) -> Result<()> {
    let ctx = Context::from_cli(cli)?;
    match cli.command {
        Commands::Sync => sync(&ctx),
        Commands::Check => check(&ctx),
        Commands::Show => show(&ctx),
    }
}

fn sync(ctx: &Context) -> Result<()> {
    // One merge per model store at a time; a held lock means another run is
    // already in flight, which is an operator error, not something to wait on.
    let Some(_lock) = ModelLock::try_acquire(&ctx.root)? else {
        return Err(TdmError::LockFailed(
            "another merge run is in progress for this model root".into(),
        ));
    };

    let mut store = ctx.store()?;
    let provider = ctx.provider();
    let resolver = ctx.resolver()?;
    let mut messages = ValidationMessages::new();

    let result = MergeEngine::new(&provider, &resolver).run(&mut store, &mut messages);
    report(&messages);

    let state = result?;
    println!(
        "Merged model: {} characteristics, {} requirements, {} warning(s)",
        state.characteristics.values().filter(|c| c.enabled).count(),
        state.requirements.values().filter(|r| r.enabled).count(),
        messages.warnings().len()
    );
    Ok(())
}

fn check(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let provider = ctx.provider();
    let resolver = ctx.resolver()?;
    let mut messages = ValidationMessages::new();

    let result = MergeEngine::new(&provider, &resolver).check(&store, &mut messages);
    report(&messages);

    result?;
    println!(
        "Model is valid ({} warning(s); nothing persisted)",
        messages.warnings().len()
    );
    Ok(())
}

fn show(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let state = store.load()?;
    if !state.is_bootstrapped() {
        println!("No model persisted yet; run `tdm sync` first.");
        return Ok(());
    }
    for root in state.roots() {
        print_subtree(&state, &root.key, 0);
    }
    let disabled = state.requirements.values().filter(|r| !r.enabled).count();
    if disabled > 0 {
        println!("({disabled} requirement(s) currently disabled)");
    }
    Ok(())
}

fn print_subtree(state: &ModelState, key: &str, depth: usize) {
    let Some(characteristic) = state.enabled_characteristic(key) else {
        return;
    };
    let indent = "  ".repeat(depth);
    let requirements = state.requirements_of(key);
    if requirements.is_empty() {
        println!("{indent}{} [{}]", characteristic.name, characteristic.key);
    } else {
        let rules = requirements
            .iter()
            .map(|r| format!("{}:{}", r.rule.repository, r.rule.key))
            .join(", ");
        println!(
            "{indent}{} [{}] — {}",
            characteristic.name, characteristic.key, rules
        );
    }
    for child in state.children_of(key) {
        print_subtree(state, &child.key, depth + 1);
    }
}

fn report(messages: &ValidationMessages) {
    for error in messages.errors() {
        eprintln!("error: {error}");
    }
    for warning in messages.warnings() {
        eprintln!("warning: {warning}");
    }
}
