//! Command-line front end over the policy catalog and state machine.
//!
//! Usage:
//!   policyctl --defs ./defs --store ./store.json list
//!   policyctl --defs ./defs --store ./store.json enable corp.telemetry --set level=3
//!   policyctl --defs ./defs --store ./store.json batch commands.txt --keep-going
//!
//! The store file is a JSON rendering of both class scopes and is rewritten
//! atomically after every committed transition.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use policyctl::batch::{ErrorPolicy, batch_lines};
use policyctl::{
    Category, ElementInput, MemStore, Policy, PolicyCatalog, PolicyClass, PolicyElement,
    StateMachine, StoreEntry, StoreOp, commit,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "policyctl")]
#[command(about = "Inspect and change policy configuration state without a graphical editor")]
struct Cli {
    /// Folder holding *.policies.json files and locale subfolders.
    #[arg(long, env = "POLICYCTL_DEFS")]
    defs: PathBuf,
    /// Display locale, e.g. en-US or fr.
    #[arg(long, env = "POLICYCTL_LOCALE", default_value = policyctl::DEFAULT_LOCALE)]
    locale: String,
    /// Store file; created on the first committed transition.
    #[arg(long, env = "POLICYCTL_STORE")]
    store: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the category tree with policies.
    List,
    /// Show one policy's definition.
    Show { name: String },
    /// Report a policy's configured state.
    State { name: String },
    /// Enable a policy; unset elements take their defaults.
    Enable {
        name: String,
        /// Element value as ELEM=TOKEN; repeat for multiple tokens.
        #[arg(long = "set", value_name = "ELEM=TOKEN")]
        set: Vec<String>,
    },
    /// Disable a policy.
    Disable { name: String },
    /// Remove every store entry the policy owns.
    Clear { name: String },
    /// Decode the current element values of an enabled policy.
    Values { name: String },
    /// Search policies by prefixed name and display name.
    Search { query: String },
    /// Run commands from a file, one per line; `#` lines are comments.
    Batch {
        file: PathBuf,
        /// Continue past failing lines instead of halting.
        #[arg(long)]
        keep_going: bool,
    },
}

/// One batch line parses under the same grammar as interactive use.
#[derive(Parser, Debug)]
#[command(name = "policyctl-batch", no_binary_name = true)]
struct BatchLine {
    #[command(subcommand)]
    command: Command,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let catalog = PolicyCatalog::load(&cli.defs, &cli.locale)
        .with_context(|| format!("loading definitions from {}", cli.defs.display()))?;
    for warning in catalog.warnings() {
        eprintln!("warning: {warning}");
    }
    let mut stores = StoreFile::load(&cli.store)
        .with_context(|| format!("loading store {}", cli.store.display()))?;

    execute(&catalog, &mut stores, cli.command)
}

fn execute(catalog: &PolicyCatalog, stores: &mut StoreFile, command: Command) -> Result<()> {
    match command {
        Command::List => run_list(catalog),
        Command::Show { name } => run_show(catalog, &name),
        Command::State { name } => run_state(catalog, stores, &name),
        Command::Enable { name, set } => run_enable(catalog, stores, &name, &set),
        Command::Disable { name } => run_transition(catalog, stores, &name, Transition::Disable),
        Command::Clear { name } => run_transition(catalog, stores, &name, Transition::Clear),
        Command::Values { name } => run_values(catalog, stores, &name),
        Command::Search { query } => run_search(catalog, &query),
        Command::Batch { file, keep_going } => {
            let policy = if keep_going {
                ErrorPolicy::Continue
            } else {
                ErrorPolicy::Halt
            };
            run_batch(catalog, stores, &file, policy)
        }
    }
}

fn run_list(catalog: &PolicyCatalog) -> Result<()> {
    for ident in catalog.root_categories() {
        print_category(catalog, catalog.category(ident)?, 0)?;
    }
    let uncategorized: Vec<&Policy> = catalog
        .policies()
        .filter(|p| p.category.is_none())
        .collect();
    if !uncategorized.is_empty() {
        println!("(uncategorized)");
        for policy in uncategorized {
            println!("  {}  {}", policy.prefixed_name, catalog.display_name(policy).text);
        }
    }
    Ok(())
}

fn print_category(catalog: &PolicyCatalog, category: &Category, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    let display = catalog.category_display(category);
    let marker = if category.orphaned { " [orphaned]" } else { "" };
    println!("{indent}{}{marker}", display.text);
    for prefixed in &category.policies {
        let policy = catalog.resolve(prefixed)?;
        println!(
            "{indent}  {}  {}",
            policy.prefixed_name,
            catalog.display_name(policy).text
        );
    }
    for child in &category.children {
        print_category(catalog, catalog.category(child)?, depth + 1)?;
    }
    Ok(())
}

fn run_show(catalog: &PolicyCatalog, name: &str) -> Result<()> {
    let policy = catalog.resolve(name)?;
    println!("{}", policy.prefixed_name);
    println!("  display:  {}", catalog.display_name(policy).text);
    if let Some(explain) = catalog.explain(policy) {
        println!("  explain:  {}", explain.text);
    }
    println!("  class:    {}", policy.class);
    println!("  key:      {}", policy.key);
    if let Some(value_name) = &policy.value_name {
        println!("  value:    {value_name}");
    }
    if let Some(supported) = &policy.supported_on {
        let definition = catalog.support_definition(supported)?;
        println!("  requires: {}", catalog.support_display(definition).text);
    }
    for element in &policy.elements {
        println!(
            "  element:  {} ({}{}){}",
            element.id(),
            element.kind(),
            if element.required() { ", required" } else { "" },
            element_constraints(element)
        );
    }
    Ok(())
}

fn element_constraints(element: &PolicyElement) -> String {
    match element {
        PolicyElement::Decimal(e) => format!(" range {}..={}", e.min, e.max),
        PolicyElement::LongDecimal(e) => format!(" range {}..={}", e.min, e.max),
        PolicyElement::Text(e) => e
            .max_length
            .map(|max| format!(" max length {max}"))
            .unwrap_or_default(),
        PolicyElement::Enum(e) => {
            let items: Vec<&str> = e.items.iter().map(|i| i.id.as_str()).collect();
            format!(" items: {}", items.join(", "))
        }
        PolicyElement::List(e) => {
            if e.explicit_pairs {
                " name=value entries".to_string()
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}

fn run_state(catalog: &PolicyCatalog, stores: &StoreFile, name: &str) -> Result<()> {
    let policy = catalog.resolve(name)?;
    let machine = StateMachine::new(policy);
    println!("{}", machine.state(&stores.machine, &stores.user));
    Ok(())
}

fn run_enable(
    catalog: &PolicyCatalog,
    stores: &mut StoreFile,
    name: &str,
    set: &[String],
) -> Result<()> {
    let policy = catalog.resolve(name)?;
    let input = parse_element_input(set)?;
    let ops = StateMachine::new(policy).enable(&input)?;
    apply_scoped(stores, policy, &ops)?;
    println!("enabled {}", policy.prefixed_name);
    Ok(())
}

enum Transition {
    Disable,
    Clear,
}

fn run_transition(
    catalog: &PolicyCatalog,
    stores: &mut StoreFile,
    name: &str,
    transition: Transition,
) -> Result<()> {
    let policy = catalog.resolve(name)?;
    let machine = StateMachine::new(policy);
    let (ops, verb) = match transition {
        Transition::Disable => (machine.disable(), "disabled"),
        Transition::Clear => (machine.not_configure(), "cleared"),
    };
    apply_scoped(stores, policy, &ops)?;
    println!("{verb} {}", policy.prefixed_name);
    Ok(())
}

fn run_values(catalog: &PolicyCatalog, stores: &StoreFile, name: &str) -> Result<()> {
    let policy = catalog.resolve(name)?;
    let machine = StateMachine::new(policy);
    // Both-class scopes agree whenever values are readable; machine scope is
    // the canonical copy.
    let store = match policy.class {
        PolicyClass::User => &stores.user,
        PolicyClass::Machine | PolicyClass::Both => &stores.machine,
    };
    let snap = machine
        .snapshot(store)
        .map_err(|err| anyhow::anyhow!("reading store: {err}"))?;
    let values = machine.get_values(&snap)?;
    for (id, value) in &values {
        let element = policy.element(id).expect("value ids come from elements");
        println!("{id} = {}", element.to_tokens(value)?.join(", "));
    }
    Ok(())
}

fn run_search(catalog: &PolicyCatalog, query: &str) -> Result<()> {
    let policies: Vec<&Policy> = catalog.policies().collect();
    let hits = policyctl::search::search(
        policies.iter().copied(),
        |policy| {
            format!(
                "{} {}",
                policy.prefixed_name,
                catalog.display_name(policy).text
            )
        },
        query,
        ' ',
    );
    for policy in hits {
        println!("{}  {}", policy.prefixed_name, catalog.display_name(policy).text);
    }
    Ok(())
}

fn run_batch(
    catalog: &PolicyCatalog,
    stores: &mut StoreFile,
    file: &Path,
    policy: ErrorPolicy,
) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("reading batch file {}", file.display()))?;
    let mut failures = 0usize;
    for (line_number, line) in batch_lines(&text) {
        let parsed = BatchLine::try_parse_from(line.split_whitespace())
            .map_err(|err| anyhow::anyhow!("{err}"));
        let outcome = parsed.and_then(|batch| match batch.command {
            Command::Batch { .. } => bail!("batch files may not nest"),
            command => execute(catalog, stores, command),
        });
        if let Err(err) = outcome {
            match policy {
                ErrorPolicy::Halt => {
                    return Err(err.context(format!("line {line_number}: {line}")));
                }
                ErrorPolicy::Continue => {
                    eprintln!("line {line_number} failed: {err:#}");
                    failures += 1;
                }
            }
        }
    }
    if failures > 0 {
        bail!("{failures} batch line(s) failed");
    }
    Ok(())
}

fn parse_element_input(set: &[String]) -> Result<ElementInput> {
    let mut input = ElementInput::new();
    for entry in set {
        let Some((element, token)) = entry.split_once('=') else {
            bail!("--set expects ELEM=TOKEN, got '{entry}'");
        };
        input
            .entry(element.to_string())
            .or_default()
            .push(token.to_string());
    }
    Ok(input)
}

/// Commit staged operations to every scope the policy's class covers, then
/// persist the store file.
fn apply_scoped(stores: &mut StoreFile, policy: &Policy, ops: &[StoreOp]) -> Result<()> {
    match policy.class {
        PolicyClass::Machine => commit(&mut stores.machine, ops)?,
        PolicyClass::User => commit(&mut stores.user, ops)?,
        PolicyClass::Both => {
            commit(&mut stores.machine, ops)?;
            commit(&mut stores.user, ops)?;
        }
    }
    stores.save()
}

/// Both class scopes in one JSON file, rewritten atomically on save.
#[derive(Debug)]
struct StoreFile {
    path: PathBuf,
    machine: MemStore,
    user: MemStore,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFileBody {
    #[serde(default)]
    machine: BTreeMap<String, Vec<StoreEntry>>,
    #[serde(default)]
    user: BTreeMap<String, Vec<StoreEntry>>,
}

impl StoreFile {
    fn load(path: &Path) -> Result<Self> {
        let body = if path.is_file() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            StoreFileBody::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            machine: MemStore::load(body.machine),
            user: MemStore::load(body.user),
        })
    }

    fn save(&self) -> Result<()> {
        let body = StoreFileBody {
            machine: self.machine.dump().clone(),
            user: self.user.dump().clone(),
        };
        let json = serde_json::to_string_pretty(&body)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        use std::io::Write;
        temp.write_all(json.as_bytes())
            .context("writing store contents")?;
        temp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
