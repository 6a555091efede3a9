use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use folio_flex::{CacheConfig, FlexConfig, FlexObject, FlexType, ObjectKind, StorageConfig};
use folio_index::Reload;
use folio_pages::PageStorage;
use folio_store::{RootResolver, StorageOptions};
use folio_types::{Meta, RowData};
use serde_json::{json, Value};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let workspace = Workspace::open(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Index => cmd_index(&workspace, format),
        Command::Keys => cmd_keys(&workspace, format),
        Command::Show(args) => cmd_show(&workspace, &args.key, format),
        Command::Meta(args) => cmd_meta(&workspace, &args.storage_key, format),
        Command::Raw(args) => {
            print!("{}", workspace.pages()?.read_raw(&args.storage_key)?);
            Ok(())
        }
        Command::Frontmatter(args) => {
            println!("{}", workspace.pages()?.read_frontmatter(&args.storage_key)?);
            Ok(())
        }
        Command::Path(args) => {
            println!("{}", workspace.flex().storage_path(&args.storage_key)?.display());
            Ok(())
        }
        Command::Update(args) => cmd_update(&workspace, args),
        Command::Remove(args) => cmd_remove(&workspace, &args.key),
    }
}

/// The object type the CLI operates on.
struct Workspace {
    config: FlexConfig,
    resolver: Arc<RootResolver>,
}

impl Workspace {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => FlexConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => default_config(),
        };
        Ok(Self {
            config,
            resolver: Arc::new(RootResolver::new(&cli.root)),
        })
    }

    fn flex(&self) -> FlexType {
        FlexType::from_config(self.config.clone(), self.resolver.clone())
    }

    fn pages(&self) -> anyhow::Result<PageStorage> {
        match &self.config.storage {
            StorageConfig::Pages(options) => {
                Ok(PageStorage::new(options.clone(), self.resolver.as_ref()))
            }
            StorageConfig::Memory => bail!(
                "type {:?} uses in-memory storage; there is nothing on disk to inspect",
                self.config.type_name
            ),
        }
    }
}

/// A page tree under `pages`. The cache is off: every run is a single pass.
fn default_config() -> FlexConfig {
    FlexConfig {
        type_name: "pages".to_string(),
        kind: ObjectKind::Page,
        storage: StorageConfig::Pages(StorageOptions::default()),
        cache: CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        },
    }
}

fn parse_data(text: &str) -> anyhow::Result<RowData> {
    match serde_json::from_str(text).context("--data is not valid JSON")? {
        Value::Object(data) => Ok(data),
        other => bail!("--data must be a JSON object, got {other}"),
    }
}

fn display_key(key: &str) -> &str {
    if key.is_empty() {
        "/"
    } else {
        key
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_index(workspace: &Workspace, format: OutputFormat) -> anyhow::Result<()> {
    let storage = workspace.pages()?;
    let index = storage.index()?;
    if format == OutputFormat::Json {
        let nodes: Vec<&Meta> = index.iter().map(|(_, meta)| meta).collect();
        return print_json(&nodes);
    }

    println!("Index of {} ({} nodes)", storage.root().display().to_string().bold(), index.len());
    for (key, meta) in index.iter() {
        let template = meta.template.as_deref().unwrap_or("-");
        println!(
            "  {} {} {} {}",
            display_key(key).yellow(),
            template.cyan(),
            format!("ts={}", meta.storage_timestamp).dimmed(),
            format!("variants={} children={}", meta.variants().count(), meta.children.len()).dimmed(),
        );
    }
    Ok(())
}

fn cmd_keys(workspace: &Workspace, format: OutputFormat) -> anyhow::Result<()> {
    let index = workspace.flex().get_index()?;
    if format == OutputFormat::Json {
        let keys: Vec<Value> = index
            .iter()
            .map(|(key, entry)| json!({"key": key, "storage_key": entry.storage_key, "timestamp": entry.timestamp}))
            .collect();
        return print_json(&keys);
    }

    if index.is_empty() {
        println!("No objects.");
    }
    for (key, entry) in index.iter() {
        println!(
            "{} → {} {}",
            key.yellow(),
            entry.storage_key,
            format!("({})", entry.timestamp).dimmed()
        );
    }
    Ok(())
}

fn object_json(object: &FlexObject) -> Value {
    json!({
        "key": object.key(),
        "storage_key": object.storage_key(),
        "timestamp": object.timestamp(),
        "data": object.data(),
    })
}

fn cmd_show(workspace: &Workspace, key: &str, format: OutputFormat) -> anyhow::Result<()> {
    let object = workspace
        .flex()
        .get_object(key)?
        .ok_or_else(|| anyhow!("no object with key {key:?}"))?;
    if format == OutputFormat::Json {
        return print_json(&object_json(&object));
    }

    println!("{} {}", "Object".bold(), object.key().yellow().bold());
    println!("  Storage key: {}", object.storage_key().unwrap_or("-"));
    println!("  Timestamp: {}", object.timestamp());
    if let Some(page) = object.as_page() {
        println!("  Route: {}", page.route().unwrap_or_default().cyan());
        println!("  Template: {}", page.template().unwrap_or("-"));
        if !page.lang().is_empty() {
            println!("  Language: {}", page.lang());
        }
        if page.is_modular() {
            println!("  {}", "modular".magenta());
        }
    }
    println!("{}", serde_json::to_string_pretty(object.data())?);
    Ok(())
}

fn cmd_meta(workspace: &Workspace, storage_key: &str, format: OutputFormat) -> anyhow::Result<()> {
    let meta = workspace.pages()?.object_meta(storage_key, Reload::Force)?;
    if format == OutputFormat::Json {
        return print_json(&meta);
    }

    let state = if meta.exists { "exists".green() } else { "missing".red() };
    println!("{} {}", meta.storage_key.yellow().bold(), state);
    println!("  Template: {}", meta.template.as_deref().unwrap_or("-"));
    if !meta.lang.is_empty() {
        println!("  Language: {}", meta.lang);
    }
    println!("  Folder timestamp: {}", meta.node.storage_timestamp);
    println!("  Checksum: {}", meta.node.checksum.dimmed());
    for (lang, template, timestamp) in meta.node.variants() {
        let lang = if lang.is_empty() { "-" } else { lang };
        println!("    {} {} {}", template.cyan(), lang, format!("({timestamp})").dimmed());
    }
    for child in meta.node.children.keys() {
        println!("    {} {}", "child".dimmed(), child);
    }
    Ok(())
}

fn cmd_update(workspace: &Workspace, args: UpdateArgs) -> anyhow::Result<()> {
    let data = parse_data(&args.data)?;
    let object = workspace.flex().update(data, args.key.as_deref())?;
    println!(
        "{} Saved {}",
        "✓".green().bold(),
        object.storage_key().unwrap_or(object.key()).yellow()
    );
    Ok(())
}

fn cmd_remove(workspace: &Workspace, key: &str) -> anyhow::Result<()> {
    match workspace.flex().remove(key)? {
        Some(object) => {
            println!(
                "{} Removed {}",
                "✓".green().bold(),
                object.storage_key().unwrap_or(key).yellow()
            );
            Ok(())
        }
        None => bail!("no object with key {key:?}"),
    }
}
