#![deny(warnings)]

//! Headless calculator: loads the treasure catalog and the player's saved
//! selections, applies edits, then reports daily crystal yield and the best
//! upgrades.

mod config;

use anyhow::{bail, Context, Result};
use config::CalcConfig;
use persistence::SavedSelections;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use treasure_core::{Catalog, TreasureGroup};
use yield_econ::{round_display, UpgradeSuggestion, YieldSummary};

/// One change to the saved selections, applied in command-line order.
#[derive(Debug, PartialEq)]
enum Edit {
    Set(String, i32),
    AddChest(String, i32),
    RemoveChest(usize),
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    catalog: Option<PathBuf>,
    save: Option<PathBuf>,
    db: Option<String>,
    top: Option<usize>,
    edits: Vec<Edit>,
    list: bool,
    version: bool,
}

fn parse_assignment(flag: &str, value: Option<String>) -> Result<(String, i32)> {
    let value = value.with_context(|| format!("{flag} expects <name>=<level>"))?;
    let (name, level) = value
        .rsplit_once('=')
        .with_context(|| format!("{flag} expects <name>=<level>, got {value:?}"))?;
    let level = level
        .trim()
        .parse()
        .with_context(|| format!("{flag}: level {level:?} is not a number"))?;
    Ok((name.trim().to_string(), level))
}

fn flag_value(flag: &str, value: Option<String>, what: &str) -> Result<String> {
    value.with_context(|| format!("{flag} expects {what}"))
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut out = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => out.config = Some(flag_value("--config", it.next(), "a path")?.into()),
            "--catalog" => out.catalog = Some(flag_value("--catalog", it.next(), "a path")?.into()),
            "--save" => out.save = Some(flag_value("--save", it.next(), "a path")?.into()),
            "--db" => out.db = Some(flag_value("--db", it.next(), "a sqlite url")?),
            "--top" => {
                let n = flag_value("--top", it.next(), "a number")?;
                out.top = Some(n.parse().with_context(|| format!("--top: {n:?}"))?);
            }
            "--set" => {
                let (name, level) = parse_assignment("--set", it.next())?;
                out.edits.push(Edit::Set(name, level));
            }
            "--add-chest" => {
                let (name, level) = parse_assignment("--add-chest", it.next())?;
                out.edits.push(Edit::AddChest(name, level));
            }
            "--remove-chest" => {
                let idx = flag_value("--remove-chest", it.next(), "an index")?;
                let idx = idx
                    .parse()
                    .with_context(|| format!("--remove-chest: {idx:?}"))?;
                out.edits.push(Edit::RemoveChest(idx));
            }
            "--list" => out.list = true,
            "--version" => out.version = true,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(out)
}

fn apply_overrides(mut cfg: CalcConfig, args: &Args) -> CalcConfig {
    if let Some(p) = &args.catalog {
        cfg.catalog_path = p.clone();
    }
    if let Some(p) = &args.save {
        cfg.save_path = p.clone();
    }
    if let Some(url) = &args.db {
        cfg.db_url = Some(url.clone());
    }
    if let Some(n) = args.top {
        cfg.top_n = n;
    }
    cfg
}

fn load_catalog(cfg: &CalcConfig) -> Result<Catalog> {
    let text = std::fs::read_to_string(&cfg.catalog_path)
        .with_context(|| format!("reading catalog {}", cfg.catalog_path.display()))?;
    let catalog = Catalog::from_json_str(&text)
        .with_context(|| format!("building catalog from {}", cfg.catalog_path.display()))?;
    Ok(catalog)
}

fn apply_edits(saved: &mut SavedSelections, catalog: &Catalog, edits: &[Edit]) -> Result<()> {
    for edit in edits {
        match edit {
            Edit::Set(name, level) => saved.set_level(catalog, name, *level)?,
            Edit::AddChest(name, level) => saved.add_chest(catalog, name, *level)?,
            Edit::RemoveChest(idx) => {
                saved.remove_chest(*idx)?;
            }
        }
    }
    Ok(())
}

/// Where the player's selections are kept.
enum SaveTarget {
    Json(PathBuf),
    Sqlite {
        pool: persistence::SqlitePool,
        save_id: i64,
    },
}

impl SaveTarget {
    async fn open(cfg: &CalcConfig) -> Result<Self> {
        match &cfg.db_url {
            Some(url) => {
                let pool = persistence::init_db(url).await?;
                let save_id = persistence::create_save(&pool, &cfg.save_name, None).await?;
                Ok(SaveTarget::Sqlite { pool, save_id })
            }
            None => Ok(SaveTarget::Json(cfg.save_path.clone())),
        }
    }

    async fn load(&self) -> Result<SavedSelections> {
        Ok(match self {
            SaveTarget::Json(path) => SavedSelections::load_json(path)?,
            SaveTarget::Sqlite { pool, save_id } => {
                persistence::read_selections(pool, *save_id).await?
            }
        })
    }

    async fn store(&self, saved: &SavedSelections) -> Result<()> {
        match self {
            SaveTarget::Json(path) => saved.save_json(path)?,
            SaveTarget::Sqlite { pool, save_id } => {
                persistence::write_selections(pool, *save_id, saved).await?
            }
        }
        Ok(())
    }
}

fn render_catalog(catalog: &Catalog) -> String {
    let mut out = String::new();
    for group in TreasureGroup::ALL {
        let names = catalog.names_in(group);
        if names.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{} ({})", group.label(), names.len());
        for name in names {
            if let Some(t) = catalog.get(name) {
                let _ = writeln!(
                    out,
                    "  {:<40} {:>3} crystals  {}% -> {}%",
                    name,
                    t.crystals_per_success(),
                    t.chance_by_level()[0],
                    t.chance_by_level()[treasure_core::LEVEL_COUNT - 1]
                );
            }
        }
    }
    out
}

fn render_report(summary: &YieldSummary, upgrades: &[UpgradeSuggestion]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Max crystals per day:      {}", summary.max_yield);
    let _ = writeln!(out, "Expected crystals per day: {:.2}", summary.expected_yield);
    let _ = writeln!(out, "Best upgrades:");
    if upgrades.is_empty() {
        let _ = writeln!(out, "  Nothing to upgrade");
    }
    for up in upgrades {
        let _ = writeln!(
            out,
            "  {:<40} {} -> {}   {:.2} -> {:.2}",
            up.name,
            up.current_level,
            up.next_level(),
            round_display(up.current_expected),
            round_display(up.next_expected)
        );
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.version {
        println!(
            "crystal-calc {} ({}, {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }

    let cfg = apply_overrides(config::load(args.config.as_deref())?, &args);
    info!(catalog = %cfg.catalog_path.display(), top_n = cfg.top_n, "starting calculator");

    let catalog = load_catalog(&cfg)?;
    if args.list {
        print!("{}", render_catalog(&catalog));
        return Ok(());
    }

    let target = SaveTarget::open(&cfg).await?;
    let mut saved = target.load().await?;
    apply_edits(&mut saved, &catalog, &args.edits)?;
    let selections = saved.restore(&catalog)?;

    let summary = yield_econ::aggregate(&catalog, &selections)?;
    let upgrades = yield_econ::recommend(&catalog, &selections, cfg.top_n)?;
    print!("{}", render_report(&summary, &upgrades));

    let mut snapshot = SavedSelections::capture(&catalog, &selections)?;
    // Keep unselected chest rows the player added.
    snapshot.chests = saved.chests;
    target.store(&snapshot).await?;
    Ok(())
}
