use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use navmap_merge::{Decisions, MergeEngine, MergeRequest, NewDiff, ANONYMOUS_ACTOR};
use navmap_server::{NavmapConfig, NavmapServer};
use navmap_store::FsStore;
use navmap_types::{
    AuditOutcome, Decision, Diff, DiffId, DiffItem, DiffStatus, ItemKey, ProjectId,
};
use serde::{Deserialize, Serialize};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let out = Output(cli.format);
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args),
        Command::Map(args) => cmd_map(&engine(&config)?, out, args),
        Command::Diffs(args) => cmd_diffs(&engine(&config)?, out, args),
        Command::Show(args) => cmd_show(&engine(&config)?, out, args),
        Command::Submit(args) => cmd_submit(&engine(&config)?, out, args),
        Command::Merge(args) => cmd_merge(&engine(&config)?, out, args),
        Command::Audit(args) => cmd_audit(&engine(&config)?, out, args),
    }
}

/// Config file (if any) with command-line overrides applied.
fn load_config(cli: &Cli) -> anyhow::Result<NavmapConfig> {
    let mut config = match &cli.config {
        Some(path) => NavmapConfig::load(path)?,
        None => NavmapConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.store.root = root.clone();
    }
    Ok(config)
}

fn engine(config: &NavmapConfig) -> anyhow::Result<MergeEngine> {
    let store = FsStore::open(&config.store.root)
        .with_context(|| format!("opening store at {}", config.store.root.display()))?;
    Ok(MergeEngine::new(Arc::new(store), config.merge.clone()))
}

#[derive(Clone, Copy)]
struct Output(OutputFormat);

impl Output {
    /// Print `value` as JSON when asked to; returns `true` if it did.
    fn json<T: Serialize>(self, value: &T) -> anyhow::Result<bool> {
        if self.0 == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(value)?);
            return Ok(true);
        }
        Ok(false)
    }
}

fn cmd_serve(config: NavmapConfig, args: ServeArgs) -> anyhow::Result<()> {
    let mut server_config = config.server.clone();
    if let Some(bind) = args.bind {
        server_config.bind_addr = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind address {bind:?}"))?;
    }
    let engine = Arc::new(engine(&config)?);
    println!(
        "navmap server on {} (root: {})",
        server_config.bind_addr.to_string().bold(),
        config.store.root.display()
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(NavmapServer::new(server_config, engine).serve())?;
    Ok(())
}

fn cmd_map(engine: &MergeEngine, out: Output, args: MapArgs) -> anyhow::Result<()> {
    let map = engine.current_map(&ProjectId::new(args.project)?)?;
    if out.json(&map)? {
        return Ok(());
    }
    println!(
        "Map {} at version {}",
        map.project_id.to_string().bold(),
        map.version.to_string().yellow()
    );
    for page in map.pages.values() {
        println!("  {} {}", "page".cyan(), page.node_id);
    }
    for route in map.routes.values() {
        println!(
            "  {} {} {} → {}",
            "route".blue(),
            route.edge_id,
            route.source_page_id,
            route.target_page_id
        );
    }
    if map.is_empty() {
        println!("  (empty)");
    }
    Ok(())
}

fn parse_status(status: &str) -> anyhow::Result<Option<DiffStatus>> {
    if status == "all" {
        return Ok(None);
    }
    Ok(Some(status.parse()?))
}

fn colored_status(status: DiffStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        DiffStatus::Pending => text.yellow(),
        DiffStatus::PartiallyApplied => text.cyan(),
        DiffStatus::Applied => text.green(),
        DiffStatus::Rejected => text.red(),
    }
}

fn cmd_diffs(engine: &MergeEngine, out: Output, args: DiffsArgs) -> anyhow::Result<()> {
    let project = ProjectId::new(args.project)?;
    let diffs = engine.diffs(&project, parse_status(&args.status)?)?;
    if out.json(&diffs)? {
        return Ok(());
    }
    if diffs.is_empty() {
        println!("No {} diffs for {}.", args.status, project.to_string().bold());
    }
    for diff in &diffs {
        println!(
            "{}  {}  {} items  base v{}{}",
            diff.diff_id.to_string().yellow(),
            colored_status(diff.status),
            diff.len(),
            diff.base_version,
            diff.parent_diff_id
                .map(|p| format!("  (remainder of {})", p.short_id()))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn print_items(diff: &Diff) {
    for item in &diff.items {
        let reason = item
            .reason
            .as_ref()
            .map(|r| format!("  [{r}]").dimmed().to_string())
            .unwrap_or_default();
        println!("  {:<24} {:<9}{}", item.key().to_string(), item.decision.to_string(), reason);
    }
}

fn cmd_show(engine: &MergeEngine, out: Output, args: ShowArgs) -> anyhow::Result<()> {
    let diff = engine.diff(&args.diff.parse::<DiffId>()?)?;
    if out.json(&diff)? {
        return Ok(());
    }
    println!(
        "Diff {} of {}: {}, base v{}, created {}",
        diff.diff_id.to_string().yellow().bold(),
        diff.project_id.to_string().bold(),
        colored_status(diff.status),
        diff.base_version,
        diff.created_at.to_rfc3339()
    );
    if let Some(parent) = diff.parent_diff_id {
        println!("  Remainder of {}", parent.to_string().yellow());
    }
    print_items(&diff);
    Ok(())
}

/// Accepted layouts of an items file.
#[derive(Deserialize)]
#[serde(untagged)]
enum ItemsFile {
    Bare(Vec<DiffItem>),
    Wrapped { items: Vec<DiffItem> },
}

fn read_items(path: &Path) -> anyhow::Result<Vec<DiffItem>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: ItemsFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing items in {}", path.display()))?;
    Ok(match file {
        ItemsFile::Bare(items) | ItemsFile::Wrapped { items } => items,
    })
}

fn cmd_submit(engine: &MergeEngine, out: Output, args: SubmitArgs) -> anyhow::Result<()> {
    let diff = engine.submit_diff(NewDiff {
        project_id: ProjectId::new(args.project)?,
        base_version: args.base_version,
        items: read_items(&args.items)?,
    })?;
    if out.json(&diff)? {
        return Ok(());
    }
    println!(
        "{} Submitted diff {} ({} items, base v{})",
        "✓".green().bold(),
        diff.diff_id.to_string().yellow(),
        diff.len(),
        diff.base_version
    );
    Ok(())
}

/// Parse `page:P1=approved` into a key and a decision.
pub fn parse_decision(text: &str) -> anyhow::Result<(ItemKey, Decision)> {
    let Some((key, decision)) = text.split_once('=') else {
        bail!("expected KEY=DECISION, got {text:?}");
    };
    Ok((key.trim().parse()?, decision.trim().parse()?))
}

fn decisions(args: &MergeArgs) -> anyhow::Result<Decisions> {
    if args.approve {
        return Ok(Decisions::approve_all());
    }
    if args.reject {
        return Ok(Decisions::reject_all());
    }
    let pairs = args
        .decision
        .iter()
        .map(|d| parse_decision(d))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Decisions::per_item(pairs))
}

fn cmd_merge(engine: &MergeEngine, out: Output, args: MergeArgs) -> anyhow::Result<()> {
    let diff_id: DiffId = args.diff.parse()?;
    let decisions = decisions(&args)?;

    if args.preview {
        let preview = engine.preview(&diff_id, &decisions)?;
        if out.json(&preview)? {
            return Ok(());
        }
        println!(
            "Preview of {}: v{} → v{}, {} new, {} overridden",
            diff_id.to_string().yellow(),
            preview.base_version,
            preview.map.version,
            preview.inserted_count,
            preview.conflicts_overridden
        );
        for key in &preview.to_apply {
            println!("  {} {key}", "apply".green());
        }
        for key in &preview.remainder {
            let reason = preview
                .reasons
                .get(key)
                .map(|r| format!("  [{r}]").dimmed().to_string())
                .unwrap_or_default();
            println!("  {} {key}{reason}", "defer".yellow());
        }
        return Ok(());
    }

    let actor = args.actor.unwrap_or_else(|| ANONYMOUS_ACTOR.to_string());
    let result = engine.merge_diff_partial(MergeRequest::new(diff_id, decisions).with_actor(actor))?;
    if out.json(&result)? {
        return Ok(());
    }
    println!(
        "{} Merged {}: {}",
        "✓".green().bold(),
        diff_id.to_string().yellow(),
        colored_status(result.diff_status)
    );
    println!(
        "  Map: v{} → v{} ({} applied, {} new)",
        result.previous_version, result.map_version, result.applied_count, result.inserted_count
    );
    if result.conflicts_overridden > 0 {
        println!(
            "  {} {} rejected page(s) overridden by approved routes",
            "!".yellow().bold(),
            result.conflicts_overridden
        );
    }
    for key in &result.demoted {
        println!("  {} {key} held back", "!".yellow().bold());
    }
    if let Some(remainder) = result.new_diff_id {
        println!("  Remainder: {}", remainder.to_string().yellow());
    }
    if result.attempts > 1 {
        println!("  Committed after {} attempts", result.attempts);
    }
    Ok(())
}

fn cmd_audit(engine: &MergeEngine, out: Output, args: AuditArgs) -> anyhow::Result<()> {
    let entries = engine.audit_trail(&args.diff.parse::<DiffId>()?)?;
    if out.json(&entries)? {
        return Ok(());
    }
    if entries.is_empty() {
        println!("Audit trail: no decisions recorded.");
    }
    for entry in &entries {
        let outcome = match entry.outcome {
            AuditOutcome::Inserted => entry.outcome.to_string().green(),
            AuditOutcome::AlreadyPresent => entry.outcome.to_string().dimmed(),
            AuditOutcome::Deferred => entry.outcome.to_string().yellow(),
            AuditOutcome::Rejected => entry.outcome.to_string().red(),
        };
        let reason = entry
            .reason
            .as_ref()
            .map(|r| format!(" [{r}]"))
            .unwrap_or_default();
        println!(
            "{}  {:<24} {:<9} {:<16} v{}→v{}  {}{}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.item_key.to_string(),
            entry.decision.to_string(),
            outcome,
            entry.previous_map_version,
            entry.resulting_map_version,
            entry.actor,
            reason
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn decision_parsing() {
        let (key, decision) = parse_decision("route:R1=approved").unwrap();
        assert_eq!(key.to_string(), "route:R1");
        assert_eq!(decision, Decision::Approved);

        assert!(parse_decision("route:R1").is_err());
        assert!(parse_decision("R1=approved").is_err());
        assert!(parse_decision("page:P1=maybe").is_err());
    }

    #[test]
    fn status_filter() {
        assert_eq!(parse_status("all").unwrap(), None);
        assert_eq!(parse_status("applied").unwrap(), Some(DiffStatus::Applied));
        assert!(parse_status("done").is_err());
    }

    #[test]
    fn submit_then_merge_against_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let items = dir.path().join("items.json");
        std::fs::write(
            &items,
            r#"[
                {"kind": "page", "node_id": "home"},
                {"kind": "page", "node_id": "cart"},
                {"kind": "route", "edge_id": "checkout", "source_page_id": "home", "target_page_id": "cart"}
            ]"#,
        )
        .unwrap();
        let root = dir.path().join("store");
        let root_arg = root.to_str().unwrap();

        let cli = Cli::try_parse_from([
            "navmap",
            "--root",
            root_arg,
            "submit",
            "shop",
            items.to_str().unwrap(),
        ])
        .unwrap();
        run_command(cli).unwrap();

        let config = NavmapConfig {
            store: navmap_server::StoreConfig { root: root.clone() },
            ..Default::default()
        };
        let engine = engine(&config).unwrap();
        let project = ProjectId::new("shop").unwrap();
        let diff = engine.diffs(&project, None).unwrap().remove(0);

        let cli = Cli::try_parse_from([
            "navmap",
            "--root",
            root_arg,
            "merge",
            &diff.diff_id.to_string(),
            "-d",
            "route:checkout=approved",
        ])
        .unwrap();
        run_command(cli).unwrap();

        let map = engine.current_map(&project).unwrap();
        assert_eq!(map.version, 1);
        assert_eq!(map.page_count(), 2);
        assert_eq!(map.route_count(), 1);
        assert_eq!(engine.audit_trail(&diff.diff_id).unwrap().len(), 3);
    }

    #[test]
    fn wrapped_items_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, r#"{"items": [{"kind": "page", "node_id": "home"}]}"#).unwrap();
        assert_eq!(read_items(&path).unwrap().len(), 1);
    }
}
