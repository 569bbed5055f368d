//! `dva tree`, `dva links` and `dva fix`: hierarchy views and corrections.

use anyhow::Result;
use clap::Args;
use devops_core::hierarchy::walk;
use devops_core::model::WorkItemNode;
use devops_core::service::StateChange;
use std::io::{self, Write};
use tracing::info;

use super::{Context, connect, resolve_area};
use crate::output::{pretty_rule, pretty_section, render, render_mode};

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Area path (defaults to `defaults.area_path`).
    #[arg(long)]
    pub area: Option<String>,
}

#[derive(Args, Debug)]
pub struct LinksArgs {
    /// Area path (defaults to `defaults.area_path`).
    #[arg(long)]
    pub area: Option<String>,

    /// One state, or a comma-separated list.
    #[arg(long, default_value = "")]
    pub state: String,

    /// Comma-separated tags; every tag must be present.
    #[arg(long, default_value = "")]
    pub tags: String,
}

#[derive(Args, Debug)]
pub struct FixArgs {
    /// Area path (defaults to `defaults.area_path`).
    #[arg(long)]
    pub area: Option<String>,

    /// List the planned changes without updating anything.
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run_tree(args: &TreeArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let area = resolve_area(args.area.as_deref(), &settings)?;
    let roots = connect(&settings)?.epic_hierarchy(&area, &ctx.cancel)?;
    render_forest(ctx, &roots)
}

pub fn run_links(args: &LinksArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let area = resolve_area(args.area.as_deref(), &settings)?;
    let roots = connect(&settings)?.tree(&area, &args.state, &args.tags, &ctx.cancel)?;
    render_forest(ctx, &roots)
}

pub fn run_fix(args: &FixArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let area = resolve_area(args.area.as_deref(), &settings)?;
    let service = connect(&settings)?;

    let roots = service.epic_hierarchy(&area, &ctx.cancel)?;
    let changes = service.fix_states(&roots, args.dry_run, &ctx.cancel)?;
    info!(changes = changes.len(), dry_run = args.dry_run, "fix complete");

    render(ctx.output, &changes, |changes, w| write_changes(changes, args.dry_run, w))
}

fn render_forest(ctx: &Context, roots: &[WorkItemNode]) -> Result<()> {
    render_mode(ctx.output, roots, write_forest_text, write_forest_pretty)
}

/// One tab-separated row per node: depth, id, type, state, expected, valid, title.
fn write_forest_text(roots: &[WorkItemNode], w: &mut dyn Write) -> io::Result<()> {
    for (depth, node) in walk(roots) {
        writeln!(
            w,
            "{depth}\t{}\t{}\t{}\t{}\t{}\t{}",
            node.info.id,
            node.info.work_item_type,
            node.info.state,
            node.expected_state,
            node.status_valid,
            node.info.title
        )?;
    }
    Ok(())
}

fn write_forest_pretty(roots: &[WorkItemNode], w: &mut dyn Write) -> io::Result<()> {
    if roots.is_empty() {
        return writeln!(w, "No open epics found.");
    }

    let nodes = walk(roots);
    let invalid = nodes.iter().filter(|(_, node)| !node.status_valid).count();

    pretty_section(w, &format!("Epic hierarchy ({} epics, {} items)", roots.len(), nodes.len()))?;
    for (depth, node) in nodes {
        let marker = if node.status_valid { ' ' } else { '!' };
        write!(
            w,
            "{marker} {:indent$}#{} {} [{}] {}",
            "",
            node.info.id,
            node.info.work_item_type,
            node.info.state,
            node.info.title,
            indent = depth * 2
        )?;
        if node.status_valid {
            writeln!(w)?;
        } else {
            writeln!(w, "  (expected {})", node.expected_state)?;
        }
    }
    pretty_rule(w)?;
    writeln!(w, "{invalid} inconsistent")
}

fn write_changes(changes: &[StateChange], dry_run: bool, w: &mut dyn Write) -> io::Result<()> {
    if changes.is_empty() {
        return writeln!(w, "All states are consistent.");
    }
    let verb = if dry_run { "would move" } else { "moved" };
    for change in changes {
        writeln!(
            w,
            "#{} {verb} {} -> {}  {}",
            change.id, change.from, change.to, change.title
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devops_core::model::{WorkItemInfo, WorkItemState, WorkItemType};
    use devops_core::status::propagate;

    fn forest() -> Vec<WorkItemNode> {
        let info = |id: u32, kind: &str, state: &str| WorkItemInfo {
            id,
            title: format!("title {id}"),
            state: WorkItemState::parse(state),
            work_item_type: WorkItemType::parse(kind),
            url: String::new(),
        };
        let mut epic = WorkItemNode::new(info(1, "Epic", "New"));
        epic.children.push(WorkItemNode::new(info(2, "Feature", "Active")));
        let mut roots = vec![epic];
        propagate(&mut roots);
        roots
    }

    #[test]
    fn text_rows_carry_depth_and_verdict() {
        let mut buf = Vec::new();
        write_forest_text(&forest(), &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "0\t1\tEpic\tNew\tActive\tfalse\ttitle 1");
        assert_eq!(lines[1], "1\t2\tFeature\tActive\tActive\ttrue\ttitle 2");
    }

    #[test]
    fn pretty_output_marks_inconsistent_nodes() {
        let mut buf = Vec::new();
        write_forest_pretty(&forest(), &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("! #1 Epic [New] title 1  (expected Active)"));
        assert!(out.contains("    #2 Feature [Active] title 2"));
        assert!(out.contains("1 inconsistent"));
    }

    #[test]
    fn dry_run_changes_use_conditional_wording() {
        let change = StateChange {
            id: 9,
            title: "epic".to_string(),
            from: WorkItemState::New,
            to: WorkItemState::Active,
            applied: false,
        };
        let mut buf = Vec::new();
        write_changes(&[change], true, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "#9 would move New -> Active  epic\n");
    }
}
