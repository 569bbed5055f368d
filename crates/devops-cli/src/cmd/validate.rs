//! `dva validate` and `dva stories`: flat listings for backlog review.

use anyhow::Result;
use clap::Args;
use devops_core::model::{StoryHierarchyDetails, WorkItemDetails, WorkItemInfo};
use std::io::{self, Write};

use super::{Context, connect, resolve_area, resolve_states};
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Area path (defaults to `defaults.area_path`).
    #[arg(long)]
    pub area: Option<String>,

    /// Comma-separated states (defaults to `defaults.states`).
    #[arg(long)]
    pub states: Option<String>,
}

#[derive(Args, Debug)]
pub struct StoriesArgs {
    /// Area path (defaults to `defaults.area_path`).
    #[arg(long)]
    pub area: Option<String>,

    /// Comma-separated states; empty means every story.
    #[arg(long)]
    pub states: Option<String>,
}

pub fn run_validate(args: &ValidateArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let area = resolve_area(args.area.as_deref(), &settings)?;
    let states = resolve_states(args.states.as_deref(), &settings);
    let rows = connect(&settings)?.validation_items(&area, &states, &ctx.cancel)?;
    render_mode(ctx.output, &rows[..], write_details_text, write_details_pretty)
}

pub fn run_stories(args: &StoriesArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let area = resolve_area(args.area.as_deref(), &settings)?;
    let states = resolve_states(args.states.as_deref(), &settings);
    let stories = connect(&settings)?.story_hierarchy(&area, &states, &ctx.cancel)?;
    render_mode(ctx.output, &stories[..], write_stories_text, write_stories_pretty)
}

/// Tab-separated: id, type, state, parent, title.
pub fn write_details_text(rows: &[WorkItemDetails], w: &mut dyn Write) -> io::Result<()> {
    for row in rows {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            row.info.id,
            row.info.work_item_type,
            row.info.state,
            row.parent_id.map_or_else(String::new, |id| id.to_string()),
            row.info.title
        )?;
    }
    Ok(())
}

pub fn write_details_pretty(rows: &[WorkItemDetails], w: &mut dyn Write) -> io::Result<()> {
    if rows.is_empty() {
        return writeln!(w, "No matching work items.");
    }
    pretty_section(w, &format!("{} work items", rows.len()))?;
    for row in rows {
        writeln!(
            w,
            "#{:<7} {:<11} {:<9} {}",
            row.info.id, row.info.work_item_type, row.info.state, row.info.title
        )?;
        if let Some(parent) = row.parent_id {
            writeln!(w, "{:9}parent #{parent}", "")?;
        }
        if !row.tags.is_empty() {
            writeln!(w, "{:9}tags: {}", "", row.tags.join(", "))?;
        }
    }
    Ok(())
}

fn write_stories_text(stories: &[StoryHierarchyDetails], w: &mut dyn Write) -> io::Result<()> {
    for story in stories {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            story.story.id,
            story.story.state,
            id_or_blank(story.feature.as_ref()),
            id_or_blank(story.epic.as_ref()),
            story.story.title
        )?;
    }
    Ok(())
}

fn write_stories_pretty(stories: &[StoryHierarchyDetails], w: &mut dyn Write) -> io::Result<()> {
    if stories.is_empty() {
        return writeln!(w, "No matching user stories.");
    }
    for story in stories {
        pretty_section(w, &format!("#{} {}", story.story.id, story.story.title))?;
        pretty_kv(w, "State", story.story.state.as_str())?;
        pretty_kv(w, "Feature", describe(story.feature.as_ref()))?;
        pretty_kv(w, "Epic", describe(story.epic.as_ref()))?;
        writeln!(w)?;
    }
    Ok(())
}

fn id_or_blank(info: Option<&WorkItemInfo>) -> String {
    info.map_or_else(String::new, |info| info.id.to_string())
}

fn describe(info: Option<&WorkItemInfo>) -> String {
    info.map_or_else(|| "(none)".to_string(), |info| format!("#{} {}", info.id, info.title))
}
