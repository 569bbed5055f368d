//! `dva search` and `dva metrics`.

use anyhow::{Result, anyhow};
use chrono::{Days, Local, NaiveDate};
use clap::Args;
use devops_core::model::{WorkItemDetails, WorkItemType};
use serde::Serialize;
use std::io::{self, Write};

use super::validate::{write_details_pretty, write_details_text};
use super::{Context, connect, resolve_area};
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Title fragment, or a work item id.
    pub term: String,

    /// Area path (defaults to `defaults.area_path`).
    #[arg(long)]
    pub area: Option<String>,
}

#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// Area path (defaults to `defaults.area_path`).
    #[arg(long)]
    pub area: Option<String>,

    /// First day counted (YYYY-MM-DD). Overrides --days.
    #[arg(long, value_name = "DATE")]
    pub since: Option<NaiveDate>,

    /// Look-back window in days.
    #[arg(long, default_value_t = 30)]
    pub days: u64,
}

/// Throughput since a date.
#[derive(Debug, Serialize)]
pub struct MetricsReport {
    pub since: NaiveDate,
    pub total: usize,
    pub stories: usize,
    pub bugs: usize,
    pub items: Vec<WorkItemDetails>,
}

impl MetricsReport {
    fn new(since: NaiveDate, items: Vec<WorkItemDetails>) -> Self {
        let count = |kind: &WorkItemType| {
            items
                .iter()
                .filter(|item| item.info.work_item_type == *kind)
                .count()
        };
        Self {
            since,
            total: items.len(),
            stories: count(&WorkItemType::UserStory),
            bugs: count(&WorkItemType::Bug),
            items,
        }
    }
}

pub fn run_search(args: &SearchArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let area = resolve_area(args.area.as_deref(), &settings)?;
    let rows = connect(&settings)?.search(&area, &args.term, &ctx.cancel)?;
    render_mode(ctx.output, &rows[..], write_details_text, write_details_pretty)
}

pub fn run_metrics(args: &MetricsArgs, ctx: &Context) -> Result<()> {
    let since = match args.since {
        Some(date) => date,
        None => Local::now()
            .date_naive()
            .checked_sub_days(Days::new(args.days))
            .ok_or_else(|| anyhow!("--days {} reaches before the supported date range", args.days))?,
    };

    let settings = ctx.settings()?;
    let area = resolve_area(args.area.as_deref(), &settings)?;
    let items = connect(&settings)?.closed_since(&area, since, &ctx.cancel)?;
    let report = MetricsReport::new(since, items);

    render_mode(ctx.output, &report, write_metrics_text, write_metrics_pretty)
}

fn write_metrics_text(report: &MetricsReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "since={} total={} stories={} bugs={}",
        report.since, report.total, report.stories, report.bugs
    )
}

fn write_metrics_pretty(report: &MetricsReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Closed since {}", report.since))?;
    pretty_kv(w, "Total", report.total.to_string())?;
    pretty_kv(w, "User stories", report.stories.to_string())?;
    pretty_kv(w, "Bugs", report.bugs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devops_core::model::{WorkItemInfo, WorkItemState};

    fn row(id: u32, kind: &str) -> WorkItemDetails {
        WorkItemDetails {
            info: WorkItemInfo {
                id,
                title: String::new(),
                state: WorkItemState::Closed,
                work_item_type: WorkItemType::parse(kind),
                url: String::new(),
            },
            area_path: None,
            iteration_path: None,
            tags: Vec::new(),
            parent_id: None,
        }
    }

    #[test]
    fn report_counts_by_type() {
        let since = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let report = MetricsReport::new(
            since,
            vec![row(1, "User Story"), row(2, "bug"), row(3, "user story")],
        );
        assert_eq!(report.total, 3);
        assert_eq!(report.stories, 2);
        assert_eq!(report.bugs, 1);

        let mut buf = Vec::new();
        write_metrics_text(&report, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "since=2024-01-01 total=3 stories=2 bugs=1\n"
        );
    }
}
