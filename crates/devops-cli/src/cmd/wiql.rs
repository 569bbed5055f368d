//! `dva wiql <kind>`: print the query a command would run. No network.

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use devops_core::area::normalize_area_path;
use devops_core::wiql;
use serde::Serialize;

use super::Context;
use crate::output::render;

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Open epics (used by `tree` and `fix`).
    Epics,
    /// Epics, features and stories in the given states.
    Validation,
    /// User stories in the given states.
    Stories,
    /// Recursive parent/child link query.
    Links,
    /// Stories and bugs closed since a date.
    Metrics,
    /// Title or id search.
    Search,
}

#[derive(Args, Debug)]
pub struct WiqlArgs {
    #[arg(value_enum)]
    pub kind: QueryKind,

    /// Area path; normalized before use.
    #[arg(long)]
    pub area: String,

    /// Comma-separated states (validation, stories, links).
    #[arg(long, default_value = "")]
    pub states: String,

    /// Comma-separated tags (links).
    #[arg(long, default_value = "")]
    pub tags: String,

    /// First day counted (metrics).
    #[arg(long, value_name = "DATE")]
    pub since: Option<NaiveDate>,

    /// Search term (search).
    #[arg(long)]
    pub term: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueryOutput {
    kind: QueryKind,
    area: String,
    query: String,
}

pub fn run_wiql(args: &WiqlArgs, ctx: &Context) -> Result<()> {
    let area = normalize_area_path(&args.area);
    let query = build(args, &area)?;
    let output = QueryOutput {
        kind: args.kind,
        area,
        query,
    };
    render(ctx.output, &output, |o, w| writeln!(w, "{}", o.query))
}

fn build(args: &WiqlArgs, area: &str) -> Result<String> {
    let states = wiql::parse_state_list(&args.states);
    let query = match args.kind {
        QueryKind::Epics => wiql::build_epics_wiql(area),
        QueryKind::Validation => wiql::build_validation_wiql(area, &states),
        QueryKind::Stories => wiql::build_stories_wiql(area, &states),
        QueryKind::Links => wiql::build_wiql(area, &args.states, &args.tags),
        QueryKind::Metrics => {
            let Some(since) = args.since else {
                bail!("metrics queries need --since YYYY-MM-DD");
            };
            wiql::build_metrics_wiql(area, since)
        }
        QueryKind::Search => {
            let Some(term) = args.term.as_deref() else {
                bail!("search queries need --term");
            };
            wiql::build_search_wiql(area, term)
        }
    };
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(kind: QueryKind) -> WiqlArgs {
        WiqlArgs {
            kind,
            area: "\\Proj\\Area\\Team".to_string(),
            states: String::new(),
            tags: String::new(),
            since: None,
            term: None,
        }
    }

    #[test]
    fn links_query_uses_state_list() {
        let mut a = args(QueryKind::Links);
        a.states = "New,Active".to_string();
        let query = build(&a, "Proj\\Team").unwrap();
        assert!(query.contains("IN ('New', 'Active')"), "{query}");
        assert!(query.contains("MODE (Recursive)"));
    }

    #[test]
    fn metrics_without_date_is_rejected() {
        let err = build(&args(QueryKind::Metrics), "Proj").unwrap_err();
        assert!(err.to_string().contains("--since"));
    }

    #[test]
    fn search_requires_term() {
        assert!(build(&args(QueryKind::Search), "Proj").is_err());
        let mut a = args(QueryKind::Search);
        a.term = Some("42".to_string());
        assert!(build(&a, "Proj").unwrap().contains("[System.Id] = 42"));
    }
}
