//! WIQL (Work Item Query Language) builders.
//!
//! Pure string formatting with no I/O. Building never fails: an empty or
//! nonsensical area path still yields a well-formed query, and the server's
//! rejection surfaces through the HTTP layer. Area paths are expected to be
//! normalized with [`crate::area::normalize_area_path`] beforehand.
//!
//! Every interpolated literal goes through [`escape`].

use std::fmt::Write as _;

use chrono::NaiveDate;

/// Double single quotes so a value can sit inside a WIQL string literal.
#[must_use]
pub fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Split a comma-separated filter (`"New, Active"`) into trimmed values.
#[must_use]
pub fn parse_state_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Open epics under `area`, ordered by id.
#[must_use]
pub fn build_epics_wiql(area: &str) -> String {
    format!(
        "SELECT [System.Id] FROM WorkItems \
         WHERE [System.WorkItemType] = 'Epic' \
         AND [System.State] NOT IN ('Closed', 'Removed') \
         AND [System.AreaPath] UNDER '{}' \
         ORDER BY [System.Id]",
        escape(area)
    )
}

/// Epics, features and stories under `area` in any of `states`.
///
/// An empty `states` slice drops the state clause.
#[must_use]
pub fn build_validation_wiql<S: AsRef<str>>(area: &str, states: &[S]) -> String {
    let mut query = format!(
        "SELECT [System.Id] FROM WorkItems \
         WHERE [System.WorkItemType] IN ('Epic', 'Feature', 'User Story') \
         AND [System.AreaPath] UNDER '{}'",
        escape(area)
    );
    push_state_in(&mut query, "[System.State]", states);
    query.push_str(" ORDER BY [System.Id]");
    query
}

/// User stories under `area`, optionally restricted to `states`.
///
/// With no states the query matches every story rather than none.
#[must_use]
pub fn build_stories_wiql<S: AsRef<str>>(area: &str, states: &[S]) -> String {
    let mut query = format!(
        "SELECT [System.Id] FROM WorkItems \
         WHERE [System.WorkItemType] = 'User Story' \
         AND [System.AreaPath] UNDER '{}'",
        escape(area)
    );
    push_state_in(&mut query, "[System.State]", states);
    query.push_str(" ORDER BY [System.Id]");
    query
}

/// Recursive parent/child link query rooted in `area`.
///
/// `state` is a single state or a comma-separated list (`IN (...)`); blank
/// means no state filter. `tags` is comma-separated, one `CONTAINS` clause
/// per tag.
#[must_use]
pub fn build_wiql(area: &str, state: &str, tags: &str) -> String {
    let area = escape(area);
    let mut source = format!("[Source].[System.AreaPath] UNDER '{area}'");

    let states = parse_state_list(state);
    if state.contains(',') {
        push_state_in(&mut source, "[Source].[System.State]", &states);
    } else if let Some(single) = states.first() {
        let _ = write!(source, " AND [Source].[System.State] = '{}'", escape(single));
    }

    for tag in parse_state_list(tags) {
        let _ = write!(source, " AND [Source].[System.Tags] CONTAINS '{}'", escape(&tag));
    }

    format!(
        "SELECT [System.Id] FROM WorkItemLinks \
         WHERE ({source}) \
         AND ([System.Links.LinkType] = 'System.LinkTypes.Hierarchy-Forward') \
         AND ([Target].[System.AreaPath] UNDER '{area}') \
         ORDER BY [System.Id] MODE (Recursive)"
    )
}

/// Stories and bugs under `area` closed on or after `since`.
#[must_use]
pub fn build_metrics_wiql(area: &str, since: NaiveDate) -> String {
    format!(
        "SELECT [System.Id] FROM WorkItems \
         WHERE [System.WorkItemType] IN ('User Story', 'Bug') \
         AND [System.AreaPath] UNDER '{}' \
         AND [System.State] IN ('Closed', 'Done') \
         AND [Microsoft.VSTS.Common.ClosedDate] >= '{}' \
         ORDER BY [Microsoft.VSTS.Common.ClosedDate]",
        escape(area),
        since.format("%Y-%m-%d")
    )
}

/// Free-text search under `area`: a numeric term matches the id, anything
/// else is a title substring match.
#[must_use]
pub fn build_search_wiql(area: &str, term: &str) -> String {
    let term = term.trim();
    let predicate = term.parse::<u32>().map_or_else(
        |_| format!("[System.Title] CONTAINS '{}'", escape(term)),
        |id| format!("[System.Id] = {id}"),
    );

    format!(
        "SELECT [System.Id] FROM WorkItems \
         WHERE [System.AreaPath] UNDER '{}' \
         AND {predicate} \
         ORDER BY [System.ChangedDate] DESC",
        escape(area)
    )
}

fn push_state_in<S: AsRef<str>>(query: &mut String, field: &str, states: &[S]) {
    if states.is_empty() {
        return;
    }
    let quoted: Vec<String> = states
        .iter()
        .map(|state| format!("'{}'", escape(state.as_ref())))
        .collect();
    let _ = write!(query, " AND {field} IN ({})", quoted.join(", "));
}
