use anyhow::Result;
use clap::Args;
use devops_core::model::WorkItemState;
use serde::Serialize;
use tracing::info;

use super::{Context, connect};
use crate::output::render;

#[derive(Args, Debug)]
pub struct SetStateArgs {
    /// Work item id.
    pub id: u32,

    /// Target state, e.g. Active or Closed.
    pub state: String,
}

#[derive(Debug, Serialize)]
struct SetStateResult {
    id: u32,
    state: WorkItemState,
}

pub fn run_set_state(args: &SetStateArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let state = WorkItemState::parse(&args.state);
    connect(&settings)?.set_state(args.id, &state)?;
    info!(id = args.id, %state, "state set");

    let result = SetStateResult { id: args.id, state };
    render(ctx.output, &result, |r, w| writeln!(w, "#{} is now {}", r.id, r.state))
}
