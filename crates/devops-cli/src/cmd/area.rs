use anyhow::Result;
use clap::Args;
use devops_core::area::normalize_area_path;
use serde::Serialize;

use super::Context;
use crate::output::render;

#[derive(Args, Debug)]
pub struct AreaArgs {
    /// Area path as reported by the classification API, e.g. `\Proj\Area\Team`.
    pub path: String,
}

#[derive(Debug, Serialize)]
struct Normalized<'a> {
    input: &'a str,
    normalized: String,
}

pub fn run_area(args: &AreaArgs, ctx: &Context) -> Result<()> {
    let result = Normalized {
        input: &args.path,
        normalized: normalize_area_path(&args.path),
    };
    render(ctx.output, &result, |r, w| writeln!(w, "{}", r.normalized))
}
