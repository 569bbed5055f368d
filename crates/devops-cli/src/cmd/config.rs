use anyhow::{Context as _, Result, anyhow, bail};
use clap::{Args, Subcommand};
use devops_core::config::Settings;
use devops_core::error::DevOpsError;
use devops_core::wiql::parse_state_list;
use serde::Serialize;
use tracing::info;

use super::Context;
use crate::output::render;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show effective settings (file plus ADO_* overrides); the PAT is masked
    Show,
    /// Set one key in the config file
    Set(SetArgs),
    /// Print the config file path
    Path,
}

#[derive(Args, Debug)]
struct SetArgs {
    /// Dot path key (e.g. connection.organization, fetch.batch_size)
    key: String,

    /// New value
    value: String,
}

#[derive(Debug, Serialize)]
struct Mutation<'a> {
    ok: bool,
    key: &'a str,
    path: String,
}

pub fn run_config(args: &ConfigArgs, ctx: &Context) -> Result<()> {
    match &args.command {
        ConfigCommand::Show => run_show(ctx),
        ConfigCommand::Set(set) => run_set(set, ctx),
        ConfigCommand::Path => {
            let path = ctx.config_path()?;
            render(ctx.output, &path, |p, w| writeln!(w, "{}", p.display()))
        }
    }
}

fn run_show(ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?.redacted();
    let rendered = toml::to_string_pretty(&settings).context("failed to render settings")?;
    render(ctx.output, &settings, |_, w| write!(w, "{rendered}"))
}

fn run_set(args: &SetArgs, ctx: &Context) -> Result<()> {
    let path = ctx.config_path()?;
    let mut settings = Settings::load(&path).map_err(DevOpsError::from)?;
    apply_set(&mut settings, &args.key, &args.value)?;
    settings.save(&path).map_err(DevOpsError::from)?;
    info!(key = %args.key, path = %path.display(), "config updated");

    let mutation = Mutation {
        ok: true,
        key: &args.key,
        path: path.display().to_string(),
    };
    render(ctx.output, &mutation, |m, w| writeln!(w, "set {} in {}", m.key, m.path))
}

fn apply_set(settings: &mut Settings, key: &str, raw: &str) -> Result<()> {
    let value = raw.trim();
    match key {
        "connection.organization" => settings.connection.organization = value.to_string(),
        "connection.project" => settings.connection.project = value.to_string(),
        "connection.pat" => settings.connection.pat = value.to_string(),
        "fetch.batch_size" => settings.fetch.batch_size = parse_number(key, value)?,
        "fetch.max_waves" => settings.fetch.max_waves = parse_number(key, value)?,
        "fetch.timeout_secs" => settings.fetch.timeout_secs = parse_number(key, value)?,
        "defaults.area_path" => {
            settings.defaults.area_path = (!value.is_empty()).then(|| value.to_string());
        }
        "defaults.states" => settings.defaults.states = parse_state_list(value),
        _ => bail!("Unsupported key `{key}`"),
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| anyhow!("{key} expects a non-negative integer, got `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_are_applied() {
        let mut settings = Settings::default();
        apply_set(&mut settings, "connection.organization", " contoso ").unwrap();
        apply_set(&mut settings, "fetch.max_waves", "8").unwrap();
        apply_set(&mut settings, "defaults.states", "New, Active").unwrap();
        apply_set(&mut settings, "defaults.area_path", "Proj\\Team").unwrap();

        assert_eq!(settings.connection.organization, "contoso");
        assert_eq!(settings.fetch.max_waves, 8);
        assert_eq!(settings.defaults.states, vec!["New", "Active"]);
        assert_eq!(settings.defaults.area_path.as_deref(), Some("Proj\\Team"));
    }

    #[test]
    fn blank_area_clears_the_default() {
        let mut settings = Settings::default();
        settings.defaults.area_path = Some("Proj".to_string());
        apply_set(&mut settings, "defaults.area_path", "").unwrap();
        assert!(settings.defaults.area_path.is_none());
    }

    #[test]
    fn unknown_key_and_bad_number_are_rejected() {
        let mut settings = Settings::default();
        assert!(apply_set(&mut settings, "connection.token", "x").is_err());
        let err = apply_set(&mut settings, "fetch.batch_size", "-3").unwrap_err();
        assert!(err.to_string().contains("fetch.batch_size"));
    }
}
