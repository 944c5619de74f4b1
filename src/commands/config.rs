use anyhow::{Context as _, Result};

use crate::Context;
use crate::ui;
use dbconverge::config::{HandlerConfig, default_config_path};

pub fn run(_ctx: &Context, config: Option<&str>) -> Result<()> {
    ui::header("Handler Configuration");

    match config {
        Some(path) => ui::kv("Config file", path),
        None => ui::kv("Config file", &default_config_path()?.display().to_string()),
    }

    let loaded = HandlerConfig::load(config)?;
    let rendered = toml::to_string_pretty(&loaded).context("Failed to serialize config to TOML")?;
    println!();
    println!("{rendered}");
    Ok(())
}
