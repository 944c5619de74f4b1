use anyhow::{Result, bail};
use std::path::Path;

use crate::Context;
use crate::ui;
use dbconverge::host::ContextStore;

pub fn run(_ctx: &Context, file: &Path) -> Result<()> {
    let store = ContextStore::new(file);
    let Some(stored) = store.load()? else {
        bail!("No context stored at {}", file.display());
    };

    ui::header("Stored Context");
    ui::kv("File", &store.path().display().to_string());

    ui::section("Completed");
    let mut any = false;
    for flag in stored.flags() {
        ui::dim(flag);
        any = true;
    }
    if !any {
        ui::dim("nothing yet");
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(())
}
