use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use crate::Context;
use crate::cli::SimulateArgs;
use crate::ui;
use dbconverge::config::HandlerConfig;
use dbconverge::handlers::{HandlerOutput, Handlers};
use dbconverge::host::{
    ContextStore, DEFAULT_MAX_INVOCATIONS, Host, Outcome, Sleeper, ThreadSleeper,
};
use dbconverge::scenario::Scenario;
use dbconverge::sim::{API_CALLS, SimulatedDb};
use reconcile::{Clock, ManualClock, ProgressEvent, SystemClock};

pub fn run(ctx: &Context, args: SimulateArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let config = HandlerConfig::load(args.config.as_deref())?;

    let db = scenario.simulator();
    let legacy = db.legacy();
    let manual = ManualClock::default();
    let (clock, sleeper): (&dyn Clock, &dyn Sleeper) = if args.real_time {
        (&SystemClock, &ThreadSleeper)
    } else {
        (&manual, &manual)
    };
    let handlers = Handlers::new(&db, config, clock).with_legacy_api(&legacy);

    let limit = args
        .max_invocations
        .or(scenario.max_invocations)
        .unwrap_or(DEFAULT_MAX_INVOCATIONS);
    let mut host = Host::new(handlers, sleeper).max_invocations(limit);
    if let Some(path) = &args.checkpoint {
        let path = PathBuf::from(shellexpand::tilde(path).as_ref());
        host = host.with_store(ContextStore::new(path));
    }

    let outcome = host.drive(scenario.operation, scenario.request())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    print_outcome(ctx, &scenario, &outcome);
    if ctx.verbose > 0 {
        print_calls(&db);
    }
    Ok(())
}

fn print_outcome(ctx: &Context, scenario: &Scenario, outcome: &Outcome) {
    let target = if scenario.desired.identifier.is_empty() {
        "instances".to_string()
    } else {
        scenario.desired.identifier.clone()
    };
    ui::header(&format!("{} {target}", scenario.operation));

    if !ctx.quiet {
        let total = outcome.invocations.len();
        for invocation in &outcome.invocations {
            let detail = match invocation.retry_after_secs {
                Some(secs) => format!("{} (retry after {secs}s)", invocation.status),
                None => invocation.status.to_string(),
            };
            ui::step(invocation.number, total, &detail);
        }
        println!();
    }

    match &outcome.event {
        ProgressEvent::Success { observed } => {
            ui::success(&format!("{} complete", scenario.operation));
            match observed {
                Some(HandlerOutput::Instance(instance)) => {
                    ui::kv("status", &instance.status);
                    if let Some(endpoint) = &instance.endpoint {
                        ui::kv("endpoint", endpoint);
                    }
                    let tags: Vec<String> = instance
                        .tags
                        .iter()
                        .map(|t| format!("{}={}", t.key, t.value))
                        .collect();
                    if !tags.is_empty() {
                        ui::kv("tags", &tags.join(", "));
                    }
                }
                Some(HandlerOutput::Page(page)) => {
                    for instance in &page.instances {
                        ui::kv(&instance.identifier, &instance.status);
                    }
                    if let Some(token) = &page.next_token {
                        ui::kv("next token", token);
                    }
                }
                None => {}
            }
        }
        ProgressEvent::Failed { kind, message, .. } => {
            ui::error(&format!("{} failed: {}", scenario.operation, kind.as_str().bold()));
            ui::dim(message);
        }
        ProgressEvent::InProgress { .. } => {}
    }
}

fn print_calls(db: &SimulatedDb) {
    ui::section("API calls");
    for api in API_CALLS {
        let count = db.calls(api);
        if count > 0 {
            ui::kv(api, &count.to_string());
        }
    }
}
