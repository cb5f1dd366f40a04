//! `stagesync run`

use stagesync_core::{BatchOutcome, RunReport};

use crate::cli::RunArgs;
use crate::context::AppContext;

pub async fn run(ctx: &AppContext, args: &RunArgs) -> anyhow::Result<u8> {
    ctx.cancel_on_ctrl_c();

    let report = match &args.batch {
        Some(batch_id) => {
            let outcome = ctx.engine.run_batch(batch_id).await?;
            RunReport {
                dry_run: ctx.config.engine.dry_run,
                cancelled: ctx.cancel.is_cancelled(),
                outcomes: vec![outcome],
                ..RunReport::default()
            }
        }
        None => ctx.engine.run_partitions(args.customer.as_deref()).await?,
    };

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(u8::try_from(report.exit_code()).unwrap_or(1))
}

fn render(report: &RunReport) -> String {
    let mut out = String::new();
    if report.dry_run {
        out.push_str("DRY RUN: no requests were sent (use --execute)\n");
    }
    if report.outcomes.is_empty() {
        out.push_str("no open batches\n");
    }
    for outcome in &report.outcomes {
        out.push_str(&render_outcome(outcome));
    }
    for error in &report.errors {
        out.push_str(&format!("error: {error}\n"));
    }
    out.push_str(&format!(
        "total: {} succeeded, {} failed, {} unresolved{}\n",
        report.total_succeeded(),
        report.total_failed(),
        report.total_unresolved(),
        if report.cancelled { " (cancelled)" } else { "" }
    ));
    out
}

fn render_outcome(outcome: &BatchOutcome) -> String {
    let mut line = format!(
        "{} [{}] {}: {}/{} succeeded, {} failed, {} unresolved, {} promoted, {} requests\n",
        outcome.batch_id,
        outcome.customer_key,
        outcome.status,
        outcome.succeeded,
        outcome.total,
        outcome.failed,
        outcome.unresolved,
        outcome.promoted,
        outcome.requests,
    );
    if let Some(summary) = &outcome.error_summary {
        line.push_str(&format!("  errors: {summary}\n"));
    }
    if let Some(error) = &outcome.error {
        line.push_str(&format!("  aborted: {error}\n"));
    }
    line
}
