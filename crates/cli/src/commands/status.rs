//! `stagesync status`

use stagesync_core::BatchSnapshot;

use crate::cli::StatusArgs;
use crate::context::AppContext;

pub async fn run(ctx: &AppContext, args: &StatusArgs) -> anyhow::Result<u8> {
    let snapshots = ctx.engine.status(args.customer.as_deref(), args.limit).await?;
    if snapshots.is_empty() {
        println!("no batches");
    }
    for snapshot in &snapshots {
        print!("{}", render(snapshot));
    }
    Ok(0)
}

fn render(snapshot: &BatchSnapshot) -> String {
    let batch = &snapshot.batch;
    let counts = &snapshot.counts;
    let mut out = format!(
        "{} [{}] {} {} started {}: total {}, ok {}, failed {}\n",
        batch.batch_id,
        batch.customer_key,
        batch.batch_type,
        batch.status,
        batch.start_time.format("%Y-%m-%d %H:%M:%S"),
        batch.total_records,
        batch.successful_records,
        batch.failed_records,
    );
    out.push_str(&format!(
        "  staged rows: pending {}, in-flight {}, success {}, failed {}, promoted {}\n",
        counts.pending, counts.in_flight, counts.api_success, counts.api_failed, counts.promoted
    ));
    if let Some(summary) = &batch.error_summary {
        out.push_str(&format!("  errors: {summary}\n"));
    }
    out
}
