//! `stagesync stage`

use stagesync_infra::JsonFileDetector;

use crate::cli::StageArgs;
use crate::context::AppContext;

pub async fn run(ctx: &AppContext, args: &StageArgs) -> anyhow::Result<u8> {
    let detector =
        JsonFileDetector::new(&args.input, ctx.staging.clone(), ctx.production.clone());

    match ctx.engine.detect_and_stage(&detector, &args.customer).await? {
        Some(batch) => {
            println!(
                "staged batch {} ({}) with {} records for {}",
                batch.batch_id, batch.batch_type, batch.total_records, batch.customer_key
            );
        }
        None => println!("nothing new to stage for {}", args.customer),
    }
    Ok(0)
}
