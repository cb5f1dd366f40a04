use std::process::Command;

use anyhow::{Context, Result};

/// `stagesync-common` tiers; `None` means default features.
const FEATURE_TIERS: &[Option<&str>] = &[None, Some("foundation"), Some("runtime")];

/// Check that each `stagesync-common` feature tier compiles on its own.
pub fn test_feature_matrix() -> Result<()> {
    println!("Testing {} stagesync-common feature tiers...", FEATURE_TIERS.len());

    for (index, tier) in FEATURE_TIERS.iter().enumerate() {
        let label = tier.unwrap_or("default");

        println!(
            "\n[{}/{}] cargo check -p stagesync-common{}",
            index + 1,
            FEATURE_TIERS.len(),
            tier.map(|t| format!(" --no-default-features --features {t}")).unwrap_or_default()
        );

        let mut command = Command::new("cargo");
        command.arg("check").arg("-p").arg("stagesync-common");

        if let Some(feature) = tier {
            command.arg("--no-default-features").arg("--features").arg(feature);
        }

        let status =
            command.status().with_context(|| format!("Failed to run cargo check for '{label}'"))?;

        if !status.success() {
            anyhow::bail!("Feature tier '{label}' failed to compile");
        }

        println!("✅ Tier '{label}' compiled successfully");
    }

    println!("\n✅ All {} feature tiers compile successfully!", FEATURE_TIERS.len());

    Ok(())
}
