//! Snapshot guard commands.

use recall_guard::{SnapshotGuard, Verification};

use crate::cli::GuardAction;

pub(crate) async fn handle_guard_command(guard: &SnapshotGuard, action: GuardAction) -> anyhow::Result<()> {
    match action {
        GuardAction::Check { force } => {
            let report = guard.check(force).await?;
            for snapshot in &report.backed_up {
                println!("backed up  {} ({})", snapshot.file, snapshot.stamp());
            }
            for file in &report.skipped {
                println!("unchanged  {}", file);
            }
            for file in &report.missing {
                println!("missing    {}", file);
            }
            for file in &report.blocked {
                println!("blocked    {} (run `recall guard recover`)", file);
            }
            for failed in &report.failed {
                println!("failed     {}: {}", failed.file, failed.error);
            }
            if report.pruned > 0 {
                println!("Pruned {} old snapshots", report.pruned);
            }
            if !report.failed.is_empty() {
                anyhow::bail!("{} files could not be backed up", report.failed.len());
            }
        }
        GuardAction::Verify { file, expected } => {
            let results = match file {
                Some(file) => {
                    let verification = guard.verify(&file, expected.as_deref()).await?;
                    vec![(file, verification)]
                }
                None => guard
                    .verify_all()
                    .await?
                    .into_iter()
                    .map(|v| (v.file, v.verification))
                    .collect(),
            };

            let mut corrupt = 0;
            for (file, verification) in &results {
                match verification {
                    Verification::Intact => println!("intact     {}", file),
                    Verification::ExpectedEdit => println!("edited     {}", file),
                    Verification::NoSnapshot => println!("no backup  {}", file),
                    Verification::Missing => println!("missing    {}", file),
                    Verification::Corrupt { expected, actual } => {
                        corrupt += 1;
                        let found = actual.as_deref().map_or("nothing", short);
                        println!("CORRUPT    {} (expected {}, found {})", file, short(expected), found);
                    }
                }
            }
            if corrupt > 0 {
                anyhow::bail!("{} corrupt files detected; run `recall guard recover`", corrupt);
            }
        }
        GuardAction::Recover => {
            let outcomes = guard.recover().await?;
            if outcomes.is_empty() {
                println!("Nothing to recover.");
            }
            let mut failures = 0;
            for outcome in &outcomes {
                match (&outcome.restored, &outcome.error) {
                    (Some(report), _) => println!(
                        "restored   {} from {}",
                        outcome.file,
                        report.snapshot.stamp()
                    ),
                    (None, Some(error)) => {
                        failures += 1;
                        println!("failed     {}: {}", outcome.file, error);
                    }
                    (None, None) => {}
                }
            }
            if failures > 0 {
                anyhow::bail!("{} files could not be recovered", failures);
            }
        }
        GuardAction::List { file } => {
            let files = match file {
                Some(file) => vec![file],
                None => guard.options().protected_files.clone(),
            };
            for file in files {
                let snapshots = guard.list_snapshots(&file).await?;
                println!("{} ({} snapshots)", file, snapshots.len());
                for snapshot in snapshots.iter().rev() {
                    println!(
                        "  {}  {:>8} bytes  {}",
                        snapshot.stamp(),
                        snapshot.size,
                        short(&snapshot.content_hash)
                    );
                }
            }
        }
        GuardAction::Restore { file, timestamp } => {
            let report = guard.restore(&file, timestamp.as_deref()).await?;
            println!("Restored {} from {}", report.file, report.snapshot.stamp());
            if let Some(path) = report.quarantined {
                println!("Previous content kept at {}", path.display());
            }
        }
        GuardAction::Status => {
            for (file, record) in guard.status() {
                let last = record
                    .last_backup_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!("{:<30} {:<18} last backup {}", file, record.state.to_string(), last);
                if let Some(error) = record.last_error {
                    println!("  {}", error);
                }
            }
        }
    }
    Ok(())
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
