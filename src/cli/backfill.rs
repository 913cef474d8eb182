//! CLI `backfill` and `rebuild` commands: embedding catch-up and index
//! compaction.

use anyhow::{Context, Result};
use indicatif::ProgressBar;

use gre_mentor::app::Mentor;

use super::progress_style;

/// Embed pending items. With `all`, every item is requeued first so the
/// whole index is regenerated with the current model.
pub fn backfill(mentor: &mut Mentor, limit: usize, all: bool) -> Result<()> {
    if all {
        let n = mentor.requeue_all()?;
        println!("Requeued {n} item(s) for embedding with '{}'.", mentor.model_id());
    }

    let total = mentor.pending_items(limit)?.len();
    if total == 0 {
        println!("No items waiting for embeddings.");
        return Ok(());
    }

    println!("Embedding {total} item(s) with '{}'...", mentor.model_id());
    let pb = ProgressBar::new(total as u64);
    pb.set_style(progress_style());

    let report = mentor
        .backfill(limit, |_, _| pb.inc(1))
        .context("backfill failed")?;
    pb.finish_and_clear();

    println!("Embedded {} of {} item(s).", report.embedded, report.attempted);
    if report.failed > 0 {
        println!("  {} item(s) still pending; see the log for errors.", report.failed);
    }
    if all {
        println!("Run `gre-mentor rebuild` to drop the replaced vectors from disk.");
    }
    Ok(())
}

pub fn rebuild(mentor: &mut Mentor) -> Result<()> {
    println!("Rebuilding vector index...");
    let report = mentor.rebuild_index().context("rebuild failed")?;
    println!(
        "  {} vector(s) before, {} after ({} dropped).",
        report.vectors_before,
        report.vectors_after,
        report.dropped()
    );
    Ok(())
}
