//! CLI `doctor` command: database and index diagnostics.

use anyhow::{Context, Result};

use gre_mentor::app::Mentor;

/// Print a health report, optionally repairing item/vector drift.
pub fn doctor(mentor: &mut Mentor, fix: bool) -> Result<()> {
    let db_path = mentor.config().resolved_db_path();
    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let report = mentor.doctor().context("failed to run health check")?;
    let db = &report.database;

    println!("GRE Mentor Health Report");
    println!("========================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", db.schema_version);
    println!();
    println!("Embedding model:");
    println!("  Stored:          {}", db.embedding_model.as_deref().unwrap_or("(not set)"));
    println!("  Configured:      {}", report.configured_model);
    if let Some(ref stored) = db.embedding_model {
        if stored != &report.configured_model && report.configured_model != "none" {
            println!("  WARNING: model mismatch! Run `gre-mentor backfill --all` to update vectors.");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Items:           {}", db.item_count);
    println!("  Mappings:        {}", db.mapping_count);
    println!("  Review log:      {}", db.review_log_count);
    println!();
    println!("Vector index:");
    match mentor.index().path() {
        Some(path) => println!("  File:            {}", path.display()),
        None => println!("  File:            (in memory)"),
    }
    println!("  Stored vectors:  {}", report.index.stored);
    println!("  Mapped:          {}", report.index.mapped);
    println!("  Holes:           {}", report.index.orphans.len());
    if !report.index.dangling.is_empty() {
        println!("  Dangling:        {}", report.index.dangling.len());
    }
    if report.index.high_water > report.index.stored as u64 {
        println!(
            "  High-water mark: {} (past the stored rows; another writer touched this index)",
            report.index.high_water
        );
    }
    for (external_id, ids) in &report.index.duplicates {
        println!("  Duplicate:       {external_id} -> {ids:?}");
    }
    if !report.items_without_vectors.is_empty() {
        println!("  Items missing vectors:   {}", report.items_without_vectors.len());
    }
    if !report.vectors_without_items.is_empty() {
        println!("  Vectors of deleted items: {}", report.vectors_without_items.len());
    }
    println!();
    if db.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", db.integrity_details);
    }

    if report.is_healthy() {
        if !report.index.orphans.is_empty() {
            println!("Run `gre-mentor rebuild` to reclaim space from holes.");
        }
        return Ok(());
    }

    if fix {
        let repaired = mentor.repair()?;
        println!();
        println!(
            "Repaired: {} item(s) requeued, {} mapping(s) removed.",
            repaired.requeued_items, repaired.removed_mappings
        );
        if repaired.requeued_items > 0 {
            println!("Run `gre-mentor backfill` to embed requeued items.");
        }
    } else {
        println!();
        println!("Run `gre-mentor doctor --fix` to repair item/vector drift.");
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
