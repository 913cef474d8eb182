//! CLI item commands: `add`, `show`, `list`, `delete`.

use anyhow::{Context, Result};

use gre_mentor::app::Mentor;
use gre_mentor::srs::{EmbeddingState, NewItem};

use super::{format_due, item_line};

pub fn add(
    mentor: &mut Mentor,
    term: &str,
    definition: Option<&str>,
    tags: &[String],
    embed: bool,
) -> Result<()> {
    let mut new = NewItem::new(term).with_tags(tags.iter().cloned());
    if let Some(def) = definition {
        new = new.with_definition(def);
    }

    let item = if embed {
        mentor.add_item(&new)
    } else {
        mentor.add_item_unindexed(&new)
    }
    .context("failed to add item")?;

    println!("Added {} ({})", item.term, item.id);
    if item.embedding == EmbeddingState::Pending {
        println!("  Embedding pending. Run `gre-mentor backfill` once the provider is available.");
    }
    Ok(())
}

pub fn show(mentor: &Mentor, id: &str) -> Result<()> {
    let item = mentor.get_item(id)?;
    let history = mentor.history(id)?;

    println!("{}", item.term);
    println!("{}", "=".repeat(item.term.chars().count().max(8)));
    if let Some(ref def) = item.definition {
        println!("Definition:    {def}");
    }
    if !item.tags.is_empty() {
        println!("Tags:          {}", item.tags.join(", "));
    }
    println!("Id:            {}", item.id);
    println!("Ease:          {:.2}", item.ease);
    println!("Interval:      {} day(s)", item.interval_days);
    println!("Repetitions:   {}", item.repetitions);
    match item.next_due {
        Some(due) => println!("Next due:      {}", format_due(&due)),
        None => println!("Next due:      (new)"),
    }
    println!("Embedding:     {}", item.embedding);

    if !history.is_empty() {
        println!();
        println!("Reviews:");
        for entry in &history {
            println!(
                "  {}  q={}  ease {:.2} -> {:.2}  interval {} -> {}",
                entry.reviewed_at.format("%Y-%m-%d %H:%M"),
                entry.quality,
                entry.before.ease,
                entry.after.ease,
                entry.before.interval_days,
                entry.after.interval_days,
            );
        }
    }
    Ok(())
}

pub fn list(mentor: &Mentor, tag: Option<&str>, limit: usize) -> Result<()> {
    let items = mentor.list_items(tag, limit)?;
    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }
    for item in &items {
        println!("{}", item_line(item));
    }
    Ok(())
}

pub fn delete(mentor: &mut Mentor, id: &str) -> Result<()> {
    let item = mentor.get_item(id)?;
    let vectors = mentor.delete_item(id)?;
    println!("Deleted {} ({vectors} vector mapping(s) removed).", item.term);
    if vectors > 0 {
        println!("  Stored vectors stay until `gre-mentor rebuild`.");
    }
    Ok(())
}
