use anyhow::Result;

use gre_mentor::app::Mentor;

use super::truncate;

/// Semantic search over item terms and definitions.
pub fn search(mentor: &Mentor, query: &str, k: Option<usize>) -> Result<()> {
    let hits = mentor.search_items(query, k)?;
    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let definition = hit
            .item
            .definition
            .as_deref()
            .map(|d| truncate(d, 80))
            .unwrap_or_default();
        println!(
            "  {}. {} (distance: {:.4})  {}",
            i + 1,
            hit.item.term,
            hit.distance,
            definition
        );
        println!("     id: {}", hit.item.id);
    }
    Ok(())
}
