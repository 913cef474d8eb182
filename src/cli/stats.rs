use anyhow::Result;

use gre_mentor::app::Mentor;

/// Display review counts in the terminal.
pub fn stats(mentor: &Mentor) -> Result<()> {
    let stats = mentor.stats()?;
    let pending = mentor.pending_count()?;

    println!("Review Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total items:         {}", stats.total);
    println!("  New:                 {}", stats.new);
    println!("  Due now:             {}", stats.due);
    println!("  Upcoming:            {}", stats.upcoming);
    println!();
    println!("Vector index:");
    println!("  Stored vectors:      {}", mentor.index().len());
    println!("  Unsaved:             {}", mentor.index().unsaved());
    println!("  Pending embeddings:  {pending}");

    Ok(())
}
