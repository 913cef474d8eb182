//! CLI review commands: `review`, `due`, `new`.

use anyhow::{bail, Result};

use gre_mentor::app::Mentor;
use gre_mentor::srs::Quality;

use super::{format_due, item_line};

/// Resolve the grade flags into a quality. `--correct`/`--wrong` map to 4/2.
pub fn resolve_quality(quality: Option<i64>, correct: bool, wrong: bool) -> Result<Quality> {
    match (quality, correct, wrong) {
        (Some(q), false, false) => Ok(Quality::new(q)?),
        (None, true, false) => Ok(Quality::from_correct(true)),
        (None, false, true) => Ok(Quality::from_correct(false)),
        (None, false, false) => bail!("give a grade with --quality 0-5, --correct or --wrong"),
        _ => bail!("--quality, --correct and --wrong are mutually exclusive"),
    }
}

pub fn review(mentor: &mut Mentor, id: &str, quality: Quality) -> Result<()> {
    let item = mentor.review(id, quality)?;
    let verdict = if quality.is_success() { "pass" } else { "fail" };
    println!("{} graded {quality} ({verdict})", item.term);
    println!(
        "  ease {:.2}, interval {} day(s), repetitions {}",
        item.ease, item.interval_days, item.repetitions
    );
    if let Some(due) = item.next_due {
        println!("  next review {}", format_due(&due));
    }
    Ok(())
}

pub fn due(mentor: &Mentor, limit: Option<usize>, include_new: bool) -> Result<()> {
    let items = mentor.due_items(limit, include_new)?;
    if items.is_empty() {
        println!("Nothing due.");
        return Ok(());
    }
    println!("{} item(s) due:", items.len());
    for item in &items {
        println!("  {}", item_line(item));
    }
    Ok(())
}

pub fn new_items(mentor: &Mentor, limit: Option<usize>) -> Result<()> {
    let items = mentor.new_items(limit)?;
    if items.is_empty() {
        println!("No new items.");
        return Ok(());
    }
    for item in &items {
        println!("  {}", item_line(item));
    }
    Ok(())
}
