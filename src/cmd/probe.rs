use anyhow::Result;
use crossterm::style::{self, Stylize};

use crate::probe;

pub fn run(json: bool) -> Result<()> {
    let runtimes = probe::detect();

    if json {
        println!("{}", serde_json::to_string_pretty(&runtimes)?);
        return Ok(());
    }

    if runtimes.is_empty() {
        eprintln!("{} No container runtimes detected", "!".yellow().bold());
        return Ok(());
    }

    for (i, rt) in runtimes.iter().enumerate() {
        let marker = if i == 0 { "*".green().bold() } else { " ".stylize() };
        println!(
            "{marker} {:<8} {}",
            rt.kind.to_string(),
            style::style(rt.binary_path.display()).dim()
        );
    }
    Ok(())
}
