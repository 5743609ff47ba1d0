use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use crossterm::style::{self, Stylize};

use crate::config::{AppConfig, GlobalOpts};
use crate::pipeline::Pipeline;
use crate::progress::Spinner;

pub async fn run(repo_url: &str, opts: &GlobalOpts) -> Result<()> {
    let cfg = AppConfig::init_from_cli(opts)?;

    print_runtime_summary(&cfg);

    let spinner = Spinner::new(format!("Cloning {repo_url} ..."));
    let mut pipeline = Pipeline::new(&cfg);
    pipeline.set_progress(spinner.clone());

    let info = match pipeline.run(repo_url).await {
        Ok(info) => {
            spinner.finish(format!("Inspected {}", info.name()));
            info
        }
        Err(e) => {
            spinner.fail("Resolution failed");
            return Err(e).with_context(|| format!("Could not resolve an image from {repo_url}"));
        }
    };

    if let Some(dest) = opts.json.as_deref() {
        let output = serde_json::to_string_pretty(&info)?;
        if dest == "-" {
            println!("{output}");
        } else {
            fs::write(dest, &output)
                .with_context(|| format!("Failed to write JSON to {dest}"))?;
            eprintln!("{} Wrote {dest}", "✔".green());
        }
    } else {
        println!("{}", info.name());
        println!("  size: {}", info.size());
        println!("  layers: {}", info.layers());
    }

    Ok(())
}

fn print_runtime_summary(cfg: &AppConfig) {
    let mut stderr = io::stderr();
    let _ = writeln!(
        stderr,
        "{} {} ({})",
        "Runtime".dim(),
        style::style(cfg.runtime.kind).green().bold(),
        style::style(cfg.runtime.binary_path.display()).dim(),
    );
    let _ = writeln!(
        stderr,
        "{} {}",
        "Checkouts".dim(),
        style::style(cfg.storage_root.display()).dim(),
    );
    let _ = writeln!(stderr);
}
