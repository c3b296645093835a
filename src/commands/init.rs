use anyhow::Result;
use colored::*;
use std::fs;

use elysium_search::{SearchConfig, Store, StorePaths};

pub fn run(force: bool) -> Result<()> {
    let paths = StorePaths::new();

    println!("{}", "Elysium Search Store".bold());
    println!("{}", "=".repeat(50));
    println!();

    fs::create_dir_all(&paths.data)?;

    if paths.config.exists() && !force {
        println!(
            "{} {} exists (use --force to overwrite)",
            "✓".green(),
            paths.config.display()
        );
    } else {
        fs::write(&paths.config, SearchConfig::default().to_yaml()?)?;
        println!("{} Wrote {}", "✓".green(), paths.config.display());
    }

    let config = SearchConfig::load(&paths)?;
    let db_path = config.db_path(&paths);
    let store = Store::open(&db_path)?;
    println!(
        "{} Store ready at {} (schema v{})",
        "✓".green(),
        db_path.display(),
        store.schema_version()
    );

    Ok(())
}
