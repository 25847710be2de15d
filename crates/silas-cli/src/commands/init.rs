//! `silas init` — idempotent workspace initialization.

use colored::Colorize;

const STARTER_CONFIG: &str = "\
# Silas workspace configuration.
# Uncomment and adjust; every field has a built-in default.

# [runtime]
# data_dir = \"data\"

# [sandbox]
# base_dir = \"data/sandbox\"
# default_max_memory_mb = 512
# default_max_cpu_seconds = 30

# [context]
# tier2_strategy = \"local\"

# [gates]
# taint_ceiling = \"external\"
# length_limit_tokens = 4000

# [logging]
# level = \"info\"
";

/// Create `data/`, `data/sandbox/{work,verify}/`, and a starter
/// `config.toml` if they don't already exist. Safe to run more than once.
pub fn run_init() -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let data_dir = cwd.join("data");

    if data_dir.exists() {
        println!("{}", format!("Workspace already initialized at {}", data_dir.display()).dimmed());
        return Ok(());
    }

    for sub in ["sandbox/work", "sandbox/verify", "secrets"] {
        std::fs::create_dir_all(data_dir.join(sub))?;
    }

    let config_path = cwd.join("config.toml");
    if !config_path.exists() {
        std::fs::write(&config_path, STARTER_CONFIG)?;
    }

    println!("{}", format!("Initialized workspace at {}", cwd.display()).green());
    println!("  Created: {}", data_dir.display());
    println!("  Config:  {}", config_path.display());
    Ok(())
}
