use std::path::{Path, PathBuf};

use {anyhow::Result, clap::Subcommand};

use relay_config::{Severity, find_config_file, load_or_discover, validate, write_default_config};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check,
    /// Write a documented default config file.
    Init {
        /// Where to write it (default: ./relay.toml).
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub fn handle_config(config: Option<&Path>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check => check(config),
        ConfigAction::Init { path } => init(path.as_deref().or(config)),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: Option<&Path>) -> Result<()> {
    match config.map(Path::to_path_buf).or_else(find_config_file) {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    let loaded = load_or_discover(config)?;
    let result = validate(&loaded);

    for d in &result.diagnostics {
        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };
        eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
    }

    let errors = count(&result.diagnostics, Severity::Error);
    let warnings = count(&result.diagnostics, Severity::Warning);
    if !result.diagnostics.is_empty() {
        eprintln!();
    }
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
        eprintln!("Errors only block the commands that need that section.");
    }
    Ok(())
}

fn count(diagnostics: &[relay_config::Diagnostic], severity: Severity) -> usize {
    diagnostics.iter().filter(|d| d.severity == severity).count()
}

fn init(path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or_else(|| Path::new("relay.toml"));
    if write_default_config(path)? {
        eprintln!("Wrote {}", path.display());
        eprintln!("Fill in [twilio] and [inbound.reply], then run `relay config check`.");
    } else {
        eprintln!("{} already exists; left it untouched.", path.display());
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_once_and_check_reads_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");

        init(Some(&path)).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(first.contains("[inbound.reply]"));

        std::fs::write(&path, "# edited\n").unwrap();
        init(Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited\n");

        check(Some(&path)).unwrap();
    }
}
