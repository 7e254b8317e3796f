//! Init subcommand - scaffold a new corpus project directory.

use std::fs;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::{Config, default_toml};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project name written into litkeep.toml
    #[arg(long, default_value = "")]
    pub name: String,
}

pub fn run(args: InitArgs, config: &Config) -> Result<()> {
    let project_dir = &config.project.dir;

    for dir in [
        "searches",
        "expansions",
        "fulltext/pdf",
        "fulltext/xml",
        "fulltext/inbox",
        "fulltext/processed",
    ] {
        fs::create_dir_all(project_dir.join(dir))
            .with_context(|| format!("failed to create {dir}"))?;
    }

    let toml_path = project_dir.join("litkeep.toml");
    if toml_path.exists() {
        eprintln!("litkeep.toml already exists, skipping");
    } else {
        let name = if args.name.is_empty() {
            project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            args.name
        };
        fs::write(&toml_path, default_toml(&name))
            .with_context(|| format!("failed to write {}", toml_path.display()))?;
        eprintln!("Created {}", toml_path.display());
    }

    eprintln!("Project initialized. Edit litkeep.toml to configure API keys and search defaults.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use tempfile::TempDir;

    #[test]
    fn init_creates_layout_and_config() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            project: ProjectConfig {
                name: String::new(),
                dir: dir.path().to_path_buf(),
            },
            ..Default::default()
        };

        run(
            InitArgs {
                name: "demo".to_string(),
            },
            &config,
        )
        .unwrap();

        assert!(dir.path().join("litkeep.toml").exists());
        assert!(dir.path().join("fulltext/inbox").is_dir());
        assert!(dir.path().join("searches").is_dir());

        let written = Config::from_file(&dir.path().join("litkeep.toml")).unwrap();
        assert_eq!(written.project.name, "demo");
    }
}
