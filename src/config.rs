use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Deployment configuration: where the store file lives and where backup
/// snapshots are written. Both default to sensible paths when absent;
/// `backup_dir` feeds `Store::open_with_backup_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TablekitConfig {
    pub database: Option<String>,
    pub backup_dir: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("tablekit.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join("data").join("store.sqlite")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<TablekitConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: TablekitConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &TablekitConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tablekit.toml");

        let config = TablekitConfig {
            database: Some("data/store.sqlite".to_string()),
            backup_dir: None,
        };
        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.database.as_deref(), Some("data/store.sqlite"));
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert!(loaded.is_none());
    }
}
