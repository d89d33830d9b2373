//! Environment loading for weft.
//!
//! Reads `$XDG_CONFIG_HOME/<app>/config.toml` (`[env]` table) and a project `.env`, then applies
//! them to the process environment. Precedence: **existing env > .env > XDG TOML**.
//! Typed settings are read from the environment afterwards (see `weft::WeftConfig::from_env`).

mod dotenv;
mod xdg_toml;

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("config dir: {0}")]
    ConfigDir(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Merges the two sources without touching the process environment.
///
/// Returns the values that would be applied: `.env` entries win over XDG entries and
/// keys already present in the process environment are dropped.
pub fn resolve(
    app_name: &str,
    override_dir: Option<&Path>,
) -> Result<HashMap<String, String>, LoadError> {
    let xdg = xdg_toml::load_env_map(app_name)?;
    let local = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let keys: BTreeSet<&String> = xdg.keys().chain(local.keys()).collect();
    let mut out = HashMap::new();
    for key in keys {
        if std::env::var_os(key).is_some() {
            continue;
        }
        if let Some(v) = local.get(key).or_else(|| xdg.get(key)) {
            out.insert(key.clone(), v.clone());
        }
    }
    Ok(out)
}

/// Applies [`resolve`] to the process environment. Only unset keys are written.
///
/// * `app_name`: e.g. `"weft"`; used for `~/.config/<app_name>/config.toml`.
/// * `override_dir`: directory holding `.env`; defaults to the current directory.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    for (key, value) in resolve(app_name, override_dir)? {
        std::env::set_var(key, value);
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn write_xdg(dir: &Path, app: &str, body: &str) {
        let app_dir = dir.join(app);
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), body).unwrap();
    }

    /// **Scenario**: A key already set in the process environment is never overwritten.
    #[test]
    fn existing_env_wins() {
        let _g = test_env::lock();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "WEFT_CFG_EXISTING=from_dotenv\n").unwrap();
        env::set_var("WEFT_CFG_EXISTING", "from_env");
        load_and_apply("weft-cfg-none", Some(dir.path())).unwrap();
        assert_eq!(env::var("WEFT_CFG_EXISTING").as_deref(), Ok("from_env"));
        env::remove_var("WEFT_CFG_EXISTING");
    }

    /// **Scenario**: No config file and no .env is not an error.
    #[test]
    fn missing_sources_ok() {
        let _g = test_env::lock();
        let dir = tempfile::tempdir().unwrap();
        let r = resolve("weft-cfg-nonexistent-app", Some(dir.path())).unwrap();
        assert!(r.is_empty());
    }

    /// **Scenario**: The same key in .env and XDG TOML resolves to the .env value.
    #[test]
    fn dotenv_overrides_xdg() {
        let _g = test_env::lock();
        let xdg = tempfile::tempdir().unwrap();
        write_xdg(xdg.path(), "weft", "[env]\nWEFT_CFG_PRIORITY = \"from_xdg\"\n");
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join(".env"), "WEFT_CFG_PRIORITY=from_dotenv\n").unwrap();

        let prev = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg.path());
        env::remove_var("WEFT_CFG_PRIORITY");
        let resolved = resolve("weft", Some(local.path()));
        test_env::restore("XDG_CONFIG_HOME", prev);

        let resolved = resolved.unwrap();
        assert_eq!(
            resolved.get("WEFT_CFG_PRIORITY").map(String::as_str),
            Some("from_dotenv")
        );
    }

    /// **Scenario**: Keys only present in XDG TOML are applied to the environment.
    #[test]
    fn xdg_applied_when_no_dotenv() {
        let _g = test_env::lock();
        let xdg = tempfile::tempdir().unwrap();
        write_xdg(xdg.path(), "weft", "[env]\nWEFT_CFG_XDG_ONLY = \"from_xdg\"\n");
        let empty = tempfile::tempdir().unwrap();

        let prev = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg.path());
        env::remove_var("WEFT_CFG_XDG_ONLY");
        let applied = load_and_apply("weft", Some(empty.path()));
        test_env::restore("XDG_CONFIG_HOME", prev);

        applied.unwrap();
        assert_eq!(env::var("WEFT_CFG_XDG_ONLY").as_deref(), Ok("from_xdg"));
        env::remove_var("WEFT_CFG_XDG_ONLY");
    }
}
