//! `[env]` table from `<config dir>/<app>/config.toml`.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::LoadError;

/// `$XDG_CONFIG_HOME` when set, otherwise the platform config dir.
fn config_home() -> Result<PathBuf, LoadError> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir().ok_or_else(|| LoadError::ConfigDir("no config directory".into()))
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Missing file or missing `[env]` table yields an empty map.
pub fn load_env_map(app_name: &str) -> Result<HashMap<String, String>, LoadError> {
    let path = config_home()?.join(app_name).join("config.toml");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(&path).map_err(LoadError::XdgRead)?;
    let file: ConfigFile = toml::from_str(&content)?;
    Ok(file.env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env;

    fn with_xdg_home<T>(dir: &std::path::Path, f: impl FnOnce() -> T) -> T {
        let prev = std::env::var("XDG_CONFIG_HOME").ok();
        std::env::set_var("XDG_CONFIG_HOME", dir);
        let out = f();
        test_env::restore("XDG_CONFIG_HOME", prev);
        out
    }

    /// **Scenario**: `[env]` entries are returned as strings.
    #[test]
    fn reads_env_table() {
        let _g = test_env::lock();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("weft")).unwrap();
        std::fs::write(
            dir.path().join("weft/config.toml"),
            "[env]\nWEFT_DB_PATH = \"/tmp/w.db\"\nWEFT_RECURSION_LIMIT = \"40\"\n",
        )
        .unwrap();

        let map = with_xdg_home(dir.path(), || load_env_map("weft")).unwrap();
        assert_eq!(map.get("WEFT_DB_PATH").map(String::as_str), Some("/tmp/w.db"));
        assert_eq!(map.get("WEFT_RECURSION_LIMIT").map(String::as_str), Some("40"));
    }

    /// **Scenario**: Other tables are ignored.
    #[test]
    fn no_env_table_is_empty() {
        let _g = test_env::lock();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("noenv")).unwrap();
        std::fs::write(dir.path().join("noenv/config.toml"), "[other]\nk = \"v\"\n").unwrap();

        let map = with_xdg_home(dir.path(), || load_env_map("noenv")).unwrap();
        assert!(map.is_empty());
    }

    /// **Scenario**: Broken TOML surfaces as XdgParse.
    #[test]
    fn invalid_toml_is_parse_error() {
        let _g = test_env::lock();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bad")).unwrap();
        std::fs::write(dir.path().join("bad/config.toml"), "not toml [[[\n").unwrap();

        let r = with_xdg_home(dir.path(), || load_env_map("bad"));
        assert!(matches!(r, Err(LoadError::XdgParse(_))));
    }
}
