//! `.env` parsing into a key-value map. Applying to the environment happens in `lib.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn dotenv_path(override_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = match override_dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().ok()?,
    };
    let path = dir.join(".env");
    path.is_file().then_some(path)
}

fn unquote(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        match (bytes[0], bytes[bytes.len() - 1]) {
            (b'"', b'"') => return raw[1..raw.len() - 1].replace("\\\"", "\""),
            (b'\'', b'\'') => return raw[1..raw.len() - 1].to_string(),
            _ => {}
        }
    }
    raw.to_string()
}

/// One `KEY=VALUE` per line. Blank lines and `#` lines are skipped, an optional
/// `export ` prefix is dropped, values may be single- or double-quoted.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| {
            let l = l.strip_prefix("export ").unwrap_or(l);
            let (k, v) = l.split_once('=')?;
            let key = k.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(v.trim())))
        })
        .collect()
}

/// Missing `.env` yields an empty map.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    match dotenv_path(override_dir) {
        Some(p) => Ok(parse_dotenv(&std::fs::read_to_string(p)?)),
        None => Ok(HashMap::new()),
    }
}
