use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub struct KeyLoader;

impl KeyLoader {
    /// Loads 0x-prefixed private keys from a newline-delimited file.
    ///
    /// Blank lines and `#` comments are ignored; malformed lines are skipped
    /// with a warning. A missing file yields an empty list so the menu can
    /// report "no accounts" instead of aborting.
    pub fn load_keys(path: &str) -> Result<Vec<String>> {
        let path_ref = Path::new(path);
        if !path_ref.exists() {
            warn!("Key file not found: {}", path);
            return Ok(Vec::new());
        }

        let content =
            fs::read_to_string(path_ref).with_context(|| format!("Failed to read {}", path))?;
        let mut keys = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if Self::looks_like_key(line) {
                keys.push(line.to_string());
            } else {
                warn!("Skipping malformed key line in {}", path);
            }
        }

        info!("Loaded {} accounts from {}", keys.len(), path);
        Ok(keys)
    }

    fn looks_like_key(line: &str) -> bool {
        let hex = match line.strip_prefix("0x") {
            Some(h) => h,
            None => return false,
        };
        hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_valid_keys_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "0x{}", "ab".repeat(32)).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not-a-key").unwrap();
        writeln!(file, "0x{}", "cd".repeat(32)).unwrap();

        let keys = KeyLoader::load_keys(file.path().to_str().unwrap()).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].starts_with("0xabab"));
    }

    #[test]
    fn missing_file_yields_empty_list() {
        let keys = KeyLoader::load_keys("does/not/exist.txt").unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!KeyLoader::looks_like_key("0xabcd"));
        assert!(KeyLoader::looks_like_key(&format!("0x{}", "12".repeat(32))));
    }
}
