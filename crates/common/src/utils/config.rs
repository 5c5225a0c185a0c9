use anyhow::{Context, Result};
use ::config::{Config, File};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Loads configuration from a file into a struct.
/// Supports TOML, YAML, JSON, etc. based on file extension.
pub fn load_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path_str = path.as_ref().to_str().context("Invalid config path")?;

    let settings = Config::builder()
        .add_source(File::with_name(path_str))
        .build()
        .with_context(|| format!("Failed to read configuration from {}", path_str))?;

    settings.try_deserialize::<T>().context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        port: u16,
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "name = \"spout\"\nport = 3000").unwrap();

        let sample: Sample = load_config(&path).unwrap();
        assert_eq!(sample.name, "spout");
        assert_eq!(sample.port, 3000);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Sample> = load_config(dir.path().join("absent.toml"));
        assert!(result.is_err());
    }
}
