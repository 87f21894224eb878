use std::env;
use std::path::PathBuf;
use anyhow::{anyhow, Context};
use sdui_core::{ComputeOptions, ComputeUnits};
use crate::generator::artifact::{DEFAULT_JPEG_QUALITY, RESULTS_DIR_NAME};

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub pictures_root: PathBuf,
    pub results_dir_name: String,
    pub db_path: PathBuf,
    pub model_resources: PathBuf,
    pub compute: ComputeOptions,
    pub jpeg_quality: u8,
}

impl GeneratorConfig {
    /// Reads `.env` if there is one, then the process environment.
    pub fn load() -> anyhow::Result<Self> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e).context("reading .env"),
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset keys take their defaults,
    /// malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let data_root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sdui");

        let pictures_root = match lookup("SDUI_PICTURES_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::picture_dir()
                .or_else(|| dirs::home_dir().map(|home| home.join("Pictures")))
                .ok_or_else(|| anyhow!("no pictures directory found, set SDUI_PICTURES_DIR"))?,
        };

        let results_dir_name = lookup("SDUI_RESULTS_DIR_NAME").unwrap_or_else(|| RESULTS_DIR_NAME.to_string());

        let db_path = lookup("SDUI_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join("history.db"));

        let model_resources = lookup("SDUI_MODEL_RESOURCES")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join("models"));

        let compute_units = match lookup("SDUI_COMPUTE_UNITS") {
            Some(units) => units
                .parse::<ComputeUnits>()
                .map_err(|e| anyhow!(e))
                .context("SDUI_COMPUTE_UNITS")?,
            None => ComputeUnits::default(),
        };

        let disable_safety = match lookup("SDUI_DISABLE_SAFETY") {
            Some(flag) => flag
                .trim()
                .parse::<bool>()
                .with_context(|| format!("SDUI_DISABLE_SAFETY must be true or false, got '{flag}'"))?,
            None => ComputeOptions::default().disable_safety,
        };

        let jpeg_quality = match lookup("SDUI_JPEG_QUALITY") {
            Some(quality) => {
                let quality: u8 = quality
                    .trim()
                    .parse()
                    .with_context(|| format!("SDUI_JPEG_QUALITY must be a number, got '{quality}'"))?;
                if !(1..=100).contains(&quality) {
                    anyhow::bail!("SDUI_JPEG_QUALITY must be between 1 and 100, got {quality}");
                }
                quality
            }
            None => DEFAULT_JPEG_QUALITY,
        };

        Ok(Self {
            pictures_root,
            results_dir_name,
            db_path,
            model_resources,
            compute: ComputeOptions {
                compute_units,
                disable_safety,
            },
            jpeg_quality,
        })
    }

    /// Directory artifacts are written to.
    pub fn results_dir(&self) -> PathBuf {
        self.pictures_root.join(&self.results_dir_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<GeneratorConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GeneratorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let conf = config(&[("SDUI_PICTURES_DIR", "/home/me/Pictures")]).unwrap();
        assert_eq!(conf.results_dir(), PathBuf::from("/home/me/Pictures/Stable Diffusion Results"));
        assert_eq!(conf.compute.compute_units, ComputeUnits::CpuAndNeuralEngine);
        assert!(conf.compute.disable_safety);
        assert_eq!(conf.jpeg_quality, 90);
        assert!(conf.db_path.ends_with("sdui/history.db"));
    }

    #[test]
    fn test_overrides() {
        let conf = config(&[
            ("SDUI_PICTURES_DIR", "/p"),
            ("SDUI_RESULTS_DIR_NAME", "out"),
            ("SDUI_DB_PATH", "/data/h.db"),
            ("SDUI_MODEL_RESOURCES", "/models/sd2"),
            ("SDUI_COMPUTE_UNITS", "cpu_and_gpu"),
            ("SDUI_DISABLE_SAFETY", "false"),
            ("SDUI_JPEG_QUALITY", "75"),
        ])
        .unwrap();

        assert_eq!(conf.results_dir(), PathBuf::from("/p/out"));
        assert_eq!(conf.db_path, PathBuf::from("/data/h.db"));
        assert_eq!(conf.model_resources, PathBuf::from("/models/sd2"));
        assert_eq!(conf.compute.compute_units, ComputeUnits::CpuAndGpu);
        assert!(!conf.compute.disable_safety);
        assert_eq!(conf.jpeg_quality, 75);
    }

    #[test]
    fn test_malformed_values_are_errors() {
        assert!(config(&[("SDUI_PICTURES_DIR", "/p"), ("SDUI_COMPUTE_UNITS", "tpu")]).is_err());
        assert!(config(&[("SDUI_PICTURES_DIR", "/p"), ("SDUI_DISABLE_SAFETY", "maybe")]).is_err());
        assert!(config(&[("SDUI_PICTURES_DIR", "/p"), ("SDUI_JPEG_QUALITY", "0")]).is_err());
        assert!(config(&[("SDUI_PICTURES_DIR", "/p"), ("SDUI_JPEG_QUALITY", "high")]).is_err());
    }
}
