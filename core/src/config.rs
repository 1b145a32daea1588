//! Extractor defaults.
//!
//! A `Graph` carries an `ExtractorConfig` that every extractor it creates
//! starts from. Each extractor can still be tuned with its own setters.

use crate::CnResult;
use anyhow::Context;

pub const ENV_LIGHT_MODE: &str = "CACHENET_LIGHT_MODE";
pub const ENV_NUM_THREADS: &str = "CACHENET_NUM_THREADS";
pub const ENV_CACHE_MODE: &str = "CACHENET_CACHE_MODE";

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ExtractorConfig {
    /// Release intermediate blobs as soon as their consumer read them.
    pub light_mode: bool,
    /// Worker count for the duration of an extraction. 0 keeps the current
    /// executor.
    pub num_threads: usize,
    /// Track changed regions and let caching layers reuse their previous
    /// output.
    pub cache_mode: bool,
}

impl ExtractorConfig {
    pub fn with_light_mode(self, light_mode: bool) -> ExtractorConfig {
        ExtractorConfig { light_mode, ..self }
    }

    pub fn with_num_threads(self, num_threads: usize) -> ExtractorConfig {
        ExtractorConfig { num_threads, ..self }
    }

    pub fn with_cache_mode(self, cache_mode: bool) -> ExtractorConfig {
        ExtractorConfig { cache_mode, ..self }
    }

    /// Defaults overridden by `CACHENET_LIGHT_MODE`, `CACHENET_NUM_THREADS`
    /// and `CACHENET_CACHE_MODE`.
    pub fn from_env() -> CnResult<ExtractorConfig> {
        Self::default().override_with(|k| std::env::var(k).ok())
    }

    fn override_with(self, var: impl Fn(&str) -> Option<String>) -> CnResult<ExtractorConfig> {
        let mut config = self;
        if let Some(v) = var(ENV_LIGHT_MODE) {
            config.light_mode = parse_flag(&v).with_context(|| format!("Parsing {ENV_LIGHT_MODE}"))?;
        }
        if let Some(v) = var(ENV_NUM_THREADS) {
            config.num_threads =
                v.trim().parse().with_context(|| format!("Parsing {ENV_NUM_THREADS}={v:?}"))?;
        }
        if let Some(v) = var(ENV_CACHE_MODE) {
            config.cache_mode = parse_flag(&v).with_context(|| format!("Parsing {ENV_CACHE_MODE}"))?;
        }
        Ok(config)
    }
}

fn parse_flag(v: &str) -> CnResult<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" | "" => Ok(false),
        other => anyhow::bail!("Expected a boolean flag, got {:?}", other),
    }
}
