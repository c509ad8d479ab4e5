//! Loads the layered [`ca_domain::config::Config`] used by `run` and
//! `doctor`. `CA_CONFIG` (or `config.json` in the current directory)
//! points at a JSON document; a missing file falls back to defaults so
//! the example works with zero setup.

use ca_domain::config::Config;

pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("CA_CONFIG").unwrap_or_else(|_| "config.json".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        serde_json::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}
