//! JSON設定ファイルの読み書き。

use anyhow::Context;
use pianoroll::PlotOptions;
use std::path::Path;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ConfigContainer {
    version: u64,
    value: serde_json::Value,
}

const CONFIG_VERSION: u64 = 1;

pub fn load_config(path: &Path) -> anyhow::Result<PlotOptions> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open config file {}", path.display()))?;
    let container: ConfigContainer = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    if container.version != CONFIG_VERSION {
        anyhow::bail!(
            "Unsupported config version {} in {} (expected {CONFIG_VERSION})",
            container.version,
            path.display()
        );
    }
    let options = serde_json::from_value(container.value).context("Failed to parse config")?;
    tracing::debug!(?options, path = %path.display(), "loaded config");
    Ok(options)
}

#[cfg(test)]
pub fn save_config(path: &Path, options: &PlotOptions) -> anyhow::Result<()> {
    let container = ConfigContainer {
        version: CONFIG_VERSION,
        value: serde_json::to_value(options).context("Failed to serialize config")?,
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create config file {}", path.display()))?;
    serde_json::to_writer_pretty(file, &container)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    Ok(())
}
