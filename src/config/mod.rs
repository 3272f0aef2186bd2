// Configuration management module
// Server identity, bind address, transport selection and tool assets

pub mod settings;


pub use settings::{AssetConfig, Config, ConfigError, ServerConfig, TransportMode};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}

/// Print the effective configuration as TOML
#[inline]
pub fn show_config(config: &Config) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config)?;
    println!("# {}", config.config_file_path().display());
    println!("{}", rendered);
    Ok(())
}
