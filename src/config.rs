use std::collections::HashSet;
use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::public_ip::ipify::IpifyConfig;

#[derive(Deserialize, Debug)]
pub(crate) struct Config {
    pub username: String,
    pub password: String,
    pub subdomains: Vec<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_records_file")]
    pub records_file: PathBuf,
    #[serde(default)]
    pub public_ip: PublicIpConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) enum PublicIpConfig {
    #[serde(rename = "http")]
    Http(IpifyConfig),
    #[serde(rename = "opendns")]
    OpenDns,
}

impl Default for PublicIpConfig {
    fn default() -> Self {
        PublicIpConfig::Http(IpifyConfig::default())
    }
}

fn default_base_url() -> String {
    "https://freedns.afraid.org".to_string()
}

fn default_records_file() -> PathBuf {
    PathBuf::from("./records.json")
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Config> {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("Failed to open {}", path.display()))?;
        let config: Config = serde_yaml::from_reader(file).wrap_err("Failed to read config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.subdomains.is_empty() {
            return Err(Error::Config("no subdomains configured".to_string()));
        }
        let mut seen = HashSet::new();
        for subdomain in &self.subdomains {
            if !seen.insert(subdomain.as_str()) {
                return Err(Error::Config(format!(
                    "subdomain {} is listed more than once",
                    subdomain
                )));
            }
        }
        Ok(())
    }

    /// Rejects a domain filter that does not name a configured subdomain.
    pub fn validate_filter(&self, domain: Option<&str>) -> Result<()> {
        match domain {
            Some(d) if !self.subdomains.iter().any(|s| s == d) => {
                Err(Error::UnknownSubdomain(d.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn selected(&self, domain: Option<&str>) -> Vec<String> {
        match domain {
            Some(d) => self
                .subdomains
                .iter()
                .filter(|s| s.as_str() == d)
                .cloned()
                .collect(),
            None => self.subdomains.clone(),
        }
    }
}
