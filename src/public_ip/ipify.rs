use std::net::IpAddr;

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::public_ip::api::{PublicIpSource, PublicIpSourceCreator};

/// Asks a plain-text "what is my IP" endpoint, ipify by default.
pub struct Ipify {
    config: IpifyConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IpifyConfig {
    #[serde(default = "default_url")]
    pub url: String,
}

impl Default for IpifyConfig {
    fn default() -> Self {
        IpifyConfig { url: default_url() }
    }
}

fn default_url() -> String {
    "https://api.ipify.org".to_string()
}

impl PublicIpSourceCreator for Ipify {
    type Config = IpifyConfig;

    fn from_config(config: Self::Config) -> Self {
        Ipify { config }
    }
}

impl PublicIpSource for Ipify {
    fn describe(&self) -> String {
        format!("HTTP[url={url}]", url = &self.config.url)
    }

    fn public_ip(&self) -> Result<String> {
        let response = attohttpc::get(&self.config.url)
            .send()
            .map_err(|e| Error::PublicIpUnavailable(e.to_string()))?;
        if !response.is_success() {
            return Err(Error::PublicIpUnavailable(format!(
                "{} returned {}",
                self.config.url,
                response.status()
            )));
        }
        let body = response
            .text()
            .map_err(|e| Error::PublicIpUnavailable(e.to_string()))?;
        debug!("[ipify] Raw response: {:?}", body);
        parse_address(&body)
    }
}

/// The body is the address itself, give or take surrounding whitespace.
fn parse_address(body: &str) -> Result<String> {
    let address = body.trim();
    address
        .parse::<IpAddr>()
        .map(|_| address.to_string())
        .map_err(|_| Error::PublicIpUnavailable(format!("not an IP address: {:?}", address)))
}
