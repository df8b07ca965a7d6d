use std::collections::HashMap;

use attohttpc::Response;
use log::{debug, info};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::provider::api::DynDnsProvider;

/// FreeDNS (afraid.org) account, addressed through its `getdyndns` API.
pub struct FreeDns {
    base_url: String,
    token: String,
    settings: HashMap<String, SettingsEntry>,
}

/// One subdomain as the provider currently knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsEntry {
    pub current_ip: String,
    /// Pre-authorized, one-shot update endpoint for this subdomain.
    pub update_url: String,
}

impl FreeDns {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        FreeDns {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: auth_token(username, password),
            settings: HashMap::new(),
        }
    }

    fn check_status(response: Response) -> Result<Response> {
        if !response.is_success() {
            return Err(Error::ProviderProtocolError(format!(
                "{status} from FreeDNS",
                status = response.status()
            )));
        }
        Ok(response)
    }

    fn entry(&self, subdomain: &str) -> Result<&SettingsEntry> {
        self.settings
            .get(subdomain)
            .ok_or_else(|| Error::UnknownSubdomain(subdomain.to_string()))
    }
}

impl DynDnsProvider for FreeDns {
    fn describe(&self) -> String {
        format!("FreeDNS[base={base}]", base = &self.base_url)
    }

    fn refresh(&mut self) -> Result<()> {
        let response = attohttpc::get(format!("{base}/api/", base = self.base_url))
            .param("action", "getdyndns")
            .param("sha", &self.token)
            .send()?;
        let body = FreeDns::check_status(response)?.text()?;
        self.settings = parse_listing(&body)?;
        debug!("[freedns] Listing holds {} subdomains", self.settings.len());
        Ok(())
    }

    fn current_ip(&self, subdomain: &str) -> Result<&str> {
        self.entry(subdomain).map(|e| e.current_ip.as_str())
    }

    fn trigger_update(&mut self, subdomain: &str) -> Result<String> {
        let update_url = self.entry(subdomain)?.update_url.clone();
        info!("[freedns] Requesting update of {}", subdomain);

        let response = attohttpc::get(update_url).send()?;
        // Read the body out so the connection is drained; its content is not used.
        let body = FreeDns::check_status(response)?.text()?;
        debug!("[freedns] Update response: {:?}", body.trim());

        self.refresh()?;
        self.current_ip(subdomain).map(str::to_string)
    }
}

/// Lowercase hex SHA-1 of `username|password`, sent instead of the credentials.
fn auth_token(username: &str, password: &str) -> String {
    let digest = Sha1::digest(format!("{}|{}", username, password).as_bytes());
    hex::encode(digest)
}

/// Parses the `subdomain|ip|update_url` lines of a `getdyndns` response.
fn parse_listing(body: &str) -> Result<HashMap<String, SettingsEntry>> {
    let mut settings = HashMap::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("ERROR") {
            return Err(Error::ProviderProtocolError(line.to_string()));
        }
        match line.splitn(3, '|').collect::<Vec<_>>().as_slice() {
            [subdomain, current_ip, update_url] => {
                settings.insert(
                    subdomain.to_string(),
                    SettingsEntry {
                        current_ip: current_ip.to_string(),
                        update_url: update_url.to_string(),
                    },
                );
            }
            _ => {
                return Err(Error::ProviderProtocolError(format!(
                    "malformed listing line {:?}",
                    line
                )))
            }
        }
    }
    Ok(settings)
}
