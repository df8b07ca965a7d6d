use serde::de::DeserializeOwned;

use crate::config::PublicIpConfig;
use crate::error::Result;
use crate::public_ip::ipify::Ipify;
use crate::public_ip::opendns::OpenDns;

pub(crate) trait PublicIpSourceCreator
where
    Self: PublicIpSource,
{
    type Config: DeserializeOwned;

    fn from_config(config: Self::Config) -> Self;
}

pub(crate) trait PublicIpSource {
    fn describe(&self) -> String;

    /// Returns the caller's public address, as text.
    fn public_ip(&self) -> Result<String>;
}

impl From<PublicIpConfig> for Box<dyn PublicIpSource> {
    fn from(config: PublicIpConfig) -> Box<dyn PublicIpSource> {
        match config {
            PublicIpConfig::Http(http) => Box::from(Ipify::from_config(http)),
            PublicIpConfig::OpenDns => Box::from(OpenDns::from_config(())),
        }
    }
}
