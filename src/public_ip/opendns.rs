use std::net::{IpAddr, Ipv4Addr};

use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::Resolver;

use crate::error::{Error, Result};
use crate::public_ip::api::{PublicIpSource, PublicIpSourceCreator};

const OPENDNS_RESOLVER: Ipv4Addr = Ipv4Addr::new(208, 67, 222, 222);
const MYIP_NAME: &str = "myip.opendns.com.";

/// Resolves `myip.opendns.com` against OpenDNS, which answers with the querying address.
pub struct OpenDns;

impl PublicIpSourceCreator for OpenDns {
    type Config = ();

    fn from_config(_config: Self::Config) -> Self {
        OpenDns
    }
}

impl PublicIpSource for OpenDns {
    fn describe(&self) -> String {
        format!("OpenDNS[resolver={}]", OPENDNS_RESOLVER)
    }

    fn public_ip(&self) -> Result<String> {
        let resolver = Resolver::new(
            ResolverConfig::from_parts(
                None,
                vec![],
                NameServerConfigGroup::from_ips_clear(&[IpAddr::V4(OPENDNS_RESOLVER)], 53, true),
            ),
            ResolverOpts::default(),
        )
        .map_err(|e| Error::PublicIpUnavailable(format!("failed to initialize resolver: {}", e)))?;
        let response = resolver
            .lookup_ip(MYIP_NAME)
            .map_err(|e| Error::PublicIpUnavailable(format!("failed to resolve {}: {}", MYIP_NAME, e)))?;
        first_v4(response.iter())
            .map(|address| address.to_string())
            .ok_or_else(|| Error::PublicIpUnavailable("no IPv4 addresses returned".to_string()))
    }
}

fn first_v4(addresses: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addresses
        .into_iter()
        .filter_map(|x| match x {
            IpAddr::V4(v4) => Some(v4),
            _ => None,
        })
        .next()
}
