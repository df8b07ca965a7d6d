use std::path::PathBuf;

use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub(crate) enum Error {
    /// The record file exists but could not be read or written.
    #[error("Record file {} is unavailable: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Record file {} is malformed: {source}", path.display())]
    RecordsMalformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to encode records for {}: {source}", path.display())]
    RecordsUnencodable {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Subdomain {0} is already tracked")]
    DuplicateSubdomain(String),

    #[error("Failed to reach the DNS provider: {0}")]
    ProviderUnreachable(#[source] attohttpc::Error),

    #[error("Unexpected response from the DNS provider: {0}")]
    ProviderProtocolError(String),

    #[error("Subdomain {0} is not known")]
    UnknownSubdomain(String),

    /// The provider accepted an update but still reports a different address.
    #[error("Provider reports {actual} for {subdomain} after update, expected {expected}")]
    UpdateNotConverged {
        subdomain: String,
        expected: String,
        actual: String,
    },

    #[error("Unable to determine the public IP address: {0}")]
    PublicIpUnavailable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<attohttpc::Error> for Error {
    fn from(err: attohttpc::Error) -> Self {
        Error::ProviderUnreachable(err)
    }
}
