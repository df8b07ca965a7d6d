use log::{debug, info};

use crate::error::{Error, Result};
use crate::provider::api::DynDnsProvider;
use crate::records::RecordStore;

/// Points every subdomain in `subdomains` at `public_ip`, recording each check.
///
/// Stops at the first failure. The store is not flushed here.
pub(crate) fn run(
    public_ip: &str,
    subdomains: &[String],
    provider: &mut dyn DynDnsProvider,
    store: &mut RecordStore,
) -> Result<()> {
    provider.refresh()?;

    for subdomain in subdomains {
        if let Some(last) = &store.lookup(subdomain).ip {
            debug!("{} was last seen at {}", subdomain, last);
        }
        let current = provider.current_ip(subdomain)?;
        info!("{} currently points at {}", subdomain, current);

        if current != public_ip {
            info!("Updating {} from {} to {}", subdomain, current, public_ip);
            let updated = provider.trigger_update(subdomain)?;
            if updated != public_ip {
                return Err(Error::UpdateNotConverged {
                    subdomain: subdomain.to_string(),
                    expected: public_ip.to_string(),
                    actual: updated,
                });
            }
            info!("{} now points at {}", subdomain, updated);
        }

        let record = store.record_check(subdomain, public_ip);
        info!(
            "{} unchanged for {} checks",
            subdomain, record.unchanged_count
        );
    }

    Ok(())
}
