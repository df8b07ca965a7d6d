use crate::error::Result;

/// A dynamic-DNS provider that lists its subdomains and can repoint them on request.
pub(crate) trait DynDnsProvider {
    fn describe(&self) -> String;

    /// Replaces the known subdomain listing with the provider's current one.
    fn refresh(&mut self) -> Result<()>;

    /// The address the provider currently holds for `subdomain`, as of the last refresh.
    fn current_ip(&self, subdomain: &str) -> Result<&str>;

    /// Asks the provider to point `subdomain` at the caller's address, then refreshes
    /// and returns the address the provider now reports.
    fn trigger_update(&mut self, subdomain: &str) -> Result<String>;
}
