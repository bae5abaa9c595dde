//! Library-manager backend abstraction and the two supported API shapes.

pub mod arr_http;
pub mod radarr;
pub mod sonarr;
#[cfg(test)]
pub(crate) mod test_server;

use crate::config::{HttpConfig, ResolvedInstance};
use crate::error::HuntError;
use crate::protocol::{ManagerKind, WantedKind, WantedPage};
use crate::retry::RetryPolicy;

use arr_http::ArrHttpClient;
use radarr::RadarrBackend;
use sonarr::SonarrBackend;

/// Capability implemented by every supported manager API shape.
///
/// Implementations normalize their payloads into [`WantedPage`]; callers never
/// see manager-specific fields.
pub trait ManagerBackend {
    /// Connection check. Returns the manager's reported version.
    fn system_version(&self) -> Result<String, HuntError>;

    /// Fetches one 1-based page of the wanted list for `kind`.
    fn fetch_wanted(
        &self,
        kind: WantedKind,
        page: u32,
        page_size: u32,
        monitored_only: bool,
    ) -> Result<WantedPage, HuntError>;

    /// Issues the manager's search command for one item.
    fn trigger_search(&self, item_id: i64) -> Result<(), HuntError>;
}

/// Builds the concrete backend selected by the instance's manager kind.
pub fn build_backend(instance: &ResolvedInstance, http: &HttpConfig) -> Box<dyn ManagerBackend> {
    let client = ArrHttpClient::new(
        &instance.name,
        &instance.url,
        &instance.api_key,
        http.timeout_secs,
        RetryPolicy::from_config(http),
    );
    match instance.manager {
        ManagerKind::Sonarr => Box::new(SonarrBackend::new(client)),
        ManagerKind::Radarr => Box::new(RadarrBackend::new(client)),
    }
}
