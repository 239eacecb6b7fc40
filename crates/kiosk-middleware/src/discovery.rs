//! Three-tier device discovery policy shared by the BLE transports.
//!
//! Tiers are tried in order and a later tier runs only after the previous
//! one failed outright. The first device a tier yields is accepted; there is
//! no ranking among several matches.
//!
//! | Tier | Scan filter | Accepts |
//! |---|---|---|
//! | [`DiscoveryTier::Open`] | none | the configured device name |
//! | [`DiscoveryTier::NamePrefix`] | none | any name starting with the prefix |
//! | [`DiscoveryTier::Service`] | service UUID | any advertiser of the service |

use std::time::Duration;

use kiosk_types::KioskError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::BleSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryTier {
    Open,
    NamePrefix,
    Service,
}

impl DiscoveryTier {
    pub const ORDER: [DiscoveryTier; 3] = [
        DiscoveryTier::Open,
        DiscoveryTier::NamePrefix,
        DiscoveryTier::Service,
    ];

    /// Whether an advertisement satisfies this tier.
    pub fn matches(&self, settings: &BleSettings, name: Option<&str>, services: &[Uuid]) -> bool {
        match self {
            DiscoveryTier::Open => name == Some(settings.device_name.as_str()),
            DiscoveryTier::NamePrefix => {
                name.is_some_and(|n| n.starts_with(settings.name_prefix.as_str()))
            }
            DiscoveryTier::Service => services.contains(&settings.service_uuid),
        }
    }

    /// Service UUIDs to hand the platform scanner for this tier.
    pub fn scan_services(&self, settings: &BleSettings) -> Vec<Uuid> {
        match self {
            DiscoveryTier::Service => vec![settings.service_uuid],
            _ => Vec::new(),
        }
    }
}

/// One platform scanner driven by [`discover`].
#[allow(async_fn_in_trait)]
pub trait Scanner {
    type Device;

    /// Scan for at most `window` and return the first device accepted by
    /// `tier`, or `None` when the window closes empty.
    async fn scan(
        &mut self,
        tier: DiscoveryTier,
        window: Duration,
    ) -> Result<Option<Self::Device>, KioskError>;
}

/// Run the tiers in order. The configured scan window is the budget for the
/// whole search and is split evenly between the tiers.
///
/// # Errors
///
/// [`KioskError::TransportUnavailable`] aborts immediately. Any other tier
/// failure falls through to the next tier; when every tier comes up empty
/// the result is [`KioskError::DeviceNotFound`].
pub async fn discover<S: Scanner>(
    scanner: &mut S,
    settings: &BleSettings,
) -> Result<S::Device, KioskError> {
    let total = settings.scan_window();
    let window = total / DiscoveryTier::ORDER.len() as u32;
    for tier in DiscoveryTier::ORDER {
        debug!(?tier, window_secs = window.as_secs(), "scanning");
        match scanner.scan(tier, window).await {
            Ok(Some(device)) => {
                info!(?tier, "controller found");
                return Ok(device);
            }
            Ok(None) => debug!(?tier, "no match"),
            Err(err @ KioskError::TransportUnavailable(_)) => return Err(err),
            Err(err) => warn!(?tier, error = %err, "scan tier failed"),
        }
    }
    Err(KioskError::DeviceNotFound(format!(
        "no '{}' controller within {}s",
        settings.name_prefix,
        total.as_secs()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers from a fixed advertisement list, recording tiers tried.
    struct FakeScanner {
        adverts: Vec<(Option<&'static str>, Vec<Uuid>)>,
        tried: Vec<DiscoveryTier>,
        windows: Vec<Duration>,
        fail_with: Option<KioskError>,
    }

    impl Scanner for FakeScanner {
        type Device = usize;

        async fn scan(
            &mut self,
            tier: DiscoveryTier,
            window: Duration,
        ) -> Result<Option<usize>, KioskError> {
            self.tried.push(tier);
            self.windows.push(window);
            if let Some(err) = self.fail_with.clone() {
                return Err(err);
            }
            let settings = BleSettings::default();
            Ok(self
                .adverts
                .iter()
                .position(|(name, services)| tier.matches(&settings, *name, services)))
        }
    }

    fn scanner(adverts: Vec<(Option<&'static str>, Vec<Uuid>)>) -> FakeScanner {
        FakeScanner {
            adverts,
            tried: Vec::new(),
            windows: Vec::new(),
            fail_with: None,
        }
    }

    #[tokio::test]
    async fn exact_name_wins_on_first_tier() -> Result<(), KioskError> {
        let mut s = scanner(vec![
            (Some("ESP32_Other"), vec![]),
            (Some("ESP32_Relay_Controller"), vec![]),
        ]);
        let found = discover(&mut s, &BleSettings::default()).await?;
        assert_eq!(found, 1);
        assert_eq!(s.tried, vec![DiscoveryTier::Open]);
        Ok(())
    }

    #[tokio::test]
    async fn falls_back_to_prefix_then_service() -> Result<(), KioskError> {
        let settings = BleSettings::default();

        let mut s = scanner(vec![(Some("Phone"), vec![]), (Some("ESP32_B"), vec![])]);
        assert_eq!(discover(&mut s, &settings).await?, 1);
        assert_eq!(s.tried, vec![DiscoveryTier::Open, DiscoveryTier::NamePrefix]);

        let mut s = scanner(vec![(None, vec![settings.service_uuid])]);
        assert_eq!(discover(&mut s, &settings).await?, 0);
        assert_eq!(s.tried, DiscoveryTier::ORDER.to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn empty_scans_end_in_device_not_found() {
        let mut s = scanner(vec![(Some("Headphones"), vec![])]);
        let err = discover(&mut s, &BleSettings::default()).await.unwrap_err();
        assert!(matches!(err, KioskError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn all_tiers_share_one_scan_window() {
        let settings = BleSettings::default();
        let mut s = scanner(vec![]);
        let err = discover(&mut s, &settings).await.unwrap_err();

        assert_eq!(s.windows.len(), 3);
        assert!(s.windows.iter().sum::<Duration>() <= settings.scan_window());
        let expected = format!("within {}s", settings.scan_window().as_secs());
        assert!(err.to_string().contains(&expected), "{err}");
    }

    #[tokio::test]
    async fn missing_capability_aborts_without_fallback() {
        let mut s = scanner(vec![]);
        s.fail_with = Some(KioskError::TransportUnavailable("no adapter".into()));
        let err = discover(&mut s, &BleSettings::default()).await.unwrap_err();
        assert!(matches!(err, KioskError::TransportUnavailable(_)));
        assert_eq!(s.tried, vec![DiscoveryTier::Open]);
    }

    #[tokio::test]
    async fn link_errors_fall_through_every_tier() {
        let mut s = scanner(vec![]);
        s.fail_with = Some(KioskError::LinkError("scan aborted".into()));
        let err = discover(&mut s, &BleSettings::default()).await.unwrap_err();
        assert!(matches!(err, KioskError::DeviceNotFound(_)));
        assert_eq!(s.tried.len(), 3);
    }
}
