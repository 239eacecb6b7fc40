//! Native Bluetooth LE transport built on `btleplug`.
//!
//! Compiled with the `ble` feature. Without it every connect attempt reports
//! [`KioskError::TransportUnavailable`].

use async_trait::async_trait;
use kiosk_types::{KioskError, TransportKind};

use crate::transport::{BleSettings, SessionSink, Transport};

#[cfg(feature = "ble")]
pub use enabled::NativeBleTransport;

#[cfg(not(feature = "ble"))]
pub struct NativeBleTransport;

#[cfg(not(feature = "ble"))]
impl NativeBleTransport {
    pub fn new(_settings: BleSettings) -> Self {
        Self
    }
}

#[cfg(not(feature = "ble"))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Transport for NativeBleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::NativeBle
    }

    async fn connect(&mut self, _sink: SessionSink) -> Result<(), KioskError> {
        Err(KioskError::TransportUnavailable(
            "built without native Bluetooth support".into(),
        ))
    }

    async fn send(&mut self, _frame: &str) -> Result<(), KioskError> {
        Err(KioskError::NotConnected)
    }

    async fn disconnect(&mut self) -> Result<(), KioskError> {
        Ok(())
    }
}

#[cfg(feature = "ble")]
mod enabled {
    use std::time::Duration;

    use btleplug::api::{
        Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
        WriteType,
    };
    use btleplug::platform::{Adapter, Manager, Peripheral};
    use futures_util::StreamExt;
    use tokio::task::JoinHandle;
    use tracing::{debug, info, warn};

    use super::*;
    use crate::discovery::{DiscoveryTier, Scanner, discover};

    /// How often the peripheral list is polled during a scan window.
    const POLL_INTERVAL: Duration = Duration::from_millis(250);

    fn ble_err(e: btleplug::Error) -> KioskError {
        KioskError::LinkError(e.to_string())
    }

    struct Link {
        peripheral: Peripheral,
        write_char: Characteristic,
        sink: SessionSink,
        tasks: Vec<JoinHandle<()>>,
    }

    pub struct NativeBleTransport {
        settings: BleSettings,
        link: Option<Link>,
    }

    impl NativeBleTransport {
        pub fn new(settings: BleSettings) -> Self {
            Self {
                settings,
                link: None,
            }
        }

        async fn first_adapter() -> Result<Adapter, KioskError> {
            let manager = Manager::new()
                .await
                .map_err(|e| KioskError::TransportUnavailable(e.to_string()))?;
            manager
                .adapters()
                .await
                .map_err(|e| KioskError::TransportUnavailable(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| KioskError::TransportUnavailable("no Bluetooth adapter found".into()))
        }

        /// Everything after the GATT connect. On error the caller drops the
        /// connection again.
        async fn open_link(
            adapter: &Adapter,
            peripheral: &Peripheral,
            settings: &BleSettings,
            sink: SessionSink,
        ) -> Result<Link, KioskError> {
            peripheral.discover_services().await.map_err(ble_err)?;

            let chars = peripheral.characteristics();
            let find = |uuid: uuid::Uuid| {
                chars.iter().find(|c| c.uuid == uuid).cloned().ok_or_else(|| {
                    KioskError::LinkError(format!("characteristic {uuid} missing"))
                })
            };
            let write_char = find(settings.write_characteristic_uuid)?;
            let notify_char = find(settings.notify_characteristic_uuid)?;

            peripheral.subscribe(&notify_char).await.map_err(ble_err)?;
            let mut notifications = peripheral.notifications().await.map_err(ble_err)?;
            let mut events = adapter.events().await.map_err(ble_err)?;

            let notify_uuid = notify_char.uuid;
            let reader_sink = sink.clone();
            let reader = tokio::spawn(async move {
                while let Some(n) = notifications.next().await {
                    if n.uuid == notify_uuid {
                        reader_sink.frame(String::from_utf8_lossy(&n.value).into_owned());
                    }
                }
                reader_sink.dropped();
            });

            let peripheral_id = peripheral.id();
            let watch_sink = sink.clone();
            let watcher = tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    if let CentralEvent::DeviceDisconnected(id) = event
                        && id == peripheral_id
                    {
                        watch_sink.dropped();
                        break;
                    }
                }
            });

            Ok(Link {
                peripheral: peripheral.clone(),
                write_char,
                sink,
                tasks: vec![reader, watcher],
            })
        }
    }

    struct AdapterScanner<'a> {
        adapter: &'a Adapter,
        settings: &'a BleSettings,
    }

    impl Scanner for AdapterScanner<'_> {
        type Device = Peripheral;

        async fn scan(
            &mut self,
            tier: DiscoveryTier,
            window: Duration,
        ) -> Result<Option<Peripheral>, KioskError> {
            let filter = ScanFilter {
                services: tier.scan_services(self.settings),
            };
            self.adapter.start_scan(filter).await.map_err(ble_err)?;

            let deadline = tokio::time::Instant::now() + window;
            let found = loop {
                if let Some(p) = self.matching_peripheral(tier).await? {
                    break Some(p);
                }
                if tokio::time::Instant::now() >= deadline {
                    break None;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            };

            if let Err(e) = self.adapter.stop_scan().await {
                warn!(error = %e, "stop_scan failed");
            }
            Ok(found)
        }
    }

    impl AdapterScanner<'_> {
        async fn matching_peripheral(
            &self,
            tier: DiscoveryTier,
        ) -> Result<Option<Peripheral>, KioskError> {
            for peripheral in self.adapter.peripherals().await.map_err(ble_err)? {
                let Some(props) = peripheral.properties().await.map_err(ble_err)? else {
                    continue;
                };
                if tier.matches(self.settings, props.local_name.as_deref(), &props.services) {
                    debug!(name = ?props.local_name, id = %peripheral.id(), "matched");
                    return Ok(Some(peripheral));
                }
            }
            Ok(None)
        }
    }

    #[async_trait]
    impl Transport for NativeBleTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::NativeBle
        }

        async fn connect(&mut self, sink: SessionSink) -> Result<(), KioskError> {
            if self.link.is_some() {
                self.disconnect().await?;
            }
            let adapter = Self::first_adapter().await?;
            let peripheral = discover(
                &mut AdapterScanner {
                    adapter: &adapter,
                    settings: &self.settings,
                },
                &self.settings,
            )
            .await?;

            peripheral.connect().await.map_err(ble_err)?;
            match Self::open_link(&adapter, &peripheral, &self.settings, sink).await {
                Ok(link) => {
                    info!(session = link.sink.session(), id = %peripheral.id(), "BLE link up");
                    self.link = Some(link);
                    Ok(())
                }
                Err(err) => {
                    if let Err(e) = peripheral.disconnect().await {
                        warn!(error = %e, "disconnect after failed setup failed");
                    }
                    Err(err)
                }
            }
        }

        async fn send(&mut self, frame: &str) -> Result<(), KioskError> {
            let link = self.link.as_ref().ok_or(KioskError::NotConnected)?;
            link.peripheral
                .write(&link.write_char, frame.as_bytes(), WriteType::WithResponse)
                .await
                .map_err(ble_err)
        }

        async fn disconnect(&mut self) -> Result<(), KioskError> {
            let Some(link) = self.link.take() else {
                return Ok(());
            };
            link.sink.close();
            for task in link.tasks {
                task.abort();
            }
            link.peripheral.disconnect().await.map_err(ble_err)
        }
    }
}
