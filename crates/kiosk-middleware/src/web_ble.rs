//! Web Bluetooth transport for browser (wasm32) builds.
//!
//! Needs `RUSTFLAGS="--cfg=web_sys_unstable_apis"` (set in
//! `.cargo/config.toml`). On every other target the transport reports
//! [`KioskError::TransportUnavailable`].

use async_trait::async_trait;
use kiosk_types::{KioskError, TransportKind};

use crate::transport::{BleSettings, SessionSink, Transport};

#[cfg(target_arch = "wasm32")]
pub use browser::WebBleTransport;

#[cfg(not(target_arch = "wasm32"))]
pub struct WebBleTransport;

#[cfg(not(target_arch = "wasm32"))]
impl WebBleTransport {
    pub fn new(_settings: BleSettings) -> Self {
        Self
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl Transport for WebBleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebBle
    }

    async fn connect(&mut self, _sink: SessionSink) -> Result<(), KioskError> {
        Err(KioskError::TransportUnavailable(
            "Web Bluetooth is only available in browser builds".into(),
        ))
    }

    async fn send(&mut self, _frame: &str) -> Result<(), KioskError> {
        Err(KioskError::NotConnected)
    }

    async fn disconnect(&mut self) -> Result<(), KioskError> {
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
mod browser {
    use std::time::Duration;

    use js_sys::{Array, Function, Promise, Reflect, Uint8Array};
    use tracing::{debug, info};
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{
        Bluetooth, BluetoothDevice, BluetoothLeScanFilterInit, BluetoothRemoteGattCharacteristic,
        BluetoothRemoteGattServer, BluetoothRemoteGattService, RequestDeviceOptions,
    };

    use super::*;
    use crate::discovery::{DiscoveryTier, Scanner, discover};

    fn js_err(e: JsValue) -> KioskError {
        KioskError::LinkError(format!("{e:?}"))
    }

    fn bluetooth() -> Result<Bluetooth, KioskError> {
        web_sys::window()
            .and_then(|w| w.navigator().bluetooth())
            .ok_or_else(|| {
                KioskError::TransportUnavailable("this browser has no Web Bluetooth".into())
            })
    }

    /// A promise that rejects after `window`.
    fn deadline(window: Duration) -> Promise {
        let ms = i32::try_from(window.as_millis()).unwrap_or(i32::MAX);
        Promise::new(&mut |_resolve, reject| {
            if let Some(w) = web_sys::window() {
                let _ = w.set_timeout_with_callback_and_timeout_and_arguments_0(&reject, ms);
            }
        })
    }

    /// Invoke `target.name(args...)` and await the returned promise.
    async fn call_async(target: &JsValue, name: &str, args: &Array) -> Result<JsValue, KioskError> {
        let func: Function = Reflect::get(target, &name.into())
            .map_err(js_err)?
            .dyn_into()
            .map_err(|_| KioskError::LinkError(format!("{name} is not a function")))?;
        let promise: Promise = func.apply(target, args).map_err(js_err)?.dyn_into().map_err(js_err)?;
        JsFuture::from(promise).await.map_err(js_err)
    }

    struct BrowserScanner<'a> {
        bluetooth: Bluetooth,
        settings: &'a BleSettings,
    }

    impl Scanner for BrowserScanner<'_> {
        type Device = BluetoothDevice;

        async fn scan(
            &mut self,
            tier: DiscoveryTier,
            window: Duration,
        ) -> Result<Option<BluetoothDevice>, KioskError> {
            let filter = BluetoothLeScanFilterInit::new();
            match tier {
                DiscoveryTier::Open => filter.set_name(&self.settings.device_name),
                DiscoveryTier::NamePrefix => filter.set_name_prefix(&self.settings.name_prefix),
                DiscoveryTier::Service => {
                    let services = Array::of1(&self.settings.service_uuid.to_string().into());
                    filter.set_services(&services);
                }
            }
            let options = RequestDeviceOptions::new();
            options.set_filters(&Array::of1(&filter));
            options.set_optional_services(&Array::of1(
                &self.settings.service_uuid.to_string().into(),
            ));

            let request = self.bluetooth.request_device(&options);
            let raced = Promise::race(&Array::of2(&request, &deadline(window)));
            match JsFuture::from(raced).await {
                Ok(device) => Ok(Some(device.unchecked_into())),
                Err(e) => {
                    debug!(?tier, error = ?e, "requestDevice rejected");
                    Ok(None)
                }
            }
        }
    }

    struct Link {
        device: BluetoothDevice,
        server: BluetoothRemoteGattServer,
        write_char: BluetoothRemoteGattCharacteristic,
        notify_char: BluetoothRemoteGattCharacteristic,
        sink: SessionSink,
        on_value: Closure<dyn FnMut(web_sys::Event)>,
        on_disconnect: Closure<dyn FnMut(web_sys::Event)>,
    }

    impl Link {
        /// Unhook both listeners so the browser never calls a dropped closure.
        fn detach(&self) {
            if let Err(e) = self.notify_char.remove_event_listener_with_callback(
                "characteristicvaluechanged",
                self.on_value.as_ref().unchecked_ref(),
            ) {
                debug!(error = ?e, "value listener not removed");
            }
            if let Err(e) = self.device.remove_event_listener_with_callback(
                "gattserverdisconnected",
                self.on_disconnect.as_ref().unchecked_ref(),
            ) {
                debug!(error = ?e, "disconnect listener not removed");
            }
        }
    }

    pub struct WebBleTransport {
        settings: BleSettings,
        link: Option<Link>,
    }

    impl WebBleTransport {
        pub fn new(settings: BleSettings) -> Self {
            Self {
                settings,
                link: None,
            }
        }

        /// Everything after the GATT connect. On error the caller closes the
        /// server again.
        async fn open_link(
            settings: &BleSettings,
            device: BluetoothDevice,
            server: BluetoothRemoteGattServer,
            sink: SessionSink,
        ) -> Result<Link, KioskError> {
            let service: BluetoothRemoteGattService = JsFuture::from(
                server.get_primary_service_with_str(&settings.service_uuid.to_string()),
            )
            .await
            .map_err(js_err)?
            .unchecked_into();

            let characteristic = |uuid: uuid::Uuid| {
                JsFuture::from(service.get_characteristic_with_str(&uuid.to_string()))
            };
            let write_char: BluetoothRemoteGattCharacteristic =
                characteristic(settings.write_characteristic_uuid)
                    .await
                    .map_err(js_err)?
                    .unchecked_into();
            let notify_char: BluetoothRemoteGattCharacteristic =
                characteristic(settings.notify_characteristic_uuid)
                    .await
                    .map_err(js_err)?
                    .unchecked_into();

            let value_sink = sink.clone();
            let on_value = Closure::<dyn FnMut(web_sys::Event)>::new(move |event: web_sys::Event| {
                let Some(target) = event.target() else { return };
                let ch: BluetoothRemoteGattCharacteristic = target.unchecked_into();
                if let Some(view) = ch.value() {
                    let bytes = Uint8Array::new_with_byte_offset_and_length(
                        &view.buffer(),
                        view.byte_offset() as u32,
                        view.byte_length() as u32,
                    )
                    .to_vec();
                    value_sink.frame(String::from_utf8_lossy(&bytes).into_owned());
                }
            });
            let drop_sink = sink.clone();
            let on_disconnect =
                Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
                    drop_sink.dropped();
                });

            let link = Link {
                device,
                server,
                write_char,
                notify_char,
                sink,
                on_value,
                on_disconnect,
            };
            link.notify_char
                .add_event_listener_with_callback(
                    "characteristicvaluechanged",
                    link.on_value.as_ref().unchecked_ref(),
                )
                .map_err(js_err)?;
            link.device
                .add_event_listener_with_callback(
                    "gattserverdisconnected",
                    link.on_disconnect.as_ref().unchecked_ref(),
                )
                .map_err(|e| {
                    link.detach();
                    js_err(e)
                })?;
            if let Err(e) = JsFuture::from(link.notify_char.start_notifications()).await {
                link.detach();
                return Err(js_err(e));
            }
            Ok(link)
        }
    }

    #[async_trait(?Send)]
    impl Transport for WebBleTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::WebBle
        }

        async fn connect(&mut self, sink: SessionSink) -> Result<(), KioskError> {
            if self.link.is_some() {
                self.disconnect().await?;
            }
            let mut scanner = BrowserScanner {
                bluetooth: bluetooth()?,
                settings: &self.settings,
            };
            let device = discover(&mut scanner, &self.settings).await?;

            let server = device
                .gatt()
                .ok_or_else(|| KioskError::LinkError("device has no GATT server".into()))?;
            let server: BluetoothRemoteGattServer =
                JsFuture::from(server.connect()).await.map_err(js_err)?.unchecked_into();

            match Self::open_link(&self.settings, device, server.clone(), sink).await {
                Ok(link) => {
                    info!(session = link.sink.session(), name = ?link.device.name(), "Web BLE link up");
                    self.link = Some(link);
                    Ok(())
                }
                Err(err) => {
                    if server.connected() {
                        server.disconnect();
                    }
                    Err(err)
                }
            }
        }

        async fn send(&mut self, frame: &str) -> Result<(), KioskError> {
            let link = self.link.as_ref().ok_or(KioskError::NotConnected)?;
            let bytes = Uint8Array::from(frame.as_bytes());
            call_async(&link.write_char, "writeValue", &Array::of1(&bytes))
                .await
                .map(|_| ())
        }

        async fn disconnect(&mut self) -> Result<(), KioskError> {
            if let Some(link) = self.link.take() {
                link.sink.close();
                link.detach();
                if link.server.connected() {
                    link.server.disconnect();
                }
                debug!(name = ?link.device.name(), "Web BLE link closed");
            }
            Ok(())
        }
    }
}
