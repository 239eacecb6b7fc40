//! USB / UART serial transport (`serial` feature).
//!
//! Commands go out newline-terminated; the controller's output is cut into
//! frames by [`LineFramer`]. The port is blocking, so reads happen on a
//! dedicated blocking task that polls with a short timeout.

use async_trait::async_trait;
use kiosk_types::{KioskError, TransportKind};

use crate::transport::{SerialSettings, SessionSink, Transport};

#[cfg(feature = "serial")]
pub use enabled::SerialTransport;

#[cfg(not(feature = "serial"))]
pub struct SerialTransport;

#[cfg(not(feature = "serial"))]
impl SerialTransport {
    pub fn new(_settings: SerialSettings) -> Self {
        Self
    }
}

#[cfg(not(feature = "serial"))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn connect(&mut self, _sink: SessionSink) -> Result<(), KioskError> {
        Err(KioskError::TransportUnavailable(
            "built without serial support".into(),
        ))
    }

    async fn send(&mut self, _frame: &str) -> Result<(), KioskError> {
        Err(KioskError::NotConnected)
    }

    async fn disconnect(&mut self) -> Result<(), KioskError> {
        Ok(())
    }
}

#[cfg(feature = "serial")]
mod enabled {
    use std::io::{ErrorKind, Read, Write};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use kiosk_protocol::LineFramer;
    use kiosk_protocol::framing::frame_line;
    use serialport::SerialPort;
    use tracing::{debug, info, warn};

    use super::*;

    const READ_TIMEOUT: Duration = Duration::from_millis(100);

    struct Link {
        port: Box<dyn SerialPort>,
        sink: SessionSink,
        stop: Arc<AtomicBool>,
    }

    pub struct SerialTransport {
        settings: SerialSettings,
        link: Option<Link>,
    }

    impl SerialTransport {
        pub fn new(settings: SerialSettings) -> Self {
            Self {
                settings,
                link: None,
            }
        }
    }

    fn open_error(port: &str, e: serialport::Error) -> KioskError {
        match e.kind() {
            serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(ErrorKind::NotFound) => {
                KioskError::DeviceNotFound(format!("{port}: {}", e.description))
            }
            _ => KioskError::LinkError(format!("{port}: {}", e.description)),
        }
    }

    /// Runs on a blocking thread until the port fails or `stop` is raised.
    fn read_loop(mut port: Box<dyn SerialPort>, sink: SessionSink, stop: Arc<AtomicBool>) {
        let mut framer = LineFramer::new();
        let mut buf = [0u8; 256];
        while !stop.load(Ordering::SeqCst) {
            match port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    for frame in framer.push(&buf[..n]) {
                        sink.frame(frame);
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "serial read failed");
                    sink.dropped();
                    return;
                }
            }
        }
        debug!(session = sink.session(), "serial reader stopped");
    }

    #[async_trait]
    impl Transport for SerialTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Serial
        }

        async fn connect(&mut self, sink: SessionSink) -> Result<(), KioskError> {
            if self.link.is_some() {
                self.disconnect().await?;
            }
            let path = self.settings.port.clone();
            let port = serialport::new(&path, self.settings.baud_rate)
                .timeout(READ_TIMEOUT)
                .open()
                .map_err(|e| open_error(&path, e))?;
            let reader = port
                .try_clone()
                .map_err(|e| KioskError::LinkError(e.to_string()))?;

            let stop = Arc::new(AtomicBool::new(false));
            let reader_stop = Arc::clone(&stop);
            let reader_sink = sink.clone();
            tokio::task::spawn_blocking(move || read_loop(reader, reader_sink, reader_stop));

            info!(
                session = sink.session(),
                port = %path,
                baud = self.settings.baud_rate,
                "serial link up"
            );
            self.link = Some(Link { port, sink, stop });
            Ok(())
        }

        async fn send(&mut self, frame: &str) -> Result<(), KioskError> {
            let link = self.link.as_mut().ok_or(KioskError::NotConnected)?;
            let line = frame_line(frame);
            link.port
                .write_all(line.as_bytes())
                .and_then(|()| link.port.flush())
                .map_err(|e| KioskError::LinkError(e.to_string()))
        }

        async fn disconnect(&mut self) -> Result<(), KioskError> {
            if let Some(link) = self.link.take() {
                link.sink.close();
                link.stop.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
    }
}
