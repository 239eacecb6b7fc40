//! `kiosk-runtime` – order sequencing and the kiosk event loop.
//!
//! # Modules
//!
//! - [`timers`] – [`TimerSet`][timers::TimerSet]: cancellable deadlines
//!   with generation tags, polled by the runtime loop.
//! - [`order`] – [`OrderStateMachine`][order::OrderStateMachine]: select
//!   category → select item → await the limit switch → activate the relay →
//!   dispense countdown, with every exit path clearing its timers.
//! - [`notifications`] – [`NotificationHandler`][notifications::NotificationHandler]:
//!   relay map, limit-switch indicator, screen wake and readiness.
//! - [`collaborators`] – the audio-cue and screen-wake seams plus their
//!   logging implementations.
//! - [`runtime`] – [`KioskRuntime`][runtime::KioskRuntime]: the single task
//!   that owns the connection, the order and the catalog, driven through a
//!   [`KioskHandle`][runtime::KioskHandle].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing] with an
//!   optional OTLP exporter.

pub mod collaborators;
pub mod notifications;
pub mod order;
pub mod runtime;
pub mod telemetry;
pub mod timers;

pub use collaborators::{Cue, CueBoard, CuePlayer, ScreenControl, ScreenLog};
pub use notifications::{NotificationHandler, NotificationSettings};
pub use order::{Order, OrderSettings, OrderState, OrderStateMachine};
pub use runtime::{Command, KioskHandle, KioskRuntime, RuntimeConfig, Snapshot};
pub use telemetry::{TelemetryGuard, init_tracing};
pub use timers::{TimerKind, TimerSet};
