//! Application Ports (Driver and Driven)
//!
//! Ports define the seams between the reconciliation core and the outside:
//! - **Driven**: `GatewayTransport` (sockets to the gateway), `TradingCalendar`
//! - **Driver**: `ExecutionReportHandler` (the host receiving reports)

mod calendar_port;
mod report_handler_port;
mod transport_port;

pub use calendar_port::TradingCalendar;
pub use report_handler_port::{ExecutionReportHandler, RecordingReportHandler};
pub use transport_port::{GatewayTransport, RawFrame, SubscriberHandle, TransportError};

#[cfg(test)]
pub use calendar_port::MockTradingCalendar;
#[cfg(test)]
pub use report_handler_port::MockExecutionReportHandler;
