//! Logging facilities for Trellis.
//!
//! Trellis uses the `tracing` crate for instrumentation. Nothing is printed
//! unless the application installs a subscriber:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("trellis=debug,trellis_core::hub=trace")
//!         .init();
//! }
//! ```
//!
//! Notification dispatch is logged at `trace`, structural mutations at
//! `debug`, and rejected operations at `warn`.

/// Span names used throughout Trellis for tracing.
pub mod span_names {
    /// Two-phase (pre/post) mutation span.
    pub const MUTATION: &str = "trellis::mutation";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "trellis_core";
    /// Listener registry and dispatch target.
    pub const HUB: &str = "trellis_core::hub";
    /// List source target.
    pub const LIST: &str = "trellis::list";
    /// Tree source target.
    pub const TREE: &str = "trellis::tree";
    /// Derived (filtered/sorted) source target.
    pub const DERIVED: &str = "trellis::derived";
    /// Row and node field updates.
    pub const ROW: &str = "trellis::row";
}
