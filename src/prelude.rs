//! Convenient re-exports for common usage.
//!
//! This module provides a "prelude" that re-exports the most commonly used
//! types from netproctor, allowing you to import them all at once.
//!
//! # Usage
//!
//! ```rust
//! use netproctor::prelude::*;
//! ```
//!
//! # What's Included
//!
//! The prelude includes:
//!
//! - **The gate**: [`CallGate`], [`SystemNetwork`]
//! - **The call surface**: [`NetworkApi`], [`SocketHandle`], [`MsgFlags`],
//!   [`RecvBuf`], [`ShutdownHow`], [`PollEntry`], [`PollInterest`]
//! - **Monitoring**: [`CallKind`], [`MonitorFlags`], [`StatsTable`]
//! - **Fault injection**: [`FaultPattern`], [`FaultPolicy`]
//! - **Errors**: [`Errno`], [`ResolveError`]
//! - **Resolution**: [`AddrFamily`], [`SockType`], [`AddrHints`],
//!   [`AddrList`], [`ReleaseOutcome`]
//! - **Delivery plans**: [`DeliveryMode`], [`DeliveryPlan`], [`Chunk`]
//!
//! # Example
//!
//! ```rust
//! use netproctor::prelude::*;
//!
//! let mut net = CallGate::new(SystemNetwork::new());
//! net.monitor_mut().set(CallKind::Connect, true);
//!
//! assert_eq!(net.stats().connect.called, 0);
//! ```

// The gate and the default backend
pub use crate::{CallGate, SystemNetwork};

// The call surface the code under test programs against
pub use crate::{
    MsgFlags, NetworkApi, PollEntry, PollInterest, RecvBuf, ShutdownHow,
    SocketHandle,
};

// Monitoring and statistics
pub use crate::{CallKind, MonitorFlags, StatsTable};

// Fault injection
pub use crate::{FaultPattern, FaultPolicy};

// Error values the gate reports and injects
pub use crate::{Errno, ResolveError};

// Name resolution types
pub use crate::{AddrFamily, AddrHints, AddrList, ReleaseOutcome, SockType};

// Timed partial delivery
pub use crate::{Chunk, DeliveryMode, DeliveryPlan};
