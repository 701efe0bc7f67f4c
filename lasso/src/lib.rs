//! # Lasso
//!
//! This library implements the host (server) side of the Lasso protocol: an
//! embedded data server that exposes registered memory cells ("data cells")
//! to a remote client over a byte-oriented serial link. Clients discover the
//! data space, select which cells to stream, set the streaming period, and
//! read or write individual cell values. The host periodically snapshots the
//! active set ("strobes") and transmits it at a configurable rate, with
//! priority on timeliness over completeness: there is no retransmission, and
//! gaps are detectable through the optional timestamp cell.
//!
//! ## Architecture
//!
//! ```text
//!  application            ┌──────────────────────────┐        serial driver
//!  variables ──────────┐  │           Host           │
//!                      │  │ ┌────────┐  ┌──────────┐ │
//!  tick source ────────┼─►│ │sampler │─►│  strobe  │─┼──┐
//!  (handle_com)        │  │ └────────┘  │  frame   │ │  │  ┌─────────┐
//!                      └──┼──────▲──────┴──────────┘ │  ├─►│Transport│──►
//!  receive ISR ────────┐  │ ┌────┴─────┐ ┌─────────┐ │  │  └─────────┘
//!  (receive_byte) ─────┴─►│ │interpret.│►│response │─┼──┘
//!       │                 │ └──────────┘ │ frame   │ │
//!       ▼                 │              └─────────┘ │
//!  inline decoder ───────►│  command buffer          │
//!                         └──────────────────────────┘
//! ```
//!
//! Components:
//! * _Config_ gathers all protocol options; invalid combinations are
//!   rejected when the [`host::Host`] is created.
//! * _Data cells_ are append-only registered handles to typed application
//!   memory. Registration order defines the strobe layout.
//! * The _sampler_ snapshots the enabled cells into the strobe frame on
//!   each strobe cycle. Sampling is deliberately non-atomic across cells;
//!   real-time priority wins over snapshot coherence.
//! * The _interpreter_ parses one command per tick at most, mutates the
//!   scheduler or the cells, and renders the reply.
//! * The _TX pump_ makes exactly one transmit attempt per tick. Strobes
//!   drain first; replies get the first free slot after them.
//! * Framing codecs (COBS, ESCS, RN) and the CRC helpers live in
//!   [`lasso_encoding`], re-exported as [`encoding`].
//!
//! ## Concurrency model
//!
//! The engine is single-threaded and cooperative. All state lives in one
//! owned [`host::Host`] value; [`host::Host::handle_com`] is invoked from a
//! periodic tick source and [`host::Host::receive_byte`] from the receive
//! path, typically an interrupt. When the two run in different interrupt
//! contexts, wrap the host in a blocking mutex:
//!
//! ```ignore
//! use core::cell::RefCell;
//! use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
//! use static_cell::StaticCell;
//!
//! static HOST: StaticCell<Mutex<CriticalSectionRawMutex, RefCell<lasso::host::Host<Uart>>>> =
//!     StaticCell::new();
//! ```
//!
//! The handler never blocks and never suspends; a busy transmitter is
//! retried on the next tick.
#![no_std]

extern crate alloc;

pub use lasso_core as core;
pub use lasso_encoding as encoding;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod cell;
pub mod config;
mod frame;
pub mod host;
mod interp;
mod wire;

pub use cell::{ChangeHook, DataCell, Value};
pub use config::{Config, ConfigError};
pub use host::{Host, RegisterError, SendError, Transport};
