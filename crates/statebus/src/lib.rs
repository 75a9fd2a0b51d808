//! statebus: fixed-layout shared-memory bridge between a long-lived host
//! process and the external tools that observe and steer it.
//!
//! One 4096-byte POSIX shared memory object is the whole wire: no sockets,
//! no files, no framing, no handshake. Both sides compile against the same
//! offset table ([`layout`]) and read or write fields in place. Control
//! flows only through field values — an external process writes a
//! *requested state* byte, the host polls it and writes the *current
//! state* byte when it decides to honor the request.
//!
//! # Segment map
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Input (0..1024)                                             │
//! │    current/requested state, classifier, active mode          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Interaction (1024..2048)  reserved                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Overlay (2048..3072)                                        │
//! │    key flags, overlay image, sound, action name + repeats    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Free allocation (3072..4096)  opaque                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use statebus::{HostState, StateBus, TextField};
//!
//! # fn main() -> Result<(), statebus::BusError> {
//! // Host side: publish state for external overlays.
//! let bus = StateBus::open()?;
//! bus.set_current_state(HostState::Running);
//! bus.set_text(TextField::Mode, "browse")?;
//! bus.record_action("scroll")?;
//!
//! // External side (any process): observe and steer.
//! let bus = StateBus::open()?;
//! if bus.current_state()? == HostState::Running {
//!     bus.request_state(HostState::Paused);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Coherence model
//!
//! Every operation is an immediate memory access: no locks, no queues, no
//! suspension points. Multi-byte fields (length-prefixed text, the action
//! name + counter pair) are committed as one bulk copy so a concurrent
//! reader sees the fully-old or fully-new run — a convention preserved by
//! the implementation, not a compare-and-swap. Two writers racing on the
//! same field can still interleave; the protocol accepts that under its
//! single-writer-per-region convention (the host writes Overlay, the
//! external process writes Input). Callers needing more must layer their
//! own synchronization on top.
//!
//! POSIX only: the segment is a `shm_open` object. Tests and models run
//! against [`Segment::anonymous`] heap stand-ins instead of real mappings.

#![forbid(unsafe_op_in_unsafe_fn)]

mod bus;
mod error;
pub mod layout;
mod segment;
mod state;

pub use bus::StateBus;
pub use error::BusError;
pub use layout::{ControlKey, TextField, MAX_TEXT_LEN, SEGMENT_NAME, SEGMENT_SIZE};
pub use segment::Segment;
pub use state::{HostState, UnknownStateName};
