//! Canonical segment layout.
//!
//! This module is the single source of truth for the byte map of the shared
//! segment. Both sides of the protocol compile against these offsets; there
//! is no framing, versioning, or schema discovery on the wire. A peer built
//! against a different table reads garbage, so changes here are protocol
//! changes.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Input (0..1024)          written by the external process    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Interaction (1024..2048) reserved for key/input injection   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Overlay (2048..3072)     written by the host process        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Free allocation (3072..4096)  opaque application payload    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Regions are a convention only: nothing in the segment marks them, and
//! nothing enforces the writer roles.

/// Well-known POSIX name of the shared segment.
pub const SEGMENT_NAME: &str = "/statebus";

/// Total segment size in bytes.
pub const SEGMENT_SIZE: usize = 4096;

/// Maximum UTF-8 payload of a text field.
pub const MAX_TEXT_LEN: usize = 255;

/// Full reserved span of a text field: one length byte plus the payload.
pub const TEXT_SPAN: usize = 1 + MAX_TEXT_LEN;

/// Input region base: desired state and mode/classifier names.
pub const INPUT_REGION: usize = 0;
/// Interaction region base: reserved for key/input injection.
pub const INTERACTION_REGION: usize = 1024;
/// Overlay region base: host-written status for external renderers.
pub const OVERLAY_REGION: usize = 2048;
/// Free-allocation window base: opaque application payload.
pub const FREE_REGION: usize = 3072;
/// Free-allocation window length.
pub const FREE_REGION_LEN: usize = 1024;

/// Current host state (enum byte, host-authoritative).
pub const CURRENT_STATE: usize = INPUT_REGION;
/// Requested host state (enum byte, external-process-authoritative).
pub const REQUESTED_STATE: usize = INPUT_REGION + 1;
/// Classifier name text field (length byte; payload follows).
pub const CLASSIFIER: usize = INPUT_REGION + 2;
/// Active mode text field.
pub const MODE: usize = INPUT_REGION + 258;

/// First key flag byte; the seven flags are contiguous from here.
pub const KEY_FLAGS: usize = OVERLAY_REGION;
/// Overlay image filename text field.
pub const OVERLAY_IMAGE: usize = OVERLAY_REGION + 7;
/// Sound name text field.
pub const SOUND: usize = OVERLAY_REGION + 263;
/// Action name text field, paired with [`ACTION_COUNT`].
pub const ACTION_NAME: usize = OVERLAY_REGION + 520;
/// Action repeat counter (big-endian u16).
pub const ACTION_COUNT: usize = OVERLAY_REGION + 776;

/// The four general-purpose length-prefixed text fields.
///
/// The action name shares the same encoding but is only ever written
/// through [`crate::StateBus::record_action`], which commits the name and
/// its repeat counter as one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    /// Classifier the external process asks the host to load.
    Classifier,
    /// Mode the host is currently running.
    Mode,
    /// Overlay image the host wants rendered.
    OverlayImage,
    /// Sound the host last played.
    Sound,
}

impl TextField {
    /// All fields, in segment order.
    pub const ALL: [TextField; 4] = [
        TextField::Classifier,
        TextField::Mode,
        TextField::OverlayImage,
        TextField::Sound,
    ];

    /// Offset of the field's length byte; the payload starts right after.
    pub const fn offset(self) -> usize {
        match self {
            TextField::Classifier => CLASSIFIER,
            TextField::Mode => MODE,
            TextField::OverlayImage => OVERLAY_IMAGE,
            TextField::Sound => SOUND,
        }
    }
}

/// Keys whose pressed state the host mirrors into the overlay region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    Ctrl,
    Shift,
    Alt,
    Up,
    Down,
    Left,
    Right,
}

impl ControlKey {
    /// All keys, in segment order.
    pub const ALL: [ControlKey; 7] = [
        ControlKey::Ctrl,
        ControlKey::Shift,
        ControlKey::Alt,
        ControlKey::Up,
        ControlKey::Down,
        ControlKey::Left,
        ControlKey::Right,
    ];

    /// Offset of the key's flag byte.
    pub const fn offset(self) -> usize {
        KEY_FLAGS + self as usize
    }

    /// Wire name of the key.
    pub const fn name(self) -> &'static str {
        match self {
            ControlKey::Ctrl => "ctrl",
            ControlKey::Shift => "shift",
            ControlKey::Alt => "alt",
            ControlKey::Up => "up",
            ControlKey::Down => "down",
            ControlKey::Left => "left",
            ControlKey::Right => "right",
        }
    }

    /// Look a key up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }
}
