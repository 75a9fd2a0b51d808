//! The accessor handle: every protocol operation over one segment view.

use tracing::warn;

use crate::error::BusError;
use crate::layout::{
    ControlKey, TextField, ACTION_COUNT, ACTION_NAME, CURRENT_STATE, FREE_REGION, FREE_REGION_LEN,
    MAX_TEXT_LEN, REQUESTED_STATE, SEGMENT_NAME, TEXT_SPAN,
};
use crate::segment::Segment;
use crate::state::HostState;

/// Handle to the shared state segment.
///
/// A `StateBus` is stateless: it holds the mapping and nothing else, so
/// every read reflects the segment as it is right now, including writes
/// made by other processes since the last call. All operations complete
/// immediately; there is no queue, no lock, and no suspension point.
///
/// The typed methods are total and strict. The `*_named` methods reproduce
/// the wire-compatible lenient behavior: unknown symbolic names are a
/// logged no-op.
pub struct StateBus {
    segment: Segment,
}

impl StateBus {
    /// Open the well-known segment, creating it if this is the first
    /// process to arrive.
    pub fn open() -> Result<Self, BusError> {
        Self::attach(SEGMENT_NAME)
    }

    /// Open a differently-named segment with the same create-or-attach
    /// semantics. Useful for tests and side deployments.
    pub fn attach(name: &str) -> Result<Self, BusError> {
        Ok(Self {
            segment: Segment::open(name)?,
        })
    }

    /// A bus over a private zeroed in-memory segment.
    pub fn in_memory() -> Self {
        Self {
            segment: Segment::anonymous(),
        }
    }

    /// Wrap an already-opened segment.
    pub fn from_segment(segment: Segment) -> Self {
        Self { segment }
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    /// Publish the host's current state.
    pub fn set_current_state(&self, state: HostState) {
        self.segment.set_byte(CURRENT_STATE, state.as_raw());
    }

    /// Read the host's current state.
    ///
    /// A byte outside the known range is a data-integrity error: the
    /// segment was never initialized by a compatible host, and guessing a
    /// default would mask that.
    pub fn current_state(&self) -> Result<HostState, BusError> {
        let raw = self.segment.byte(CURRENT_STATE);
        HostState::from_raw(raw).ok_or(BusError::UnknownState(raw))
    }

    /// Ask the host to transition to `state`.
    ///
    /// The host polls this field; nothing here blocks or waits for it to
    /// be honored.
    pub fn request_state(&self, state: HostState) {
        self.segment.set_byte(REQUESTED_STATE, state.as_raw());
    }

    /// Whether a state change is pending.
    ///
    /// True iff the requested byte is not `NotRunning` and differs from
    /// the current byte. Pure byte comparison; neither field is decoded.
    pub fn is_change_requested(&self) -> bool {
        let requested = self.segment.byte(REQUESTED_STATE);
        requested != HostState::NotRunning.as_raw() && requested != self.segment.byte(CURRENT_STATE)
    }

    /// The pending state request, or `None` when there is none.
    ///
    /// A requested byte outside the known range also reads as `None`: a
    /// request we cannot decode is a request we cannot honor.
    pub fn requested_state(&self) -> Option<HostState> {
        if !self.is_change_requested() {
            return None;
        }
        let raw = self.segment.byte(REQUESTED_STATE);
        let state = HostState::from_raw(raw);
        if state.is_none() {
            warn!(raw, "requested-state byte does not decode, ignoring");
        }
        state
    }

    /// Name-keyed variant of [`set_current_state`](Self::set_current_state).
    ///
    /// Unknown names leave the field untouched and return `false`.
    pub fn set_current_state_named(&self, name: &str) -> bool {
        match HostState::from_name(name) {
            Some(state) => {
                self.set_current_state(state);
                true
            }
            None => {
                warn!(name, "unknown state name, current state unchanged");
                false
            }
        }
    }

    /// Name-keyed variant of [`request_state`](Self::request_state).
    pub fn request_state_named(&self, name: &str) -> bool {
        match HostState::from_name(name) {
            Some(state) => {
                self.request_state(state);
                true
            }
            None => {
                warn!(name, "unknown state name, requested state unchanged");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Text fields
    // ------------------------------------------------------------------

    /// Write a text field as one `[len] + payload` run.
    ///
    /// The length byte and payload are committed in a single bulk copy so
    /// a concurrent reader never pairs a new length with stale payload
    /// bytes. Payloads over 255 UTF-8 bytes are rejected and the field is
    /// left unchanged.
    pub fn set_text(&self, field: TextField, text: &str) -> Result<(), BusError> {
        let payload = text.as_bytes();
        if payload.len() > MAX_TEXT_LEN {
            warn!(?field, len = payload.len(), "text payload too long, field unchanged");
            return Err(BusError::TextTooLong { len: payload.len() });
        }
        let mut run = [0u8; TEXT_SPAN];
        run[0] = payload.len() as u8;
        run[1..1 + payload.len()].copy_from_slice(payload);
        self.segment.write(field.offset(), &run[..1 + payload.len()]);
        Ok(())
    }

    /// Read a text field.
    ///
    /// The length byte is re-read on every call and the read never runs
    /// past `offset + 1 + len`. A zero length is the empty string.
    pub fn text(&self, field: TextField) -> Result<String, BusError> {
        self.read_text_at(field.offset())
    }

    fn read_text_at(&self, offset: usize) -> Result<String, BusError> {
        let len = self.segment.byte(offset) as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let mut buf = [0u8; MAX_TEXT_LEN];
        self.segment.read_into(offset + 1, &mut buf[..len]);
        Ok(std::str::from_utf8(&buf[..len])?.to_owned())
    }

    // ------------------------------------------------------------------
    // Key flags
    // ------------------------------------------------------------------

    /// Mirror a key's pressed state. Truthy input is normalized to a
    /// stored `1`.
    pub fn set_key(&self, key: ControlKey, pressed: bool) {
        self.segment.set_byte(key.offset(), pressed as u8);
    }

    /// Read a key's pressed state. Any stored nonzero byte is pressed.
    pub fn key_pressed(&self, key: ControlKey) -> bool {
        self.segment.byte(key.offset()) != 0
    }

    /// Name-keyed variant of [`set_key`](Self::set_key). Unknown names are
    /// a logged no-op returning `false`.
    pub fn set_key_named(&self, name: &str, pressed: bool) -> bool {
        match ControlKey::from_name(name) {
            Some(key) => {
                self.set_key(key, pressed);
                true
            }
            None => {
                warn!(name, "unknown key name, flag unchanged");
                false
            }
        }
    }

    /// Name-keyed variant of [`key_pressed`](Self::key_pressed). Unknown
    /// names read as unpressed.
    pub fn key_pressed_named(&self, name: &str) -> bool {
        ControlKey::from_name(name).is_some_and(|key| self.key_pressed(key))
    }

    // ------------------------------------------------------------------
    // Action debounce counter
    // ------------------------------------------------------------------

    /// Record an action signal, tracking consecutive repeats.
    ///
    /// The incoming name is expanded to its fixed 256-byte image (length
    /// byte, payload, zero padding) and compared byte-for-byte against the
    /// stored image. An identical image increments the repeat counter;
    /// any difference resets it to 1. The counter wraps to zero past
    /// 65535. Name and counter are committed as one contiguous run so a
    /// reader never pairs a new name with a stale count.
    pub fn record_action(&self, name: &str) -> Result<(), BusError> {
        let payload = name.as_bytes();
        if payload.len() > MAX_TEXT_LEN {
            warn!(len = payload.len(), "action name too long, field unchanged");
            return Err(BusError::TextTooLong { len: payload.len() });
        }

        let mut run = [0u8; TEXT_SPAN + 2];
        run[0] = payload.len() as u8;
        run[1..1 + payload.len()].copy_from_slice(payload);

        let mut stored = [0u8; TEXT_SPAN];
        self.segment.read_into(ACTION_NAME, &mut stored);
        let count = if stored == run[..TEXT_SPAN] {
            self.action_count().wrapping_add(1)
        } else {
            1
        };
        run[TEXT_SPAN..].copy_from_slice(&count.to_be_bytes());

        self.segment.write(ACTION_NAME, &run);
        Ok(())
    }

    /// The most recently recorded action name. Empty when no action has
    /// been recorded.
    pub fn action_name(&self) -> Result<String, BusError> {
        self.read_text_at(ACTION_NAME)
    }

    /// The repeat counter paired with the action name.
    ///
    /// There is no presence flag: when [`action_name`](Self::action_name)
    /// is empty the counter is stale and must be ignored.
    pub fn action_count(&self) -> u16 {
        let mut raw = [0u8; 2];
        self.segment.read_into(ACTION_COUNT, &mut raw);
        u16::from_be_bytes(raw)
    }

    // ------------------------------------------------------------------
    // Free-allocation window
    // ------------------------------------------------------------------

    /// Read from the opaque free-allocation window. `offset` is relative
    /// to the window start.
    pub fn read_free(&self, offset: usize, buf: &mut [u8]) -> Result<(), BusError> {
        Self::check_free_bounds(offset, buf.len())?;
        self.segment.read_into(FREE_REGION + offset, buf);
        Ok(())
    }

    /// Write into the opaque free-allocation window as one bulk copy.
    /// The bytes are never interpreted by this layer.
    pub fn write_free(&self, offset: usize, bytes: &[u8]) -> Result<(), BusError> {
        Self::check_free_bounds(offset, bytes.len())?;
        self.segment.write(FREE_REGION + offset, bytes);
        Ok(())
    }

    fn check_free_bounds(offset: usize, len: usize) -> Result<(), BusError> {
        match offset.checked_add(len) {
            Some(end) if end <= FREE_REGION_LEN => Ok(()),
            _ => Err(BusError::OutOfBounds { offset, len }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_segment_defaults() {
        let bus = StateBus::in_memory();
        assert_eq!(bus.current_state().unwrap(), HostState::NotRunning);
        assert!(!bus.is_change_requested());
        assert_eq!(bus.requested_state(), None);
        for field in TextField::ALL {
            assert_eq!(bus.text(field).unwrap(), "");
        }
        for key in ControlKey::ALL {
            assert!(!bus.key_pressed(key));
        }
        assert_eq!(bus.action_name().unwrap(), "");
        assert_eq!(bus.action_count(), 0);
    }

    #[test]
    fn text_round_trip() {
        let bus = StateBus::in_memory();
        for field in TextField::ALL {
            bus.set_text(field, "grid-mode").unwrap();
            assert_eq!(bus.text(field).unwrap(), "grid-mode");
            bus.set_text(field, "").unwrap();
            assert_eq!(bus.text(field).unwrap(), "");
        }
    }

    #[test]
    fn text_round_trip_multibyte_utf8() {
        let bus = StateBus::in_memory();
        bus.set_text(TextField::Sound, "ping — 応答").unwrap();
        assert_eq!(bus.text(TextField::Sound).unwrap(), "ping — 応答");
    }

    #[test]
    fn text_at_limit_round_trips() {
        let bus = StateBus::in_memory();
        let max = "x".repeat(MAX_TEXT_LEN);
        bus.set_text(TextField::Classifier, &max).unwrap();
        assert_eq!(bus.text(TextField::Classifier).unwrap(), max);
    }

    #[test]
    fn oversized_text_leaves_field_unchanged() {
        let bus = StateBus::in_memory();
        bus.set_text(TextField::Mode, "browse").unwrap();
        let long = "y".repeat(MAX_TEXT_LEN + 1);
        let err = bus.set_text(TextField::Mode, &long).unwrap_err();
        assert!(matches!(err, BusError::TextTooLong { len: 256 }));
        assert_eq!(bus.text(TextField::Mode).unwrap(), "browse");
    }

    #[test]
    fn shorter_rewrite_hides_stale_tail() {
        let bus = StateBus::in_memory();
        bus.set_text(TextField::OverlayImage, "long-overlay-name.png").unwrap();
        bus.set_text(TextField::OverlayImage, "a.png").unwrap();
        assert_eq!(bus.text(TextField::OverlayImage).unwrap(), "a.png");
    }

    #[test]
    fn key_flags() {
        let bus = StateBus::in_memory();
        bus.set_key(ControlKey::Shift, true);
        assert!(bus.key_pressed(ControlKey::Shift));
        assert!(!bus.key_pressed(ControlKey::Ctrl));
        bus.set_key(ControlKey::Shift, false);
        assert!(!bus.key_pressed(ControlKey::Shift));
    }

    #[test]
    fn named_key_surface_is_lenient() {
        let bus = StateBus::in_memory();
        assert!(bus.set_key_named("alt", true));
        assert!(bus.key_pressed_named("alt"));
        assert!(!bus.set_key_named("super", true));
        assert!(!bus.key_pressed_named("super"));
        for key in ControlKey::ALL {
            if key != ControlKey::Alt {
                assert!(!bus.key_pressed(key), "{key:?} must be untouched");
            }
        }
    }

    #[test]
    fn change_request_detection() {
        let bus = StateBus::in_memory();
        bus.set_current_state(HostState::Running);

        bus.request_state(HostState::NotRunning);
        assert!(!bus.is_change_requested());
        assert_eq!(bus.requested_state(), None);

        bus.request_state(HostState::Running);
        assert!(!bus.is_change_requested());

        bus.request_state(HostState::Paused);
        assert!(bus.is_change_requested());
        assert_eq!(bus.requested_state(), Some(HostState::Paused));

        // The host honors it; the request stops being pending.
        bus.set_current_state(HostState::Paused);
        assert!(!bus.is_change_requested());
        assert_eq!(bus.requested_state(), None);
    }

    #[test]
    fn named_state_surface_is_lenient() {
        let bus = StateBus::in_memory();
        assert!(bus.set_current_state_named("running"));
        assert_eq!(bus.current_state().unwrap(), HostState::Running);
        assert!(!bus.set_current_state_named("hibernating"));
        assert_eq!(bus.current_state().unwrap(), HostState::Running);
        assert!(bus.request_state_named("paused"));
        assert_eq!(bus.requested_state(), Some(HostState::Paused));
    }

    #[test]
    fn corrupt_state_byte_is_an_error() {
        let bus = StateBus::in_memory();
        bus.segment.set_byte(CURRENT_STATE, 9);
        assert!(matches!(bus.current_state(), Err(BusError::UnknownState(9))));
    }

    #[test]
    fn corrupt_requested_byte_reads_as_no_request() {
        let bus = StateBus::in_memory();
        bus.set_current_state(HostState::Running);
        bus.segment.set_byte(REQUESTED_STATE, 200);
        assert!(bus.is_change_requested());
        assert_eq!(bus.requested_state(), None);
    }

    #[test]
    fn action_debounce_counts_repeats() {
        let bus = StateBus::in_memory();
        bus.record_action("jump").unwrap();
        bus.record_action("jump").unwrap();
        bus.record_action("jump").unwrap();
        assert_eq!(bus.action_name().unwrap(), "jump");
        assert_eq!(bus.action_count(), 3);

        bus.record_action("duck").unwrap();
        assert_eq!(bus.action_name().unwrap(), "duck");
        assert_eq!(bus.action_count(), 1);
    }

    #[test]
    fn action_reset_on_length_change_with_shared_prefix() {
        let bus = StateBus::in_memory();
        bus.record_action("fire").unwrap();
        bus.record_action("firework").unwrap();
        assert_eq!(bus.action_count(), 1);
        assert_eq!(bus.action_name().unwrap(), "firework");
        // Shrinking back must also reset: the padded images differ.
        bus.record_action("fire").unwrap();
        assert_eq!(bus.action_count(), 1);
    }

    #[test]
    fn oversized_action_leaves_pair_unchanged() {
        let bus = StateBus::in_memory();
        bus.record_action("jump").unwrap();
        let long = "z".repeat(MAX_TEXT_LEN + 10);
        assert!(bus.record_action(&long).is_err());
        assert_eq!(bus.action_name().unwrap(), "jump");
        assert_eq!(bus.action_count(), 1);
    }

    #[test]
    fn action_counter_wraps() {
        let bus = StateBus::in_memory();
        bus.record_action("hold").unwrap();
        bus.segment.write(ACTION_COUNT, &u16::MAX.to_be_bytes());
        bus.record_action("hold").unwrap();
        assert_eq!(bus.action_count(), 0);
    }

    #[test]
    fn free_window_round_trip_and_bounds() {
        let bus = StateBus::in_memory();
        bus.write_free(0, b"opaque").unwrap();
        let mut buf = [0u8; 6];
        bus.read_free(0, &mut buf).unwrap();
        assert_eq!(&buf, b"opaque");

        bus.write_free(FREE_REGION_LEN - 1, &[7]).unwrap();
        assert!(matches!(
            bus.write_free(FREE_REGION_LEN - 1, &[7, 7]),
            Err(BusError::OutOfBounds { .. })
        ));
        assert!(matches!(
            bus.read_free(FREE_REGION_LEN, &mut buf),
            Err(BusError::OutOfBounds { .. })
        ));
        assert!(matches!(
            bus.write_free(usize::MAX, &[1]),
            Err(BusError::OutOfBounds { .. })
        ));
    }
}
