//! Input recording and replay.
//!
//! While recording, the engine samples the input driver at a fixed interval
//! and emits discrete events only when state changes between two samples:
//! a relative pointer move for a position delta, one button event per
//! flipped button bit, one key event per flipped key bit. Event `instant`s
//! count elapsed sampling intervals, so a sequence replays with the same
//! relative timing it was captured with.
//!
//! Every recording opens with a `MOUSE_MOVE_ABSOLUTE` at instant 0 carrying
//! the baseline pointer position. The key-state baseline is then cleared,
//! so keys already held when recording starts are reported as fresh presses
//! on the first tick; clients depend on seeing those presses.

use crate::config::SAMPLE_INTERVAL_MS;
use crate::host::{InputDriver, InputSample, KEY_STATE_BYTES, SHIFT_MASK};
use crate::protocol::UserEvent;

/// Differential input recorder with IDLE / RECORDING states.
#[derive(Debug, Default)]
pub struct EventRecorder {
    recording: bool,
    events: Vec<UserEvent>,
    instant: u32,
    last: InputSample,
}

impl EventRecorder {
    /// Create an idle recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a recording is in progress.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Start a recording, implicitly stopping any previous one.
    ///
    /// Clears the event buffer, resets elapsed time, emits the baseline
    /// absolute pointer position, then zeroes the stored key state.
    ///
    /// # Errors
    ///
    /// Fails when the input driver cannot take the baseline sample; the
    /// recorder stays idle in that case.
    pub fn start(&mut self, input: &dyn InputDriver) -> anyhow::Result<()> {
        self.recording = false;
        self.events.clear();
        self.instant = 0;

        self.last = input.sample()?;
        self.events.push(UserEvent::MouseMoveAbs {
            instant: 0,
            x: self.last.x,
            y: self.last.y,
        });

        // Forget which keys are held so the first tick reports them as
        // fresh presses.
        self.last.keys = [0; KEY_STATE_BYTES];

        self.recording = true;
        Ok(())
    }

    /// Process one sampling tick: diff the new sample against the stored
    /// baseline and append events for every change.
    ///
    /// No-op while idle. A failed sample skips the tick but still advances
    /// elapsed time.
    pub fn on_tick(&mut self, input: &dyn InputDriver) {
        if !self.recording {
            return;
        }

        let state = match input.sample() {
            Ok(state) => state,
            Err(e) => {
                log::warn!("[recorder] input sample failed, skipping tick: {e}");
                self.instant += SAMPLE_INTERVAL_MS as u32;
                return;
            }
        };

        if state.x != self.last.x || state.y != self.last.y {
            self.events.push(UserEvent::MouseMoveRel {
                instant: self.instant,
                dx: state.x - self.last.x,
                dy: state.y - self.last.y,
            });
        }

        if state.buttons != self.last.buttons {
            let changed = state.buttons ^ self.last.buttons;
            for bit in 0..8u8 {
                if changed & (1 << bit) != 0 {
                    self.events.push(UserEvent::MouseButton {
                        instant: self.instant,
                        button: bit + 1,
                        pressed: state.buttons & (1 << bit) != 0,
                    });
                }
            }
        }

        let shifted = state.modifiers & SHIFT_MASK != 0;
        for byte in 0..KEY_STATE_BYTES {
            let changed = state.keys[byte] ^ self.last.keys[byte];
            if changed == 0 {
                continue;
            }
            for bit in 0..8 {
                if (changed >> bit) & 1 != 0 {
                    let pressed = (state.keys[byte] >> bit) & 1 != 0;
                    let keycode = (8 * byte + bit) as u32;
                    if let Some(key) = input.key_symbol(keycode, shifted) {
                        self.events.push(UserEvent::Keyboard {
                            instant: self.instant,
                            key,
                            pressed,
                        });
                    }
                }
            }
        }

        self.last = state;
        self.instant += SAMPLE_INTERVAL_MS as u32;
    }

    /// Stop recording and hand the accumulated sequence to the caller.
    pub fn stop(&mut self) -> Vec<UserEvent> {
        self.recording = false;
        std::mem::take(&mut self.events)
    }

    /// Replay a single event through the input driver.
    ///
    /// An absolute move is converted to one relative move of the delta from
    /// the current pointer position, since the injection capability only
    /// exposes relative motion. Returns `false` when injection fails.
    pub fn replay(input: &dyn InputDriver, event: &UserEvent) -> bool {
        let result = match event {
            UserEvent::MouseMoveAbs { x, y, .. } => input
                .sample()
                .and_then(|current| input.move_pointer(x - current.x, y - current.y)),
            UserEvent::MouseMoveRel { dx, dy, .. } => input.move_pointer(*dx, *dy),
            UserEvent::MouseButton { button, pressed, .. } => {
                input.press_button(*button, *pressed)
            }
            UserEvent::Keyboard { key, pressed, .. } => input.press_key(key, *pressed),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[recorder] replay failed: {e}");
                false
            }
        }
    }
}
