//! Abstract capabilities the host process must provide.
//!
//! The engine never talks to a GUI toolkit or a windowing system directly;
//! everything it needs from the host is behind the traits in this module.
//! An integration implements them once (e.g. over Qt meta-objects and X11)
//! and hands the bundle to [`crate::install`].

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

/// Width of the key-state bitmap, in bytes (256 keycodes).
pub const KEY_STATE_BYTES: usize = 32;

/// Bit of [`InputSample::modifiers`] indicating a held Shift.
pub const SHIFT_MASK: u32 = 1;

/// One snapshot of input-device state, taken at a sampling tick.
///
/// Used only for differencing against the previous snapshot; it has no
/// identity of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputSample {
    /// Pointer x position, in screen coordinates.
    pub x: i32,
    /// Pointer y position, in screen coordinates.
    pub y: i32,
    /// Pressed pointer buttons, one bit per button (bit 0 = button 1).
    pub buttons: u8,
    /// Active keyboard modifiers.
    pub modifiers: u32,
    /// Pressed keys, one bit per keycode (keycode = 8 * byte + bit).
    pub keys: [u8; KEY_STATE_BYTES],
}

/// One introspected property of a host object, pre-encoding.
#[derive(Debug, Clone)]
pub struct HostProperty {
    /// Property name.
    pub name: String,
    /// Whether the host allows writing it.
    pub writable: bool,
    /// Current value.
    pub value: serde_json::Value,
}

/// A live, introspectable object in the host's object graph.
///
/// The engine holds only weak references to these; the host graph keeps
/// exclusive ownership and may drop objects between tree fetches.
pub trait HostObject: Send + Sync {
    /// Toolkit type name (e.g. class name).
    fn type_name(&self) -> String;

    /// Host-assigned object name; empty when unnamed.
    fn object_name(&self) -> String;

    /// Native address of the object, surfaced for display only.
    fn native_address(&self) -> u64;

    /// Direct children, in the host's enumeration order.
    fn children(&self) -> Vec<Arc<dyn HostObject>>;

    /// All introspectable properties, in declared order.
    fn properties(&self) -> Vec<HostProperty>;

    /// Assign a property by name.
    ///
    /// Unknown names are accepted silently; the host decides what that
    /// means (typically a dynamic property).
    fn set_property(&self, name: &str, value: serde_json::Value);

    /// For surfaces whose content lives in a separate scene graph, the
    /// root of that scene graph; `None` for ordinary objects.
    fn scene_root(&self) -> Option<Arc<dyn HostObject>> {
        None
    }
}

/// Enumeration of the host's top-level object roots.
pub trait ObjectGraph: Send + Sync {
    /// Current top-level widgets.
    fn top_level_widgets(&self) -> Vec<Arc<dyn HostObject>>;

    /// Current top-level windows (surfaces that are not widgets).
    fn top_level_windows(&self) -> Vec<Arc<dyn HostObject>>;
}

/// Input-state sampling and input injection.
pub trait InputDriver: Send + Sync {
    /// Snapshot the current pointer/keyboard state.
    fn sample(&self) -> Result<InputSample>;

    /// Resolve a keycode to its symbolic name, honoring Shift.
    ///
    /// Returns `None` for keycodes with no symbol.
    fn key_symbol(&self, keycode: u32, shifted: bool) -> Option<String>;

    /// Move the pointer by a relative delta.
    fn move_pointer(&self, dx: i32, dy: i32) -> Result<()>;

    /// Press or release a pointer button (indices start at 1).
    fn press_button(&self, button: u8, pressed: bool) -> Result<()>;

    /// Press or release the key for a symbolic name.
    fn press_key(&self, key: &str, pressed: bool) -> Result<()>;
}

/// Screen capture collaborator.
pub trait ScreenCapture: Send + Sync {
    /// Capture the screen into an image file at `path`.
    fn capture_to(&self, path: &Path) -> Result<()>;
}

/// Opaque encoder/decoder for property value payloads.
pub trait ValueCodec: Send + Sync {
    /// Encode a value into payload bytes.
    fn encode(&self, value: &serde_json::Value) -> Vec<u8>;

    /// Decode payload bytes back into a value.
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value>;
}

/// Host lifecycle hooks: startup readiness and requested shutdown.
pub trait HostControl: Send + Sync {
    /// Whether the host's main loop has started.
    fn is_ready(&self) -> bool;

    /// Ask the host application to terminate.
    fn request_quit(&self);
}

/// The full capability bundle an integration hands to the engine.
#[derive(Clone)]
pub struct Host {
    /// Object-graph enumeration.
    pub graph: Arc<dyn ObjectGraph>,
    /// Input sampling and injection.
    pub input: Arc<dyn InputDriver>,
    /// Screen capture.
    pub screen: Arc<dyn ScreenCapture>,
    /// Property value codec.
    pub values: Arc<dyn ValueCodec>,
    /// Lifecycle hooks.
    pub control: Arc<dyn HostControl>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}
