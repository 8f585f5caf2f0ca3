//! Binary request/response messages carried inside SLIP packets.
//!
//! Requests are `[u8 opcode]` followed by opcode-specific fields; responses
//! always carry all four result sections (possibly empty) after the error
//! code:
//!
//! ```text
//! Response: [u8 error]
//!           [u32 LE object_count]   objects…
//!           [u32 LE property_count] properties…
//!           [u32 LE event_count]    events…
//!           [u32 LE image_len]      image bytes
//! ```
//!
//! Strings are `u16 LE length + UTF-8`; blobs are `u32 LE length + bytes`.
//! All integers are little-endian. Both directions are implemented so the
//! test suite can act as a client.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Request operation codes.
pub mod opcode {
    /// Rebuild and return the full object tree.
    pub const FETCH_OBJECT_TREE: u8 = 0x01;
    /// Return all properties of one registered object.
    pub const FETCH_OBJECT: u8 = 0x02;
    /// Write one property of one registered object.
    pub const WRITE_PROPERTY: u8 = 0x03;
    /// Start or stop recording user input.
    pub const RECORD_USER: u8 = 0x04;
    /// Replay a single user event.
    pub const SIMULATE_USER: u8 = 0x05;
    /// Capture the screen and return the image bytes.
    pub const TAKE_SCREENSHOT: u8 = 0x06;
    /// Flush the response, then terminate the host application.
    pub const TERMINATE_HOST: u8 = 0x07;
}

/// User event kind tags on the wire.
mod event_kind {
    pub const MOUSE_MOVE_ABS: u8 = 0x01;
    pub const MOUSE_MOVE_REL: u8 = 0x02;
    pub const MOUSE_BUTTON: u8 = 0x03;
    pub const KEYBOARD: u8 = 0x04;
}

/// Response error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Operation succeeded.
    NoError = 0,
    /// Malformed message or unrecognized opcode.
    InvalidRequest = 1,
    /// Identifier not present in the current registry snapshot.
    UnknownObjectId = 2,
    /// The input automation capability reported failure.
    AutomationError = 3,
    /// Collaborator I/O failure (e.g. screenshot readback).
    UnknownError = 4,
}

impl ErrorCode {
    fn from_u8(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => Self::NoError,
            1 => Self::InvalidRequest,
            2 => Self::UnknownObjectId,
            3 => Self::AutomationError,
            4 => Self::UnknownError,
            _ => bail!("unknown error code: {raw}"),
        })
    }
}

/// One entry of the object tree snapshot.
///
/// Serializable so test drivers can persist tree snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Pre-order identifier, starting at 1.
    pub id: u32,
    /// Identifier of the parent; 0 for top-level roots.
    pub parent: u32,
    /// Native address of the live object, for display only.
    pub address: u64,
    /// Host toolkit type name.
    pub type_name: String,
    /// Host-assigned object name (may be empty).
    pub name: String,
}

/// One named property of a registered object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Whether the host reports the property as writable.
    pub writable: bool,
    /// Value bytes, encoded through the opaque value codec.
    pub value: Vec<u8>,
}

/// One recorded or replayable user input event.
///
/// `instant` is milliseconds elapsed since the start of the recording.
/// Serializable so recorded sequences can be stored and replayed later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    /// Absolute pointer position; always the first event of a recording.
    MouseMoveAbs { instant: u32, x: i32, y: i32 },
    /// Pointer displacement since the previous sample.
    MouseMoveRel { instant: u32, dx: i32, dy: i32 },
    /// Pointer button transition (button indices start at 1).
    MouseButton { instant: u32, button: u8, pressed: bool },
    /// Key transition, identified by its symbolic name.
    Keyboard { instant: u32, key: String, pressed: bool },
}

impl UserEvent {
    /// Milliseconds since the start of the recording.
    pub fn instant(&self) -> u32 {
        match self {
            Self::MouseMoveAbs { instant, .. }
            | Self::MouseMoveRel { instant, .. }
            | Self::MouseButton { instant, .. }
            | Self::Keyboard { instant, .. } => *instant,
        }
    }

    fn put(&self, buf: &mut Vec<u8>) {
        match self {
            Self::MouseMoveAbs { instant, x, y } => {
                buf.push(event_kind::MOUSE_MOVE_ABS);
                buf.extend_from_slice(&instant.to_le_bytes());
                buf.extend_from_slice(&x.to_le_bytes());
                buf.extend_from_slice(&y.to_le_bytes());
            }
            Self::MouseMoveRel { instant, dx, dy } => {
                buf.push(event_kind::MOUSE_MOVE_REL);
                buf.extend_from_slice(&instant.to_le_bytes());
                buf.extend_from_slice(&dx.to_le_bytes());
                buf.extend_from_slice(&dy.to_le_bytes());
            }
            Self::MouseButton { instant, button, pressed } => {
                buf.push(event_kind::MOUSE_BUTTON);
                buf.extend_from_slice(&instant.to_le_bytes());
                buf.push(*button);
                buf.push(u8::from(*pressed));
            }
            Self::Keyboard { instant, key, pressed } => {
                buf.push(event_kind::KEYBOARD);
                buf.extend_from_slice(&instant.to_le_bytes());
                put_str(buf, key);
                buf.push(u8::from(*pressed));
            }
        }
    }

    fn take(reader: &mut Reader<'_>) -> Result<Self> {
        let kind = reader.u8().context("event kind")?;
        let instant = reader.u32().context("event instant")?;
        Ok(match kind {
            event_kind::MOUSE_MOVE_ABS => Self::MouseMoveAbs {
                instant,
                x: reader.i32()?,
                y: reader.i32()?,
            },
            event_kind::MOUSE_MOVE_REL => Self::MouseMoveRel {
                instant,
                dx: reader.i32()?,
                dy: reader.i32()?,
            },
            event_kind::MOUSE_BUTTON => Self::MouseButton {
                instant,
                button: reader.u8()?,
                pressed: reader.u8()? != 0,
            },
            event_kind::KEYBOARD => Self::Keyboard {
                instant,
                key: reader.str()?,
                pressed: reader.u8()? != 0,
            },
            _ => bail!("unknown event kind: 0x{kind:02x}"),
        })
    }
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Rebuild the registry and return the full object list.
    FetchObjectTree,
    /// Return all properties of the identified object.
    FetchObject { id: u32 },
    /// Write one property of the identified object.
    WriteProperty { id: u32, property: Property },
    /// Start (`true`) or stop (`false`) recording user input.
    RecordUser { start: bool },
    /// Replay one user event through the input driver.
    SimulateUser { event: UserEvent },
    /// Capture the screen.
    TakeScreenshot,
    /// Terminate the host application after the response is flushed.
    TerminateHost,
}

impl Request {
    /// Encode this request into its wire payload (pre-SLIP).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::FetchObjectTree => buf.push(opcode::FETCH_OBJECT_TREE),
            Self::FetchObject { id } => {
                buf.push(opcode::FETCH_OBJECT);
                buf.extend_from_slice(&id.to_le_bytes());
            }
            Self::WriteProperty { id, property } => {
                buf.push(opcode::WRITE_PROPERTY);
                buf.extend_from_slice(&id.to_le_bytes());
                put_property(&mut buf, property);
            }
            Self::RecordUser { start } => {
                buf.push(opcode::RECORD_USER);
                buf.push(u8::from(*start));
            }
            Self::SimulateUser { event } => {
                buf.push(opcode::SIMULATE_USER);
                event.put(&mut buf);
            }
            Self::TakeScreenshot => buf.push(opcode::TAKE_SCREENSHOT),
            Self::TerminateHost => buf.push(opcode::TERMINATE_HOST),
        }
        buf
    }

    /// Decode a request payload.
    ///
    /// # Errors
    ///
    /// Returns an error for truncated fields or an unrecognized opcode; the
    /// dispatcher maps both to `INVALID_REQUEST`.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(payload);
        let op = reader.u8().context("request opcode")?;

        Ok(match op {
            opcode::FETCH_OBJECT_TREE => Self::FetchObjectTree,
            opcode::FETCH_OBJECT => Self::FetchObject { id: reader.u32()? },
            opcode::WRITE_PROPERTY => Self::WriteProperty {
                id: reader.u32()?,
                property: take_property(&mut reader)?,
            },
            opcode::RECORD_USER => Self::RecordUser {
                start: reader.u8()? != 0,
            },
            opcode::SIMULATE_USER => Self::SimulateUser {
                event: UserEvent::take(&mut reader)?,
            },
            opcode::TAKE_SCREENSHOT => Self::TakeScreenshot,
            opcode::TERMINATE_HOST => Self::TerminateHost,
            _ => bail!("unknown opcode: 0x{op:02x}"),
        })
    }
}

/// A server response: error code plus the result sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Outcome of the operation.
    pub error: ErrorCode,
    /// Object tree snapshot (FETCH_OBJECT_TREE).
    pub objects: Vec<ObjectEntry>,
    /// Property list (FETCH_OBJECT).
    pub properties: Vec<Property>,
    /// Recorded event sequence (RECORD_USER stop).
    pub events: Vec<UserEvent>,
    /// Screenshot bytes (TAKE_SCREENSHOT).
    pub image: Vec<u8>,
}

impl Response {
    /// A response carrying only an error code.
    pub fn error(error: ErrorCode) -> Self {
        Self {
            error,
            objects: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            image: Vec::new(),
        }
    }

    /// Encode this response into its wire payload (pre-SLIP).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.error as u8];

        buf.extend_from_slice(&(self.objects.len() as u32).to_le_bytes());
        for object in &self.objects {
            buf.extend_from_slice(&object.id.to_le_bytes());
            buf.extend_from_slice(&object.parent.to_le_bytes());
            buf.extend_from_slice(&object.address.to_le_bytes());
            put_str(&mut buf, &object.type_name);
            put_str(&mut buf, &object.name);
        }

        buf.extend_from_slice(&(self.properties.len() as u32).to_le_bytes());
        for property in &self.properties {
            put_property(&mut buf, property);
        }

        buf.extend_from_slice(&(self.events.len() as u32).to_le_bytes());
        for event in &self.events {
            event.put(&mut buf);
        }

        buf.extend_from_slice(&(self.image.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.image);

        buf
    }

    /// Decode a response payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(payload);
        let error = ErrorCode::from_u8(reader.u8().context("response error code")?)?;

        let object_count = reader.u32().context("object count")?;
        let mut objects = Vec::with_capacity(object_count.min(1024) as usize);
        for _ in 0..object_count {
            objects.push(ObjectEntry {
                id: reader.u32()?,
                parent: reader.u32()?,
                address: reader.u64()?,
                type_name: reader.str()?,
                name: reader.str()?,
            });
        }

        let property_count = reader.u32().context("property count")?;
        let mut properties = Vec::with_capacity(property_count.min(1024) as usize);
        for _ in 0..property_count {
            properties.push(take_property(&mut reader)?);
        }

        let event_count = reader.u32().context("event count")?;
        let mut events = Vec::with_capacity(event_count.min(1024) as usize);
        for _ in 0..event_count {
            events.push(UserEvent::take(&mut reader)?);
        }

        let image = reader.blob().context("image bytes")?;

        Ok(Self { error, objects, properties, events, image })
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn put_property(buf: &mut Vec<u8>, property: &Property) {
    put_str(buf, &property.name);
    buf.push(u8::from(property.writable));
    buf.extend_from_slice(&(property.value.len() as u32).to_le_bytes());
    buf.extend_from_slice(&property.value);
}

fn take_property(reader: &mut Reader<'_>) -> Result<Property> {
    Ok(Property {
        name: reader.str()?,
        writable: reader.u8()? != 0,
        value: reader.blob()?,
    })
}

/// Forward-only reader over a wire payload.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).context("length overflow")?;
        if end > self.buf.len() {
            bail!(
                "message truncated: wanted {n} bytes at offset {}, have {}",
                self.pos,
                self.buf.len() - self.pos
            );
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }

    fn str(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.bytes(len)?;
        Ok(String::from_utf8(bytes.to_vec()).context("invalid UTF-8 in string field")?)
    }

    fn blob(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.bytes(len)?.to_vec())
    }
}
