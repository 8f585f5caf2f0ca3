//! Request routing: one decoded request in, exactly one response out.
//!
//! The [`Engine`] owns the object registry and the event recorder and holds
//! the host capability bundle. Operation failures are captured into the
//! response's error code and never tear down the session; the only
//! operation with a side effect after its response is TERMINATE_HOST,
//! which the session loop signals once the response bytes are flushed.

use std::path::PathBuf;

use crate::host::Host;
use crate::properties;
use crate::protocol::{ErrorCode, Property, Request, Response, UserEvent};
use crate::recorder::EventRecorder;
use crate::registry::{Lookup, ObjectRegistry};

/// What the session loop should do after writing the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep serving requests.
    Continue,
    /// Flush the response, then ask the host to terminate.
    TerminateHost,
}

/// The protocol engine: registry + recorder + host capabilities.
pub struct Engine {
    host: Host,
    registry: ObjectRegistry,
    recorder: EventRecorder,
    screenshot_path: PathBuf,
}

impl Engine {
    /// Create an engine over the given host capability bundle.
    pub fn new(host: Host) -> Self {
        Self {
            host,
            registry: ObjectRegistry::new(),
            recorder: EventRecorder::new(),
            screenshot_path: std::env::temp_dir().join("stagehand-screenshot.png"),
        }
    }

    /// Lifecycle hooks of the host (used by the session loop for
    /// TERMINATE_HOST).
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Whether the recorder wants sampling ticks.
    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Deliver one sampling tick to the recorder.
    pub fn tick(&mut self) {
        self.recorder.on_tick(&*self.host.input);
    }

    /// Handle one request payload and produce the response for it.
    ///
    /// Structurally undecodable payloads get an `INVALID_REQUEST` response;
    /// nothing here returns an error to the session loop.
    pub fn handle(&mut self, payload: &[u8]) -> (Response, Outcome) {
        let request = match Request::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("[engine] undecodable request: {e}");
                return (Response::error(ErrorCode::InvalidRequest), Outcome::Continue);
            }
        };

        log::debug!("[engine] handling {request:?}");

        match request {
            Request::FetchObjectTree => (self.fetch_object_tree(), Outcome::Continue),
            Request::FetchObject { id } => (self.fetch_object(id), Outcome::Continue),
            Request::WriteProperty { id, property } => {
                (self.write_property(id, &property), Outcome::Continue)
            }
            Request::RecordUser { start } => (self.record_user(start), Outcome::Continue),
            Request::SimulateUser { event } => (self.simulate_user(&event), Outcome::Continue),
            Request::TakeScreenshot => (self.take_screenshot(), Outcome::Continue),
            Request::TerminateHost => {
                (Response::error(ErrorCode::NoError), Outcome::TerminateHost)
            }
        }
    }

    /// FETCH_OBJECT_TREE: rebuild the registry and return the snapshot.
    fn fetch_object_tree(&mut self) -> Response {
        let objects = self.registry.rebuild(&*self.host.graph);
        log::debug!("[engine] object tree rebuilt: {} entries", objects.len());

        Response {
            objects,
            ..Response::error(ErrorCode::NoError)
        }
    }

    /// FETCH_OBJECT: all readable properties of one registered object.
    fn fetch_object(&mut self, id: u32) -> Response {
        match self.registry.lookup(id) {
            Lookup::Live(object) => Response {
                properties: properties::read_all(&*object, &*self.host.values),
                ..Response::error(ErrorCode::NoError)
            },
            Lookup::Stale | Lookup::Unknown => {
                Response::error(ErrorCode::UnknownObjectId)
            }
        }
    }

    /// WRITE_PROPERTY: decode the value and assign it, unchecked.
    fn write_property(&mut self, id: u32, property: &Property) -> Response {
        match self.registry.lookup(id) {
            Lookup::Live(object) => {
                if let Err(e) =
                    properties::write(&*object, &*self.host.values, &property.name, &property.value)
                {
                    // Permissive by design: an undecodable value is logged
                    // and otherwise ignored, matching write-as-upsert
                    // expectations of existing clients.
                    log::warn!("[engine] property write ignored: {e}");
                }
                Response::error(ErrorCode::NoError)
            }
            Lookup::Stale | Lookup::Unknown => Response::error(ErrorCode::UnknownObjectId),
        }
    }

    /// RECORD_USER: start sampling, or stop and return the sequence.
    fn record_user(&mut self, start: bool) -> Response {
        if start {
            match self.recorder.start(&*self.host.input) {
                Ok(()) => Response::error(ErrorCode::NoError),
                Err(e) => {
                    log::error!("[engine] failed to start recording: {e}");
                    Response::error(ErrorCode::AutomationError)
                }
            }
        } else {
            Response {
                events: self.recorder.stop(),
                ..Response::error(ErrorCode::NoError)
            }
        }
    }

    /// SIMULATE_USER: replay one event through the input driver.
    fn simulate_user(&mut self, event: &UserEvent) -> Response {
        if EventRecorder::replay(&*self.host.input, event) {
            Response::error(ErrorCode::NoError)
        } else {
            Response::error(ErrorCode::AutomationError)
        }
    }

    /// TAKE_SCREENSHOT: capture to a temp file and read the bytes back.
    fn take_screenshot(&mut self) -> Response {
        if let Err(e) = self.host.screen.capture_to(&self.screenshot_path) {
            log::error!("[engine] screenshot capture failed: {e}");
            return Response::error(ErrorCode::AutomationError);
        }

        match std::fs::read(&self.screenshot_path) {
            Ok(image) => Response {
                image,
                ..Response::error(ErrorCode::NoError)
            },
            Err(e) => {
                log::error!("[engine] screenshot readback failed: {e}");
                Response::error(ErrorCode::UnknownError)
            }
        }
    }
}
