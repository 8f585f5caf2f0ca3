//! End-to-end session tests: a real TCP client driving the engine through
//! SLIP-framed requests against a mock host.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use stagehand::host::{HostProperty, InputSample};
use stagehand::{
    Engine, ErrorCode, Host, HostControl, HostObject, InputDriver, JsonValueCodec, ObjectGraph,
    Property, Request, Response, ScreenCapture, Server, UserEvent,
};

struct TestObject {
    type_name: &'static str,
    name: &'static str,
    props: Mutex<HashMap<String, serde_json::Value>>,
    children: Vec<Arc<dyn HostObject>>,
}

impl TestObject {
    fn new(
        type_name: &'static str,
        name: &'static str,
        props: &[(&str, serde_json::Value)],
        children: Vec<Arc<dyn HostObject>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            type_name,
            name,
            props: Mutex::new(
                props.iter().map(|(n, v)| (n.to_string(), v.clone())).collect(),
            ),
            children,
        })
    }
}

impl HostObject for TestObject {
    fn type_name(&self) -> String {
        self.type_name.into()
    }
    fn object_name(&self) -> String {
        self.name.into()
    }
    fn native_address(&self) -> u64 {
        self as *const Self as u64
    }
    fn children(&self) -> Vec<Arc<dyn HostObject>> {
        self.children.clone()
    }
    fn properties(&self) -> Vec<HostProperty> {
        self.props
            .lock()
            .unwrap()
            .iter()
            .map(|(name, value)| HostProperty {
                name: name.clone(),
                writable: true,
                value: value.clone(),
            })
            .collect()
    }
    fn set_property(&self, name: &str, value: serde_json::Value) {
        self.props.lock().unwrap().insert(name.to_string(), value);
    }
}

struct TestGraph {
    widgets: Vec<Arc<dyn HostObject>>,
}

impl ObjectGraph for TestGraph {
    fn top_level_widgets(&self) -> Vec<Arc<dyn HostObject>> {
        self.widgets.clone()
    }
    fn top_level_windows(&self) -> Vec<Arc<dyn HostObject>> {
        Vec::new()
    }
}

struct StillInput;

impl InputDriver for StillInput {
    fn sample(&self) -> Result<InputSample> {
        Ok(InputSample { x: 320, y: 240, ..InputSample::default() })
    }
    fn key_symbol(&self, keycode: u32, _shifted: bool) -> Option<String> {
        Some(format!("k{keycode}"))
    }
    fn move_pointer(&self, _dx: i32, _dy: i32) -> Result<()> {
        Ok(())
    }
    fn press_button(&self, _button: u8, _pressed: bool) -> Result<()> {
        Ok(())
    }
    fn press_key(&self, _key: &str, _pressed: bool) -> Result<()> {
        Ok(())
    }
}

struct NoScreen;

impl ScreenCapture for NoScreen {
    fn capture_to(&self, _path: &Path) -> Result<()> {
        Err(anyhow!("no display in tests"))
    }
}

#[derive(Default)]
struct TestControl {
    quit_requested: AtomicBool,
}

impl HostControl for TestControl {
    fn is_ready(&self) -> bool {
        true
    }
    fn request_quit(&self) {
        self.quit_requested.store(true, Ordering::SeqCst);
    }
}

fn test_host() -> (Host, Arc<TestControl>) {
    let label = TestObject::new("Label", "status", &[("text", json!("ready"))], Vec::new());
    let window = TestObject::new(
        "MainWindow",
        "main",
        &[("title", json!("app"))],
        vec![label],
    );
    let control = Arc::new(TestControl::default());
    let host = Host {
        graph: Arc::new(TestGraph { widgets: vec![window] }),
        input: Arc::new(StillInput),
        screen: Arc::new(NoScreen),
        values: Arc::new(JsonValueCodec),
        control: control.clone(),
    };
    (host, control)
}

/// Start a server on an ephemeral port and return a connected client.
async fn start_session() -> (TcpStream, Arc<TestControl>, tokio::task::JoinHandle<()>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let (host, control) = test_host();
    let server = Server::bind(0).await.unwrap();
    let addr = server.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let _ = server.run(Engine::new(host)).await;
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    (stream, control, handle)
}

/// Send one request and read back its response.
async fn round_trip(stream: &mut TcpStream, request: Request) -> Response {
    stream
        .write_all(&stagehand::slip::encode(&request.encode()))
        .await
        .unwrap();

    let mut slip = stagehand::slip::SlipReassembler::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "server closed before responding");
        slip.feed(&buf[..n]);
        if let Some(packet) = slip.next_packet() {
            return Response::decode(&packet).unwrap();
        }
    }
}

#[tokio::test]
async fn test_fetch_tree_and_objects_over_the_wire() {
    let (mut stream, _control, handle) = start_session().await;

    let tree = round_trip(&mut stream, Request::FetchObjectTree).await;
    assert_eq!(tree.error, ErrorCode::NoError);
    assert_eq!(tree.objects.len(), 2);
    assert_eq!(tree.objects[0].name, "main");
    assert_eq!(tree.objects[1].parent, tree.objects[0].id);

    for entry in &tree.objects {
        let response = round_trip(&mut stream, Request::FetchObject { id: entry.id }).await;
        assert_eq!(response.error, ErrorCode::NoError);
        assert_eq!(response.properties.len(), 1);
    }

    handle.abort();
}

#[tokio::test]
async fn test_unknown_opcode_keeps_connection_open() {
    let (mut stream, _control, handle) = start_session().await;

    // Raw garbage opcode, hand-framed.
    stream
        .write_all(&stagehand::slip::encode(&[0x7F]))
        .await
        .unwrap();

    let mut slip = stagehand::slip::SlipReassembler::new();
    let mut buf = [0u8; 4096];
    let response = loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0);
        slip.feed(&buf[..n]);
        if let Some(packet) = slip.next_packet() {
            break Response::decode(&packet).unwrap();
        }
    };
    assert_eq!(response.error, ErrorCode::InvalidRequest);

    // The session is still usable afterwards.
    let tree = round_trip(&mut stream, Request::FetchObjectTree).await;
    assert_eq!(tree.error, ErrorCode::NoError);

    handle.abort();
}

#[tokio::test]
async fn test_write_property_visible_in_next_fetch() {
    let (mut stream, _control, handle) = start_session().await;

    let tree = round_trip(&mut stream, Request::FetchObjectTree).await;
    let id = tree.objects[0].id;

    let written = round_trip(
        &mut stream,
        Request::WriteProperty {
            id,
            property: Property {
                name: "title".into(),
                writable: true,
                value: br#""retitled""#.to_vec(),
            },
        },
    )
    .await;
    assert_eq!(written.error, ErrorCode::NoError);

    let fetched = round_trip(&mut stream, Request::FetchObject { id }).await;
    let title = fetched.properties.iter().find(|p| p.name == "title").unwrap();
    assert_eq!(title.value, br#""retitled""#.to_vec());

    handle.abort();
}

#[tokio::test]
async fn test_recording_round_trip_yields_baseline_event() {
    let (mut stream, _control, handle) = start_session().await;

    let started = round_trip(&mut stream, Request::RecordUser { start: true }).await;
    assert_eq!(started.error, ErrorCode::NoError);

    // Let a few sampling ticks pass; the mock input never changes.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let stopped = round_trip(&mut stream, Request::RecordUser { start: false }).await;
    assert_eq!(stopped.error, ErrorCode::NoError);
    assert_eq!(
        stopped.events,
        vec![UserEvent::MouseMoveAbs { instant: 0, x: 320, y: 240 }]
    );

    handle.abort();
}

#[tokio::test]
async fn test_simulate_user_over_the_wire() {
    let (mut stream, _control, handle) = start_session().await;

    let response = round_trip(
        &mut stream,
        Request::SimulateUser {
            event: UserEvent::Keyboard { instant: 0, key: "Return".into(), pressed: true },
        },
    )
    .await;
    assert_eq!(response.error, ErrorCode::NoError);

    handle.abort();
}

#[tokio::test]
async fn test_screenshot_failure_is_reported_not_fatal() {
    let (mut stream, _control, handle) = start_session().await;

    let response = round_trip(&mut stream, Request::TakeScreenshot).await;
    assert_eq!(response.error, ErrorCode::AutomationError);
    assert!(response.image.is_empty());

    // Session survives the failure.
    let tree = round_trip(&mut stream, Request::FetchObjectTree).await;
    assert_eq!(tree.error, ErrorCode::NoError);

    handle.abort();
}

#[tokio::test]
async fn test_terminate_host_flushes_response_then_quits() {
    let (mut stream, control, handle) = start_session().await;

    let response = round_trip(&mut stream, Request::TerminateHost).await;
    assert_eq!(response.error, ErrorCode::NoError);

    // The server loop resolves and the quit hook fires.
    handle.await.unwrap();
    assert!(control.quit_requested.load(Ordering::SeqCst));
}
