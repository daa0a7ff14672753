//! Behavioural tests covering request handling over real sockets.

use std::cell::RefCell;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use crate::dispatch::Dispatcher;
use crate::server::{ProtocolServer, StopSummary};
use crate::tests::support::{RecordingHealthReporter, TestClient, WireResponse, test_config};

type StepResult = Result<(), String>;

struct ServerWorld {
    server: Option<ProtocolServer>,
    addr: Option<SocketAddr>,
    data_dir: TempDir,
    data_file: Option<PathBuf>,
    clients: Vec<TestClient>,
    summary: Option<StopSummary>,
}

impl ServerWorld {
    fn new() -> Self {
        Self {
            server: None,
            addr: None,
            data_dir: TempDir::new().expect("create data directory"),
            data_file: None,
            clients: Vec::new(),
            summary: None,
        }
    }

    fn start(&mut self) -> StepResult {
        let mut server = ProtocolServer::new(
            test_config(),
            Arc::new(Dispatcher::with_builtin_commands()),
            Arc::new(RecordingHealthReporter::default()),
        );
        let addr = server.initialize().map_err(|error| error.to_string())?;
        server.start().map_err(|error| error.to_string())?;
        self.addr = Some(addr);
        self.server = Some(server);
        Ok(())
    }

    fn connect(&mut self) -> StepResult {
        let addr = self.addr.ok_or("server has not been started")?;
        self.clients.push(TestClient::connect(addr));
        Ok(())
    }

    fn client(&mut self) -> Result<&mut TestClient, String> {
        self.clients
            .first_mut()
            .ok_or_else(|| String::from("no connected client"))
    }

    fn data_path(&self) -> Result<String, String> {
        self.data_file
            .as_ref()
            .map(|path| path.display().to_string())
            .ok_or_else(|| String::from("no data file written"))
    }
}

#[fixture]
fn world() -> RefCell<ServerWorld> {
    RefCell::new(ServerWorld::new())
}

#[given("a running command server")]
fn given_running_server(world: &RefCell<ServerWorld>) -> StepResult {
    world.borrow_mut().start()
}

#[given("a data file containing \"{content}\"")]
fn given_data_file(world: &RefCell<ServerWorld>, content: String) -> StepResult {
    let mut world = world.borrow_mut();
    let path = world.data_dir.path().join("payload.bin");
    fs::write(&path, content.as_bytes()).map_err(|error| error.to_string())?;
    world.data_file = Some(path);
    Ok(())
}

#[given("a connected client")]
fn given_connected_client(world: &RefCell<ServerWorld>) -> StepResult {
    world.borrow_mut().connect()
}

#[given("{count} clients that have each received a response")]
fn given_answered_clients(world: &RefCell<ServerWorld>, count: usize) -> StepResult {
    let mut world = world.borrow_mut();
    for _ in 0..count {
        world.connect()?;
    }
    // A reply proves the multiplexer owns the connection.
    for client in &mut world.clients {
        client.send_line("{}");
        if !matches!(client.read_response(), WireResponse::Error(_)) {
            return Err(String::from("expected an error for an empty request"));
        }
    }
    Ok(())
}

#[when("the client requests {length} bytes at offset \"{offset}\"")]
fn when_client_requests(
    world: &RefCell<ServerWorld>,
    length: usize,
    offset: String,
) -> StepResult {
    let mut world = world.borrow_mut();
    let path = world.data_path()?;
    world
        .client()?
        .request_binary(&path, &offset, &length.to_string());
    Ok(())
}

#[when("the client sends the line \"{line}\"")]
fn when_client_sends_line(world: &RefCell<ServerWorld>, line: String) -> StepResult {
    world.borrow_mut().client()?.send_line(&line);
    Ok(())
}

#[when("the client asks for the command \"{name}\"")]
fn when_client_asks_for_command(world: &RefCell<ServerWorld>, name: String) -> StepResult {
    let request = serde_json::json!({ "name": name, "args": [] });
    world.borrow_mut().client()?.send_line(&request.to_string());
    Ok(())
}

#[when("the client pipelines requests for offsets \"{first}\" and \"{second}\"")]
fn when_client_pipelines(
    world: &RefCell<ServerWorld>,
    first: String,
    second: String,
) -> StepResult {
    let mut world = world.borrow_mut();
    let path = world.data_path()?;
    let batch: String = [first, second]
        .iter()
        .map(|offset| {
            let request = serde_json::json!({
                "name": "getBinaryData",
                "args": [path, offset, "2"],
            });
            format!("{request}\n")
        })
        .collect();
    world.client()?.send_raw(batch.as_bytes());
    Ok(())
}

#[when("the server stops")]
fn when_server_stops(world: &RefCell<ServerWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let mut server = world.server.take().ok_or("server has not been started")?;
    let summary = server.stop().map_err(|error| error.to_string())?;
    world.summary = Some(summary);
    Ok(())
}

#[then("the client receives the bytes \"{expected}\"")]
fn then_client_receives_bytes(world: &RefCell<ServerWorld>, expected: String) -> StepResult {
    let response = world.borrow_mut().client()?.read_response();
    assert_eq!(response, WireResponse::Binary(expected.into_bytes()));
    Ok(())
}

#[then("the client receives an error mentioning \"{fragment}\"")]
fn then_client_receives_error(world: &RefCell<ServerWorld>, fragment: String) -> StepResult {
    match world.borrow_mut().client()?.read_response() {
        WireResponse::Error(message) => {
            assert!(
                message.contains(&fragment),
                "error '{message}' should mention '{fragment}'"
            );
            Ok(())
        }
        other => Err(format!("expected an error response, got {other:?}")),
    }
}

#[then("every client observes the connection closing")]
fn then_clients_closed(world: &RefCell<ServerWorld>) {
    for (index, client) in world.borrow_mut().clients.iter_mut().enumerate() {
        assert!(client.observes_close(), "client {index} should see EOF");
    }
}

#[then("the stop summary reports {count} closed connections")]
fn then_summary_reports(world: &RefCell<ServerWorld>, count: usize) {
    let summary = world.borrow().summary.expect("server should have stopped");
    assert_eq!(summary.closed_connections, count);
}

#[scenario(path = "tests/features/command_server.feature")]
fn command_server(#[from(world)] world: RefCell<ServerWorld>) {
    drop(world);
}
