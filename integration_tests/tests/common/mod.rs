use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use life_proto::{decode_message, ServerMessage};
use life_sim::{GameConfig, LifeServer, ServerMetrics, SessionSettings, SharedWorld, World};

/// Small, fast-ticking configuration for socket tests.
pub fn test_config() -> GameConfig {
    GameConfig {
        rows: 12,
        cols: 16,
        speed: 0.05,
        max_viewport_cells: 100,
        initial_viewport_timeout: 2.0,
        seed: Some(17),
        ..GameConfig::default()
    }
}

/// Start a server on an ephemeral port and return its address.
pub fn spawn_server(config: &GameConfig, world: World) -> (SocketAddr, Arc<ServerMetrics>) {
    let metrics = Arc::new(ServerMetrics::default());
    let server = LifeServer::bind(
        "127.0.0.1:0".parse().expect("loopback addr"),
        SharedWorld::new(world),
        SessionSettings::from_config(config),
        Arc::clone(&metrics),
    )
    .expect("bind test server");
    let addr = server.local_addr().expect("local addr");
    server.spawn().expect("spawn accept thread");
    (addr, metrics)
}

pub struct LineClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl LineClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect to test server");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");
        let writer = stream.try_clone().expect("clone stream");
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    pub fn send_raw(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .expect("write frame");
    }

    pub fn send_json(&mut self, value: &serde_json::Value) {
        self.send_raw(&value.to_string());
    }

    /// Next server message, or `None` once the server closed the connection.
    pub fn recv(&mut self) -> Option<ServerMessage> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(decode_message(line.trim()).expect("server frame is a message")),
            Err(err) => panic!("read failed: {err}"),
        }
    }

    pub fn expect(&mut self) -> ServerMessage {
        self.recv().expect("server closed connection")
    }
}
