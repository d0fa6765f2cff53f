//! Shared helpers for integration tests: an in-process device server on a local
//! TCP port, driven by a per-test handler.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const X: &str = "BL02:SAMPLE:X";
pub const Y: &str = "BL02:SAMPLE:Y";
pub const I0: &str = "BL02:DET:I0";
pub const IT: &str = "BL02:DET:IT";
pub const RING: &str = "BL02:RING:CURRENT";

/// What the server does with one request line.
#[derive(Debug, Clone)]
pub enum ServerReply {
    /// Send the line followed by `\n`.
    Line(String),
    /// Send these bytes verbatim.
    Raw(Vec<u8>),
    /// Send these bytes, then drop the connection.
    Hangup(Vec<u8>),
    /// Send nothing, keep the connection open.
    Silent,
    /// Drop the connection without answering.
    Close,
}

impl ServerReply {
    pub fn line(s: impl Into<String>) -> Self {
        ServerReply::Line(s.into())
    }
}

pub struct DeviceServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl DeviceServer {
    /// Listen on an ephemeral local port. Connections are served one after another.
    pub async fn start<F>(mut handler: F) -> Self
    where
        F: FnMut(&str) -> ServerReply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log.lock().push(line.clone());
                    let written = match handler(&line) {
                        ServerReply::Line(reply) => {
                            write.write_all(format!("{reply}\n").as_bytes()).await
                        }
                        ServerReply::Raw(bytes) => write.write_all(&bytes).await,
                        ServerReply::Hangup(bytes) => {
                            let _ = write.write_all(&bytes).await;
                            break;
                        }
                        ServerReply::Silent => Ok(()),
                        ServerReply::Close => break,
                    };
                    if written.is_err() {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            received,
            task,
        }
    }

    /// Serve the simulated beamline from [`beamline`].
    pub async fn beamline() -> Self {
        Self::start(beamline()).await
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Request lines received so far, without terminators.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }
}

impl Drop for DeviceServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A small beamline: two sample motors that report one `MOVING` poll after each move,
/// two ion chambers and the ring current.
pub fn beamline() -> impl FnMut(&str) -> ServerReply + Send + 'static {
    let mut pvs: HashMap<String, f64> = HashMap::from([
        (I0.to_string(), 1.0e6),
        (IT.to_string(), 5.0e5),
        (RING.to_string(), 350.5),
        ("BL02:SHUTTER:STATUS".to_string(), 0.0),
        ("BL02:SHUTTER:CMD".to_string(), 0.0),
    ]);
    let mut motors: HashMap<String, (f64, usize)> =
        HashMap::from([(X.to_string(), (0.0, 0)), (Y.to_string(), (0.0, 0))]);

    move |line: &str| {
        let (verb, args) = line.split_once(':').unwrap_or((line, ""));
        let reply = match verb {
            "GET" => {
                let motor = args.strip_suffix(".RBV").unwrap_or(args);
                match motors.get(motor).map(|m| m.0).or_else(|| pvs.get(args).copied()) {
                    Some(v) => format!("OK:{v}"),
                    None => "ERR:UNKNOWN_PV".to_string(),
                }
            }
            "PUT" => match args.rsplit_once(':').map(|(pv, v)| (pv, v.parse::<f64>())) {
                Some((pv, Ok(v))) if pvs.contains_key(pv) => {
                    pvs.insert(pv.to_string(), v);
                    if pv == "BL02:SHUTTER:CMD" {
                        pvs.insert("BL02:SHUTTER:STATUS".to_string(), v);
                    }
                    "OK:PUT".to_string()
                }
                Some((_, Err(_))) => "ERR:INVALID_VALUE".to_string(),
                _ => "ERR:UNKNOWN_PV".to_string(),
            },
            "MOVE" => match args.rsplit_once(':').map(|(m, p)| (m, p.parse::<f64>())) {
                Some((motor, Ok(p))) => match motors.get_mut(motor) {
                    Some(state) => {
                        *state = (p, 1);
                        "OK:MOVING".to_string()
                    }
                    None => "ERR:UNKNOWN_PV".to_string(),
                },
                _ => "ERR:INVALID_VALUE".to_string(),
            },
            "STATUS" => match motors.get_mut(args) {
                Some((_, pending)) if *pending > 0 => {
                    *pending -= 1;
                    "OK:MOVING".to_string()
                }
                Some(_) => "OK:IDLE".to_string(),
                None => "ERR:UNKNOWN_PV".to_string(),
            },
            "LIST" => {
                let prefix = args.trim_end_matches('*');
                let mut names: Vec<&String> = pvs
                    .keys()
                    .chain(motors.keys())
                    .filter(|n| n.starts_with(prefix))
                    .collect();
                names.sort();
                let names: Vec<&str> = names.into_iter().map(String::as_str).collect();
                format!("OK:{}", names.join(","))
            }
            "MONITOR" => "OK:MONITORING".to_string(),
            "STOP" => "OK:STOPPED".to_string(),
            "PING" => "OK:PONG".to_string(),
            "QUIT" => "OK:BYE".to_string(),
            _ => "ERR:UNKNOWN_COMMAND".to_string(),
        };
        ServerReply::Line(reply)
    }
}
