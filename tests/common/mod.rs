#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub const STUDENT: &str = "id,name,age\n1,John,30\n2,Jane,25\n3,Bob,22\n4,Alice,24\n";
pub const ENROLLMENT: &str =
    "student_id,course\n1,Mathematics\n1,Physics\n2,Chemistry\n3,Mathematics\n5,Biology\n";

pub struct ServerGuard {
    child: Child,
    data_dir: tempfile::TempDir,
    stderr_thread: Option<thread::JoinHandle<()>>,
}

impl ServerGuard {
    pub fn data_dir(&self) -> &Path {
        self.data_dir.path()
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}

pub fn fixture_dir() -> anyhow::Result<tempfile::TempDir> {
    let data_dir = tempfile::tempdir()?;
    std::fs::write(data_dir.path().join("student.csv"), STUDENT)?;
    std::fs::write(data_dir.path().join("enrollment.csv"), ENROLLMENT)?;
    Ok(data_dir)
}

pub fn spawn_server() -> anyhow::Result<(ServerGuard, SocketAddr)> {
    let bin = env!("CARGO_BIN_EXE_csvql");
    let data_dir = fixture_dir()?;

    let mut child = Command::new(bin)
        .arg("--data")
        .arg(data_dir.path())
        .args(["serve", "--listen", "127.0.0.1:0"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("failed to capture server stderr"))?;

    let (addr_tx, addr_rx) = mpsc::channel::<SocketAddr>();
    let stderr_thread = thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        while reader
            .read_line(&mut line)
            .ok()
            .filter(|n| *n > 0)
            .is_some()
        {
            if let Some(rest) = line.strip_prefix("csvql listening on ") {
                if let Ok(addr) = rest.trim().parse::<SocketAddr>() {
                    let _ = addr_tx.send(addr);
                }
            }
            eprint!("{}", line);
            line.clear();
        }
    });

    let addr = match addr_rx.recv_timeout(Duration::from_secs(5)) {
        Ok(addr) => addr,
        Err(err) => {
            if let Some(status) = child.try_wait()? {
                anyhow::bail!("server exited before reporting listen address: {status} ({err})");
            }
            anyhow::bail!("timed out waiting for server listen address: {err}");
        }
    };

    Ok((
        ServerGuard {
            child,
            data_dir,
            stderr_thread: Some(stderr_thread),
        },
        addr,
    ))
}

/// Blocking line client for the query protocol.
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    /// Connects and returns the client with the first line the server sent.
    pub fn connect(addr: SocketAddr) -> anyhow::Result<(Self, String)> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        let writer = stream.try_clone()?;
        let mut client = Self {
            reader: BufReader::new(stream),
            writer,
        };
        let first = client.read_line()?;
        Ok((client, first))
    }

    pub fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn read_line(&mut self) -> anyhow::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            anyhow::bail!("server closed the connection");
        }
        Ok(line.trim_end_matches('\n').to_string())
    }

    /// Sends `<id>:<sql>` and splits the reply into id and body.
    pub fn query(&mut self, id: &str, sql: &str) -> anyhow::Result<(String, String)> {
        self.send(&format!("{id}:{sql}"))?;
        let line = self.read_line()?;
        let (reply_id, body) = line
            .split_once("<|>")
            .ok_or_else(|| anyhow::anyhow!("malformed response: {line}"))?;
        Ok((reply_id.to_string(), body.to_string()))
    }

    /// Runs a query that must succeed and parses its JSON body.
    pub fn json(&mut self, sql: &str) -> anyhow::Result<serde_json::Value> {
        let (_, body) = self.query("q", sql)?;
        if body.starts_with("Error: ") {
            anyhow::bail!("query failed: {body}");
        }
        Ok(serde_json::from_str(&body)?)
    }
}
