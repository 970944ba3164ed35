//! `smbclient` backend
//!
//! Share enumeration runs `smbclient -g -N -L //addr` once per host. A
//! session keeps one interactive `smbclient //addr/share -N` process alive
//! for the whole walk and feeds it `ls` commands on stdin. Each command is
//! followed by `pwd`, whose `Current directory is ...` reply marks the end of
//! that command's output.

use super::parse::{find_status, parse_listing, parse_share_list, DIRECTORY_MARKER};
use super::{ProtocolError, ProtocolErrorKind, RemoteEntry, ShareSession, ShareTransport};
use crate::config::SmbConfig;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Lines of stderr kept for error classification
const STDERR_TAIL: usize = 32;

#[derive(Debug, Clone)]
pub struct SmbClientTransport {
    binary: PathBuf,
    connect_timeout: Duration,
    list_timeout: Duration,
}

impl SmbClientTransport {
    pub fn new(config: &SmbConfig) -> Self {
        Self {
            binary: config.client_binary.clone(),
            connect_timeout: config.connect_timeout(),
            list_timeout: config.list_timeout(),
        }
    }

    fn spawn_error(&self, e: std::io::Error) -> ProtocolError {
        ProtocolError::other(format!("failed to run {}: {e}", self.binary.display()))
    }
}

#[async_trait]
impl ShareTransport for SmbClientTransport {
    async fn list_shares(&self, addr: IpAddr) -> Result<Vec<String>, ProtocolError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-g")
            .arg("-N")
            .arg("-L")
            .arg(format!("//{addr}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.connect_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(self.spawn_error(e)),
            Err(_) => return Err(ProtocolError::timeout(format!("listing shares on {addr}"))),
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        parse_share_list(&text, output.status.success())
    }

    async fn connect(&self, addr: IpAddr, share: &str) -> Result<Box<dyn ShareSession>, ProtocolError> {
        let label = format!("//{addr}/{share}");
        let mut child = Command::new(&self.binary)
            .arg(&label)
            .arg("-N")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let (Some(stdin), Some(stdout), Some(stderr)) = (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ProtocolError::other(format!("{label}: child pipes unavailable")));
        };

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL)));
        let tail = stderr_tail.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Ok(mut tail) = tail.lock() {
                    push_bounded(&mut tail, line);
                }
            }
        });

        let mut session = SmbClientSession {
            label,
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr_tail,
            stderr_task: Some(stderr_task),
            pending_markers: 0,
            list_timeout: self.list_timeout,
        };

        // Tree connect happens before the first prompt; a bare `pwd` surfaces it
        match session.roundtrip(None, self.connect_timeout).await {
            Ok(_) => Ok(Box::new(session)),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }
}

/// Keep only the last `STDERR_TAIL` lines
fn push_bounded(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == STDERR_TAIL {
        tail.pop_front();
    }
    tail.push_back(line);
}

pub struct SmbClientSession {
    label: String,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_task: Option<JoinHandle<()>>,
    /// Markers still owed by commands whose reply timed out
    pending_markers: usize,
    list_timeout: Duration,
}

impl SmbClientSession {
    /// Send `command` (if any) followed by `pwd` and collect the lines
    /// printed before the marker.
    async fn roundtrip(&mut self, command: Option<&str>, limit: Duration) -> Result<Vec<String>, ProtocolError> {
        let mut input = String::new();
        if let Some(command) = command {
            input.push_str(command);
            input.push('\n');
        }
        input.push_str("pwd\n");

        if let Err(e) = self.stdin.write_all(input.as_bytes()).await {
            return Err(self.exited_error(format!("write failed: {e}")).await);
        }
        if let Err(e) = self.stdin.flush().await {
            return Err(self.exited_error(format!("flush failed: {e}")).await);
        }
        self.pending_markers += 1;

        match tokio::time::timeout(limit, self.read_reply()).await {
            Ok(Ok(lines)) => Ok(lines),
            Ok(Err(lines)) => Err(self.exited_error(lines.join("\n")).await),
            Err(_) => Err(ProtocolError::timeout(format!("{}: no reply within {limit:?}", self.label))),
        }
    }

    /// Read up to the marker answering the latest command, skipping output
    /// owed to earlier timed-out commands. `Err` carries what was read
    /// before the process closed stdout.
    async fn read_reply(&mut self) -> Result<Vec<String>, Vec<String>> {
        let mut lines = Vec::new();
        loop {
            match self.stdout.next_line().await {
                Ok(Some(line)) => {
                    if line.contains(DIRECTORY_MARKER) {
                        self.pending_markers = self.pending_markers.saturating_sub(1);
                        if self.pending_markers == 0 {
                            return Ok(lines);
                        }
                        lines.clear();
                    } else {
                        lines.push(line);
                    }
                }
                Ok(None) | Err(_) => return Err(lines),
            }
        }
    }

    /// Classify a session that stopped answering, from its output and stderr.
    async fn exited_error(&mut self, stdout_text: String) -> ProtocolError {
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(CLOSE_GRACE, task).await;
        }
        let stderr_text = self
            .stderr_tail
            .lock()
            .map(|tail| tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();

        let combined = format!("{stdout_text}\n{stderr_text}");
        match find_status(&combined) {
            Some(status) => ProtocolError::new(
                ProtocolErrorKind::from_status(status),
                format!("{}: {status}", self.label),
            ),
            None => ProtocolError::other(format!("{}: smbclient exited", self.label)),
        }
    }
}

#[async_trait]
impl ShareSession for SmbClientSession {
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ProtocolError> {
        let command = format!("ls \"{path}*\"");
        let lines = self.roundtrip(Some(&command), self.list_timeout).await?;
        parse_listing(&lines)
    }

    async fn close(&mut self) {
        let _ = self.stdin.write_all(b"quit\n").await;
        let _ = self.stdin.flush().await;

        match tokio::time::timeout(CLOSE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(session = %self.label, %status, "Session closed"),
            Ok(Err(e)) => warn!(session = %self.label, error = %e, "Failed waiting for smbclient"),
            Err(_) => {
                debug!(session = %self.label, "smbclient ignored quit, killing");
                if let Err(e) = self.child.start_kill() {
                    warn!(session = %self.label, error = %e, "Failed to kill smbclient");
                }
            }
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}
