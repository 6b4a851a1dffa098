//! Scripted in-process server for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// What the server does after reading one request line.
pub enum Reply {
    /// Send this line plus `\n`.
    Line(&'static str),
    /// Send the first part, pause, then the second part (sent verbatim).
    Split(&'static str, &'static str),
    /// Never answer; keep reading until the client hangs up.
    Hold,
    /// Close the connection without answering.
    Close,
}

/// Server accepting exactly one connection and answering per `replies`.
pub struct ScriptedServer {
    pub port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl ScriptedServer {
    pub async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let mut received = Vec::new();

            for reply in replies {
                match lines.next_line().await {
                    Ok(Some(line)) => received.push(line),
                    _ => return received,
                }

                match reply {
                    Reply::Line(line) => {
                        let _ = write_half.write_all(format!("{}\n", line).as_bytes()).await;
                    }
                    Reply::Split(first, second) => {
                        let _ = write_half.write_all(first.as_bytes()).await;
                        let _ = write_half.flush().await;
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        let _ = write_half.write_all(second.as_bytes()).await;
                    }
                    Reply::Hold => break,
                    Reply::Close => return received,
                }
            }

            // Record anything else the client sends until it hangs up.
            while let Ok(Some(line)) = lines.next_line().await {
                received.push(line);
            }
            received
        });

        Self { port, handle }
    }

    /// Wait for the client to hang up and return every line it sent.
    pub async fn received(self) -> Vec<String> {
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("client never closed the connection")
            .unwrap()
    }
}

/// A local port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
