//! In-memory duplex transport for driving an [`McpServer`] end to end.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use switchboard_mcp::{Dispatcher, McpError, McpServer};

use crate::fixtures::{notification_line, request_line};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct McpTestHarness {
    input_writer: Option<DuplexStream>,
    output_reader: BufReader<DuplexStream>,
    server_handle: tokio::task::JoinHandle<Result<(), McpError>>,
}

impl McpTestHarness {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::with_server(McpServer::new(Arc::new(dispatcher)))
    }

    pub fn with_server(server: McpServer) -> Self {
        let (input_writer, input_reader) = tokio::io::duplex(64 * 1024);
        let (output_writer, output_reader) = tokio::io::duplex(64 * 1024);

        let server_handle =
            tokio::spawn(async move { server.run(input_reader, output_writer).await });

        Self {
            input_writer: Some(input_writer),
            output_reader: BufReader::new(output_reader),
            server_handle,
        }
    }

    pub async fn send_line(&mut self, line: &str) {
        self.send_bytes(format!("{line}\n").as_bytes()).await;
    }

    /// Write raw bytes to the server input; no newline is appended.
    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        let writer = self
            .input_writer
            .as_mut()
            .expect("server input already closed");
        writer
            .write_all(bytes)
            .await
            .expect("failed to write to server input");
        writer.flush().await.expect("failed to flush server input");
    }

    pub async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(RESPONSE_TIMEOUT, self.output_reader.read_line(&mut line))
            .await
            .expect("timeout reading server output")
            .expect("I/O error reading server output");
        line.trim_end().to_string()
    }

    pub async fn recv_json(&mut self) -> Value {
        let line = self.recv_line().await;
        serde_json::from_str(&line).expect("response is not valid JSON")
    }

    /// Send a request and read back its response.
    pub async fn send_request(
        &mut self,
        id: impl Into<Value>,
        method: &str,
        params: Value,
    ) -> Value {
        self.send_line(&request_line(id, method, params)).await;
        self.recv_json().await
    }

    pub async fn send_notification(&mut self, method: &str, params: Value) {
        self.send_line(&notification_line(method, params)).await;
    }

    /// Close the server's input and collect everything it writes until it
    /// exits.
    pub async fn finish(mut self) -> Vec<Value> {
        drop(self.input_writer.take());
        let mut responses = Vec::new();
        loop {
            let mut line = String::new();
            let read =
                tokio::time::timeout(RESPONSE_TIMEOUT, self.output_reader.read_line(&mut line))
                    .await
                .expect("timeout draining server output")
                .expect("I/O error reading server output");
            if read == 0 {
                break;
            }
            let response =
                serde_json::from_str(line.trim_end()).expect("response is not valid JSON");
            responses.push(response);
        }
        self.server_handle
            .await
            .expect("server task panicked")
            .expect("server returned an error");
        responses
    }
}
