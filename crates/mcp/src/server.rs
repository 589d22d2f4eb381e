use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::dispatcher::{Dispatcher, Outgoing, RequestGate};
use crate::error::McpError;
use crate::parser::{parse_bytes, MAX_MESSAGE_SIZE};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::registry::Registry;

/// Received lines longer than this are shortened before being logged.
const LOG_LINE_LIMIT: usize = 200;

/// Methods every client may call without presenting a token.
const HOUSEKEEPING_METHODS: &[&str] = &[
    "initialize",
    "initialized",
    "notifications/initialized",
    "ping",
];

/// Async MCP server that reads JSON-RPC from an input stream, dispatches
/// through a shared [`Dispatcher`], and writes responses to an output stream.
///
/// Each message is dispatched on its own task, so a slow handler does not
/// hold up later requests; responses are written in completion order, one
/// JSON line each. In production the streams are stdin and stdout; in tests
/// they are `tokio::io::DuplexStream`s.
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    max_message_size: usize,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Run the server loop.
    ///
    /// Terminates once `input` reaches EOF and every in-flight request has
    /// been answered. Only I/O failures on the streams themselves end the
    /// loop early; malformed or oversized lines are answered and skipped.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut frames = FrameReader::new(input, self.max_message_size);
        let (sender, mut receiver) = mpsc::unbounded_channel::<Outgoing>();

        loop {
            tokio::select! {
                frame = frames.next_frame() => {
                    let bytes = match frame? {
                        None => break, // EOF
                        Some(Frame::Line(bytes)) => bytes,
                        Some(Frame::Oversized(actual_size)) => {
                            let error = McpError::OversizedMessage {
                                max_size: self.max_message_size,
                                actual_size,
                            };
                            warn!("rejecting message: {error}");
                            let response =
                                JsonRpcResponse::error(Value::Null, error.to_jsonrpc_error());
                            write_jsonl(&mut output, &response).await?;
                            continue;
                        }
                    };
                    if bytes.trim_ascii().is_empty() {
                        continue;
                    }
                    debug!(
                        "received: {}",
                        truncate_for_log(&String::from_utf8_lossy(&bytes), LOG_LINE_LIMIT)
                    );

                    match parse_bytes(&bytes, self.max_message_size) {
                        Ok(incoming) => {
                            let dispatcher = Arc::clone(&self.dispatcher);
                            let sender = sender.clone();
                            tokio::spawn(async move {
                                if let Some(outgoing) = dispatcher.handle_incoming(incoming).await {
                                    let _ = sender.send(outgoing);
                                }
                            });
                        }
                        Err(error) => {
                            warn!("rejecting message: {error}");
                            let response =
                                JsonRpcResponse::error(Value::Null, error.to_jsonrpc_error());
                            write_jsonl(&mut output, &response).await?;
                        }
                    }
                }

                Some(outgoing) = receiver.recv() => {
                    write_jsonl(&mut output, &outgoing).await?;
                }
            }
        }

        drop(sender);
        while let Some(outgoing) = receiver.recv().await {
            write_jsonl(&mut output, &outgoing).await?;
        }
        Ok(())
    }
}

/// One newline-terminated message read from the input stream.
#[derive(Debug, PartialEq)]
enum Frame {
    Line(Vec<u8>),
    /// A line longer than the limit; only its length was kept.
    Oversized(usize),
}

/// Splits a byte stream into newline-terminated frames without holding more
/// than `limit` bytes of any one line.
///
/// A partially read line lives in the reader, not in the `next_frame`
/// future, so the future can be dropped by `select!` without losing input.
struct FrameReader<R> {
    inner: BufReader<R>,
    limit: usize,
    pending: Vec<u8>,
    length: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    fn new(input: R, limit: usize) -> Self {
        Self {
            inner: BufReader::new(input),
            limit,
            pending: Vec::new(),
            length: 0,
        }
    }

    /// The next frame, or `None` at EOF. A final line without a trailing
    /// newline is still returned.
    async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if self.length == 0 {
                    return Ok(None);
                }
                return Ok(Some(self.take_frame()));
            }

            let newline = available.iter().position(|&byte| byte == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];
            self.length += chunk.len();
            if self.length <= self.limit {
                self.pending.extend_from_slice(chunk);
            } else {
                self.pending.clear();
            }
            let used = chunk.len() + usize::from(newline.is_some());
            self.inner.consume(used);

            if newline.is_some() {
                return Ok(Some(self.take_frame()));
            }
        }
    }

    fn take_frame(&mut self) -> Frame {
        let length = std::mem::take(&mut self.length);
        let bytes = std::mem::take(&mut self.pending);
        if length > self.limit {
            Frame::Oversized(length)
        } else {
            Frame::Line(bytes)
        }
    }
}

/// Shared-token authentication read from `params._meta.authToken`.
///
/// Housekeeping methods and invocations of operations registered as public
/// are admitted without a token.
pub struct TokenGate {
    token: String,
}

impl TokenGate {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for TokenGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGate").finish_non_exhaustive()
    }
}

impl RequestGate for TokenGate {
    fn admit(&self, request: &JsonRpcRequest, registry: &Registry) -> Result<(), McpError> {
        if HOUSEKEEPING_METHODS.contains(&request.method.as_str())
            || registry.is_public_request(request)
        {
            return Ok(());
        }

        let presented = request
            .meta()
            .and_then(|meta| meta.get("authToken"))
            .and_then(Value::as_str);
        match presented {
            Some(token) if token == self.token => Ok(()),
            Some(_) => Err(McpError::Unauthorized {
                message: "Invalid auth token".to_string(),
                data: None,
            }),
            None => Err(McpError::Unauthorized {
                message: "Missing auth token".to_string(),
                data: None,
            }),
        }
    }
}

/// Write a serializable value as a single JSON line.
async fn write_jsonl<W: AsyncWrite + Unpin, T: serde::Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), McpError> {
    let mut json = serde_json::to_vec(value).map_err(|e| McpError::Io {
        source: std::io::Error::other(e),
    })?;
    json.push(b'\n');
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

/// Cut `line` to at most `limit` bytes without splitting a character.
fn truncate_for_log(line: &str, limit: usize) -> &str {
    if line.len() <= limit {
        return line;
    }
    let mut end = limit;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
