use bytes::Bytes;
use serde::Serialize;

/// Greeting written to every stream as soon as it opens.
pub const CONNECTED_LOG: &str = "Connected to SSE stream";

/// One discrete event on a live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `log:<text>`, used for the connect greeting.
    Log(String),
    /// `data: <json>`, carrying one serialized payload.
    Data(String),
    /// SSE comment line, ignored by clients, keeps idle proxies from timing out.
    KeepAlive,
}

impl Frame {
    pub fn connected() -> Self {
        Self::Log(CONNECTED_LOG.to_string())
    }

    pub fn data<T: Serialize>(payload: &T) -> serde_json::Result<Self> {
        serde_json::to_string(payload).map(Self::Data)
    }

    /// Wire encoding, double-newline terminated. Compact JSON never contains a
    /// raw newline, so a data frame is always a single line.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Log(text) => Bytes::from(format!("log:{text}\n\n")),
            Self::Data(json) => Bytes::from(format!("data: {json}\n\n")),
            Self::KeepAlive => Bytes::from_static(b": keep-alive\n\n"),
        }
    }
}
