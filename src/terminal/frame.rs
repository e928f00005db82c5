use serde::{Deserialize, Serialize};

/// Frame received from the daemon's terminal stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Raw terminal output bytes
    Output(Vec<u8>),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum JsonServerFrame {
    Output { data: String },
}

impl ServerFrame {
    /// Decode a text frame. JSON `{"type":"output","data":...}` envelopes are
    /// unwrapped; anything else is raw output.
    pub fn from_text(text: &str) -> Self {
        if text.starts_with('{') {
            if let Ok(JsonServerFrame::Output { data }) = serde_json::from_str(text) {
                return ServerFrame::Output(data.into_bytes());
            }
        }
        ServerFrame::Output(text.as_bytes().to_vec())
    }

    pub fn output(data: impl Into<Vec<u8>>) -> Self {
        ServerFrame::Output(data.into())
    }
}

/// Frame sent upstream to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ClientFrame {
    Input(String),
    Resize { cols: u16, rows: u16 },
}
