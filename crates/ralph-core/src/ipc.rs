//! Length-prefixed JSON framing for the subagent approval-proxy protocol
//! (spec.md §4.2, §6). A subagent's policy engine writes an
//! `ApprovalRequestFrame` on its `APPROVAL_REQUEST_FD`; the parent
//! process's supervisor reads it, runs the interactive prompt on its own
//! TTY, and writes back an `ApprovalResponseFrame` on the matching
//! `APPROVAL_RESPONSE_FD`. Frames are matched by `request_id`; an
//! unmatched response is dropped by the reader.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A pending approval request proxied from a subagent to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequestFrame {
    /// Monotonically increasing per-child id, used to match the reply.
    pub request_id: u32,
    /// The tool name being gated.
    pub tool_name: String,
    /// The call's JSON arguments, as text.
    pub arguments_json: String,
    /// A short human-readable summary to show in the parent's prompt.
    pub display_summary: String,
}

/// The outcome of an approval decision, as it crosses the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// Approved for this call only.
    Allowed,
    /// Approved, and a session allowlist pattern was installed.
    AllowedAlways,
    /// Denied by the user.
    Denied,
    /// The user aborted (SIGINT) during the prompt.
    Aborted,
    /// The tool is currently rate-limited; no prompt was shown.
    RateLimited,
}

/// A parent's reply to one `ApprovalRequestFrame`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponseFrame {
    /// Echoes the originating request's id.
    pub request_id: u32,
    /// The decision.
    pub result: ApprovalOutcome,
    /// On `AllowedAlways`, the pattern that was installed, so the child
    /// can mirror it into its own in-memory allowlist for the rest of its
    /// run (the parent's allowlist is the durable copy).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pattern: Option<String>,
}

/// Framing/transport failure reading or writing an IPC frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying pipe returned an I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The frame's JSON body failed to (de)serialize.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The peer closed its end of the pipe.
    #[error("pipe closed by peer")]
    Closed,
}

/// Writes one length-prefixed JSON frame: a 4-byte big-endian length
/// followed by that many bytes of UTF-8 JSON.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), FrameError> {
    let body = serde_json::to_vec(value)?;
    let len = u32::try_from(body.len()).unwrap_or(u32::MAX);
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Reads one length-prefixed JSON frame. Returns `FrameError::Closed` on a
/// clean EOF at the length prefix (the peer closed its pipe between
/// frames, not mid-frame).
pub fn read_frame<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> Result<T, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(FrameError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_request_frame() {
        let req = ApprovalRequestFrame {
            request_id: 7,
            tool_name: "shell".into(),
            arguments_json: "{\"cmd\":\"ls\"}".into(),
            display_summary: "run: ls".into(),
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, &req).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded: ApprovalRequestFrame = read_frame(&mut cursor).unwrap();
        assert_eq!(decoded.request_id, 7);
        assert_eq!(decoded.tool_name, "shell");
    }

    #[test]
    fn closed_pipe_reports_closed_not_io_error() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = read_frame::<_, ApprovalRequestFrame>(&mut cursor).unwrap_err();
        assert!(matches!(err, FrameError::Closed));
    }
}
