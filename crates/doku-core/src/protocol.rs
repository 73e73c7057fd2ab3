//! Line-delimited JSON protocol between a cleaner worker and its helper
//! child processes (`doku-worker validate` / `doku-worker write`).
//!
//! Every message is a single line; helpers never emit partial lines on
//! success. The protocol carries validation, batched deletions, and
//! batched score upserts; the `deleted` count in `Ack` is what the fatal
//! mismatch check compares against.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Request from a worker to a helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HelperRequest {
    /// Handshake; the helper loads its inputs and replies `Ready`.
    Init {
        /// Corpus file for the validate role.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        corpus: Option<PathBuf>,
        /// Store database for the write role.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        db: Option<PathBuf>,
    },
    /// Fillability check of one layout against the helper's corpus.
    Validate {
        rows: [String; 4],
        cols: [String; 4],
    },
    /// Bulk delete by fingerprint.
    Delete { hashes: Vec<String> },
    /// Bulk score update.
    UpsertScores { items: Vec<(String, f64)> },
    /// Flush and exit cleanly.
    Shutdown,
}

/// Reply from a helper to its worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HelperReply {
    Ready,
    Valid,
    Invalid,
    Ack {
        #[serde(default)]
        deleted: usize,
    },
    Error(String),
}

/// Serialize a message as one line and flush it.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let json = serde_json::to_string(message)?;
    debug_assert!(!json.contains('\n'));
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read one line and parse it; `Ok(None)` on a closed pipe.
pub fn read_message<R: BufRead, T: for<'de> Deserialize<'de>>(reader: &mut R) -> Result<Option<T>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let message = serde_json::from_str(line.trim_end())
        .map_err(|e| Error::Protocol(format!("bad message {:?}: {e}", line.trim_end())))?;
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_request(req: &HelperRequest) -> HelperRequest {
        let mut buf = Vec::new();
        write_message(&mut buf, req).unwrap();
        assert_eq!(buf.iter().filter(|&&b| b == b'\n').count(), 1);
        read_message(&mut buf.as_slice()).unwrap().unwrap()
    }

    #[test]
    fn test_request_roundtrips() {
        let reqs = [
            HelperRequest::Init {
                corpus: Some(PathBuf::from("/data/words.json")),
                db: None,
            },
            HelperRequest::Validate {
                rows: std::array::from_fn(|i| format!("R{i}")),
                cols: std::array::from_fn(|j| format!("C{j}")),
            },
            HelperRequest::Delete {
                hashes: vec!["abc".to_string(), "def".to_string()],
            },
            HelperRequest::UpsertScores {
                items: vec![("abc".to_string(), 4.5)],
            },
            HelperRequest::Shutdown,
        ];
        for req in reqs {
            assert_eq!(roundtrip_request(&req), req);
        }
    }

    #[test]
    fn test_reply_roundtrips() {
        let mut buf = Vec::new();
        write_message(&mut buf, &HelperReply::Ack { deleted: 37 }).unwrap();
        let got: HelperReply = read_message(&mut buf.as_slice()).unwrap().unwrap();
        assert_eq!(got, HelperReply::Ack { deleted: 37 });
    }

    #[test]
    fn test_ack_deleted_defaults_to_zero() {
        // Score-upsert acks omit the count.
        let got: HelperReply = serde_json::from_str(r#"{"Ack":{}}"#).unwrap();
        assert_eq!(got, HelperReply::Ack { deleted: 0 });
    }

    #[test]
    fn test_closed_pipe_is_none() {
        let empty: &[u8] = &[];
        let got: Option<HelperReply> = read_message(&mut &*empty).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        let junk: &[u8] = b"not json\n";
        let got: Result<Option<HelperReply>> = read_message(&mut &*junk);
        assert!(matches!(got, Err(Error::Protocol(_))));
    }
}
