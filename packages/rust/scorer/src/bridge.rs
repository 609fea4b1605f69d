//! Subprocess classifier speaking a JSON-lines protocol over stdin/stdout.
//!
//! Lets a locally hosted model (e.g. a Python zero-shot pipeline) score
//! documents without an HTTP server. Protocol:
//!
//! ```text
//! child  -> {"type":"ready"}
//! parent -> {"type":"classify","id":"req-1","text":"...","labels":["a","b"]}
//! child  -> {"type":"result","id":"req-1","scores":{"a":0.8,"b":0.1}}
//!         | {"type":"error","id":"req-1","error":"..."}
//! parent -> {"type":"shutdown"}
//! ```

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use paperfilter_shared::{ClassifierConfig, PaperFilterError, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{Classifier, ScoreResult};

/// Request message sent to the bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestMessage<'a> {
    Classify {
        id: String,
        text: &'a str,
        labels: &'a [String],
    },
    Shutdown,
}

/// Response message received from the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseMessage {
    Ready,
    Result {
        id: String,
        scores: HashMap<String, f64>,
    },
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
    },
}

/// Live bridge process and its pipes.
struct BridgeHandle {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    request_counter: u64,
}

/// Classifier backed by a long-lived subprocess.
///
/// Requests are serialized: one classification is in flight at a time.
pub struct BridgeClassifier {
    handle: Mutex<Option<BridgeHandle>>,
    timeout: Duration,
}

impl BridgeClassifier {
    /// Spawn `bridge_cmd bridge_args...` and wait for its ready message.
    pub async fn spawn(config: &ClassifierConfig) -> Result<Self> {
        info!(cmd = %config.bridge_cmd, args = ?config.bridge_args, "spawning classifier bridge");

        let mut child = Command::new(&config.bridge_cmd)
            .args(&config.bridge_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Bridge logs go to parent stderr
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PaperFilterError::scoring(format!(
                    "failed to spawn bridge: {e}. Is `{}` installed?",
                    config.bridge_cmd
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PaperFilterError::scoring("failed to capture bridge stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PaperFilterError::scoring("failed to capture bridge stdout"))?;

        let mut handle = BridgeHandle {
            child,
            stdin,
            reader: BufReader::new(stdout),
            request_counter: 0,
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        match tokio::time::timeout(timeout, handle.read_message()).await {
            Ok(Ok(ResponseMessage::Ready)) => info!("classifier bridge is ready"),
            Ok(Ok(other)) => {
                return Err(PaperFilterError::scoring(format!(
                    "expected ready message, got: {other:?}"
                )));
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(PaperFilterError::scoring(format!(
                    "bridge did not become ready within {}s",
                    timeout.as_secs()
                )));
            }
        }

        Ok(Self {
            handle: Mutex::new(Some(handle)),
            timeout,
        })
    }
}

impl BridgeHandle {
    async fn read_message(&mut self) -> Result<ResponseMessage> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| PaperFilterError::scoring(format!("bridge read error: {e}")))?;

        if read == 0 {
            return Err(PaperFilterError::scoring("bridge closed stdout unexpectedly"));
        }

        serde_json::from_str(line.trim()).map_err(|e| {
            let snippet: String = line.chars().take(200).collect();
            PaperFilterError::scoring(format!("invalid bridge message: {e} (got: {snippet})"))
        })
    }

    async fn write_message(&mut self, message: &RequestMessage<'_>) -> Result<()> {
        let mut json = serde_json::to_string(message)
            .map_err(|e| PaperFilterError::scoring(format!("failed to serialize request: {e}")))?;
        json.push('\n');

        self.stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| PaperFilterError::scoring(format!("failed to write to bridge stdin: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| PaperFilterError::scoring(format!("failed to flush bridge stdin: {e}")))
    }

    async fn classify(&mut self, text: &str, labels: &[String]) -> Result<ScoreResult> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);

        self.write_message(&RequestMessage::Classify {
            id: id.clone(),
            text,
            labels,
        })
        .await?;

        match self.read_message().await? {
            ResponseMessage::Result {
                id: resp_id,
                scores,
            } => {
                if resp_id != id {
                    return Err(PaperFilterError::scoring(format!(
                        "bridge answered {resp_id}, expected {id}"
                    )));
                }
                // Report in label order; labels the bridge skipped are absent.
                Ok(ScoreResult::new(
                    labels
                        .iter()
                        .filter_map(|l| scores.get(l).map(|s| (l.clone(), *s)))
                        .collect(),
                ))
            }
            ResponseMessage::Error { id: _, error } => Err(PaperFilterError::scoring(error)),
            ResponseMessage::Ready => Err(PaperFilterError::scoring(
                "unexpected ready message during classification",
            )),
        }
    }
}

#[async_trait]
impl Classifier for BridgeClassifier {
    async fn classify(&self, text: &str, labels: &[String]) -> Result<ScoreResult> {
        let mut guard = self.handle.lock().await;
        let handle = guard
            .as_mut()
            .ok_or_else(|| PaperFilterError::scoring("bridge has been shut down"))?;

        match tokio::time::timeout(self.timeout, handle.classify(text, labels)).await {
            Ok(result) => result,
            Err(_) => {
                // The pipe is now out of sync with the request counter; retire the process.
                warn!(timeout_secs = self.timeout.as_secs(), "bridge timed out, stopping it");
                *guard = None;
                Err(PaperFilterError::scoring(format!(
                    "bridge did not answer within {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    fn name(&self) -> &'static str {
        "bridge"
    }

    async fn shutdown(&self) {
        let Some(mut handle) = self.handle.lock().await.take() else {
            return;
        };

        let _ = handle.write_message(&RequestMessage::Shutdown).await;
        drop(handle.stdin);

        match tokio::time::timeout(Duration::from_secs(5), handle.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "bridge exited"),
            Ok(Err(e)) => warn!("bridge wait error: {e}"),
            Err(_) => {
                warn!("bridge did not exit after shutdown, killing it");
                let _ = handle.child.kill().await;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn config_for(script: &str) -> ClassifierConfig {
        ClassifierConfig {
            bridge_cmd: "sh".into(),
            bridge_args: vec!["-c".into(), script.into()],
            timeout_secs: 5,
            ..ClassifierConfig::default()
        }
    }

    const ECHO_BRIDGE: &str = r#"
echo '{"type":"ready"}'
while IFS= read -r line; do
  case "$line" in
    *'"type":"shutdown"'*) exit 0 ;;
  esac
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  echo "{\"type\":\"result\",\"id\":\"$id\",\"scores\":{\"finance\":0.2,\"llm\":0.7}}"
done
"#;

    fn labels() -> Vec<String> {
        vec!["finance".into(), "llm".into()]
    }

    #[tokio::test]
    async fn classifies_over_json_lines() {
        let bridge = BridgeClassifier::spawn(&config_for(ECHO_BRIDGE)).await.unwrap();

        let first = bridge.classify("LLMs in finance", &labels()).await.unwrap();
        assert_eq!(first.iter().collect::<Vec<_>>(), [("finance", 0.2), ("llm", 0.7)]);

        let second = bridge.classify("again", &labels()).await.unwrap();
        assert_eq!(second.max(), Some(0.7));

        bridge.shutdown().await;
        assert!(bridge.classify("after shutdown", &labels()).await.is_err());
    }

    #[tokio::test]
    async fn error_message_is_scoring_unavailable() {
        let script = r#"
echo '{"type":"ready"}'
read -r line
echo '{"type":"error","id":"req-1","error":"model crashed"}'
"#;
        let bridge = BridgeClassifier::spawn(&config_for(script)).await.unwrap();
        let err = bridge.classify("text", &labels()).await.unwrap_err();
        assert!(matches!(err, PaperFilterError::ScoringUnavailable(_)));
        assert!(err.to_string().contains("model crashed"));
    }

    #[tokio::test]
    async fn bridge_without_ready_fails_to_spawn() {
        let err = BridgeClassifier::spawn(&config_for("exit 0")).await.err().unwrap();
        assert!(err.to_string().contains("closed stdout"));
    }

    #[tokio::test]
    async fn missing_command_fails_to_spawn() {
        let config = ClassifierConfig {
            bridge_cmd: "paperfilter-no-such-bridge-binary".into(),
            ..ClassifierConfig::default()
        };
        let err = BridgeClassifier::spawn(&config).await.err().unwrap();
        assert!(err.to_string().contains("failed to spawn bridge"));
    }
}
