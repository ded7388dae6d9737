//! External IndicLID helper process.
//!
//! The helper reads one JSON request on stdin and writes one JSON response
//! on stdout:
//!
//! ```text
//! request:  {"lines": ["tum hi ho", "...", ...]}
//! response: {"results": [{"lang": "hin_Latn", "score": 0.93, "model": "IndicLID-BERT"}, ...]}
//! ```
//!
//! A result may carry a full `scores` map (`{"hin_Latn": 0.9, "tam_Latn":
//! 0.1}`) instead of a single `lang`/`score` pair. `IndicLID-BERT` reports
//! raw logits, which are passed through a sigmoid; other models already
//! report probabilities.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::adapters::{LanguageScorer, LineScores};
use crate::error::{AdapterError, AdapterResult};

/// Model name whose scores are raw logits.
const LOGIT_MODEL: &str = "IndicLID-BERT";

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    lines: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    results: Vec<LineResult>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LineResult {
    Single {
        lang: String,
        score: f64,
        #[serde(default)]
        model: Option<String>,
    },
    Multi {
        scores: LineScores,
        #[serde(default)]
        model: Option<String>,
    },
}

impl LineResult {
    fn into_scores(self) -> LineScores {
        let (mut scores, model) = match self {
            Self::Single { lang, score, model } => (LineScores::from([(lang, score)]), model),
            Self::Multi { scores, model } => (scores, model),
        };
        let is_logit = model.as_deref() == Some(LOGIT_MODEL);
        for value in scores.values_mut() {
            if is_logit {
                *value = sigmoid(*value);
            }
            *value = value.clamp(0.0, 1.0);
        }
        scores
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Runs a configured helper command once per batch of lines.
#[derive(Debug, Clone)]
pub struct CommandScorer {
    program: PathBuf,
    args: Vec<String>,
    model_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandScorer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            model_dir: None,
            timeout,
        }
    }

    /// Pass `--model-dir <dir>` to the helper.
    #[must_use]
    pub fn with_model_dir(mut self, model_dir: Option<PathBuf>) -> Self {
        self.model_dir = model_dir;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.model_dir {
            cmd.arg("--model-dir").arg(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn invoke(&self, lines: &[String]) -> AdapterResult<Vec<u8>> {
        let payload = serde_json::to_vec(&ScoreRequest { lines })
            .map_err(|e| AdapterError::scorer(format!("failed to encode request: {e}")))?;

        // The child is killed on drop, so a timeout also ends the helper.
        tokio::time::timeout(self.timeout, self.exchange(&payload))
            .await
            .map_err(|_| AdapterError::scorer(format!("helper timed out after {:?}", self.timeout)))?
    }

    /// Spawn the helper, send `payload` and collect its stdout.
    async fn exchange(&self, payload: &[u8]) -> AdapterResult<Vec<u8>> {
        let mut child = self.command().spawn().map_err(|e| {
            AdapterError::scorer(format!(
                "failed to start {}: {e}",
                self.program.display()
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AdapterError::scorer("helper stdin unavailable"))?;
        stdin
            .write_all(payload)
            .await
            .map_err(|e| AdapterError::scorer(format!("failed to write request: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AdapterError::scorer(format!("failed to read helper output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::scorer(format!(
                "helper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// Decode a helper response for `expected` input lines.
fn parse_response(stdout: &[u8], expected: usize) -> AdapterResult<Vec<LineScores>> {
    let response: ScoreResponse = serde_json::from_slice(stdout)
        .map_err(|e| AdapterError::scorer(format!("invalid helper output: {e}")))?;
    if response.results.len() != expected {
        return Err(AdapterError::scorer(format!(
            "helper returned {} results for {expected} lines",
            response.results.len()
        )));
    }
    Ok(response
        .results
        .into_iter()
        .map(LineResult::into_scores)
        .collect())
}

#[async_trait]
impl LanguageScorer for CommandScorer {
    async fn score_lines(&self, lines: &[String]) -> AdapterResult<Vec<LineScores>> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("Scoring {} line(s) with {}", lines.len(), self.program.display());
        let stdout = self.invoke(lines).await?;
        parse_response(&stdout, lines.len())
    }
}
