//! Scorer that runs an external program per invocation.
//!
//! The program is called as
//! `<program> <args...> --family <CODE> [--label <L>] [--ordinal <N>] <paths...>`
//! and must print `{"score": x}` or `{"scores": [..]}` as its last line of
//! stdout.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::domain::models::ScorerCommandConfig;
use crate::domain::ports::{ScoreRequest, Scorer, ScorerError, ScorerOutput};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOutput {
    Single { score: f64 },
    Many { scores: Vec<f64> },
}

/// Scores by running an external program per request.
pub struct CommandScorer {
    config: ScorerCommandConfig,
}

impl CommandScorer {
    /// Create a new command scorer.
    pub fn new(config: ScorerCommandConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, request: &ScoreRequest) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push("--family".to_string());
        args.push(request.family.code().to_string());
        if let Some(label) = &request.label {
            args.push("--label".to_string());
            args.push(label.clone());
        }
        if let Some(ordinal) = request.ordinal {
            args.push("--ordinal".to_string());
            args.push(ordinal.to_string());
        }
        args.extend(request.paths.iter().map(|p| p.to_string_lossy().into_owned()));
        args
    }
}

/// Parse the scorer's stdout. Only the last non-empty line is read, so the
/// program may log freely before it.
pub fn parse_output(stdout: &str) -> Result<ScorerOutput, ScorerError> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ScorerError::InvalidOutput("scorer printed nothing".to_string()))?;

    let raw: RawOutput = serde_json::from_str(line.trim())
        .map_err(|e| ScorerError::InvalidOutput(format!("{e}: {line}")))?;

    Ok(match raw {
        RawOutput::Single { score } => ScorerOutput::Single(score),
        RawOutput::Many { scores } => ScorerOutput::Many(scores),
    })
}

#[async_trait]
impl Scorer for CommandScorer {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn score(&self, request: ScoreRequest) -> Result<ScorerOutput, ScorerError> {
        let args = self.build_args(&request);
        debug!(family = %request.family, program = %self.config.program, ?args, "Running scorer");

        // kill_on_drop: a timed-out invocation is dropped, which kills the child
        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScorerError::Failed(format!("failed to spawn {}: {e}", self.config.program)))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ScorerError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(ScorerError::Failed(format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }

        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskFamily;
    use std::path::PathBuf;

    #[test]
    fn test_parse_single_and_many() {
        assert_eq!(parse_output("{\"score\": 3}").unwrap(), ScorerOutput::Single(3.0));
        assert_eq!(
            parse_output("loading model...\n{\"scores\": [1.5, 2]}\n\n").unwrap(),
            ScorerOutput::Many(vec![1.5, 2.0])
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_output(""), Err(ScorerError::InvalidOutput(_))));
        assert!(matches!(parse_output("42"), Err(ScorerError::InvalidOutput(_))));
    }

    #[test]
    fn test_build_args() {
        let scorer = CommandScorer::new(ScorerCommandConfig {
            program: "python3".into(),
            args: vec!["-m".into(), "scoring".into()],
        });
        let request = ScoreRequest::new(TaskFamily::Diadochokinesis, vec![PathBuf::from("a.wav")])
            .with_label("PTK");
        assert_eq!(
            scorer.build_args(&request),
            vec!["-m", "scoring", "--family", "PTK_SOUND", "--label", "PTK", "a.wav"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_program_and_reads_last_line() {
        let scorer = CommandScorer::new(ScorerCommandConfig {
            program: "sh".into(),
            args: vec!["-c".into(), "echo warming up; echo '{\"score\": 7.25}'".into(), "scorer".into()],
        });
        let out = scorer
            .score(ScoreRequest::new(TaskFamily::SustainedVowel, vec![PathBuf::from("x.wav")]))
            .await
            .unwrap();
        assert_eq!(out, ScorerOutput::Single(7.25));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let scorer = CommandScorer::new(ScorerCommandConfig {
            program: "sh".into(),
            args: vec!["-c".into(), "echo model missing >&2; exit 3".into(), "scorer".into()],
        });
        let err = scorer
            .score(ScoreRequest::new(TaskFamily::SayAnimal, vec![PathBuf::from("x.wav")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScorerError::Failed(msg) if msg.contains("model missing")));
    }
}
