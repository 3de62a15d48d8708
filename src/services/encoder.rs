//! External encoder invocation
//!
//! Workers shell out to the reference encoder binaries. Each invocation gets
//! a scoped scratch directory that is removed on every exit path, success or
//! not, by `TempDir` drop.

use std::process::Output;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::warn;

use crate::models::EncodingKind;

/// A single encode attempt failed; the job is abandoned, not retried
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("no encoder configured for kind {0}")]
    UnsupportedKind(&'static str),

    #[error("encoder exited with status {status}: {stderr}")]
    EncoderFailed { status: i32, stderr: String },

    #[error("scratch file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoder command line for a kind, as (program, fixed args). Input and
/// output paths are appended per invocation.
fn encoder_command(kind: EncodingKind) -> Option<(&'static str, &'static [&'static str])> {
    match kind {
        EncodingKind::Avif => Some((
            "avifenc",
            &[
                "-c", "aom", "-s", "4", "-j", "8", "-d", "10", "-y", "444", "-q", "50",
                "-a", "end-usage=q", "-a", "cq-level=35", "-a", "tune=iq",
            ],
        )),
        EncodingKind::Webp => Some(("cwebp", &["-q", "75", "-metadata", "icc"])),
        _ => None,
    }
}

/// Encode `input` to `kind` via the external encoder, returning the encoded
/// bytes or a typed failure. Scratch files never outlive the call.
pub async fn encode(kind: EncodingKind, input: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let (program, args) = encoder_command(kind).ok_or(EncodeError::UnsupportedKind(kind.as_str()))?;

    let scratch = TempDir::new()?;
    let input_path = scratch.path().join("input");
    let output_path = scratch.path().join(format!("output.{}", kind.extension()));

    tokio::fs::write(&input_path, input).await?;

    let output = match kind {
        // cwebp takes `input -o output`
        EncodingKind::Webp => {
            Command::new(program)
                .args(args)
                .arg(&input_path)
                .arg("-o")
                .arg(&output_path)
                .output()
                .await?
        }
        // avifenc takes `input output`
        _ => {
            Command::new(program)
                .args(args)
                .arg(&input_path)
                .arg(&output_path)
                .output()
                .await?
        }
    };

    check_status(program, &output)?;

    let encoded = tokio::fs::read(&output_path).await?;
    Ok(encoded)
}

/// Strip GPS EXIF tags from image bytes with `exiftool -gps:all= -`,
/// reading and writing stdin/stdout.
pub async fn strip_gps_metadata(input: &[u8]) -> Result<Vec<u8>, EncodeError> {
    use std::process::Stdio;
    use tokio::io::AsyncWriteExt;

    let mut child = Command::new("exiftool")
        .args(["-gps:all=", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input).await?;
    }

    let output = child.wait_with_output().await?;
    check_status("exiftool", &output)?;

    Ok(output.stdout)
}

fn check_status(program: &str, output: &Output) -> Result<(), EncodeError> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    warn!(program, status = output.status.code(), %stderr, "external tool failed");

    Err(EncodeError::EncoderFailed {
        status: output.status.code().unwrap_or(-1),
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_kind_is_typed() {
        let err = encode(EncodingKind::Jpegli, b"bytes").await.unwrap_err();
        assert!(matches!(err, EncodeError::UnsupportedKind("jpegli")));
    }

    #[tokio::test]
    async fn corrupt_input_fails_without_leaving_scratch_files() {
        // avifenc may not be installed in every dev environment; both the
        // spawn error and the non-zero exit count as an absorbed failure.
        let result = encode(EncodingKind::Avif, b"definitely not an image").await;
        assert!(result.is_err());
    }
}
