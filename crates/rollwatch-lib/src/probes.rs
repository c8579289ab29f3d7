//! Read-only probes built on the workload gateway
//!
//! Probes never log or print; every outcome is returned to the caller.

use crate::error::{Error, Result};
use crate::gateway::{LogOptions, WorkloadGateway};
use crate::models::{zero_time, ImageUpdate, WorkloadKind};
use chrono::{DateTime, Utc};
use futures::io::{AsyncRead, AsyncReadExt};

/// Bytes requested from the log stream per read
pub const LOG_READ_CHUNK: usize = 4096;

/// When the pod was last (re)started
///
/// Uses the recorded start time, falling back to the creation timestamp when
/// the runtime has not reported a start yet.
pub async fn restart_time(
    gateway: &dyn WorkloadGateway,
    namespace: &str,
    pod: &str,
) -> Result<DateTime<Utc>> {
    let pod = gateway.get_pod(namespace, pod).await?;

    let started = pod
        .status
        .as_ref()
        .and_then(|status| status.start_time.as_ref())
        .map(|t| t.0);
    let created = pod.metadata.creation_timestamp.as_ref().map(|t| t.0);

    Ok(started.or(created).unwrap_or_else(zero_time))
}

/// Current monitored image and when the workload was last updated
///
/// The update time is the workload creation timestamp, which only tracks
/// image changes for workloads that are recreated rather than patched.
pub async fn last_image_update(
    gateway: &dyn WorkloadGateway,
    namespace: &str,
    name: &str,
    kind: WorkloadKind,
) -> Result<ImageUpdate> {
    let workload = gateway.get_workload(namespace, name, kind).await?;

    Ok(ImageUpdate {
        updated_at: workload.creation_timestamp().unwrap_or_else(zero_time),
        image: workload.monitored_image()?,
    })
}

/// Timestamp of the last log line carrying the activity marker
///
/// Fails with [`Error::Parse`] when no line matched or the matching line has
/// no RFC3339 prefix.
pub async fn last_log_time(
    gateway: &dyn WorkloadGateway,
    namespace: &str,
    pod: &str,
    options: &LogOptions,
    marker: &str,
) -> Result<DateTime<Utc>> {
    let reader = gateway.stream_pod_logs(namespace, pod, options).await?;
    let line = last_matching_line(reader, marker)
        .await
        .ok_or_else(|| Error::Parse(format!("no log line containing {}", marker)))?;

    parse_line_timestamp(&line)
}

/// Scan a log stream and keep the last line containing `marker`
///
/// Lines split across read boundaries are reassembled before matching. A
/// read error ends the scan with whatever was seen so far.
pub async fn last_matching_line<R>(mut reader: R, marker: &str) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; LOG_READ_CHUNK];
    let mut pending: Vec<u8> = Vec::new();
    let mut last_match: Option<String> = None;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buf[..n]);

        // Everything up to the last newline is complete
        if let Some(end) = pending.iter().rposition(|b| *b == b'\n') {
            let complete: Vec<u8> = pending.drain(..=end).collect();
            if let Some(line) = last_match_in(&complete, marker) {
                last_match = Some(line);
            }
        }
    }

    if let Some(line) = last_match_in(&pending, marker) {
        last_match = Some(line);
    }

    last_match
}

fn last_match_in(bytes: &[u8], marker: &str) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .split('\n')
        .rev()
        .find(|line| line.contains(marker))
        .map(|line| line.trim_end_matches('\r').to_string())
}

/// Parse the space-delimited timestamp prefix of a log line
pub fn parse_line_timestamp(line: &str) -> Result<DateTime<Utc>> {
    let token = line.split(' ').next().unwrap_or_default();
    DateTime::parse_from_rfc3339(token)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("invalid log timestamp {:?}: {}", token, e)))
}
