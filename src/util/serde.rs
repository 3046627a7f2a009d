//! Shared serializable types describing stored payloads and send results.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Retry window applied when a 429 response carries no usable `Retry-After`.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 60_000;

/// Coarse importance tier for background work.
///
/// Each tier carries a delay threshold added to the submission time, so old
/// low-tier work eventually outranks fresh high-tier work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Lowest tier.
    Low,
    /// Default tier.
    Normal,
    /// Elevated tier.
    High,
    /// Runs ahead of everything submitted at the same time.
    Critical,
}

impl TaskPriority {
    /// Milliseconds added to the submission time when ranking a task.
    #[must_use]
    pub const fn delay_threshold_ms(self) -> u64 {
        match self {
            Self::Critical => 0,
            Self::High => 5_000,
            Self::Normal => 30_000,
            Self::Low => 60_000,
        }
    }
}

/// Kind of telemetry envelope held in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Session envelope.
    Session,
    /// Batch of log records.
    Log,
    /// Crash report.
    Crash,
    /// Binary attachment.
    Attachment,
    /// Captured network request bodies.
    Blob,
}

impl EnvelopeKind {
    /// Endpoint this kind is routed to unless metadata says otherwise.
    #[must_use]
    pub const fn endpoint(self) -> Endpoint {
        match self {
            Self::Session => Endpoint::Sessions,
            Self::Log | Self::Crash | Self::Blob => Endpoint::Logs,
            Self::Attachment => Endpoint::Attachments,
        }
    }

    /// Stable lowercase name used in storage file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Log => "log",
            Self::Crash => "crash",
            Self::Attachment => "attachment",
            Self::Blob => "blob",
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(Self::Session),
            "log" => Ok(Self::Log),
            "crash" => Ok(Self::Crash),
            "attachment" => Ok(Self::Attachment),
            "blob" => Ok(Self::Blob),
            other => Err(format!("unknown envelope kind `{other}`")),
        }
    }
}

/// Logical collector destination. Rate limits are scoped per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Sessions API.
    Sessions,
    /// Logs API (logs, crashes, network blobs).
    Logs,
    /// Attachments API.
    Attachments,
}

impl Endpoint {
    /// URL path segment of the endpoint.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Sessions => "spans",
            Self::Logs => "logs",
            Self::Attachments => "attachments",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Identifies a stored payload without loading its body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadMetadata {
    /// Creation time in milliseconds.
    pub timestamp: u64,
    /// Unique identifier of the payload.
    pub uuid: String,
    /// Identifier of the process that produced the payload.
    pub process_id: String,
    /// Envelope kind.
    pub kind: EnvelopeKind,
    /// Whether the payload has been fully written and may be sent.
    pub complete: bool,
    /// Destination endpoint.
    pub endpoint: Endpoint,
}

impl PayloadMetadata {
    /// Metadata for a complete payload routed to the kind's default endpoint.
    pub fn new(
        timestamp: u64,
        uuid: impl Into<String>,
        process_id: impl Into<String>,
        kind: EnvelopeKind,
    ) -> Self {
        Self {
            timestamp,
            uuid: uuid.into(),
            process_id: process_id.into(),
            kind,
            complete: true,
            endpoint: kind.endpoint(),
        }
    }

    /// Metadata with a freshly generated v4 uuid.
    pub fn generate(timestamp: u64, process_id: impl Into<String>, kind: EnvelopeKind) -> Self {
        Self::new(timestamp, uuid::Uuid::new_v4().to_string(), process_id, kind)
    }

    /// Set the completeness flag.
    #[must_use]
    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    /// Override the destination endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Storage file name: `{timestamp}_{kind}_{uuid}_{process}_{complete}_v1.json`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_v1.json",
            self.timestamp, self.kind, self.uuid, self.process_id, self.complete
        )
    }

    /// Parse a name produced by [`file_name`](Self::file_name). The endpoint is
    /// the kind's default routing. Returns `None` for anything malformed.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix("_v1.json")?;
        let parts: Vec<&str> = stem.split('_').collect();
        let [timestamp, kind, uuid, process_id, complete] = parts.as_slice() else {
            return None;
        };
        if uuid.is_empty() || process_id.is_empty() {
            return None;
        }
        let kind: EnvelopeKind = kind.parse().ok()?;
        Some(
            Self::new(timestamp.parse().ok()?, *uuid, *process_id, kind)
                .with_complete(complete.parse().ok()?),
        )
    }

    /// Delivery order: sessions first, then oldest first.
    #[must_use]
    pub fn delivery_order(a: &Self, b: &Self) -> Ordering {
        let a_session = a.kind == EnvelopeKind::Session;
        let b_session = b.kind == EnvelopeKind::Session;
        b_session
            .cmp(&a_session)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    }
}

impl fmt::Display for PayloadMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.uuid)
    }
}

/// Result of one send attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    /// The collector accepted the payload.
    Success,
    /// Retryable failure. `http_status` is `None` for transport errors.
    Failure {
        /// HTTP status returned by the collector, if any.
        http_status: Option<u16>,
    },
    /// The collector asked us to back off from `endpoint`.
    RateLimited {
        /// Endpoint that is rate limited.
        endpoint: Endpoint,
        /// How long the endpoint stays blocked.
        blocked_for_ms: u64,
    },
}

impl ExecutionOutcome {
    /// Classify an HTTP status code.
    #[must_use]
    pub fn from_status(endpoint: Endpoint, status: u16, retry_after_ms: Option<u64>) -> Self {
        match status {
            200..=299 => Self::Success,
            429 => Self::RateLimited {
                endpoint,
                blocked_for_ms: retry_after_ms.unwrap_or(DEFAULT_RATE_LIMIT_MS),
            },
            other => Self::Failure {
                http_status: Some(other),
            },
        }
    }

    /// True for [`ExecutionOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Connectivity reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    /// No route to the collector.
    NotReachable,
    /// Connected over wifi.
    Wifi,
    /// Connected over a cellular network.
    Wan,
    /// Connectivity could not be determined.
    Unknown,
}

impl NetworkStatus {
    /// Whether a send attempt is worth making.
    #[must_use]
    pub const fn is_reachable(self) -> bool {
        !matches!(self, Self::NotReachable)
    }
}
