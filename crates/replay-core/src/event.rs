//! Event records: the closed tag set of things recorders can emit.

use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameter names that are always scrubbed from `network_request`
/// URLs before the record is serialized, per the PII handling rule in the
/// engine's design notes.
const SENSITIVE_QUERY_KEYS: &[&str] = &[
    "token",
    "key",
    "secret",
    "password",
    "auth",
    "access_token",
    "api_key",
];

/// Closed set of event record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A raw touch.
    Touch,
    /// A recognized gesture (tap, swipe, pinch, ...).
    Gesture,
    /// A text input change.
    Input,
    /// A screen/view navigation.
    Navigation,
    /// A network request lifecycle record.
    NetworkRequest,
    /// A host-supplied custom event.
    Custom,
    /// An application error.
    Error,
    /// An application-not-responding event.
    Anr,
    /// The identified user changed.
    UserIdentityChanged,
    /// The application cold/warm started.
    AppStartup,
    /// The application entered the foreground.
    AppForeground,
    /// A diagnostic log line.
    Log,
}

/// One point of contact in a multi-touch gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    /// Logical-unit x coordinate.
    pub x: f64,
    /// Logical-unit y coordinate.
    pub y: f64,
}

/// Shared payload shape for `touch` and `gesture` records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureDetail {
    /// Concrete gesture name (`tap`, `rage_tap`, `pinch_in`, `scroll`, ...).
    pub gesture_type: String,
    /// Target label/accessibility identifier, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Primary x coordinate (centroid for multi-touch).
    pub x: f64,
    /// Primary y coordinate (centroid for multi-touch).
    pub y: f64,
    /// All simultaneous touch points.
    #[serde(default)]
    pub touches: Vec<TouchPoint>,
    /// Swipe/pan/rotation direction, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Pinch scale factor, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Rotation angle in degrees, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    /// Tap count (rage-tap cluster size, double-tap count), when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Frustration classification (`rage_tap`, `dead_tap`), when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frustration_kind: Option<String>,
}

/// Outcome of a completed network request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum NetworkOutcome {
    /// Request completed with an HTTP response.
    Success,
    /// Request failed before a response was received (timeout, DNS, TLS, ...).
    Error {
        /// Human-readable failure reason.
        reason: String,
    },
}

/// A captured stack for one thread at the moment of an ANR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    /// Thread name (`main`, `ui`, ...).
    pub name: String,
    /// Symbolicated or raw stack frames, outermost first.
    pub frames: Vec<String>,
}

/// Type-specific event body. The serialized `type` tag is exactly the
/// [`EventKind`] closed tag set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Raw touch-down/move/up.
    Touch(GestureDetail),
    /// Recognized gesture.
    Gesture(GestureDetail),
    /// Text input change.
    Input {
        /// Field value, or `"***"` when the field is marked redacted.
        value: String,
        /// Field label/accessibility identifier.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Screen/view navigation.
    Navigation {
        /// Destination screen name.
        screen: String,
        /// Destination view identifier, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        view_id: Option<String>,
        /// `true` when entering the screen, `false` when leaving it.
        entering: bool,
    },
    /// Network request lifecycle.
    NetworkRequest {
        /// HTTP method.
        method: String,
        /// Request URL with sensitive query parameters scrubbed.
        url: String,
        /// HTTP status code, when a response was received.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        /// Wall-clock duration of the request in milliseconds.
        duration_ms: u64,
        /// Request body size in bytes.
        #[serde(default)]
        request_bytes: u64,
        /// Response body size in bytes.
        #[serde(default)]
        response_bytes: u64,
        /// Outcome classification.
        outcome: NetworkOutcome,
    },
    /// Host-supplied custom event.
    Custom {
        /// Custom event name.
        name: String,
        /// Arbitrary host-supplied JSON payload.
        payload: serde_json::Value,
    },
    /// Application error.
    Error {
        /// Error message.
        message: String,
        /// Stack trace, when available.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    /// Application-not-responding event.
    Anr {
        /// Stall duration measured from the first missed watchdog ping.
        duration_ms: u64,
        /// UI-thread stack snapshot captured at detection time.
        thread_state: ThreadState,
    },
    /// Identified user changed.
    UserIdentityChanged {
        /// New user identifier, or `None` for anonymous/logout.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// Application startup.
    AppStartup {
        /// `true` for a cold start, `false` for a warm start.
        cold: bool,
    },
    /// Application foreground transition.
    AppForeground {
        /// `true` when entering the foreground, `false` when leaving it.
        foreground: bool,
    },
    /// Diagnostic log line.
    Log {
        /// Log level (`info`, `warn`, `error`, ...).
        level: String,
        /// Log message.
        message: String,
    },
}

impl EventPayload {
    /// Returns the closed-set tag for this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Touch(_) => EventKind::Touch,
            EventPayload::Gesture(_) => EventKind::Gesture,
            EventPayload::Input { .. } => EventKind::Input,
            EventPayload::Navigation { .. } => EventKind::Navigation,
            EventPayload::NetworkRequest { .. } => EventKind::NetworkRequest,
            EventPayload::Custom { .. } => EventKind::Custom,
            EventPayload::Error { .. } => EventKind::Error,
            EventPayload::Anr { .. } => EventKind::Anr,
            EventPayload::UserIdentityChanged { .. } => EventKind::UserIdentityChanged,
            EventPayload::AppStartup { .. } => EventKind::AppStartup,
            EventPayload::AppForeground { .. } => EventKind::AppForeground,
            EventPayload::Log { .. } => EventKind::Log,
        }
    }

    /// Builds a `network_request` payload with sensitive query parameters
    /// scrubbed from `raw_url` before it is stored.
    pub fn network_request(
        method: impl Into<String>,
        raw_url: &str,
        status: Option<u16>,
        duration_ms: u64,
        request_bytes: u64,
        response_bytes: u64,
        outcome: NetworkOutcome,
    ) -> Self {
        EventPayload::NetworkRequest {
            method: method.into(),
            url: scrub_sensitive_query_params(raw_url),
            status,
            duration_ms,
            request_bytes,
            response_bytes,
            outcome,
        }
    }
}

/// One immutable event record. Once enqueued into the Event Ring its content
/// never changes; the ring may drop it but never rewrite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Capture time in Unix epoch milliseconds.
    pub timestamp_ms: u64,
    /// Type-specific payload.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventRecord {
    /// Creates a new immutable event record.
    pub fn new(timestamp_ms: u64, payload: EventPayload) -> Self {
        Self { timestamp_ms, payload }
    }

    /// Returns the closed-set tag for this record.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Serializes this record to its self-describing, newline-terminated
    /// wire form.
    ///
    /// # Errors
    /// Returns an error when JSON encoding fails (never expected for a
    /// well-formed record).
    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Approximate uncompressed wire size of this record, used by the Event
    /// Ring's byte-bounded drain.
    pub fn approximate_byte_len(&self) -> usize {
        self.to_ndjson_line().map(|line| line.len()).unwrap_or(0)
    }

    /// Returns `true` when this record counts as a "response" for the
    /// dead-tap window (`navigation` or `input`; scrolls do not count).
    pub fn is_dead_tap_response(&self) -> bool {
        matches!(self.kind(), EventKind::Navigation | EventKind::Input)
    }
}

/// Redacts well-known sensitive query parameter values with `[REDACTED]`.
///
/// URLs that fail to parse are returned unchanged rather than dropped, since
/// a malformed URL carries no query-string PII risk beyond what it already
/// displays in the path.
pub fn scrub_sensitive_query_params(raw_url: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw_url) else {
        return raw_url.to_string();
    };

    if parsed.query().is_none() {
        return parsed.to_string();
    }

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut serializer = parsed.query_pairs_mut();
        serializer.clear();
        for (key, value) in pairs {
            if SENSITIVE_QUERY_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                serializer.append_pair(&key, "[REDACTED]");
            } else {
                serializer.append_pair(&key, &value);
            }
        }
    }

    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubs_known_sensitive_keys_only() {
        let scrubbed = scrub_sensitive_query_params(
            "https://api.example.test/login?token=abc123&user=alice",
        );
        assert!(scrubbed.contains("token=%5BREDACTED%5D") || scrubbed.contains("token=[REDACTED]"));
        assert!(scrubbed.contains("user=alice"));
        assert!(!scrubbed.contains("abc123"));
    }

    #[test]
    fn non_url_input_is_returned_unchanged() {
        let input = "not-a-url";
        assert_eq!(scrub_sensitive_query_params(input), input);
    }

    #[test]
    fn ndjson_line_is_newline_terminated() {
        let record = EventRecord::new(
            1,
            EventPayload::Log {
                level: "info".to_string(),
                message: "hello".to_string(),
            },
        );
        let line = record.to_ndjson_line().expect("serialization should succeed");
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn navigation_and_input_count_as_dead_tap_responses_scroll_does_not() {
        let navigation = EventRecord::new(
            1,
            EventPayload::Navigation {
                screen: "detail".to_string(),
                view_id: None,
                entering: true,
            },
        );
        assert!(navigation.is_dead_tap_response());

        let scroll = EventRecord::new(
            1,
            EventPayload::Gesture(GestureDetail {
                gesture_type: "scroll".to_string(),
                label: None,
                x: 0.0,
                y: 0.0,
                touches: vec![],
                direction: Some("down".to_string()),
                scale: None,
                angle: None,
                count: None,
                frustration_kind: None,
            }),
        );
        assert!(!scroll.is_dead_tap_response());
    }
}
