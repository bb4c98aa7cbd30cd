//! Claims verification.
//!
//! One-shot token verification delivered by callback from a worker
//! execution context, the asynchronous half that the blocking adapter in
//! [`crate::sync`] turns back into a synchronous wait.
//!
//! In-tree verification is structural: three-segment shape, base64url and
//! JSON decoding, audience equality and the `exp`/`nbf` time window.
//! Signature checking requires the signing-key collaborator that sits with
//! the excluded transport-security layer.

use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;

use crate::runtime::Runtime;

/// Tolerated clock skew for the `exp`/`nbf` checks, in seconds.
const CLOCK_SKEW_SECS: u64 = 60;

/// Outcome of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Ok,
    /// Token is not three base64url JSON segments.
    BadFormat,
    /// Audience claim missing or not addressed to the expected audience.
    BadAudience,
    /// Token expired or not yet valid.
    TimeConstraintFailure,
    GenericError,
}

impl VerifyStatus {
    /// True for [`VerifyStatus::Ok`].
    pub fn is_ok(self) -> bool {
        self == VerifyStatus::Ok
    }

    /// Stable name for reporting.
    pub fn as_str(self) -> &'static str {
        match self {
            VerifyStatus::Ok => "OK",
            VerifyStatus::BadFormat => "BAD_FORMAT",
            VerifyStatus::BadAudience => "BAD_AUDIENCE",
            VerifyStatus::TimeConstraintFailure => "TIME_CONSTRAINT_FAILURE",
            VerifyStatus::GenericError => "GENERIC_ERROR",
        }
    }
}

impl std::fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audience claim: a single value or a list of values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn matches(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StandardClaims {
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    nbf: Option<u64>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

/// Decoded claims of a verified token.
#[derive(Debug, Clone)]
pub struct Claims {
    json: Value,
    standard: StandardClaims,
}

impl Claims {
    fn from_value(json: Value) -> Option<Self> {
        if !json.is_object() {
            return None;
        }
        let standard = StandardClaims::deserialize(&json).ok()?;
        Some(Self { json, standard })
    }

    /// Issuer claim, if present.
    pub fn issuer(&self) -> Option<&str> {
        self.standard.iss.as_deref()
    }

    /// Subject claim, if present.
    pub fn subject(&self) -> Option<&str> {
        self.standard.sub.as_deref()
    }

    /// Expiry as seconds since the epoch, if present.
    pub fn expires_at(&self) -> Option<u64> {
        self.standard.exp
    }

    /// Not-before as seconds since the epoch, if present.
    pub fn not_before(&self) -> Option<u64> {
        self.standard.nbf
    }

    /// The full claims object.
    pub fn json(&self) -> &Value {
        &self.json
    }

    /// Pretty-printed JSON rendering for display.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.json).unwrap_or_default()
    }
}

fn decode_json_segment(segment: &str) -> Option<Value> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Verify a token against an audience at the given wall-clock time.
/// Claims are only produced on success.
fn check_token(token: &str, audience: &str, now_secs: u64) -> (VerifyStatus, Option<Claims>) {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return (VerifyStatus::BadFormat, None);
    }

    // Header must decode to a JSON object; its contents belong to the
    // signature collaborator.
    match decode_json_segment(segments[0]) {
        Some(header) if header.is_object() => {}
        _ => return (VerifyStatus::BadFormat, None),
    }

    let claims = match decode_json_segment(segments[1]).and_then(Claims::from_value) {
        Some(claims) => claims,
        None => return (VerifyStatus::BadFormat, None),
    };

    match &claims.standard.aud {
        Some(aud) if aud.matches(audience) => {}
        _ => return (VerifyStatus::BadAudience, None),
    }

    if let Some(exp) = claims.standard.exp {
        if now_secs > exp.saturating_add(CLOCK_SKEW_SECS) {
            return (VerifyStatus::TimeConstraintFailure, None);
        }
    }
    if let Some(nbf) = claims.standard.nbf {
        if now_secs.saturating_add(CLOCK_SKEW_SECS) < nbf {
            return (VerifyStatus::TimeConstraintFailure, None);
        }
    }

    (VerifyStatus::Ok, Some(claims))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Verifies tokens on a worker execution context, delivering the outcome
/// through a callback invoked on that context.
pub struct ClaimsVerifier {
    _runtime: Runtime,
}

impl ClaimsVerifier {
    /// Create a verifier bound to the process runtime.
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            _runtime: runtime.clone(),
        }
    }

    /// Start one verification. The callback runs on the verifier's worker
    /// thread, not the caller's; pair it with a
    /// [`Synchronizer`](crate::sync::Synchronizer) to wait synchronously.
    pub fn verify<F>(&self, token: &str, audience: &str, callback: F)
    where
        F: FnOnce(VerifyStatus, Option<Claims>) + Send + 'static,
    {
        let token = token.to_owned();
        let audience = audience.to_owned();
        let spawned = thread::Builder::new()
            .name("claims-verifier".into())
            .spawn(move || {
                let (status, claims) = check_token(&token, &audience, unix_now());
                callback(status, claims);
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to spawn verifier worker");
        }
    }
}

/// Build an unsigned token from a claims object, for tests and local
/// harness runs.
pub fn encode_unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.", header, payload)
}
