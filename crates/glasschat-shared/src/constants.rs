//! Protocol tunables shared across crates.

use std::time::Duration;

/// How long the caller lets an unanswered call ring before abandoning it
/// (and clearing the shared session so the callee's prompt is torn down too).
pub const RING_TIMEOUT: Duration = Duration::from_secs(45);

/// Redial pacing for the external signaling transport while the remote peer
/// slot is not yet registered. The coordinator itself is event-driven; this
/// is exported for transport adapters.
pub const DIAL_RETRY_INTERVAL: Duration = Duration::from_millis(1500);

/// Tick interval for the in-call duration counter.
pub const CALL_TICK: Duration = Duration::from_secs(1);

/// Longest image edge after the "fast" downscale pass.
pub const FAST_IMAGE_MAX_DIMENSION: u32 = 1280;

/// JPEG quality used when re-encoding a downscaled image.
pub const FAST_IMAGE_JPEG_QUALITY: u8 = 80;

/// How many trailing messages are sent to the suggestion API as context.
pub const SUGGESTION_CONTEXT_MESSAGES: usize = 6;

/// Canned quick replies used whenever the suggestion API response is
/// missing, malformed, or the wrong length.
pub const SUGGESTION_FALLBACKS: [&str; 3] = [
    "Thanks for reaching out!",
    "Could you share a few more details?",
    "Let me check that for you right away.",
];
