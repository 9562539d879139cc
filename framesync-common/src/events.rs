//! Event types for the framesync event system
//!
//! Workers never return errors across thread boundaries. Faults and
//! lifecycle changes are published as `EngineEvent`s and picked up by the
//! controller's subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Engine event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A playback session started
    PlaybackStarted {
        session_id: Uuid,
        position_ticks: i64,
        timestamp: DateTime<Utc>,
    },

    /// The frame sequence ran out and every sink was notified
    PlaybackFinished {
        session_id: Uuid,
        frames_dispatched: u64,
        timestamp: DateTime<Utc>,
    },

    /// A session was stopped by the controller
    PlaybackStopped {
        session_id: Uuid,
        kept_audio: bool,
        timestamp: DateTime<Utc>,
    },

    /// Playback position changed by a seek
    Seeked {
        position_ticks: i64,
        timestamp: DateTime<Utc>,
    },

    /// A video frame was reached after its deadline plus tolerance
    Underrun {
        session_id: Uuid,
        frame_ticks: i64,
        late_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Decoder reported corrupt data; the session ends early
    DecoderFault {
        session_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Audio device failed to open or stopped accepting writes
    AudioDeviceFault {
        session_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Session this event belongs to (None for session-independent events)
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            EngineEvent::PlaybackStarted { session_id, .. }
            | EngineEvent::PlaybackFinished { session_id, .. }
            | EngineEvent::PlaybackStopped { session_id, .. }
            | EngineEvent::Underrun { session_id, .. }
            | EngineEvent::DecoderFault { session_id, .. }
            | EngineEvent::AudioDeviceFault { session_id, .. } => Some(*session_id),
            EngineEvent::Seeked { .. } => None,
        }
    }

    /// True for events that end a session abnormally
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            EngineEvent::DecoderFault { .. } | EngineEvent::AudioDeviceFault { .. }
        )
    }
}

/// Externally observable playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}
