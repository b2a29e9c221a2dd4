//! Message Types for Thread Communication
//!
//! Commands flow from UI thread -> Analyzer thread
//! Events flow from Analyzer thread -> UI thread
//!
//! The audio thread takes part in neither: it only writes to FIFOs and
//! atomics.

use serde::{Deserialize, Serialize};

/// Commands sent from UI thread to the analyzer thread
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Re-send the current response curve (triggers ResponseCurveUpdated)
    RequestResponseCurve,

    /// Clear every channel's analysis history
    ResetSpectrum,

    /// Shutdown the analyzer thread
    Shutdown,
}

/// Events sent from the analyzer thread to UI thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Analyzer thread started
    Started,

    /// Analyzer thread stopped
    Stopped,

    /// The filter chain changed and the response curve was recomputed.
    /// Magnitudes are in dB, one per frequency.
    ResponseCurveUpdated {
        frequencies: Vec<f32>,
        magnitudes_db: Vec<f32>,
    },

    /// New spectrum frames are waiting in a channel's frame queue
    SpectrumFramesReady {
        /// Channel index (0 = left/mono, 1 = right)
        channel: usize,
        /// Frames produced during this tick
        frames: usize,
    },

    /// Frames were dropped because the UI did not drain the frame queue
    FramesDropped { channel: usize, count: usize },

    /// Blocks were dropped on the audio thread because the analyzer fell behind
    BlocksDropped { channel: usize, count: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::FramesDropped {
            channel: 1,
            count: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("FramesDropped"));
        assert!(json.contains("payload"));

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_response_curve_serialization() {
        let event = Event::ResponseCurveUpdated {
            frequencies: vec![20.0, 200.0, 2000.0],
            magnitudes_db: vec![-3.0, 0.0, 6.0],
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        if let Event::ResponseCurveUpdated { magnitudes_db, .. } = deserialized {
            assert_eq!(magnitudes_db[2], 6.0);
        } else {
            panic!("Wrong variant");
        }
    }

    #[test]
    fn test_unit_variant_serialization() {
        let json = serde_json::to_string(&Event::Started).unwrap();
        assert_eq!(json, r#"{"type":"Started"}"#);
    }
}
