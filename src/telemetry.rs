//! Telemetry text codec
//!
//! Wire format (ASCII, human readable):
//!
//! ```text
//! Steps: 3, Channel 0: 120, Channel 1: 0, ..., Channel 7: 41
//! ```
//!
//! Decoding is deliberately permissive: the step count and channel pairs are
//! located by pattern anywhere in the text, a missing step count decodes to 0,
//! and nothing is ever rejected. Anything suspicious is reported as a warning.

use crate::types::{is_valid_channel, ChannelMap, DecodeReport, TelemetryMessage};
use regex::Regex;
use std::fmt::Write;
use std::sync::OnceLock;

/// Literal prefix of every message
pub const STEPS_PREFIX: &str = "Steps: ";

const STEP_PATTERN: &str = r"Steps: (\d+)";
const CHANNEL_PATTERN: &str = r"Channel (\d+): (\d+)";

fn step_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(STEP_PATTERN).expect("step pattern is a valid regex"))
}

fn channel_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CHANNEL_PATTERN).expect("channel pattern is a valid regex"))
}

/// Encode a step count and channel readings, channels in ascending id order
pub fn encode(step_count: u64, channels: &ChannelMap) -> String {
    let mut text = format!("{STEPS_PREFIX}{step_count}");
    for (channel_id, value) in channels {
        // Writing into a String cannot fail
        let _ = write!(text, ", Channel {channel_id}: {value}");
    }
    text
}

/// Encode a message
pub fn encode_message(message: &TelemetryMessage) -> String {
    encode(message.step_count, &message.channels)
}

/// Decode telemetry text without ever failing
pub fn decode(text: &str) -> DecodeReport {
    let mut warnings = Vec::new();

    let step_count = match step_regex().captures(text) {
        Some(caps) => match caps[1].parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                warnings.push(format!("step count {} out of range, using 0", &caps[1]));
                0
            }
        },
        None => {
            warnings.push("no step count found, using 0".to_string());
            0
        }
    };

    let mut channels = ChannelMap::new();
    for caps in channel_regex().captures_iter(text) {
        let id = match caps[1].parse::<u8>() {
            Ok(id) if is_valid_channel(id) => id,
            _ => {
                warnings.push(format!("ignoring unknown channel {}", &caps[1]));
                continue;
            }
        };
        let value = match caps[2].parse::<u16>() {
            Ok(value) => value,
            Err(_) => {
                warnings.push(format!("channel {id} value {} out of range", &caps[2]));
                continue;
            }
        };
        if channels.insert(id, value).is_some() {
            warnings.push(format!("channel {id} repeated, keeping last value"));
        }
    }

    DecodeReport {
        message: TelemetryMessage {
            step_count,
            channels,
        },
        warnings,
    }
}
