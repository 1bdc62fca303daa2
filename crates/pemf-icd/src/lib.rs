#![cfg_attr(not(any(test, feature = "use-std")), no_std)]

use postcard_rpc::{endpoints, topics, TopicDirection};
use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

pub use pemf_core::ENTRY_KEY_LEN;

/// Discriminant that matches no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidDiscriminant(pub u8);

macro_rules! define_wire_enum {
    ($wrapper:ident, $external:path, { $($variant:ident),* $(,)? }) => {
        #[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub enum $wrapper {
            $($variant),*
        }

        impl TryFrom<u8> for $wrapper {
            type Error = InvalidDiscriminant;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $(x if x == Self::$variant as u8 => Ok(Self::$variant),)*
                    other => Err(InvalidDiscriminant(other)),
                }
            }
        }

        impl From<$wrapper> for u8 {
            fn from(value: $wrapper) -> Self {
                value as u8
            }
        }

        impl From<$external> for $wrapper {
            fn from(value: $external) -> Self {
                match value {
                    $(<$external>::$variant => Self::$variant),*
                }
            }
        }

        impl From<$wrapper> for $external {
            fn from(value: $wrapper) -> Self {
                match value {
                    $(<$wrapper>::$variant => <$external>::$variant),*
                }
            }
        }
    };
}

mod battery;
pub use battery::*;

mod entry;
pub use entry::*;

mod pulse;
pub use pulse::*;

mod safety;
pub use safety::*;

// Device Information types
#[derive(Debug, PartialEq, Serialize, Deserialize, Schema, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
    pub hardware_revision: heapless::String<32>,
    pub software_revision: heapless::String<32>,
    pub manufacturer_name: heapless::String<32>,
}

endpoints! {
    list = ENDPOINT_LIST;
    omit_std = true;
    | EndpointTy                | RequestTy         | ResponseTy            | Path              |
    | ----------                | ---------         | ----------            | ----              |
    // Device Info endpoint (read-only)
    | DeviceInfoGetEndpoint     | ()                | DeviceInfo            | "device/info"     |
    // Battery endpoints
    | BatteryGetEndpoint        | ()                | (Option<BatteryReport>) | "battery/get"   |
    | BatteryStreamEndpoint     | ()                | bool                  | "battery/stream"  |
    | BatteryStopEndpoint       | ()                | ()                    | "battery/stop"    |
    // Safety endpoints
    | SafetyGetEndpoint         | ()                | SafetyReport          | "safety/get"      |
    | SafetyResetEndpoint       | EntryKey          | ResetResponse         | "safety/reset"    |
    // Waveform endpoints
    | WaveformGetEndpoint       | ()                | WaveformConfig        | "waveform/get"    |
    | WaveformSetEndpoint       | WaveformConfig    | bool                  | "waveform/set"    |
    | PulseStatsEndpoint        | ()                | PulseReport           | "pulse/stats"     |
    // Loader entry endpoints
    | LoaderEnterEndpoint       | EntryKey          | EntryResponse         | "loader/enter"    |
    | LoaderStatusEndpoint      | ()                | EntryStatusReport     | "loader/status"   |
}

topics! {
    list = TOPICS_IN_LIST;
    direction = TopicDirection::ToServer;
    | TopicTy                   | MessageTy     | Path              |
    | -------                   | ---------     | ----              |
}

topics! {
    list = TOPICS_OUT_LIST;
    direction = TopicDirection::ToClient;
    | TopicTy                   | MessageTy     | Path              | Cfg                           |
    | -------                   | ---------     | ----              | ---                           |
    | BatteryTopic              | BatteryReport | "battery/data"    |                               |
}
