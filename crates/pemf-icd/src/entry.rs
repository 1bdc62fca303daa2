use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

use crate::{InvalidDiscriminant, ENTRY_KEY_LEN};

/// Shared secret carried by loader-entry and safety-reset commands.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EntryKey(pub [u8; ENTRY_KEY_LEN]);

define_wire_enum!(EntryState, pemf_core::ShutdownState, {
    Normal,
    EntryRequested,
    ValidatingHardware,
    ShuttingDownTasks,
    FinalSafetyCheck,
    ReadyForTransition,
    EntryFailed,
});

define_wire_enum!(TaskName, pemf_core::TaskId, {
    PulseGenerator,
    BatteryMonitor,
    ShutdownCoordinator,
    Diagnostics,
});

define_wire_enum!(RejectReason, pemf_core::EntryRejected, {
    Unauthorized,
    RateLimited,
    Busy,
});

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EntryFailure {
    UnsafeHardwareState,
    TaskQuiesceTimeout { task: TaskName },
}

impl From<pemf_core::BootloaderError> for EntryFailure {
    fn from(value: pemf_core::BootloaderError) -> Self {
        match value {
            pemf_core::BootloaderError::UnsafeHardwareState => {
                Self::UnsafeHardwareState
            }
            pemf_core::BootloaderError::TaskQuiesceTimeout { task } => {
                Self::TaskQuiesceTimeout { task: task.into() }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EntryResponse {
    /// The sequence will run. Poll `loader/status` for its outcome.
    Accepted,
    Rejected(RejectReason),
}

impl From<Result<(), pemf_core::EntryRejected>> for EntryResponse {
    fn from(value: Result<(), pemf_core::EntryRejected>) -> Self {
        match value {
            Ok(()) => Self::Accepted,
            Err(e) => Self::Rejected(e.into()),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EntryStatusReport {
    pub state: EntryState,
    pub last_error: Option<EntryFailure>,
}

impl From<pemf_core::EntryStatus> for EntryStatusReport {
    fn from(value: pemf_core::EntryStatus) -> Self {
        Self {
            state: value.state.into(),
            last_error: value.last_error.map(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_report_carries_the_failed_task() {
        let status = pemf_core::EntryStatus {
            state: pemf_core::ShutdownState::Normal,
            last_error: Some(pemf_core::BootloaderError::TaskQuiesceTimeout {
                task: pemf_core::TaskId::BatteryMonitor,
            }),
        };
        assert_eq!(
            EntryStatusReport::from(status),
            EntryStatusReport {
                state: EntryState::Normal,
                last_error: Some(EntryFailure::TaskQuiesceTimeout {
                    task: TaskName::BatteryMonitor
                }),
            }
        );
    }

    #[test]
    fn rejections_map_one_to_one() {
        assert_eq!(
            EntryResponse::from(Err(pemf_core::EntryRejected::RateLimited)),
            EntryResponse::Rejected(RejectReason::RateLimited)
        );
        assert_eq!(EntryResponse::from(Ok(())), EntryResponse::Accepted);
        assert_eq!(
            EntryState::try_from(6),
            Ok(EntryState::EntryFailed)
        );
    }
}
