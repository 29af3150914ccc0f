//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a status from its database ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// The canonical upper-case label, e.g. `"SUCCESS"`.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $label => Ok(Self::$variant), )+
                    other => Err(CoreError::Validation(format!(
                        "Unknown {} '{other}'",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

define_status_enum! {
    /// Job execution status.
    ///
    /// `Received` and `Started` are reported by the broker between
    /// dispatch and the first progress update.
    JobStatus {
        Waiting = 1 => "WAITING",
        Dispatched = 2 => "DISPATCHED",
        Received = 3 => "RECEIVED",
        Started = 4 => "STARTED",
        Running = 5 => "RUNNING",
        Success = 6 => "SUCCESS",
        Failure = 7 => "FAILURE",
        Cancelled = 8 => "CANCELLED",
        Rejected = 9 => "REJECTED",
    }
}

impl JobStatus {
    /// Rank of the status; broadly the order in which a job moves through
    /// them.
    ///
    /// `Failure` has the highest rank so that a failed child dominates the
    /// aggregate status of its composite parent.
    pub fn rank(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Dispatched => 1,
            Self::Received => 2,
            Self::Started => 3,
            Self::Running => 4,
            Self::Success => 5,
            Self::Cancelled => 6,
            Self::Rejected => 7,
            Self::Failure => 8,
        }
    }

    /// Whether the job has ended. No further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failure | Self::Cancelled | Self::Rejected
        )
    }

    /// Whether the job was handed to the broker and has not ended yet.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::Dispatched | Self::Received | Self::Started | Self::Running
        )
    }

    /// Whether this status counts as a failure for a composite parent.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failure | Self::Rejected)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Terminal statuses are final and a status never moves to a lower rank,
    /// which discards late or duplicated broker events.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
