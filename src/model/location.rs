//! Location state of a tablet and the assignment state machine
//!
//! A tablet moves through three locations:
//!
//! ```text
//!   unassigned --assign_future--> future=S --promote(S)--> current=S
//!        ^                            |                        |
//!        +---------- unassign --------+------------------------+
//! ```
//!
//! At most one of `current` and `future` is ever set. `last` survives unassignment
//! so operators can see where a tablet was hosted before it went away.

use crate::common::{Error, Result};
use crate::model::{KeyExtent, ServerSession};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The location columns of one tablet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locations {
    pub current: Option<ServerSession>,
    pub future: Option<ServerSession>,
    pub last: Option<ServerSession>,
}

/// Outcome of applying a state machine step to observed locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Write these locations
    Apply(Locations),
    /// The observed state already is the requested outcome
    AlreadyApplied,
    /// The precondition does not hold
    Reject(String),
}

impl Locations {
    /// Install `server` as the future location.
    pub fn assign_future(&self, server: &ServerSession) -> Transition {
        match (&self.current, &self.future) {
            (Some(current), _) => Transition::Reject(format!("tablet is hosted by {}", current)),
            (None, Some(future)) if future == server => Transition::AlreadyApplied,
            (None, Some(future)) => {
                Transition::Reject(format!("tablet is already assigned to {}", future))
            }
            (None, None) => Transition::Apply(Locations {
                future: Some(server.clone()),
                ..self.clone()
            }),
        }
    }

    /// Promote the future location to current on behalf of `server`.
    pub fn promote(&self, server: &ServerSession) -> Transition {
        match (&self.current, &self.future) {
            (None, Some(future)) if future == server => Transition::Apply(Locations {
                current: Some(server.clone()),
                future: None,
                last: Some(server.clone()),
            }),
            (Some(current), None) if current == server => Transition::AlreadyApplied,
            (Some(current), _) => Transition::Reject(format!("tablet is hosted by {}", current)),
            (None, Some(future)) => Transition::Reject(format!(
                "tablet is assigned to {}, not {}",
                future, server
            )),
            (None, None) => Transition::Reject("tablet is not assigned".into()),
        }
    }

    /// Clear current and future, provided they still are what the caller saw.
    pub fn unassign(
        &self,
        seen_current: Option<&ServerSession>,
        seen_future: Option<&ServerSession>,
    ) -> Transition {
        if self.current.is_none() && self.future.is_none() {
            return Transition::AlreadyApplied;
        }
        if self.current.as_ref() != seen_current || self.future.as_ref() != seen_future {
            return Transition::Reject(format!(
                "locations changed since scan: current={} future={}",
                display_opt(&self.current),
                display_opt(&self.future)
            ));
        }
        Transition::Apply(Locations {
            current: None,
            future: None,
            last: self.current.clone().or_else(|| self.last.clone()),
        })
    }
}

fn display_opt(session: &Option<ServerSession>) -> String {
    session
        .as_ref()
        .map_or_else(|| "-".to_string(), |s| s.to_string())
}

/// Classification of a tablet against the set of live tablet servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabletState {
    Unassigned,
    Assigned,
    Hosted,
    AssignedToDeadServer,
}

impl fmt::Display for TabletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabletState::Unassigned => write!(f, "unassigned"),
            TabletState::Assigned => write!(f, "assigned"),
            TabletState::Hosted => write!(f, "hosted"),
            TabletState::AssignedToDeadServer => write!(f, "assigned_to_dead_server"),
        }
    }
}

/// Snapshot of one tablet's locations as read from a state store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LocationFields")]
pub struct LocationState {
    extent: KeyExtent,
    locations: Locations,
    walogs: Vec<String>,
}

#[derive(Deserialize)]
struct LocationFields {
    extent: KeyExtent,
    locations: Locations,
    walogs: Vec<String>,
}

impl TryFrom<LocationFields> for LocationState {
    type Error = Error;

    fn try_from(fields: LocationFields) -> Result<Self> {
        LocationState::from_locations(fields.extent, fields.locations, fields.walogs)
    }
}

impl LocationState {
    pub fn new(
        extent: KeyExtent,
        current: Option<ServerSession>,
        future: Option<ServerSession>,
        last: Option<ServerSession>,
        walogs: Vec<String>,
    ) -> Result<Self> {
        Self::from_locations(
            extent,
            Locations {
                current,
                future,
                last,
            },
            walogs,
        )
    }

    pub fn from_locations(
        extent: KeyExtent,
        locations: Locations,
        walogs: Vec<String>,
    ) -> Result<Self> {
        if let (Some(current), Some(future)) = (&locations.current, &locations.future) {
            return Err(Error::MalformedRecord(format!(
                "{} has both current location {} and future location {}",
                extent, current, future
            )));
        }
        Ok(Self {
            extent,
            locations,
            walogs,
        })
    }

    pub fn extent(&self) -> &KeyExtent {
        &self.extent
    }

    pub fn current(&self) -> Option<&ServerSession> {
        self.locations.current.as_ref()
    }

    pub fn future(&self) -> Option<&ServerSession> {
        self.locations.future.as_ref()
    }

    pub fn last(&self) -> Option<&ServerSession> {
        self.locations.last.as_ref()
    }

    pub fn locations(&self) -> &Locations {
        &self.locations
    }

    /// Write-ahead logs the tablet still depends on
    pub fn walogs(&self) -> &[String] {
        &self.walogs
    }

    /// The server the tablet is on or moving to
    pub fn server(&self) -> Option<&ServerSession> {
        self.current().or_else(|| self.future())
    }

    pub fn state(&self, live: &HashSet<ServerSession>) -> TabletState {
        match (self.current(), self.future()) {
            (None, None) => TabletState::Unassigned,
            (Some(current), _) if live.contains(current) => TabletState::Hosted,
            (None, Some(future)) if live.contains(future) => TabletState::Assigned,
            _ => TabletState::AssignedToDeadServer,
        }
    }
}

impl fmt::Display for LocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@(current={},future={},last={})",
            self.extent,
            display_opt(&self.locations.current),
            display_opt(&self.locations.future),
            display_opt(&self.locations.last)
        )
    }
}
