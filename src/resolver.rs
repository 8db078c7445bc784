//! Responsibility resolution
//!
//! Maps a (classification, ticket) pair onto the two people who must act on
//! it: the person directly responsible for that kind of incident on the
//! ticket's journey, and the route in-charge. Lookup data comes from a roster
//! file loaded once at startup and shared read-only.
//!
//! ```toml
//! [tickets.PNR123]
//! route_incharge = "RI-02"
//!
//! [tickets.PNR123.responsible]
//! violence = "CRPF-07"
//! default = "TT-11"
//! ```

use crate::classifier::ClassificationTag;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Key in a ticket's `responsible` table used when the tag has no entry
pub const DEFAULT_RESPONSIBLE_KEY: &str = "default";

/// Requester-supplied ticket identifier (PNR)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketReference(String);

impl TicketReference {
    /// Trimmed reference, or `None` when nothing usable was supplied
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two identifiers a routing directive carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsibilityRecord {
    pub responsible_person: String,
    pub route_incharge: String,
}

/// Lookup failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LookupError {
    #[error("No record found for ticket {0}")]
    UnknownTicket(String),

    #[error("Ticket {ticket} has no responsible person for category '{tag}'")]
    NoResponsible { ticket: String, tag: String },
}

/// Resolves who is responsible for a classified incident
pub trait ResponsibilityResolver: Send + Sync {
    fn resolve(
        &self,
        tag: &ClassificationTag,
        ticket: &TicketReference,
    ) -> Result<ResponsibilityRecord, LookupError>;
}

/// One ticket's staffing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub route_incharge: String,
    /// Category -> person; `default` catches every other category
    #[serde(default)]
    pub responsible: HashMap<String, String>,
}

/// Roster loading errors
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Failed to read roster file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse roster TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid roster entry for ticket {ticket}: {reason}")]
    InvalidEntry { ticket: String, reason: String },
}

/// Immutable ticket roster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    tickets: HashMap<String, RosterEntry>,
}

impl Roster {
    pub fn load_from_file(path: &Path) -> Result<Self, RosterError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, RosterError> {
        let parsed: Roster = toml::from_str(content)?;

        // Keys are normalised; two raw keys landing on the same one are rejected
        // so resolution never depends on map iteration order.
        let mut tickets = HashMap::with_capacity(parsed.tickets.len());
        for (raw_ticket, entry) in parsed.tickets {
            let ticket = raw_ticket.trim().to_string();
            if entry.route_incharge.trim().is_empty() {
                return Err(RosterError::InvalidEntry {
                    ticket,
                    reason: "route_incharge is empty".to_string(),
                });
            }

            let mut responsible = HashMap::with_capacity(entry.responsible.len());
            for (category, person) in entry.responsible {
                let key = category.trim().to_lowercase();
                if responsible.insert(key.clone(), person).is_some() {
                    return Err(RosterError::InvalidEntry {
                        ticket,
                        reason: format!("category '{key}' is listed more than once"),
                    });
                }
            }

            if tickets.contains_key(&ticket) {
                return Err(RosterError::InvalidEntry {
                    reason: "ticket is listed more than once".to_string(),
                    ticket,
                });
            }
            tickets.insert(
                ticket,
                RosterEntry {
                    route_incharge: entry.route_incharge,
                    responsible,
                },
            );
        }

        Ok(Self { tickets })
    }

    pub fn with_entry(mut self, ticket: impl Into<String>, entry: RosterEntry) -> Self {
        self.tickets.insert(ticket.into(), entry);
        self
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn entry(&self, ticket: &TicketReference) -> Option<&RosterEntry> {
        self.tickets.get(ticket.as_str())
    }
}

impl ResponsibilityResolver for Roster {
    fn resolve(
        &self,
        tag: &ClassificationTag,
        ticket: &TicketReference,
    ) -> Result<ResponsibilityRecord, LookupError> {
        let entry = self
            .entry(ticket)
            .ok_or_else(|| LookupError::UnknownTicket(ticket.to_string()))?;

        let responsible_person = entry
            .responsible
            .get(tag.as_str())
            .or_else(|| entry.responsible.get(DEFAULT_RESPONSIBLE_KEY))
            .ok_or_else(|| LookupError::NoResponsible {
                ticket: ticket.to_string(),
                tag: tag.to_string(),
            })?;

        Ok(ResponsibilityRecord {
            responsible_person: responsible_person.clone(),
            route_incharge: entry.route_incharge.clone(),
        })
    }
}
