//! Snapshot loading and validation
//!
//! A snapshot is an export of the three collections the reports read. Two
//! layouts are accepted:
//! - a JSON object keyed by collection name, each holding an array of documents
//! - NDJSON, one `{"collection": "...", "document": {...}}` record per line

use crate::error::ReportError;
use crate::normalizer::normalize;
use crate::schema::document::{type_name, DocumentDecoder};
use crate::types::{Facility, Member, RawNumber, RawTimestamp, VisitEvent};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub const USERS: &str = "users";
pub const MEMBER_VISITS: &str = "member_visits";
pub const FACILITIES: &str = "facilities";

/// Decoded collections
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub members: Vec<Member>,
    pub visits: Vec<VisitEvent>,
    pub facilities: Vec<Facility>,
    /// Documents that could not be decoded at all
    pub skipped: Vec<SkippedDocument>,
}

/// A document left out of the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub collection: String,
    /// Index of the document within its collection in the source
    pub position: usize,
    pub reason: String,
}

#[derive(Deserialize)]
struct TaggedDocument {
    collection: String,
    document: Value,
}

impl Snapshot {
    /// Read and parse a snapshot file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReportError::SnapshotError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&contents)
    }

    /// Parse either snapshot layout, detected from the content
    pub fn parse(input: &str) -> Result<Self, ReportError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ReportError::SnapshotError("snapshot is empty".into()));
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(obj)) if !obj.contains_key("collection") => {
                Self::from_collections(&Value::Object(obj))
            }
            Ok(Value::Object(_)) | Err(_) => Self::parse_ndjson(trimmed),
            Ok(other) => Err(ReportError::SnapshotError(format!(
                "expected an object of collections, found {}",
                type_name(&other)
            ))),
        }
    }

    /// Parse the object-of-collections layout
    pub fn from_collections(root: &Value) -> Result<Self, ReportError> {
        let obj = root.as_object().ok_or_else(|| {
            ReportError::SnapshotError("snapshot root must be an object".into())
        })?;

        let mut snapshot = Snapshot::default();
        for (name, docs) in obj {
            let Some(docs) = docs.as_array() else {
                return Err(ReportError::SnapshotError(format!(
                    "collection '{name}' must be an array, found {}",
                    type_name(docs)
                )));
            };
            for (position, doc) in docs.iter().enumerate() {
                snapshot.push(name, doc, position);
            }
        }
        snapshot.log_loaded();
        Ok(snapshot)
    }

    /// Parse NDJSON of tagged documents
    pub fn parse_ndjson(ndjson: &str) -> Result<Self, ReportError> {
        let mut snapshot = Snapshot::default();
        // Per-collection document index, counted over the source lines
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let tagged: TaggedDocument = serde_json::from_str(trimmed).map_err(|e| {
                ReportError::SnapshotError(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?;
            let next = positions.entry(tagged.collection.clone()).or_default();
            let position = *next;
            *next += 1;
            snapshot.push(&tagged.collection, &tagged.document, position);
        }
        snapshot.log_loaded();
        Ok(snapshot)
    }

    /// Decode one document; `position` is its index within its collection
    fn push(&mut self, collection: &str, doc: &Value, position: usize) {
        let result = match collection {
            USERS => DocumentDecoder::member(doc).map(|m| self.members.push(m)),
            MEMBER_VISITS => DocumentDecoder::visit(doc, position).map(|v| self.visits.push(v)),
            FACILITIES => DocumentDecoder::facility(doc).map(|f| self.facilities.push(f)),
            other => {
                tracing::debug!(collection = other, "ignoring unknown collection");
                return;
            }
        };

        if let Err(e) = result {
            tracing::warn!(collection, position, error = %e, "skipping undecodable document");
            self.skipped.push(SkippedDocument {
                collection: collection.to_string(),
                position,
                reason: e.to_string(),
            });
        }
    }

    fn log_loaded(&self) {
        tracing::debug!(
            members = self.members.len(),
            visits = self.visits.len(),
            facilities = self.facilities.len(),
            skipped = self.skipped.len(),
            "snapshot loaded"
        );
    }

    /// Count field-level problems that would silently exclude or zero records
    pub fn validate(&self, tz: Tz) -> ValidationReport {
        let mut users = CollectionReport::new(USERS, self.members.len());
        for member in &self.members {
            for membership in &member.memberships {
                users.check_timestamp(&membership.joined_at, tz);
            }
            for booking in &member.bookings {
                users.check_timestamp(&booking.start_time, tz);
            }
        }

        let mut visits = CollectionReport::new(MEMBER_VISITS, self.visits.len());
        for visit in &self.visits {
            visits.check_timestamp(&visit.visited_at, tz);
            visits.check_amount(&visit.amount_spent);
            visits.check_amount(&visit.amount_saved);
            if visit.member_id.is_none() {
                visits.missing_references += 1;
            }
        }

        let mut facilities = CollectionReport::new(FACILITIES, self.facilities.len());
        for facility in &self.facilities {
            if facility.name.as_deref().map(str::trim).unwrap_or("").is_empty() {
                facilities.missing_names += 1;
            }
        }

        let mut report = ValidationReport {
            collections: vec![users, visits, facilities],
            skipped: self.skipped.clone(),
        };
        for collection in &mut report.collections {
            collection.skipped = self
                .skipped
                .iter()
                .filter(|s| s.collection == collection.name)
                .count();
            if !collection.is_clean() {
                tracing::warn!(
                    collection = %collection.name,
                    invalid_timestamps = collection.invalid_timestamps,
                    invalid_amounts = collection.invalid_amounts,
                    "collection has documents that reports will exclude or zero"
                );
            }
        }
        report
    }
}

/// Problems found in one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub name: String,
    pub documents: usize,
    pub skipped: usize,
    /// Absent or null date fields
    pub missing_timestamps: usize,
    /// Present date fields that do not normalize
    pub invalid_timestamps: usize,
    /// Present amount fields that coerce to zero
    pub invalid_amounts: usize,
    pub missing_references: usize,
    pub missing_names: usize,
}

impl CollectionReport {
    fn new(name: &str, documents: usize) -> Self {
        Self {
            name: name.to_string(),
            documents,
            skipped: 0,
            missing_timestamps: 0,
            invalid_timestamps: 0,
            invalid_amounts: 0,
            missing_references: 0,
            missing_names: 0,
        }
    }

    fn check_timestamp(&mut self, raw: &RawTimestamp, tz: Tz) {
        match raw {
            RawTimestamp::Missing => self.missing_timestamps += 1,
            other if normalize(other, tz).is_none() => self.invalid_timestamps += 1,
            _ => {}
        }
    }

    fn check_amount(&mut self, raw: &RawNumber) {
        let valid = match raw {
            RawNumber::Missing => true,
            RawNumber::Int(_) => true,
            RawNumber::Double(v) => v.is_finite(),
            RawNumber::Decimal(s) | RawNumber::Text(s) => {
                s.trim().parse::<f64>().map(f64::is_finite).unwrap_or(false)
            }
            RawNumber::Unsupported(_) => false,
        };
        if !valid {
            self.invalid_amounts += 1;
        }
    }

    pub fn is_clean(&self) -> bool {
        self.skipped == 0 && self.invalid_timestamps == 0 && self.invalid_amounts == 0
    }
}

/// Result of [`Snapshot::validate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub collections: Vec<CollectionReport>,
    pub skipped: Vec<SkippedDocument>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.collections.iter().all(CollectionReport::is_clean)
    }
}
