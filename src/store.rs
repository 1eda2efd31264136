//! Document store access
//!
//! Reports never touch storage directly. They ask a [`DocumentStore`] for the
//! documents they need, already scoped to a vendor where the query allows it.

use crate::error::ReportError;
use crate::metrics::visit_matches_vendor;
use crate::schema::Snapshot;
use crate::types::{Booking, Facility, Membership, ObjectId, VisitEvent};
use std::collections::HashSet;

/// A member together with their memberships of one vendor, in document order
#[derive(Debug, Clone)]
pub struct VendorMember {
    pub member: ObjectId,
    pub memberships: Vec<Membership>,
}

/// Read-only queries the reports run
pub trait DocumentStore: Send + Sync {
    /// Members holding at least one membership of `vendor`
    fn members_of_vendor(&self, vendor: &ObjectId) -> Result<Vec<VendorMember>, ReportError>;

    /// Visits recorded against `vendor`
    fn visits_for_vendor(&self, vendor: &ObjectId) -> Result<Vec<VisitEvent>, ReportError>;

    /// Visits of the given members recorded against `vendor`
    fn visits_for_members(
        &self,
        vendor: &ObjectId,
        members: &[ObjectId],
    ) -> Result<Vec<VisitEvent>, ReportError>;

    /// Every embedded booking of every member
    fn bookings(&self) -> Result<Vec<Booking>, ReportError>;

    /// Facilities owned by `vendor`
    fn facilities_for_vendor(&self, vendor: &ObjectId) -> Result<Vec<Facility>, ReportError>;
}

/// In-memory store over a loaded snapshot
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    snapshot: Snapshot,
}

impl SnapshotStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl From<Snapshot> for SnapshotStore {
    fn from(snapshot: Snapshot) -> Self {
        Self::new(snapshot)
    }
}

impl DocumentStore for SnapshotStore {
    fn members_of_vendor(&self, vendor: &ObjectId) -> Result<Vec<VendorMember>, ReportError> {
        Ok(self
            .snapshot
            .members
            .iter()
            .filter_map(|m| {
                let memberships: Vec<Membership> = m
                    .memberships
                    .iter()
                    .filter(|ms| ms.belongs_to(vendor))
                    .cloned()
                    .collect();
                (!memberships.is_empty()).then(|| VendorMember {
                    member: m.id,
                    memberships,
                })
            })
            .collect())
    }

    fn visits_for_vendor(&self, vendor: &ObjectId) -> Result<Vec<VisitEvent>, ReportError> {
        Ok(self
            .snapshot
            .visits
            .iter()
            .filter(|v| visit_matches_vendor(v, vendor))
            .cloned()
            .collect())
    }

    fn visits_for_members(
        &self,
        vendor: &ObjectId,
        members: &[ObjectId],
    ) -> Result<Vec<VisitEvent>, ReportError> {
        let wanted: HashSet<String> = members.iter().map(ObjectId::to_hex).collect();
        Ok(self
            .snapshot
            .visits
            .iter()
            .filter(|v| visit_matches_vendor(v, vendor))
            .filter(|v| v.member_id.as_ref().is_some_and(|m| wanted.contains(&m.key())))
            .cloned()
            .collect())
    }

    fn bookings(&self) -> Result<Vec<Booking>, ReportError> {
        Ok(self
            .snapshot
            .members
            .iter()
            .flat_map(|m| m.bookings.iter().cloned())
            .collect())
    }

    fn facilities_for_vendor(&self, vendor: &ObjectId) -> Result<Vec<Facility>, ReportError> {
        Ok(self
            .snapshot
            .facilities
            .iter()
            .filter(|f| f.vendor_id.as_ref().is_some_and(|r| r.refers_to(vendor)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VENDOR: &str = "67f773acc9504931fcc411ec";

    fn store() -> SnapshotStore {
        let snapshot = Snapshot::from_collections(&json!({
            "users": [
                {
                    "_id": {"$oid": "64b000000000000000000001"},
                    "userLoyaltyTier": [
                        {"vendorId": VENDOR, "totalVisits": 2},
                        {"vendorId": "67f773acc9504931fcc41100", "totalVisits": 9}
                    ],
                    "bookings": [{"serviceId": VENDOR}, {"serviceId": VENDOR}]
                },
                {
                    "_id": {"$oid": "64b000000000000000000002"},
                    "userLoyaltyTier": [{"vendorId": "67f773acc9504931fcc41100"}],
                    "bookings": [{"serviceId": VENDOR}]
                }
            ],
            "member_visits": [
                {"_id": "a", "memberId": {"$oid": "64b000000000000000000001"}, "vendorId": {"$oid": VENDOR}},
                {"_id": "b", "memberId": "64b000000000000000000002", "vendorId": VENDOR},
                {"_id": "c", "memberId": "64b000000000000000000001", "vendorId": "67f773acc9504931fcc41100"}
            ],
            "facilities": [
                {"_id": "64f000000000000000000001", "vendorId": {"$oid": VENDOR}, "name": "Pool"},
                {"_id": "64f000000000000000000002", "vendorId": "67f773acc9504931fcc41100", "name": "Gym"}
            ]
        }))
        .unwrap();
        SnapshotStore::new(snapshot)
    }

    fn vendor() -> ObjectId {
        ObjectId::parse_str(VENDOR).unwrap()
    }

    #[test]
    fn test_members_are_scoped_by_membership() {
        let members = store().members_of_vendor(&vendor()).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].memberships.len(), 1);
    }

    #[test]
    fn test_visit_queries() {
        let store = store();
        assert_eq!(store.visits_for_vendor(&vendor()).unwrap().len(), 2);

        let member = ObjectId::parse_str("64b000000000000000000001").unwrap();
        let visits = store.visits_for_members(&vendor(), &[member]).unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].id.key(), "a");
    }

    #[test]
    fn test_bookings_are_unwound() {
        assert_eq!(store().bookings().unwrap().len(), 3);
    }

    #[test]
    fn test_facilities_for_vendor() {
        let facilities = store().facilities_for_vendor(&vendor()).unwrap();
        assert_eq!(facilities.len(), 1);
        assert_eq!(facilities[0].name.as_deref(), Some("Pool"));
    }
}
