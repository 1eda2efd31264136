//! Extended JSON document decoding
//!
//! Snapshots are exported as MongoDB Extended JSON, in either its relaxed or
//! canonical flavour. Field values are decoded into the loosely-typed
//! variants from [`crate::types`] without judging them; the normalizer
//! decides later what is usable.

use crate::error::ReportError;
use crate::types::{
    Booking, DocRef, Facility, Member, Membership, ObjectId, RawNumber, RawTimestamp, VisitEvent,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Decoder for the `users`, `member_visits` and `facilities` collections
pub struct DocumentDecoder;

impl DocumentDecoder {
    /// Decode a `users` document
    pub fn member(doc: &Value) -> Result<Member, ReportError> {
        let obj = as_object(doc, "users")?;
        let id = required_id(obj, "users")?;

        let memberships = array_field(obj, "userLoyaltyTier")
            .iter()
            .filter_map(Value::as_object)
            .map(|tier| Membership {
                vendor_id: reference_string(tier.get("vendorId")).unwrap_or_default(),
                joined_at: raw_timestamp(tier.get("memberDateJoined")),
                total_visits: raw_number(tier.get("totalVisits")),
            })
            .collect();

        let bookings = array_field(obj, "bookings")
            .iter()
            .filter_map(Value::as_object)
            .map(|b| Booking {
                facility_id: doc_ref(b.get("facilityId")),
                service_id: doc_ref(b.get("serviceId")),
                start_time: raw_timestamp(b.get("startTime")),
                is_active: b.get("isActive").and_then(Value::as_bool),
            })
            .collect();

        Ok(Member {
            id,
            memberships,
            bookings,
        })
    }

    /// Decode a `member_visits` document.
    ///
    /// Visits without an `_id` get a positional one so classification stays
    /// deterministic.
    pub fn visit(doc: &Value, position: usize) -> Result<VisitEvent, ReportError> {
        let obj = as_object(doc, "member_visits")?;

        let tier_display_name = obj
            .get("tier")
            .and_then(Value::as_object)
            .and_then(|tier| tier.get("displayName"))
            .and_then(scalar_string);

        Ok(VisitEvent {
            id: doc_ref(obj.get("_id")).unwrap_or_else(|| DocRef::Str(format!("#{position:08}"))),
            member_id: doc_ref(obj.get("memberId")),
            vendor_id: doc_ref(obj.get("vendorId")),
            visited_at: raw_timestamp(obj.get("visitDate")),
            amount_spent: raw_number(obj.get("amountSpent")),
            amount_saved: raw_number(obj.get("amountSaved")),
            tier_display_name,
        })
    }

    /// Decode a `facilities` document
    pub fn facility(doc: &Value) -> Result<Facility, ReportError> {
        let obj = as_object(doc, "facilities")?;
        Ok(Facility {
            id: required_id(obj, "facilities")?,
            vendor_id: doc_ref(obj.get("vendorId")),
            name: obj.get("name").and_then(scalar_string),
        })
    }
}

fn as_object<'a>(doc: &'a Value, collection: &str) -> Result<&'a Map<String, Value>, ReportError> {
    doc.as_object().ok_or_else(|| {
        ReportError::SnapshotError(format!(
            "{collection}: expected a document, found {}",
            type_name(doc)
        ))
    })
}

fn required_id(obj: &Map<String, Value>, collection: &str) -> Result<ObjectId, ReportError> {
    obj.get("_id").and_then(object_id).ok_or_else(|| {
        ReportError::SnapshotError(format!("{collection}: document without a valid ObjectId _id"))
    })
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// `{"$oid": "<hex>"}` or a bare hex string
pub fn object_id(value: &Value) -> Option<ObjectId> {
    match value {
        Value::String(s) => ObjectId::parse_str(s.trim()),
        Value::Object(obj) => obj.get("$oid").and_then(Value::as_str).and_then(ObjectId::parse_str),
        _ => None,
    }
}

/// A reference in whichever representation it was stored
pub fn doc_ref(value: Option<&Value>) -> Option<DocRef> {
    match value? {
        Value::Object(obj) => {
            let hex = obj.get("$oid")?.as_str()?;
            Some(
                ObjectId::parse_str(hex)
                    .map(DocRef::Oid)
                    .unwrap_or_else(|| DocRef::Str(hex.to_string())),
            )
        }
        Value::String(s) => Some(DocRef::Str(s.clone())),
        Value::Number(n) => Some(DocRef::Str(n.to_string())),
        _ => None,
    }
}

/// String form of a reference (`$oid` payload or the string itself)
fn reference_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(obj) => obj.get("$oid")?.as_str().map(String::from),
        other => scalar_string(other),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Decode a date field
pub fn raw_timestamp(value: Option<&Value>) -> RawTimestamp {
    let Some(value) = value else {
        return RawTimestamp::Missing;
    };
    match value {
        Value::Null => RawTimestamp::Missing,
        Value::String(s) => RawTimestamp::Text(s.clone()),
        Value::Number(n) => n
            .as_f64()
            .map(RawTimestamp::EpochMillis)
            .unwrap_or(RawTimestamp::Unsupported("number")),
        Value::Bool(_) => RawTimestamp::Unsupported("bool"),
        Value::Array(_) => RawTimestamp::Unsupported("array"),
        Value::Object(obj) => {
            if let Some(date) = obj.get("$date") {
                native_date(date)
            } else if let Some(n) = wrapped_number(obj) {
                match n {
                    RawNumber::Int(ms) => RawTimestamp::EpochMillis(ms as f64),
                    RawNumber::Double(ms) => RawTimestamp::EpochMillis(ms),
                    _ => RawTimestamp::Unsupported("object"),
                }
            } else {
                RawTimestamp::Unsupported("object")
            }
        }
    }
}

/// Payload of a `$date` wrapper: ISO string (relaxed) or `$numberLong` (canonical)
fn native_date(date: &Value) -> RawTimestamp {
    let millis = match date {
        Value::String(s) => {
            return match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => RawTimestamp::Native(dt.with_timezone(&Utc)),
                Err(_) => RawTimestamp::Text(s.clone()),
            };
        }
        Value::Number(n) => n.as_i64(),
        Value::Object(obj) => match wrapped_number(obj) {
            Some(RawNumber::Int(ms)) => Some(ms),
            _ => None,
        },
        _ => None,
    };
    millis
        .and_then(DateTime::from_timestamp_millis)
        .map(RawTimestamp::Native)
        .unwrap_or(RawTimestamp::Unsupported("date"))
}

/// Decode a numeric field
pub fn raw_number(value: Option<&Value>) -> RawNumber {
    let Some(value) = value else {
        return RawNumber::Missing;
    };
    match value {
        Value::Null => RawNumber::Missing,
        Value::Number(n) => match n.as_i64() {
            Some(i) => RawNumber::Int(i),
            None => n
                .as_f64()
                .map(RawNumber::Double)
                .unwrap_or(RawNumber::Unsupported("number")),
        },
        Value::String(s) => RawNumber::Text(s.clone()),
        Value::Bool(_) => RawNumber::Unsupported("bool"),
        Value::Array(_) => RawNumber::Unsupported("array"),
        Value::Object(obj) => wrapped_number(obj).unwrap_or(RawNumber::Unsupported("object")),
    }
}

/// `$numberInt`, `$numberLong`, `$numberDouble` and `$numberDecimal` wrappers
fn wrapped_number(obj: &Map<String, Value>) -> Option<RawNumber> {
    if let Some(v) = obj.get("$numberInt").or_else(|| obj.get("$numberLong")) {
        let s = v.as_str()?;
        return Some(
            s.trim()
                .parse::<i64>()
                .map(RawNumber::Int)
                .unwrap_or_else(|_| RawNumber::Text(s.to_string())),
        );
    }
    if let Some(v) = obj.get("$numberDouble") {
        let s = v.as_str()?;
        return Some(
            s.trim()
                .parse::<f64>()
                .map(RawNumber::Double)
                .unwrap_or_else(|_| RawNumber::Text(s.to_string())),
        );
    }
    obj.get("$numberDecimal")
        .and_then(Value::as_str)
        .map(|s| RawNumber::Decimal(s.to_string()))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_decode_member_relaxed() {
        let doc = json!({
            "_id": {"$oid": "64b000000000000000000001"},
            "userLoyaltyTier": [
                {
                    "vendorId": "67f773acc9504931fcc411ec",
                    "memberDateJoined": {"$date": "2025-06-20T02:00:00Z"},
                    "totalVisits": "3"
                },
                "garbage"
            ],
            "bookings": [
                {
                    "facilityId": {"$oid": "64f000000000000000000001"},
                    "serviceId": "67f773acc9504931fcc411ec",
                    "startTime": "2025-06-21T10:00:00",
                    "isActive": false
                }
            ]
        });
        let member = DocumentDecoder::member(&doc).unwrap();
        assert_eq!(member.id.to_hex(), "64b000000000000000000001");
        assert_eq!(member.memberships.len(), 1);
        assert_eq!(
            member.memberships[0].joined_at,
            RawTimestamp::Native(Utc.with_ymd_and_hms(2025, 6, 20, 2, 0, 0).unwrap())
        );
        assert_eq!(member.memberships[0].total_visits, RawNumber::Text("3".into()));
        assert!(member.bookings[0].is_cancelled());
        assert!(matches!(member.bookings[0].facility_id, Some(DocRef::Oid(_))));
        assert!(matches!(member.bookings[0].service_id, Some(DocRef::Str(_))));
    }

    #[test]
    fn test_member_without_id_is_rejected() {
        let err = DocumentDecoder::member(&json!({"userLoyaltyTier": []})).unwrap_err();
        assert!(err.to_string().contains("users"));
        assert!(DocumentDecoder::member(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_decode_visit_canonical() {
        let doc = json!({
            "_id": {"$oid": "650000000000000000000001"},
            "memberId": {"$oid": "64b000000000000000000001"},
            "vendorId": {"$oid": "67f773acc9504931fcc411ec"},
            "visitDate": {"$date": {"$numberLong": "1750384800000"}},
            "amountSpent": {"$numberDecimal": "120.50"},
            "amountSaved": {"$numberInt": "20"},
            "tier": {"displayName": "Gold"}
        });
        let visit = DocumentDecoder::visit(&doc, 0).unwrap();
        assert_eq!(
            visit.visited_at,
            RawTimestamp::Native(DateTime::from_timestamp_millis(1_750_384_800_000).unwrap())
        );
        assert_eq!(visit.amount_spent, RawNumber::Decimal("120.50".into()));
        assert_eq!(visit.amount_saved, RawNumber::Int(20));
        assert_eq!(visit.tier_display_name.as_deref(), Some("Gold"));
    }

    #[test]
    fn test_visit_without_id_gets_positional_id() {
        let visit = DocumentDecoder::visit(&json!({"visitDate": "bad"}), 7).unwrap();
        assert_eq!(visit.id, DocRef::Str("#00000007".into()));
        assert_eq!(visit.member_id, None);
        assert_eq!(visit.visited_at, RawTimestamp::Text("bad".into()));
        assert_eq!(visit.amount_spent, RawNumber::Missing);
    }

    #[test]
    fn test_raw_field_variants() {
        assert_eq!(raw_timestamp(Some(&json!(1.75e12))), RawTimestamp::EpochMillis(1.75e12));
        assert_eq!(raw_timestamp(Some(&json!(true))), RawTimestamp::Unsupported("bool"));
        assert_eq!(raw_timestamp(Some(&Value::Null)), RawTimestamp::Missing);
        assert_eq!(
            raw_timestamp(Some(&json!({"$date": "16/06/2025"}))),
            RawTimestamp::Text("16/06/2025".into())
        );
        assert_eq!(raw_number(Some(&json!(12))), RawNumber::Int(12));
        assert_eq!(raw_number(Some(&json!(12.5))), RawNumber::Double(12.5));
        assert!(matches!(
            raw_number(Some(&json!({"$numberDouble": "NaN"}))),
            RawNumber::Double(v) if v.is_nan()
        ));
        assert_eq!(raw_number(Some(&json!({"x": 1}))), RawNumber::Unsupported("object"));
    }

    #[test]
    fn test_doc_ref_keeps_invalid_oid_as_string() {
        assert_eq!(
            doc_ref(Some(&json!({"$oid": "not-hex"}))),
            Some(DocRef::Str("not-hex".into()))
        );
        assert_eq!(doc_ref(Some(&Value::Null)), None);
        assert_eq!(
            object_id(&json!("64F000000000000000000001")).map(|o| o.to_hex()),
            Some("64f000000000000000000001".to_string())
        );
    }
}
