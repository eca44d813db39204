//! Typed ID definitions for IIB's resources.
//!
//! All of these are database-assigned monotone integers (see
//! `define_int_id!`), not client-generated tokens: a request's identity is
//! its primary key, and that key is what appears in `/builds/<id>`.

use crate::define_int_id;

define_int_id!(RequestId);
define_int_id!(RequestStateId);
define_int_id!(BatchId);
define_int_id!(ImageId);
define_int_id!(ArchitectureId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_roundtrip() {
        let id = RequestId::new(42);
        let s = id.to_string();
        let parsed: RequestId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_request_id_json_roundtrip() {
        let id = RequestId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let parsed: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_request_id_ordering() {
        assert!(RequestId::new(1) < RequestId::new(2));
    }

    #[test]
    fn test_batch_id_from_into_i64() {
        let id: BatchId = 5i64.into();
        let raw: i64 = id.into();
        assert_eq!(raw, 5);
    }

    #[test]
    fn test_request_id_parse_rejects_non_numeric() {
        let result: Result<RequestId, _> = "not-a-number".parse();
        assert!(result.is_err());
    }
}
