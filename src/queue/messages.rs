//! Wire messages for the transcode job protocol
//!
//! Payload bytes travel base64-encoded inside JSON so the messages stay
//! broker-inspectable. The field names are the protocol; do not rename.

use serde::{Deserialize, Serialize};

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        String::serialize(&STANDARD.encode(v), s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Forward job: source bytes for one optimized variant, published to the
/// queue matching the variant's encoding kind.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub variant_id: String,
    #[serde(with = "base64_bytes")]
    pub original_file: Vec<u8>,
}

/// Result: encoded output for a variant, published to the shared result queue.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscodeResult {
    pub variant_id: String,
    #[serde(with = "base64_bytes")]
    pub variant_file: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_round_trips_through_base64_json() {
        let job = TranscodeJob {
            variant_id: "4be0643f-1d98-4573-86e6-df0f36c9b1a2".into(),
            original_file: vec![0xff, 0xd8, 0xff, 0xe0, 0x00],
        };

        let encoded = serde_json::to_vec(&job).unwrap();
        let decoded: TranscodeJob = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(decoded.variant_id, job.variant_id);
        assert_eq!(decoded.original_file, job.original_file);
    }

    #[test]
    fn wire_format_matches_protocol() {
        let result = TranscodeResult {
            variant_id: "test".into(),
            variant_file: b"hello".to_vec(),
        };

        let json: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&result).unwrap()).unwrap();
        assert_eq!(json["variant_id"], "test");
        assert_eq!(json["variant_file"], "aGVsbG8=");
    }

    #[test]
    fn rejects_invalid_base64() {
        let raw = br#"{"variant_id": "x", "original_file": "not base64!!"}"#;
        assert!(serde_json::from_slice::<TranscodeJob>(raw).is_err());
    }
}
