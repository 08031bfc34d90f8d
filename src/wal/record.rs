//! WAL record framing and serialization

use crate::{Result, SeqNo, StorageError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// A single logged write. A `None` value records a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalRecord {
    /// Sequence number assigned at write time
    pub seq: SeqNo,
    /// Record key
    pub key: Vec<u8>,
    /// Record value, `None` for tombstones
    pub value: Option<Vec<u8>>,
}

impl WalRecord {
    /// Serialize the record with length prefix and CRC checksum
    ///
    /// Format:
    /// - 4 bytes: frame length (excluding this field)
    /// - N bytes: bincode payload
    /// - 4 bytes: CRC32 over the payload
    pub fn encode(&self) -> Result<Bytes> {
        let payload =
            bincode::serialize(self).map_err(|e| StorageError::InvalidFormat(e.to_string()))?;

        let mut buf = BytesMut::with_capacity(payload.len() + 8);
        buf.put_u32_le(payload.len() as u32 + 4);
        buf.put_slice(&payload);
        buf.put_u32_le(crc32fast::hash(&payload));
        Ok(buf.freeze())
    }

    /// Decode one record from the front of `data`, validating its checksum.
    /// Returns the record and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(StorageError::InvalidFormat("record too short".into()));
        }

        let mut cursor = std::io::Cursor::new(data);
        let len = cursor.get_u32_le() as usize;
        if len < 4 || data.len() < 4 + len {
            return Err(StorageError::InvalidFormat("incomplete record".into()));
        }

        let payload = &data[4..4 + len - 4];
        let expected = {
            let mut c = std::io::Cursor::new(&data[len..4 + len]);
            c.get_u32_le()
        };
        let actual = crc32fast::hash(payload);
        if expected != actual {
            return Err(StorageError::ChecksumMismatch { expected, actual });
        }

        let record = bincode::deserialize(payload)
            .map_err(|e| StorageError::InvalidFormat(e.to_string()))?;
        Ok((record, 4 + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let record = WalRecord {
            seq: 42,
            key: b"user:00000001".to_vec(),
            value: Some(b"payload".to_vec()),
        };

        let encoded = record.encode().unwrap();
        let (decoded, consumed) = WalRecord::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_tombstone_round_trip() {
        let record = WalRecord {
            seq: 7,
            key: b"gone".to_vec(),
            value: None,
        };

        let encoded = record.encode().unwrap();
        let (decoded, _) = WalRecord::decode(&encoded).unwrap();
        assert!(decoded.value.is_none());
    }

    #[test]
    fn test_checksum_validation() {
        let record = WalRecord {
            seq: 1,
            key: b"key".to_vec(),
            value: Some(b"value".to_vec()),
        };

        let mut corrupted = record.encode().unwrap().to_vec();
        corrupted[8] ^= 0xFF;

        let result = WalRecord::decode(&corrupted);
        assert!(matches!(
            result,
            Err(StorageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_short_input() {
        assert!(WalRecord::decode(&[0x01, 0x02]).is_err());

        let record = WalRecord {
            seq: 1,
            key: b"key".to_vec(),
            value: None,
        };
        let encoded = record.encode().unwrap();
        // Truncated frame looks like an incomplete tail
        let result = WalRecord::decode(&encoded[..encoded.len() - 2]);
        assert!(matches!(result, Err(StorageError::InvalidFormat(_))));
    }
}
