//! Snowflake 分布式 ID 生成器
//!
//! 64 位布局（最高位恒为 0）：
//!
//! ```text
//! | 41 bit 毫秒时间戳（相对纪元） | 10 bit 实例 ID | 12 bit 序列号 |
//! ```
//!
//! 同一实例内生成的 ID 严格递增；时钟回拨时沿用上一次的时间戳，
//! 序列号溢出时时间戳人为前进 1 毫秒。

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use serde::{Deserialize, Serialize};
use xoidc_errors::{AppError, AppResult};

/// 纪元（Unix 毫秒）
pub const SNOWFLAKE_EPOCH_MILLIS: i64 = 1_676_620_020_347;

const INSTANCE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_SHIFT: u32 = INSTANCE_BITS + SEQUENCE_BITS;

/// 实例 ID 上限
pub const MAX_INSTANCE_ID: u16 = (1 << INSTANCE_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// Snowflake ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnowflakeId(i64);

impl SnowflakeId {
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// 相对纪元的毫秒数
    pub fn timestamp_offset(&self) -> i64 {
        self.0 >> TIMESTAMP_SHIFT
    }

    /// Unix 毫秒时间戳
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_offset() + SNOWFLAKE_EPOCH_MILLIS
    }

    pub fn instance_id(&self) -> u16 {
        ((self.0 >> SEQUENCE_BITS) & i64::from(MAX_INSTANCE_ID)) as u16
    }

    pub fn sequence(&self) -> u16 {
        (self.0 & i64::from(MAX_SEQUENCE)) as u16
    }

    /// 8 字节大端序
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| AppError::validation("snowflake id must be 8 bytes"))?;
        Ok(Self(i64::from_be_bytes(arr)))
    }

    /// 标准 base64（带填充）
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// URL 安全 base64（带填充）
    pub fn to_base64_url(&self) -> String {
        URL_SAFE.encode(self.to_bytes())
    }

    pub fn parse_base64(s: &str) -> AppResult<Self> {
        let bytes = STANDARD
            .decode(s)
            .map_err(|e| AppError::validation(format!("invalid base64 snowflake id: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn parse_base64_url(s: &str) -> AppResult<Self> {
        let bytes = URL_SAFE
            .decode(s)
            .map_err(|e| AppError::validation(format!("invalid base64 snowflake id: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SnowflakeId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|e| AppError::validation(format!("invalid snowflake id: {}", e)))
    }
}

#[derive(Debug)]
struct GeneratorState {
    last_timestamp: i64,
    sequence: u16,
}

/// Snowflake 生成器，可在线程间共享
#[derive(Debug)]
pub struct SnowflakeGenerator {
    instance_id: u16,
    state: Mutex<GeneratorState>,
}

impl SnowflakeGenerator {
    /// 创建生成器，实例 ID 必须在 0..=1023 范围内
    pub fn new(instance_id: u16) -> AppResult<Self> {
        if instance_id > MAX_INSTANCE_ID {
            return Err(AppError::validation(format!(
                "snowflake instance id {} out of range 0..={}",
                instance_id, MAX_INSTANCE_ID
            )));
        }
        Ok(Self {
            instance_id,
            state: Mutex::new(GeneratorState {
                last_timestamp: -1,
                sequence: 0,
            }),
        })
    }

    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }

    /// 生成下一个 ID
    pub fn next_id(&self) -> SnowflakeId {
        let now = chrono::Utc::now().timestamp_millis() - SNOWFLAKE_EPOCH_MILLIS;
        self.next_id_at(now)
    }

    fn next_id_at(&self, now_offset: i64) -> SnowflakeId {
        // 锁内无 panic 路径，中毒时直接沿用内部状态
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut timestamp = now_offset.max(state.last_timestamp).max(0);

        if timestamp == state.last_timestamp {
            if state.sequence == MAX_SEQUENCE {
                timestamp += 1;
                state.sequence = 0;
            } else {
                state.sequence += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp = timestamp;

        SnowflakeId(
            (timestamp << TIMESTAMP_SHIFT)
                | (i64::from(self.instance_id) << SEQUENCE_BITS)
                | i64::from(state.sequence),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_rejects_out_of_range_instance() {
        assert!(SnowflakeGenerator::new(1024).is_err());
        assert!(SnowflakeGenerator::new(1023).is_ok());
    }

    #[test]
    fn test_fields_decode() {
        let generator = SnowflakeGenerator::new(7).unwrap();
        let id = generator.next_id_at(1000);
        assert_eq!(id.timestamp_offset(), 1000);
        assert_eq!(id.timestamp_millis(), SNOWFLAKE_EPOCH_MILLIS + 1000);
        assert_eq!(id.instance_id(), 7);
        assert_eq!(id.sequence(), 0);
    }

    #[test]
    fn test_same_millisecond_increments_sequence() {
        let generator = SnowflakeGenerator::new(1).unwrap();
        let a = generator.next_id_at(50);
        let b = generator.next_id_at(50);
        assert_eq!(b.sequence(), a.sequence() + 1);
        assert!(b > a);
    }

    #[test]
    fn test_clock_regression_is_clamped() {
        let generator = SnowflakeGenerator::new(1).unwrap();
        let a = generator.next_id_at(500);
        let b = generator.next_id_at(400);
        assert_eq!(b.timestamp_offset(), 500);
        assert!(b > a);
    }

    #[test]
    fn test_sequence_overflow_advances_timestamp() {
        let generator = SnowflakeGenerator::new(3).unwrap();
        let mut last = generator.next_id_at(10);
        for _ in 0..MAX_SEQUENCE {
            let id = generator.next_id_at(10);
            assert!(id > last);
            last = id;
        }
        assert_eq!(last.sequence(), MAX_SEQUENCE);

        let overflow = generator.next_id_at(10);
        assert_eq!(overflow.timestamp_offset(), 11);
        assert_eq!(overflow.sequence(), 0);
        assert!(overflow > last);
    }

    #[test]
    fn test_burst_is_unique_and_increasing() {
        let generator = SnowflakeGenerator::new(42).unwrap();
        let mut prev = generator.next_id();
        for _ in 0..10_000 {
            let id = generator.next_id();
            assert!(id > prev);
            prev = id;
        }
    }

    #[test]
    fn test_concurrent_generation_is_unique() {
        let generator = Arc::new(SnowflakeGenerator::new(9).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..2_000).map(|_| generator.next_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 8_000);
    }

    #[test]
    fn test_encodings() {
        let id = SnowflakeId::from_raw(1_234_567_890_123);
        assert_eq!(id.to_string(), "1234567890123");
        assert_eq!("1234567890123".parse::<SnowflakeId>().unwrap(), id);
        assert_eq!(SnowflakeId::from_bytes(&id.to_bytes()).unwrap(), id);
        assert_eq!(SnowflakeId::parse_base64(&id.to_base64()).unwrap(), id);
        assert_eq!(SnowflakeId::parse_base64_url(&id.to_base64_url()).unwrap(), id);
        assert!(SnowflakeId::from_bytes(&[1, 2, 3]).is_err());
        assert!("abc".parse::<SnowflakeId>().is_err());
    }
}
