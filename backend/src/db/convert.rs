//! Checked conversions between domain integers and SQL BIGINT columns.

use anyhow::anyhow;

pub fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    i64::try_from(v).map_err(|_| anyhow!("u64 too large for i64: {v}"))
}

pub fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    u64::try_from(v).map_err(|_| anyhow!("negative i64 where u64 expected: {v}"))
}

pub fn usize_to_i64(v: usize) -> anyhow::Result<i64> {
    i64::try_from(v).map_err(|_| anyhow!("usize too large for i64: {v}"))
}

pub fn i64_to_usize(v: i64) -> anyhow::Result<usize> {
    usize::try_from(v).map_err(|_| anyhow!("i64 out of range for usize: {v}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range() {
        assert!(u64_to_i64(u64::MAX).is_err());
        assert!(i64_to_u64(-1).is_err());
        assert!(i64_to_usize(-5).is_err());
        assert_eq!(u64_to_i64(42).unwrap(), 42);
        assert_eq!(i64_to_u64(42).unwrap(), 42);
    }
}
