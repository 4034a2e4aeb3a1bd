use chrono::Utc;

pub const MS_PER_MINUTE: u64 = 60_000;

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

pub fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(MS_PER_MINUTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn minutes_saturate() {
        assert_eq!(minutes_to_ms(2), 120_000);
        assert_eq!(minutes_to_ms(u64::MAX), u64::MAX);
    }
}
