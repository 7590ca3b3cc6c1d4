//! Small free functions shared across layers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Integer ceiling division.
pub fn ceil_division(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

/// Seconds since the Unix epoch, used for inode timestamps.
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_division_rounds_up() {
        assert_eq!(ceil_division(0, 4), 0);
        assert_eq!(ceil_division(1, 4), 1);
        assert_eq!(ceil_division(4, 4), 1);
        assert_eq!(ceil_division(5, 4), 2);
    }
}
