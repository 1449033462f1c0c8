//! Semaphore helper for bounding concurrent builds

use std::sync::Arc;
use tokio::sync::Semaphore;

/// Create a semaphore with at least one permit
#[must_use]
pub fn create_semaphore(permits: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(permits.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_permits_still_allows_one() {
        let semaphore = create_semaphore(0);
        assert_eq!(semaphore.available_permits(), 1);
        assert_eq!(create_semaphore(3).available_permits(), 3);
    }
}
