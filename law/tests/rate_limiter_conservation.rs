//! Property 3: the rate limiter neither drops nor manufactures bytes, and no
//! single grant exceeds the configured limit.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]
    #[test]
    fn conserves_total_bytes_and_never_exceeds_limit(
        limit in 1u64..=10_000,
        total in 1usize..=50_000,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result: Result<(), TestCaseError> = runtime.block_on(async move {
            let limiter = law::pipeline::RateLimiter::new(limit, Duration::from_millis(5));
            let mut remaining = total;
            while remaining > 0 {
                let grant = limiter.reserve(remaining).await.unwrap();
                prop_assert!(grant as u64 <= limit);
                remaining -= grant;
            }
            Ok(())
        });
        result?;
    }
}
