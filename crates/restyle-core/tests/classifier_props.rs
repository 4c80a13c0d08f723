use proptest::prelude::*;
use restyle_core::{ErrorClassifier, ErrorKind, RetryConfig};
use std::time::Duration;

fn keyword() -> impl Strategy<Value = (&'static str, ErrorKind)> {
    prop_oneof![
        Just(("request timed out", ErrorKind::Transient)),
        Just(("rate limit exceeded", ErrorKind::Transient)),
        Just(("node is locked", ErrorKind::Partial)),
        Just(("layer is read-only", ErrorKind::Partial)),
        Just(("style not found", ErrorKind::Validation)),
        Just(("malformed payload", ErrorKind::Validation)),
        Just(("permission denied", ErrorKind::Persistent)),
    ]
}

#[test]
fn test_unrecognized_is_persistent() {
    let classifier = ErrorClassifier::new();
    assert_eq!(classifier.classify_message("something odd happened"), ErrorKind::Persistent);
    assert_eq!(classifier.classify_message(""), ErrorKind::Persistent);
}

proptest! {
    #[test]
    fn prop_keyword_decides_kind_in_any_case(
        (message, kind) in keyword(),
        prefix in "[a-z ]{0,12}",
        upper in any::<bool>(),
    ) {
        let text = format!("{prefix} {message}");
        let text = if upper { text.to_uppercase() } else { text };
        prop_assert_eq!(ErrorClassifier::new().classify_message(&text), kind);
    }

    #[test]
    fn prop_only_transient_is_retryable((_, kind) in keyword()) {
        prop_assert_eq!(kind.is_retryable(), kind == ErrorKind::Transient);
    }

    #[test]
    fn prop_backoff_reuses_last_delay(retry in 0u32..64) {
        let config = RetryConfig::default();
        let delay = config.backoff_delay(retry);
        prop_assert!(delay <= Duration::from_millis(4000));
        if retry >= 2 {
            prop_assert_eq!(delay, Duration::from_millis(4000));
        }
    }
}
