use std::cmp::Ordering;

use proptest::prelude::*;

use graft::version::{Version, compare, in_upgrade_window};

fn triple() -> impl Strategy<Value = (u64, u64, u64)> {
    (0u64..200, 0u64..200, 0u64..200)
}

fn render((major, minor, patch): (u64, u64, u64)) -> String {
    format!("{major}.{minor}.{patch}")
}

proptest! {
    #[test]
    fn test_order_is_numeric_per_component(a in triple(), b in triple()) {
        prop_assert_eq!(compare(&render(a), &render(b)).unwrap(), a.cmp(&b));
    }

    #[test]
    fn test_missing_components_are_zero(major in 0u64..1000, minor in 0u64..1000) {
        prop_assert_eq!(
            compare(&format!("{major}.{minor}"), &format!("{major}.{minor}.0")).unwrap(),
            Ordering::Equal
        );
        prop_assert_eq!(
            compare(&major.to_string(), &format!("{major}.0.0")).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_window_excludes_from_includes_to(from in triple(), to in triple()) {
        let from_v = Version::parse(&render(from)).unwrap();
        let to_v = Version::parse(&render(to)).unwrap();
        prop_assert!(!in_upgrade_window(&from_v, &from_v, &to_v));
        prop_assert_eq!(in_upgrade_window(&to_v, &from_v, &to_v), from < to);
    }

    #[test]
    fn test_non_numeric_component_rejected(word in "[a-z]{1,6}") {
        let input = format!("1.{word}.0");
        prop_assert!(compare(&input, "1.0.0").is_err());
    }
}
