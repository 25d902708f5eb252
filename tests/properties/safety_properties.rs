use proptest::prelude::*;

use graft::utils::path_policy::normalize_relative;

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_-]{1,8}"
}

proptest! {
    #[test]
    fn test_parent_segments_always_rejected(
        before in prop::collection::vec(segment(), 0..4),
        after in prop::collection::vec(segment(), 0..4),
    ) {
        let mut parts = before;
        parts.push("..".to_string());
        parts.extend(after);
        prop_assert!(normalize_relative(&parts.join("/")).is_err());
    }

    #[test]
    fn test_absolute_paths_rejected(parts in prop::collection::vec(segment(), 1..4)) {
        let absolute = format!("/{}", parts.join("/"));
        prop_assert!(normalize_relative(&absolute).is_err());
    }

    #[test]
    fn test_clean_paths_survive_noise(parts in prop::collection::vec(segment(), 1..5)) {
        let noisy = format!("./{}", parts.join("//"));
        let normalized = normalize_relative(&noisy).unwrap();
        prop_assert_eq!(normalized, std::path::PathBuf::from(parts.join("/")));
    }

    #[test]
    fn test_engine_directory_is_reserved(rest in prop::collection::vec(segment(), 0..3)) {
        let mut path = ".graft".to_string();
        for part in rest {
            path.push('/');
            path.push_str(&part);
        }
        prop_assert!(normalize_relative(&path).is_err());
    }
}
