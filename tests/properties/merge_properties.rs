use proptest::prelude::*;

use graft::merge::{MergeOptions, MergeResult, merge};

fn numbered(count: usize) -> Vec<String> {
    (0..count).map(|n| format!("line {n}\n")).collect()
}

fn text(lines: &[String]) -> String {
    lines.concat()
}

fn lines_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-c]{0,3}\n", 0..12).prop_map(|lines| lines.concat())
}

proptest! {
    #[test]
    fn test_unchanged_current_takes_incoming(base in lines_strategy(), incoming in lines_strategy()) {
        let result = merge(Some(&base), Some(&base), &incoming, &MergeOptions::default());
        prop_assert_eq!(result, MergeResult::Clean(incoming));
    }

    #[test]
    fn test_unchanged_incoming_keeps_current(base in lines_strategy(), current in lines_strategy()) {
        let result = merge(Some(&base), Some(&current), &base, &MergeOptions::default());
        prop_assert_eq!(result, MergeResult::Clean(current));
    }

    #[test]
    fn test_identical_edits_merge_cleanly(base in lines_strategy(), edited in lines_strategy()) {
        let result = merge(Some(&base), Some(&edited), &edited, &MergeOptions::default());
        prop_assert_eq!(result, MergeResult::Clean(edited));
    }

    #[test]
    fn test_merge_is_deterministic(
        base in lines_strategy(),
        current in lines_strategy(),
        incoming in lines_strategy(),
    ) {
        let options = MergeOptions::default();
        let first = merge(Some(&base), Some(&current), &incoming, &options);
        let second = merge(Some(&base), Some(&current), &incoming, &options);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_separated_edits_both_land(
        (count, ours, theirs) in (4usize..16).prop_flat_map(|count| {
            (Just(count), 0..count - 2).prop_flat_map(|(count, ours)| {
                (Just(count), Just(ours), ours + 2..count)
            })
        })
    ) {
        let base = numbered(count);
        let mut current = base.clone();
        current[ours] = "ours\n".to_string();
        let mut incoming = base.clone();
        incoming[theirs] = "theirs\n".to_string();
        let mut expected = base.clone();
        expected[ours] = "ours\n".to_string();
        expected[theirs] = "theirs\n".to_string();

        let options = MergeOptions::default();
        let forward = merge(Some(&text(&base)), Some(&text(&current)), &text(&incoming), &options);
        let backward = merge(Some(&text(&base)), Some(&text(&incoming)), &text(&current), &options);

        prop_assert_eq!(&forward, &MergeResult::Clean(text(&expected)));
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn test_competing_edits_conflict(count in 1usize..10, line in 0usize..10) {
        let line = line % count;
        let base = numbered(count);
        let mut current = base.clone();
        current[line] = "ours\n".to_string();
        let mut incoming = base.clone();
        incoming[line] = "theirs\n".to_string();

        let result = merge(
            Some(&text(&base)),
            Some(&text(&current)),
            &text(&incoming),
            &MergeOptions::default(),
        );

        prop_assert!(!result.is_clean());
        prop_assert!(graft::merge::has_conflict_markers(result.content()));
    }
}
