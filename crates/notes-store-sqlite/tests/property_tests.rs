//! Property-based tests for notes-store-sqlite

use notes_store_sqlite::uti::{classify, conforms_to, UtiClass};
use notes_store_sqlite::{core_time_to_utc, strip_html, CORE_TIME_OFFSET};
use proptest::prelude::*;

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Legacy body fragment: text or one of the tags real bodies use
fn fragment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ]{1,8}",
        Just("<div>".to_string()),
        Just("</div>".to_string()),
        Just("<br>".to_string()),
        Just("<br/>".to_string()),
        Just("<b>".to_string()),
        Just("</b>".to_string()),
        Just("<p>".to_string()),
        Just("</p>".to_string()),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_strip_html_keeps_text_drops_tags(fragments in prop::collection::vec(fragment_strategy(), 0..20)) {
        let html: String = fragments.concat();
        let text: String = fragments.iter().filter(|f| !f.starts_with('<')).cloned().collect();
        let breaks = fragments
            .iter()
            .filter(|f| f.starts_with("<br") || *f == "</div>" || *f == "</p>")
            .count();

        let plain = strip_html(&html);
        prop_assert!(!plain.contains('<'));
        prop_assert_eq!(plain.replace('\n', ""), text);
        prop_assert_eq!(plain.matches('\n').count(), breaks);
    }

    #[test]
    fn prop_core_time_offsets_unix(seconds in -1_000_000_000i64..2_000_000_000) {
        let dt = core_time_to_utc(seconds as f64).unwrap();
        prop_assert_eq!(dt.timestamp(), seconds + CORE_TIME_OFFSET);
    }

    #[test]
    fn prop_classify_is_total(uti in "[a-z.]{0,30}") {
        // Unknown public types still count as media
        if uti.starts_with("public.") {
            prop_assert_ne!(classify(&uti), UtiClass::Generic);
        }
        prop_assert!(!conforms_to(&uti).is_empty());
    }
}
