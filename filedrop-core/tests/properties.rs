//! Property-based tests for filedrop core

use filedrop_core::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn props_strict_names_never_escape_directory(name in "\\PC{1,40}") {
        // Anything accepted under the strict policy must be a single path component
        if let Ok(file_name) = FileName::new(&name, NamePolicy::Strict) {
            let s = file_name.as_str();
            prop_assert!(!s.contains('/'));
            prop_assert!(!s.contains('\\'));
            prop_assert!(s != "..");
            prop_assert!(s != ".");
        }
    }

    #[test]
    fn props_permissive_names_are_preserved(name in "[a-zA-Z0-9._/-]{1,40}") {
        let file_name = FileName::new(&name, NamePolicy::Permissive).unwrap();
        prop_assert_eq!(file_name.as_str(), name.as_str());
    }

    #[test]
    fn props_outcome_status_follows_error_class(kind in 0usize..4) {
        let err = match kind {
            0 => FileDropError::MissingFileField,
            1 => FileDropError::MalformedMultipart("truncated".to_string()),
            2 => FileDropError::BodyRead("reset".to_string()),
            _ => FileDropError::Write(std::io::Error::new(std::io::ErrorKind::Other, "full")),
        };
        let expected = match err.class() {
            ErrorClass::Server => 500,
            _ => 400,
        };
        let outcome: Outcome = err.into();
        prop_assert_eq!(outcome.status_code(), expected);
    }
}
