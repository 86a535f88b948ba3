//! Tests for the identifier types.

use super::*;

mod installation_id_tests {
    use super::*;

    #[test]
    fn test_parse_numeric_installation() {
        let id: InstallationId = "12345".parse().expect("numeric id should parse");

        assert_eq!(id.as_u64(), 12345);
        assert_eq!(id.to_string(), "12345");
        assert!(id.is_valid());
    }

    #[test]
    fn test_zero_is_not_a_valid_installation() {
        let id = InstallationId::new(0);

        assert!(!id.is_valid());
    }

    #[test]
    fn test_non_numeric_installation_rejected() {
        let err = "abc".parse::<InstallationId>().unwrap_err();

        assert!(err.to_string().contains("installation"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_installation_serializes_as_number() {
        let json = serde_json::to_string(&InstallationId::new(7)).unwrap();

        assert_eq!(json, "7");
    }
}

mod app_id_tests {
    use super::*;

    #[test]
    fn test_parse_app_id_trims_whitespace() {
        let id: AppId = " 42 ".parse().unwrap();

        assert_eq!(id.as_u64(), 42);
    }

    #[test]
    fn test_negative_app_id_rejected() {
        assert!("-1".parse::<AppId>().is_err());
    }
}
