//! Property tests for the validators.

use guardrail::security::{sanitize_for_prompt, validate_url, ErrorKind};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_prompt_output_is_bounded_and_clean(input in ".{0,600}", max in 0usize..300) {
        let out = sanitize_for_prompt(&input, max);
        prop_assert!(out.chars().count() <= max);
        prop_assert!(out.chars().all(|c| !c.is_ascii_control() || c == '\n' || c == '\t'));
        prop_assert!(!out.contains("\n\n\n"));
        prop_assert!(!out.contains("```"));
    }

    #[test]
    fn test_prompt_control_characters_removed(
        parts in prop::collection::vec(("[a-z ]{0,8}", 0u8..32), 0..20)
    ) {
        let input: String = parts
            .iter()
            .map(|(text, control)| format!("{}{}", text, *control as char))
            .collect();
        let out = sanitize_for_prompt(&input, 10_000);
        prop_assert!(out.chars().all(|c| !c.is_ascii_control() || c == '\n' || c == '\t'));
    }

    #[test]
    fn test_private_ipv4_hosts_rejected(
        prefix in prop::sample::select(vec!["127", "10", "192.168", "169.254"]),
        a in 0u8..=255, b in 0u8..=255, c in 0u8..=255,
        port in prop::option::of(1u16..),
    ) {
        let host = match prefix {
            "127" | "10" => format!("{}.{}.{}.{}", prefix, a, b, c),
            _ => format!("{}.{}.{}", prefix, b, c),
        };
        let url = match port {
            Some(port) => format!("http://{}:{}/path", host, port),
            None => format!("https://{}/", host),
        };
        let rejection = validate_url(&url).unwrap_err();
        prop_assert_eq!(rejection.kind, ErrorKind::PrivateAddress);
    }

    #[test]
    fn test_private_range_172_16_rejected(second in 16u8..=31, c in 0u8..=255, d in 0u8..=255) {
        let url = format!("http://172.{}.{}.{}/", second, c, d);
        prop_assert_eq!(validate_url(&url).unwrap_err().kind, ErrorKind::PrivateAddress);
    }

    #[test]
    fn test_bracketed_ipv6_local_rejected(
        prefix in prop::sample::select(vec!["::1", "fe80::", "fc00::", "fd12:3456::"]),
        tail in 1u16..,
    ) {
        let host = if prefix == "::1" {
            prefix.to_string()
        } else {
            format!("{}{:x}", prefix, tail)
        };
        let url = format!("http://[{}]/", host);
        prop_assert_eq!(validate_url(&url).unwrap_err().kind, ErrorKind::PrivateAddress);
    }

    #[test]
    fn test_dangerous_schemes_rejected_in_any_case(
        scheme in prop::sample::select(vec!["javascript:", "data:", "file:", "vbscript:"]),
        mask in any::<u32>(),
        payload in "[a-z0-9/(),]{0,20}",
    ) {
        let mixed: String = scheme
            .chars()
            .enumerate()
            .map(|(i, c)| if mask & (1 << (i % 32)) != 0 { c.to_ascii_uppercase() } else { c })
            .collect();
        let rejection = validate_url(&format!("{}{}", mixed, payload)).unwrap_err();
        prop_assert_eq!(rejection.kind, ErrorKind::DangerousScheme);
    }
}
