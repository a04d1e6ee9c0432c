//! Kernel command-line parsing (spec §4.9: `ostree=<path>`).

/// Looks up `key=value` on a space-separated kernel command line. Bare
/// flags (no `=`) and unrelated keys are skipped; the first match wins,
/// matching how the kernel itself resolves duplicate `init=` args.
pub fn parse_kernel_arg<'a>(cmdline: &'a str, key: &str) -> Option<&'a str> {
    let prefix = format!("{key}=");
    cmdline.split_whitespace().find_map(|tok| tok.strip_prefix(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_value() {
        let cmdline = "root=/dev/sda1 ostree=/ostree/boot.1/default/0 quiet\n";
        assert_eq!(parse_kernel_arg(cmdline, "ostree"), Some("/ostree/boot.1/default/0"));
    }

    #[test]
    fn missing_key_is_none() {
        assert_eq!(parse_kernel_arg("root=/dev/sda1 quiet", "ostree"), None);
    }

    #[test]
    fn does_not_match_a_bare_flag() {
        assert_eq!(parse_kernel_arg("ostree quiet", "ostree"), None);
    }

    #[test]
    fn takes_the_first_occurrence() {
        let cmdline = "ostree=/first ostree=/second";
        assert_eq!(parse_kernel_arg(cmdline, "ostree"), Some("/first"));
    }
}
