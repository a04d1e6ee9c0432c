//! Kernel argument list management (spec §4.8): the command line a
//! deployment's bootloader entry carries.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelArgs {
    entries: Vec<String>,
}

impl KernelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(line: &str) -> Self {
        Self { entries: line.split_whitespace().map(str::to_string).collect() }
    }

    pub fn append(&mut self, arg: impl Into<String>) {
        let arg = arg.into();
        if !self.entries.contains(&arg) {
            self.entries.push(arg);
        }
    }

    /// Replaces any arg matching `key` as a bare flag or a `key=...` pair
    /// with `arg`, appending it if nothing matched.
    pub fn replace(&mut self, key: &str, arg: impl Into<String>) {
        let arg = arg.into();
        let prefix = format!("{key}=");
        if let Some(pos) = self.entries.iter().position(|e| e == key || e.starts_with(&prefix)) {
            self.entries[pos] = arg;
        } else {
            self.entries.push(arg);
        }
    }

    pub fn delete(&mut self, key: &str) {
        let prefix = format!("{key}=");
        self.entries.retain(|e| e != key && !e.starts_with(&prefix));
    }

    pub fn render(&self) -> String {
        self.entries.join(" ")
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_is_deduplicated() {
        let mut kargs = KernelArgs::parse("quiet splash");
        kargs.append("quiet");
        assert_eq!(kargs.render(), "quiet splash");
    }

    #[test]
    fn replace_swaps_a_keyed_argument() {
        let mut kargs = KernelArgs::parse("root=/dev/sda1 quiet");
        kargs.replace("root", "root=/dev/sda2");
        assert_eq!(kargs.render(), "root=/dev/sda2 quiet");
    }

    #[test]
    fn delete_removes_matching_entries() {
        let mut kargs = KernelArgs::parse("quiet splash debug");
        kargs.delete("splash");
        assert_eq!(kargs.render(), "quiet debug");
    }
}
