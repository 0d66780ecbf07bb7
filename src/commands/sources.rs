//! Command: list registered update sources.
use crate::sources::SourceRegistry;

/// Render one source name per line.
#[must_use]
pub fn render(registry: &SourceRegistry) -> String {
    registry
        .names()
        .iter()
        .map(|name| format!("{name}\n"))
        .collect()
}

/// Print the built-in sources to stdout.
pub fn run() {
    print!("{}", render(&SourceRegistry::with_builtin()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sources_are_listed_sorted() {
        insta::assert_snapshot!(render(&SourceRegistry::with_builtin()), @r"
        directory
        github
        ");
    }

    #[test]
    fn empty_registry_renders_nothing() {
        assert_eq!(render(&SourceRegistry::new()), "");
    }
}
