use std::sync::LazyLock;

use regex::Regex;

use crate::config::AuthorsConfig;
use crate::registry::{AuthorId, Registry};

/// Optional name followed by an optional `<local@domain.tld>` address.
static AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?P<name>[^@<]*)(?:\s|$)\s*)?<?(?P<email>[A-Za-z0-9_.+-]+@[A-Za-z0-9_.-]+\.[A-Za-z]{2,})?>?",
    )
    .expect("author regex")
});

/// Maps free-text author strings onto registry authors.
///
/// The sentinel identity stands in for whatever part of an author is
/// missing. Lookups skip authors still carrying sentinel values so that an
/// author once seen with a full identity keeps it when later mentioned by
/// name or email alone.
pub struct AuthorResolver<'a> {
    default_name: &'a str,
    default_email: &'a str,
}

impl<'a> AuthorResolver<'a> {
    pub fn new(config: &'a AuthorsConfig) -> Self {
        Self {
            default_name: &config.default_name,
            default_email: &config.default_email,
        }
    }

    /// Resolves a `"Name <email>"` string such as a Makefile `Owner` field.
    pub fn resolve(&self, registry: &mut Registry, text: &str) -> AuthorId {
        let (name, email) = parse_author(text);
        self.resolve_parts(registry, name.as_deref(), email.as_deref())
    }

    /// Resolves an author from already separated parts.
    pub fn resolve_parts(
        &self,
        registry: &mut Registry,
        name: Option<&str>,
        email: Option<&str>,
    ) -> AuthorId {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let email = email.map(str::trim).filter(|e| !e.is_empty());

        match (name, email) {
            (None, Some(email)) => {
                if let Some(id) =
                    registry.find_author(|a| a.email == email && a.name != self.default_name)
                {
                    return id;
                }
            }
            (Some(name), None) => {
                if let Some(id) =
                    registry.find_author(|a| a.name == name && a.email != self.default_email)
                {
                    return id;
                }
            }
            _ => {}
        }

        registry.get_or_create_author(
            email.unwrap_or(self.default_email),
            name.unwrap_or(self.default_name),
        )
    }
}

/// Splits `"Jane Doe <jane@example.com>"` into its name and email parts.
fn parse_author(text: &str) -> (Option<String>, Option<String>) {
    let Some(caps) = AUTHOR.captures(text) else {
        return (None, None);
    };

    let name = caps
        .name("name")
        .map(|m| m.as_str().trim().to_string())
        .filter(|n| !n.is_empty());
    let email = caps
        .name("email")
        .map(|m| m.as_str().trim().to_string())
        .filter(|e| !e.is_empty());

    (name, email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthorsConfig {
        AuthorsConfig::default()
    }

    #[cfg(test)]
    mod parse_author {
        use super::*;

        #[test]
        fn splits_name_and_email() {
            assert_eq!(
                parse_author("Jane Doe <jane@example.com>"),
                (Some("Jane Doe".into()), Some("jane@example.com".into()))
            );
        }

        #[test]
        fn email_only() {
            assert_eq!(
                parse_author("<jane@example.com>"),
                (None, Some("jane@example.com".into()))
            );
        }

        #[test]
        fn name_only() {
            assert_eq!(parse_author("Jane Doe"), (Some("Jane Doe".into()), None));
        }

        #[test]
        fn empty_string() {
            assert_eq!(parse_author(""), (None, None));
        }
    }

    #[test]
    fn test_full_identity_creates_author() {
        let config = config();
        let resolver = AuthorResolver::new(&config);
        let mut registry = Registry::new();

        let id = resolver.resolve(&mut registry, "Jane <jane@x.com>");
        let author = registry.author(id).unwrap();

        assert_eq!(author.name, "Jane");
        assert_eq!(author.email, "jane@x.com");
    }

    #[test]
    fn test_email_only_keeps_known_name() {
        let config = config();
        let resolver = AuthorResolver::new(&config);
        let mut registry = Registry::new();

        let jane = resolver.resolve(&mut registry, "Jane <jane@x.com>");
        let again = resolver.resolve(&mut registry, "<jane@x.com>");

        assert_eq!(jane, again);
        assert_eq!(registry.author(again).unwrap().name, "Jane");
        assert_eq!(registry.authors().len(), 1);
    }

    #[test]
    fn test_name_only_finds_known_email() {
        let config = config();
        let resolver = AuthorResolver::new(&config);
        let mut registry = Registry::new();

        let jane = resolver.resolve(&mut registry, "Jane <jane@x.com>");
        let again = resolver.resolve(&mut registry, "Jane");

        assert_eq!(jane, again);
    }

    #[test]
    fn test_unknown_name_only_maps_to_sentinel_email() {
        let config = config();
        let resolver = AuthorResolver::new(&config);
        let mut registry = Registry::new();

        let id = resolver.resolve(&mut registry, "Nobody Known");
        let author = registry.author(id).unwrap();

        assert_eq!(author.email, config.default_email);
        assert_eq!(author.name, "Nobody Known");
    }

    #[test]
    fn test_empty_owner_is_sentinel() {
        let config = config();
        let resolver = AuthorResolver::new(&config);
        let mut registry = Registry::new();

        let first = resolver.resolve(&mut registry, "");
        let second = resolver.resolve_parts(&mut registry, None, None);
        let author = registry.author(first).unwrap();

        assert_eq!(first, second);
        assert_eq!(author.name, config.default_name);
        assert_eq!(author.email, config.default_email);
    }

    #[test]
    fn test_existing_email_keeps_original_name() {
        let config = config();
        let resolver = AuthorResolver::new(&config);
        let mut registry = Registry::new();

        let first = resolver.resolve_parts(&mut registry, Some("Jane"), Some("jane@x.com"));
        let second = resolver.resolve_parts(&mut registry, Some("J. Doe"), Some("jane@x.com"));

        assert_eq!(first, second);
        assert_eq!(registry.author(second).unwrap().name, "Jane");
    }
}
