use bimap::BiMap;
use dap::types;
use url::Url;

/// Maps flat filesystem paths back to the source identifiers they came from.
///
/// Clients strip `file:` URIs down to bare paths but send every other scheme
/// verbatim, so a path is only resolvable once its URI has been seen at load time.
#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    paths: BiMap<String, Url>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the flat path of a local-file identifier. Other schemes are ignored.
    pub fn register(&mut self, uri: &Url) {
        if uri.scheme() != "file" {
            return;
        }

        if let Ok(path) = uri.to_file_path() {
            self.paths.insert(path.to_string_lossy().to_string(), uri.clone());
        }
    }

    pub fn resolve(&self, path_or_uri: &str) -> Option<Url> {
        if let Some(uri) = self.paths.get_by_left(path_or_uri) {
            return Some(uri.clone());
        }

        if has_uri_scheme(path_or_uri) {
            Url::parse(path_or_uri).ok()
        } else {
            None
        }
    }

    /// Resolves the identifier a client sent in a `Source` object.
    pub fn resolve_source(&self, source: &types::Source) -> Option<Url> {
        source.path.as_deref().and_then(|path| self.resolve(path))
    }

    /// The client-facing form of a source identifier.
    pub fn client_source(&self, uri: &Url) -> types::Source {
        let path = self
            .paths
            .get_by_right(uri)
            .cloned()
            .unwrap_or_else(|| uri.to_string());

        types::Source {
            name: uri
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|name| !name.is_empty())
                .map(|name| name.to_string()),
            path: Some(path),
            ..Default::default()
        }
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

/// Whether `value` starts with `scheme:`. Single letters are drive prefixes, not schemes.
fn has_uri_scheme(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once(':') else {
        return false;
    };

    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("C:\\work\\main.qs")]
    #[case("c:/work/main.qs")]
    #[case("/work/main.qs")]
    #[case("main.qs")]
    #[case("work/1:2.qs")]
    fn test_flat_paths_stay_opaque(#[case] path: &str) {
        let registry = SourceRegistry::new();
        assert_eq!(registry.resolve(path), None);
    }

    #[rstest]
    #[case("untitled:Untitled-1")]
    #[case("vscode-vfs://github/org/repo/main.qs")]
    #[case("file:///work/main.qs")]
    fn test_uris_resolve_directly(#[case] uri: &str) {
        let registry = SourceRegistry::new();
        assert_eq!(registry.resolve(uri), Some(Url::parse(uri).unwrap()));
    }

    #[cfg(unix)]
    #[test]
    fn test_registered_path_resolves_to_uri() {
        let mut registry = SourceRegistry::new();
        let uri = Url::parse("file:///work/src/main.qs").unwrap();
        registry.register(&uri);

        assert_eq!(registry.resolve("/work/src/main.qs"), Some(uri));
    }

    #[test]
    fn test_non_file_uri_resolves_directly() {
        let mut registry = SourceRegistry::new();
        let uri = Url::parse("vscode-vfs://github/org/repo/main.qs").unwrap();
        registry.register(&uri);

        assert_eq!(registry.resolve(uri.as_str()), Some(uri));
        assert_eq!(registry.resolve("/org/repo/main.qs"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_client_source_for_local_file_uses_path() {
        let mut registry = SourceRegistry::new();
        let uri = Url::parse("file:///work/src/main.qs").unwrap();
        registry.register(&uri);

        let source = registry.client_source(&uri);
        assert_eq!(source.name, Some("main.qs".to_string()));
        assert_eq!(source.path, Some("/work/src/main.qs".to_string()));
    }

    #[test]
    fn test_client_source_for_remote_uri_keeps_uri() {
        let registry = SourceRegistry::new();
        let uri = Url::parse("untitled:Untitled-1").unwrap();

        let source = registry.client_source(&uri);
        assert_eq!(source.path, Some("untitled:Untitled-1".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_source_uses_path() {
        let mut registry = SourceRegistry::new();
        let uri = Url::parse("file:///work/main.qs").unwrap();
        registry.register(&uri);

        let source = types::Source {
            name: Some("main.qs".to_string()),
            path: Some("/work/main.qs".to_string()),
            ..Default::default()
        };
        assert_eq!(registry.resolve_source(&source), Some(uri));
    }
}
