//! Path wrapping.
//!
//! A request body that is a wrapped path is streamed from disk instead of
//! being sent as literal text. Asset paths point into the application
//! bundle's asset directory.

/// Prefix marking a string body as a file reference.
pub const FILE_PREFIX: &str = "RNFetchBlob-file://";

/// Prefix marking a path as a bundled asset.
pub const ASSET_PREFIX: &str = "bundle-assets://";

const FILE_SCHEME: &str = "file://";

/// Wrap a path so request bodies stream the file it names.
pub fn wrap(path: impl AsRef<str>) -> String {
    format!("{}{}", FILE_PREFIX, path.as_ref())
}

pub fn is_wrapped(value: &str) -> bool {
    value.starts_with(FILE_PREFIX)
}

/// Strip the wrap prefix, or `None` for plain strings.
pub fn unwrap(value: &str) -> Option<&str> {
    value.strip_prefix(FILE_PREFIX)
}

/// True for `file://` URIs and wrapped paths.
pub fn is_file_uri(value: &str) -> bool {
    value.starts_with(FILE_SCHEME) || is_wrapped(value)
}

/// Strip either file prefix, returning the bare path.
pub fn unwrap_file_uri(value: &str) -> Option<&str> {
    unwrap(value).or_else(|| value.strip_prefix(FILE_SCHEME))
}

pub fn asset(path: impl AsRef<str>) -> String {
    format!("{}{}", ASSET_PREFIX, path.as_ref())
}

pub fn is_asset(value: &str) -> bool {
    value.starts_with(ASSET_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_is_pure_and_distinguishable() {
        let path = "/data/cache/photo.png";
        assert_eq!(wrap(path), wrap(path));
        assert_eq!(wrap(path), "RNFetchBlob-file:///data/cache/photo.png");
        assert!(is_wrapped(&wrap(path)));
        assert!(!is_wrapped(path));
        assert_eq!(unwrap(&wrap(path)), Some(path));
        assert_eq!(unwrap(path), None);
    }

    #[test]
    fn test_file_uri_forms() {
        assert!(is_file_uri("file:///tmp/a.txt"));
        assert!(is_file_uri(&wrap("/tmp/a.txt")));
        assert!(!is_file_uri("https://example.com/a.txt"));

        assert_eq!(unwrap_file_uri("file:///tmp/a.txt"), Some("/tmp/a.txt"));
        assert_eq!(unwrap_file_uri(&wrap("/tmp/a.txt")), Some("/tmp/a.txt"));
        assert_eq!(unwrap_file_uri("/tmp/a.txt"), None);
    }

    #[test]
    fn test_asset_prefix() {
        assert_eq!(asset("img/logo.png"), "bundle-assets://img/logo.png");
        assert!(is_asset(&asset("x")));
        assert!(!is_asset("x"));
    }
}
