pub use uri::{InvalidUriError, Uri};

mod uri {
    use std::fmt::Display;
    use std::str::FromStr;

    use thiserror::Error;

    #[derive(Debug, Clone, Error)]
    pub struct InvalidUriError(String);

    impl Display for InvalidUriError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.0.fmt(f)
        }
    }

    impl From<http::uri::InvalidUri> for InvalidUriError {
        fn from(value: http::uri::InvalidUri) -> Self {
            InvalidUriError(value.to_string())
        }
    }

    impl From<http::uri::InvalidUriParts> for InvalidUriError {
        fn from(value: http::uri::InvalidUriParts) -> Self {
            InvalidUriError(value.to_string())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct Uri(http::Uri);

    impl Uri {
        pub fn new(uri: http::Uri) -> Self {
            Self(uri)
        }

        pub fn from_static(src: &'static str) -> Self {
            Self(http::Uri::from_static(src))
        }

        /// Build an `https://` base URI for a bare host name such as the
        /// one handed out by the broker on assignment.
        pub fn from_host(host: &str) -> Result<Self, InvalidUriError> {
            Self::from_string(format!("https://{host}"))
        }

        pub fn from_string(src: String) -> Result<Self, InvalidUriError> {
            Ok(Self(http::uri::Uri::from_maybe_shared(src)?))
        }

        /// Replace the path and query of `base_uri`
        pub fn from_parts(
            base_uri: Uri,
            path: &str,
            query: Option<&str>,
        ) -> Result<Self, InvalidUriError> {
            let path_and_query = if let Some(qs) = query {
                http::uri::PathAndQuery::from_maybe_shared(format!("{path}?{qs}",))?
            } else {
                http::uri::PathAndQuery::from_str(path)?
            };
            let mut parts = base_uri.0.into_parts();
            parts.path_and_query = Some(path_and_query);

            Ok(http::Uri::from_parts(parts).map(Self::new)?)
        }

        pub fn host(&self) -> Option<&str> {
            self.0.host()
        }
    }

    impl Display for Uri {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.0.fmt(f)
        }
    }

    impl FromStr for Uri {
        type Err = InvalidUriError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            Ok(http::Uri::from_str(s).map(Self::new)?)
        }
    }

    impl TryFrom<String> for Uri {
        type Error = InvalidUriError;

        fn try_from(value: String) -> Result<Self, Self::Error> {
            Ok(Self(http::Uri::from_maybe_shared(value)?))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn it_replaces_path_and_query() {
            let base = Uri::from_static("https://broker.example.net");
            let uri = Uri::from_parts(
                base,
                "/0ne00/registrations/dev/register",
                Some("api-version=2019-03-31"),
            )
            .unwrap();

            assert_eq!(
                uri.to_string(),
                "https://broker.example.net/0ne00/registrations/dev/register?api-version=2019-03-31"
            );
        }

        #[test]
        fn it_builds_a_base_uri_from_a_host() {
            let uri = Uri::from_host("hub-01.example.net").unwrap();
            assert_eq!(uri.host(), Some("hub-01.example.net"));
        }

        #[test]
        fn it_rejects_invalid_hosts() {
            assert!(Uri::from_host("bad host").is_err());
        }
    }
}
