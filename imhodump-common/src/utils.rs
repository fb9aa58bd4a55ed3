use std::{fmt, str::FromStr};

use isahc::{
    config::{Configurable as _, RedirectPolicy},
    HttpClient, ReadResponseExt as _, Request,
};

use url::Url;

use crate::{err, Context as _, Report, Uri};

#[cfg(target_os = "linux")]
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (X11; Linux x86_64; rv:63.0) Gecko/20100101 Firefox/63.0 imhodump/",
    env!("CARGO_PKG_VERSION"),
);

#[cfg(target_os = "windows")]
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 6.1; Win64; x64; rv:63.0) Gecko/20100101 Firefox/63.0 imhodump/",
    env!("CARGO_PKG_VERSION"),
);

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.10; rv:63.0) Gecko/20100101 Firefox/63.0 imhodump/",
    env!("CARGO_PKG_VERSION"),
);

/// Which representation of listing and detail pages is requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Html,
    Json,
}

impl Format {
    pub fn mime(&self) -> &'static str {
        match self {
            Format::Html => "text/html",
            Format::Json => "application/json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Html => f.write_str("html"),
            Format::Json => f.write_str("json"),
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(Format::Html),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown format `{}`, expected `html` or `json`", other)),
        }
    }
}

/// Something that can GET a page.
///
/// Implemented over HTTP by [`HttpFetcher`]; tests swap in a canned site.
pub trait Fetch {
    /// Returns the response body, or `None` when the server answered with a
    /// non-success status.
    fn fetch(&self, url: &Uri, format: Format) -> Result<Option<String>, Report>;
}

impl<F: Fetch + ?Sized> Fetch for &F {
    fn fetch(&self, url: &Uri, format: Format) -> Result<Option<String>, Report> {
        (**self).fetch(url, format)
    }
}

pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, Report> {
        let client = HttpClient::builder()
            .default_header("User-Agent", USER_AGENT)
            .redirect_policy(RedirectPolicy::Follow)
            .build()?;

        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    #[tracing::instrument(err, skip(self, url), fields(url = %url))]
    fn fetch(&self, url: &Uri, format: Format) -> Result<Option<String>, Report> {
        tracing::debug!("fetching");

        let req = Request::builder()
            .uri(url)
            .header("Accept", format.mime())
            .body(())?;

        let mut res = self.client.send(req)?;

        if !res.status().is_success() {
            tracing::warn!(status = %res.status(), "server answered with a non-success status");

            return Ok(None);
        }

        let body = res
            .text()
            .with_context(|| format!("unable to read response body of `{}`", url))?;

        Ok(Some(body))
    }
}

/// Resolves a possibly relative `href` found on `base_url` into an absolute url.
///
/// Follows RFC 3986 reference resolution, so query-only and path-relative
/// links work as well as root-relative and absolute ones.
pub fn resolve_url(base_url: &Uri, href: &str) -> Result<Uri, Report> {
    let href = href.trim();

    let base = Url::parse(&base_url.to_string())
        .with_context(|| format!("invalid base url `{}`", base_url))?;
    let joined = base
        .join(href)
        .with_context(|| format!("invalid url `{}` found on `{}`", href, base_url))?;

    if !joined.has_host() {
        return Err(err!("url `{}` found on `{}` has no host", href, base_url));
    }

    Uri::try_from(joined.as_str()).with_context(|| format!("unable to convert url `{}`", joined))
}
