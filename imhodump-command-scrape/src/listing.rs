use std::collections::{HashSet, VecDeque};

use imhodump_common::{
    err,
    utils::{resolve_url, Fetch, Format},
    Context as _, Report, Uri,
};
use tracing::Span;

use crate::{details, query::Document};

/// What a listing page tells about one rated item.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub title: String,
    pub details_url: String,
    pub year: Option<String>,
}

#[derive(Debug, Default)]
pub struct Page {
    pub summaries: Vec<Summary>,
    pub next: Option<Uri>,
}

pub fn parse_page(page_url: &Uri, body: &str, format: Format) -> Result<Page, Report> {
    match format {
        Format::Html => parse_html_page(page_url, body),
        Format::Json => parse_json_page(page_url, body),
    }
}

#[tracing::instrument(skip(page_url, html), err)]
fn parse_html_page(page_url: &Uri, html: &str) -> Result<Page, Report> {
    static LIST_SELECTOR: &str = "div.m-rate-list-item";
    static TITLE_SELECTOR: &str = "a.m-rate-item-content-header-link";
    static DETAILS_SELECTOR: &str = "a.m-rate-item-link";
    static NEXT_SELECTOR: &str = "a[rel=next]";

    let doc = Document::try_from(html)?;

    let mut summaries = Vec::new();

    for (index, element) in doc.select(LIST_SELECTOR).into_iter().enumerate() {
        let title = element
            .first(TITLE_SELECTOR)
            .map(|link| link.text().trim().to_string())
            .filter(|title| !title.is_empty())
            .ok_or_else(|| {
                err!("unable to find the title of item {} on `{}`", index, page_url)
            })?;

        let href = element
            .first(DETAILS_SELECTOR)
            .and_then(|link| link.attr("href"))
            .ok_or_else(|| {
                err!("unable to find the details link of `{}` on `{}`", title, page_url)
            })?;

        let details_url = resolve_url(page_url, &href)?.to_string();
        let year = details::year_suffix(&title);

        summaries.push(Summary {
            title,
            details_url,
            year,
        });
    }

    let next = doc
        .first(NEXT_SELECTOR)
        .and_then(|link| link.attr("href"))
        .map(|href| resolve_url(page_url, &href))
        .transpose()
        .with_context(|| format!("invalid next url on `{}`", page_url))?;

    Ok(Page { summaries, next })
}

#[derive(serde::Deserialize)]
struct JsonPage {
    #[serde(default)]
    items: Vec<JsonItem>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(serde::Deserialize)]
struct JsonItem {
    title: String,
    url: String,
    #[serde(default)]
    year: Option<serde_json::Value>,
}

#[tracing::instrument(skip(page_url, body), err)]
fn parse_json_page(page_url: &Uri, body: &str) -> Result<Page, Report> {
    let page: JsonPage = serde_json::from_str(body)
        .with_context(|| format!("malformed json listing `{}`", page_url))?;

    let summaries = page
        .items
        .into_iter()
        .map(|item| {
            let title = item.title.trim().to_string();
            let year = item
                .year
                .as_ref()
                .and_then(details::json_text)
                .or_else(|| details::year_suffix(&title));

            Ok(Summary {
                details_url: resolve_url(page_url, &item.url)?.to_string(),
                title,
                year,
            })
        })
        .collect::<Result<Vec<_>, Report>>()?;

    let next = page
        .next_page
        .filter(|href| !href.trim().is_empty())
        .map(|href| resolve_url(page_url, &href))
        .transpose()?;

    Ok(Page { summaries, next })
}

/// Lazily walks every listing page of one rating, yielding item summaries in
/// page order.
///
/// Stops on a page without a next link, without items, with a non-success
/// status, or whose next link points at a page that was already walked. The
/// first error ends the walk.
pub struct Listing<'f, F> {
    fetcher: &'f F,
    format: Format,
    next: Option<Uri>,
    visited: HashSet<String>,
    pending: VecDeque<Summary>,
    page_index: usize,
    span: Span,
}

impl<'f, F: Fetch> Listing<'f, F> {
    pub fn new(fetcher: &'f F, format: Format, rating: u8, first_page: Uri) -> Self {
        Self {
            fetcher,
            format,
            next: Some(first_page),
            visited: HashSet::new(),
            pending: VecDeque::new(),
            page_index: 0,
            span: tracing::info_span!("listing", rating = rating),
        }
    }

    fn walk(&mut self, page_url: &Uri) -> Result<Option<Page>, Report> {
        self.page_index += 1;
        self.visited.insert(page_url.to_string());

        tracing::info!(url = %page_url, page_index = self.page_index, "scraping listing page");

        let body = match self.fetcher.fetch(page_url, self.format)? {
            Some(body) => body,
            None => {
                tracing::info!("listing page unavailable, done with this rating");

                return Ok(None);
            }
        };

        let mut page = parse_page(page_url, &body, self.format)?;

        if page.summaries.is_empty() {
            tracing::debug!("listing page has no items");

            page.next = None;
        }

        if let Some(next) = &page.next {
            if self.visited.contains(&next.to_string()) {
                tracing::debug!(next = %next, "next page link points at a walked page");

                page.next = None;
            }
        }

        Ok(Some(page))
    }
}

impl<'f, F: Fetch> Iterator for Listing<'f, F> {
    type Item = Result<Summary, Report>;

    fn next(&mut self) -> Option<Self::Item> {
        let span = self.span.clone();
        let _entered = span.enter();

        loop {
            if let Some(summary) = self.pending.pop_front() {
                return Some(Ok(summary));
            }

            let page_url = self.next.take()?;

            match self.walk(&page_url) {
                Ok(Some(page)) => {
                    self.pending.extend(page.summaries);
                    self.next = page.next;
                }
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{listing_html, Site};

    use super::*;

    fn url(s: &str) -> Uri {
        Uri::try_from(s).unwrap()
    }

    #[test]
    fn html_page_yields_items_in_order() {
        let page_url = url("http://user.imhonet.ru/1/content/films/rates/9/?page=1");
        let html = listing_html(
            &[
                ("Интерстеллар (2014)", "http://films.imhonet.ru/element/1/"),
                ("Сталкер", "/element/2/"),
            ],
            Some("/1/content/films/rates/9/?page=2"),
        );

        let page = parse_page(&page_url, &html, Format::Html).unwrap();

        assert_eq!(
            page.summaries,
            [
                Summary {
                    title: "Интерстеллар (2014)".into(),
                    details_url: "http://films.imhonet.ru/element/1/".into(),
                    year: Some("2014".into()),
                },
                Summary {
                    title: "Сталкер".into(),
                    details_url: "http://user.imhonet.ru/element/2/".into(),
                    year: None,
                },
            ]
        );
        assert_eq!(
            page.next.unwrap().to_string(),
            "http://user.imhonet.ru/1/content/films/rates/9/?page=2"
        );
    }

    #[test]
    fn item_without_details_link_is_an_error() {
        let page_url = url("http://user.imhonet.ru/1/content/films/rates/9/?page=1");
        let html = r#"<div class="m-rate-list-item">
            <a class="m-rate-item-content-header-link">Без ссылки</a>
        </div>"#;

        assert!(parse_page(&page_url, html, Format::Html).is_err());
    }

    #[test]
    fn json_page_is_parsed() {
        let page_url = url("http://user.imhonet.ru/1/content/books/rates/3/?page=1");
        let body = r#"{
            "items": [
                {"title": "Пикник на обочине", "url": "/element/7/", "year": 1972},
                {"title": "Дюна (1965)", "url": "http://books.imhonet.ru/element/8/"}
            ],
            "next_page": ""
        }"#;

        let page = parse_page(&page_url, body, Format::Json).unwrap();

        assert_eq!(page.summaries.len(), 2);
        assert_eq!(page.summaries[0].year.as_deref(), Some("1972"));
        assert_eq!(
            page.summaries[0].details_url,
            "http://user.imhonet.ru/element/7/"
        );
        assert_eq!(page.summaries[1].year.as_deref(), Some("1965"));
        assert!(page.next.is_none());
    }

    #[test]
    fn walks_until_there_is_no_next_link() {
        let site = Site::default()
            .page(
                "http://site/rates/5/?page=1",
                listing_html(&[("A", "/a/"), ("B", "/b/")], Some("/rates/5/?page=2")),
            )
            .page(
                "http://site/rates/5/?page=2",
                listing_html(&[("C", "/c/")], None),
            );

        let listing = Listing::new(&site, Format::Html, 5, url("http://site/rates/5/?page=1"));
        let titles: Vec<_> = listing
            .map(|summary| summary.unwrap().title)
            .collect();

        assert_eq!(titles, ["A", "B", "C"]);
        assert_eq!(site.requests().len(), 2);
    }

    #[test]
    fn follows_query_only_and_path_relative_links() {
        let site = Site::default()
            .page(
                "http://site/rates/5/?page=1",
                listing_html(&[("A", "element/1/")], Some("?page=2")),
            )
            .page(
                "http://site/rates/5/?page=2",
                listing_html(&[("B", "element/2/")], None),
            );

        let listing = Listing::new(&site, Format::Html, 5, url("http://site/rates/5/?page=1"));
        let urls: Vec<_> = listing
            .map(|summary| summary.unwrap().details_url)
            .collect();

        assert_eq!(
            urls,
            ["http://site/rates/5/element/1/", "http://site/rates/5/element/2/"]
        );
        assert_eq!(site.requests().len(), 2);
    }

    #[test]
    fn stops_when_next_link_repeats_a_walked_page() {
        let site = Site::default()
            .page(
                "http://site/rates/5/?page=1",
                listing_html(&[("A", "/a/")], Some("/rates/5/?page=2")),
            )
            .page(
                "http://site/rates/5/?page=2",
                listing_html(&[("B", "/b/")], Some("/rates/5/?page=1")),
            );

        let listing = Listing::new(&site, Format::Html, 5, url("http://site/rates/5/?page=1"));
        let count = listing.count();

        assert_eq!(count, 2);
        assert_eq!(site.requests().len(), 2);
    }

    #[test]
    fn stops_on_self_link() {
        let site = Site::default().page(
            "http://site/rates/5/?page=1",
            listing_html(&[("A", "/a/")], Some("/rates/5/?page=1")),
        );

        let listing = Listing::new(&site, Format::Html, 5, url("http://site/rates/5/?page=1"));
        let count = listing.count();

        assert_eq!(count, 1);
        assert_eq!(site.requests().len(), 1);
    }

    #[test]
    fn non_success_status_ends_the_rating() {
        let site = Site::default().page(
            "http://site/rates/5/?page=1",
            listing_html(&[("A", "/a/")], Some("/rates/5/?page=2")),
        );

        let listing = Listing::new(&site, Format::Html, 5, url("http://site/rates/5/?page=1"));
        let titles: Vec<_> = listing
            .map(|summary| summary.unwrap().title)
            .collect();

        assert_eq!(titles, ["A"]);
        assert_eq!(
            site.requests(),
            ["http://site/rates/5/?page=1", "http://site/rates/5/?page=2"]
        );
    }

    #[test]
    fn empty_page_ends_the_rating() {
        let site = Site::default().page(
            "http://site/rates/5/?page=1",
            listing_html(&[], Some("/rates/5/?page=2")),
        );

        assert_eq!(
            Listing::new(&site, Format::Html, 5, url("http://site/rates/5/?page=1")).count(),
            0
        );
        assert_eq!(site.requests().len(), 1);
    }
}
