use imhodump_common::{
    models::{RatedItem, Subject},
    utils::{Fetch, Format},
    Context as _, Report, Uri,
};

use crate::{listing::Summary, query::Document};

/// What a detail page adds on top of a listing summary.
#[derive(Debug, Default, PartialEq)]
pub struct Details {
    pub title: Option<String>,
    pub title_orig: Option<String>,
    pub year: Option<String>,
    pub countries: Vec<String>,
}

pub fn parse_details(body: &str, format: Format) -> Result<Details, Report> {
    match format {
        Format::Html => parse_html_details(body),
        Format::Json => parse_json_details(body),
    }
}

#[tracing::instrument(skip(html), err)]
fn parse_html_details(html: &str) -> Result<Details, Report> {
    static CONTENT_SELECTOR: &str = "div._index_content__Nrmux.layout_colContent__3D7W7";
    static NAME_SELECTOR: &str = "meta[itemprop=name]";
    static YEAR_SELECTOR: &str = "meta[itemprop=dateCreated]";
    static TITLE_ORIG_SELECTOR: &str = "div[itemprop=alternativeHeadline]";
    static COUNTRY_SELECTOR: &str = "meta[itemprop=countryOfOrigin]";

    let doc = Document::try_from(html)?;

    let content = doc.first(CONTENT_SELECTOR);
    if content.is_none() {
        tracing::debug!("content block not found, looking through the whole page");
    }

    let select = |selector: &str| match &content {
        Some(content) => content.select(selector),
        None => doc.select(selector),
    };

    let meta_content = |selector: &str| {
        select(selector)
            .into_iter()
            .next()
            .and_then(|meta| meta.attr("content"))
            .and_then(non_empty)
    };

    let countries = select(COUNTRY_SELECTOR)
        .into_iter()
        .filter_map(|meta| meta.attr("content"))
        .filter_map(non_empty)
        .collect();

    Ok(Details {
        title: meta_content(NAME_SELECTOR),
        title_orig: select(TITLE_ORIG_SELECTOR)
            .into_iter()
            .next()
            .and_then(|div| non_empty(div.text())),
        year: meta_content(YEAR_SELECTOR),
        countries,
    })
}

#[derive(Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonDetails {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    alternative_headline: Option<String>,
    #[serde(default)]
    date_created: Option<serde_json::Value>,
    #[serde(default)]
    country_of_origin: Vec<String>,
}

#[tracing::instrument(skip(body), err)]
fn parse_json_details(body: &str) -> Result<Details, Report> {
    let details: JsonDetails =
        serde_json::from_str(body).context("malformed json detail page")?;

    Ok(Details {
        title: details.name.and_then(non_empty),
        title_orig: details.alternative_headline.and_then(non_empty),
        year: details.date_created.as_ref().and_then(json_text),
        countries: details
            .country_of_origin
            .into_iter()
            .filter_map(non_empty)
            .collect(),
    })
}

/// Fetches detail pages and folds them into listing summaries.
pub struct Enricher<'f, F> {
    fetcher: &'f F,
    subject: Subject,
    format: Format,
}

impl<'f, F: Fetch> Enricher<'f, F> {
    pub fn new(fetcher: &'f F, subject: Subject, format: Format) -> Self {
        Self {
            fetcher,
            subject,
            format,
        }
    }

    #[tracing::instrument(skip(self, summary), fields(title = %summary.title), err)]
    pub fn enrich(&self, summary: Summary, rating: u8) -> Result<RatedItem, Report> {
        tracing::info!("processing item");

        let url = Uri::try_from(summary.details_url.as_str())
            .with_context(|| format!("invalid details url `{}`", summary.details_url))?;

        let details = match self.fetcher.fetch(&url, self.format)? {
            Some(body) => parse_details(&body, self.format)?,
            None => {
                tracing::warn!(url = %url, "detail page unavailable, keeping listing data only");

                Details::default()
            }
        };

        Ok(build_item(self.subject, summary, rating, details))
    }
}

pub fn build_item(subject: Subject, summary: Summary, rating: u8, details: Details) -> RatedItem {
    let year = details.year.or(summary.year);

    let mut title = details.title.unwrap_or(summary.title);
    if let Some(year) = &year {
        title = strip_year(&title, year);
    }

    match &details.title_orig {
        Some(title_orig) => tracing::debug!(title_orig = %title_orig, "original title"),
        None => tracing::debug!("no original title published, probably a local release"),
    }
    tracing::debug!(year = ?year, "year");

    let country = match subject {
        Subject::Films if !details.countries.is_empty() => Some(details.countries.join(", ")),
        _ => None,
    };

    RatedItem {
        title_ru: title,
        title_orig: details.title_orig,
        rating,
        year,
        details_url: summary.details_url,
        country,
        extra: Default::default(),
    }
}

/// Removes a `(year)` suffix from a display title.
pub fn strip_year(title: &str, year: &str) -> String {
    title.replace(&format!("({})", year), "").trim().to_string()
}

/// The year of a title ending in `(YYYY)`.
pub(crate) fn year_suffix(title: &str) -> Option<String> {
    let inner = title.trim_end().strip_suffix(')')?;
    let (_, year) = inner.rsplit_once('(')?;
    let year = year.trim();

    (year.len() == 4 && year.chars().all(|c| c.is_ascii_digit())).then(|| year.to_string())
}

/// A json scalar as text, numbers included.
pub(crate) fn json_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => non_empty(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
