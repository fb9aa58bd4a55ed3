use std::{fs, path::Path};

use askama::Template;
use imhodump_common::{
    models::{RatedItem, Subject},
    Context as _, Report, Settings,
};
use imhodump_store::Collection;

/// Sites a title can be looked up on from the report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchTarget {
    Goodreads,
    Kinopoisk,
}

impl SearchTarget {
    pub fn name(&self) -> &'static str {
        match self {
            SearchTarget::Goodreads => "Goodreads",
            SearchTarget::Kinopoisk => "КиноПоиск",
        }
    }

    fn url_template(&self) -> &'static str {
        match self {
            SearchTarget::Goodreads => {
                "https://www.goodreads.com/search?utf8=%E2%9C%93&q={term}&search_type=books"
            }
            SearchTarget::Kinopoisk => {
                "http://www.kinopoisk.ru/index.php?first=no&what=&kp_query={term}"
            }
        }
    }

    pub fn search_url(&self, term: &str) -> String {
        self.url_template()
            .replace("{term}", &urlencoding::encode(term))
    }

    pub fn for_subject(subject: Subject) -> &'static [SearchTarget] {
        match subject {
            Subject::Films | Subject::Serials => &[SearchTarget::Kinopoisk],
            Subject::Books => &[SearchTarget::Goodreads],
            Subject::Games => &[],
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct SearchLink {
    pub href: String,
    pub label: String,
}

/// Search links for every published title of an item, original title first.
pub fn search_links(subject: Subject, item: &RatedItem) -> Vec<SearchLink> {
    let titles = [
        ("title_orig", item.title_orig.as_deref()),
        ("title_ru", Some(item.title_ru.as_str())),
    ];

    SearchTarget::for_subject(subject)
        .iter()
        .flat_map(|target| {
            titles
                .iter()
                .filter_map(|(field, title)| title.filter(|t| !t.is_empty()).map(|t| (field, t)))
                .map(move |(field, title)| SearchLink {
                    href: target.search_url(title),
                    label: format!("{} ({})", target.name(), field),
                })
        })
        .collect()
}

/// The 10 point rating on a 5 point scale, rounded up.
pub fn rating_five(rating: u8) -> u8 {
    rating / 2 + rating % 2
}

struct Row {
    year: String,
    rating: u8,
    rating_five: u8,
    title_ru: String,
    title_orig: String,
    links: Vec<SearchLink>,
}

#[derive(askama::Template)]
#[template(path = "report.html")]
struct ReportPage<'a> {
    subject: &'a str,
    rows: Vec<Row>,
}

pub fn render_html(subject: Subject, items: &Collection) -> Result<String, Report> {
    let rows = items
        .values()
        .map(|item| Row {
            year: item.year.clone().unwrap_or_default(),
            rating: item.rating,
            rating_five: rating_five(item.rating),
            title_ru: item.title_ru.clone(),
            title_orig: item.title_orig.clone().unwrap_or_default(),
            links: search_links(subject, item),
        })
        .collect();

    let page = ReportPage {
        subject: subject.as_str(),
        rows,
    };

    page.render().context("unable to render the html report")
}

pub static IMDB_HEADER: [&str; 16] = [
    "Position",
    "Const",
    "Created",
    "Modified",
    "Description",
    "Title",
    "URL",
    "Title Type",
    "IMDb Rating",
    "Runtime (mins)",
    "Year",
    "Genres",
    "Num Votes",
    "Release Date",
    "Directors",
    "Your Rating",
];

/// The IMDb list type of a subject, `None` when IMDb does not list it.
pub fn imdb_title_type(subject: Subject) -> Option<&'static str> {
    match subject {
        Subject::Films => Some("movie"),
        Subject::Serials => Some("tvSeries"),
        Subject::Books | Subject::Games => None,
    }
}

/// Renders items as an IMDb list export, for importing into other trackers.
pub fn render_csv(subject: Subject, items: &Collection) -> Result<String, Report> {
    let title_type = imdb_title_type(subject).unwrap_or_default();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(IMDB_HEADER)?;

    for (position, item) in items.values().enumerate() {
        let position = (position + 1).to_string();
        let title = item
            .title_orig
            .as_deref()
            .filter(|title| !title.is_empty())
            .unwrap_or(&item.title_ru);
        let year = item.year.as_deref().unwrap_or_default();
        let rating = item.rating.to_string();

        writer.write_record([
            position.as_str(),
            "",
            "",
            "",
            "",
            title,
            item.details_url.as_str(),
            title_type,
            "",
            "",
            year,
            "",
            "",
            "",
            "",
            rating.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| imhodump_common::err!("unable to finish the csv report: {}", err))?;

    String::from_utf8(bytes).context("csv report is not utf-8")
}

/// Regenerates the html (and for films and serials, csv) report next to the
/// json dump.
#[tracing::instrument(skip(settings), err)]
pub fn run(settings: &Settings, user: &str, subject: Subject) -> Result<(), Report> {
    let path = settings.output_path(subject, user);

    if !path.exists() {
        tracing::warn!(path = %path.display(), "nothing dumped yet, the report will be empty");
    }

    let items = imhodump_store::load(&path)?;

    write_reports(&path, subject, &items)
}

fn write_reports(path: &Path, subject: Subject, items: &Collection) -> Result<(), Report> {
    let html_path = path.with_extension("html");
    tracing::info!(path = %html_path.display(), items = items.len(), "writing html report");

    fs::write(&html_path, render_html(subject, items)?)
        .with_context(|| format!("unable to write `{}`", html_path.display()))?;

    if imdb_title_type(subject).is_some() {
        let csv_path = path.with_extension("csv");
        tracing::info!(path = %csv_path.display(), "writing csv report");

        fs::write(&csv_path, render_csv(subject, items)?)
            .with_context(|| format!("unable to write `{}`", csv_path.display()))?;
    }

    Ok(())
}
