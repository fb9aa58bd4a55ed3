mod details;
mod listing;
mod query;

use imhodump_common::{
    models::{RatedItem, Subject},
    utils::{Fetch, HttpFetcher},
    Context as _, Report, Settings, Uri, RATINGS,
};
use imhodump_store::DumpSummary;

pub use details::{build_item, parse_details, strip_year, Details, Enricher};
pub use listing::{parse_page, Listing, Page, Summary};

#[tracing::instrument(skip(settings), err)]
pub fn run(settings: &Settings, user: &str, subject: Subject) -> Result<DumpSummary, Report> {
    let fetcher = HttpFetcher::new()?;

    run_with(&fetcher, settings, user, subject)
}

/// Loads the previous dump, backs it up and rewrites it with whatever the
/// site lists from `settings.start_from_rating` on.
pub fn run_with<F: Fetch>(
    fetcher: &F,
    settings: &Settings,
    user: &str,
    subject: Subject,
) -> Result<DumpSummary, Report> {
    if subject != Subject::Films {
        tracing::warn!(
            subject = %subject,
            "page layout was verified for films only, other subjects may come out incomplete"
        );
    }

    let path = settings.output_path(subject, user);

    tracing::info!(user = %user, path = %path.display(), "dumping ratings");

    let existing = imhodump_store::load(&path)?;
    imhodump_store::backup(&path)?;

    let scraper = Scraper::new(fetcher, settings, user, subject);
    let summary = imhodump_store::dump(
        &path,
        &existing,
        scraper.rated_items(settings.start_from_rating),
    )?;

    if summary.interrupted {
        tracing::warn!(
            "scrape was cut short, set start_from_rating to resume from the last rating"
        );
    }

    Ok(summary)
}

/// Turns a user's listing pages into rated items.
pub struct Scraper<'f, F> {
    fetcher: &'f F,
    settings: &'f Settings,
    user: &'f str,
    subject: Subject,
    enricher: Enricher<'f, F>,
}

impl<'f, F: Fetch> Scraper<'f, F> {
    pub fn new(fetcher: &'f F, settings: &'f Settings, user: &'f str, subject: Subject) -> Self {
        Self {
            fetcher,
            settings,
            user,
            subject,
            enricher: Enricher::new(fetcher, subject, settings.format),
        }
    }

    /// Walks every page of one rating, starting at page one.
    pub fn listing(&self, rating: u8) -> Result<Listing<'f, F>, Report> {
        let url = self.settings.rates_url(self.user, self.subject, rating, 1);
        let url = Uri::try_from(url.as_str())
            .with_context(|| format!("invalid listing url `{}`", url))?;

        Ok(Listing::new(self.fetcher, self.settings.format, rating, url))
    }

    /// Every rated item from `start_rating` up to the highest rating, in
    /// listing order.
    pub fn rated_items(
        &self,
        start_rating: u8,
    ) -> impl Iterator<Item = Result<RatedItem, Report>> + '_ {
        (start_rating..=*RATINGS.end()).flat_map(move |rating| self.rating_items(rating))
    }

    fn rating_items(
        &self,
        rating: u8,
    ) -> Box<dyn Iterator<Item = Result<RatedItem, Report>> + '_> {
        match self.listing(rating) {
            Ok(listing) => Box::new(listing.map(move |summary| {
                summary.and_then(|summary| self.enricher.enrich(summary, rating))
            })),
            Err(err) => Box::new(std::iter::once(Err(err))),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use imhodump_common::utils::Format;

    use super::*;
    use crate::testing::{detail_html, listing_html, Site};

    fn settings(dir: PathBuf, start_from_rating: u8) -> Settings {
        Settings {
            rates_url: "http://user.imhonet.ru/{user}/content/{subject}/rates/{rating}/?page={page}"
                .into(),
            start_from_rating,
            output_dir: dir,
            format: Format::Html,
        }
    }

    fn rates_url(rating: u8) -> String {
        format!(
            "http://user.imhonet.ru/42/content/films/rates/{}/?page=1",
            rating
        )
    }

    fn element_url(rating: u8) -> String {
        format!("http://films.imhonet.ru/element/{}/", rating)
    }

    /// One film per rating, released in `2000 + rating`
    fn site() -> Site {
        let mut site = Site::default();

        for rating in RATINGS {
            let title = format!("Фильм {}", rating);
            let url = element_url(rating);
            let year = (2000 + u32::from(rating)).to_string();

            site = site
                .page(
                    &rates_url(rating),
                    listing_html(&[(title.as_str(), url.as_str())], None),
                )
                .page(&url, detail_html(&format!("{} ({})", title, year), &year));
        }

        site
    }

    #[test]
    fn walks_every_rating_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path().to_path_buf(), 1);
        let site = site();

        let items: Vec<_> = Scraper::new(&site, &settings, "42", Subject::Films)
            .rated_items(1)
            .collect::<Result<_, _>>()
            .unwrap();

        let ratings: Vec<u8> = items.iter().map(|item| item.rating).collect();
        assert_eq!(ratings, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(items[6].title_ru, "Фильм 7");
        assert_eq!(items[6].year.as_deref(), Some("2007"));
        assert_eq!(items[9].details_url, element_url(10));
    }

    #[test]
    fn resuming_fetches_only_the_remaining_ratings() {
        let dir = tempfile::tempdir().unwrap();

        let settings_from_one = settings(dir.path().to_path_buf(), 1);
        let first = run_with(&site(), &settings_from_one, "42", Subject::Films).unwrap();
        assert_eq!(first.added, 10);

        let path = dir.path().join("films_42.json");
        let existing = imhodump_store::load(&path).unwrap();
        let kept: imhodump_store::Collection = existing
            .into_iter()
            .filter(|(_, item)| item.rating <= 5)
            .collect();
        imhodump_store::dump(&path, &kept, std::iter::empty()).unwrap();

        let resumed_site = site();
        let second = run_with(
            &resumed_site,
            &settings(dir.path().to_path_buf(), 6),
            "42",
            Subject::Films,
        )
        .unwrap();

        assert_eq!(second.kept, 5);
        assert_eq!(second.added, 5);

        let requests = resumed_site.requests();
        for rating in 1..=5 {
            assert!(!requests.contains(&rates_url(rating)));
            assert!(!requests.contains(&element_url(rating)));
        }
        assert!(requests.contains(&rates_url(6)));

        let ratings: Vec<u8> = imhodump_store::load(&path)
            .unwrap()
            .values()
            .map(|item| item.rating)
            .collect();
        assert_eq!(ratings, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn rerun_backs_up_and_adds_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path().to_path_buf(), 1);

        run_with(&site(), &settings, "42", Subject::Films).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let summary = run_with(&site(), &settings, "42", Subject::Films).unwrap();

        assert_eq!(summary.kept, 10);
        assert_eq!(summary.added, 0);
        assert_eq!(summary.skipped, 10);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn broken_listing_still_leaves_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path().to_path_buf(), 1);
        let site = site().page(
            &rates_url(3),
            r#"<div class="m-rate-list-item"><a class="m-rate-item-content-header-link">?</a></div>"#,
        );

        let summary = run_with(&site, &settings, "42", Subject::Films).unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.added, 2);

        let loaded = imhodump_store::load(&dir.path().join("films_42.json")).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn malformed_previous_dump_aborts_without_touching_it() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path().to_path_buf(), 1);
        let path = dir.path().join("films_42.json");
        fs::write(&path, "[{").unwrap();

        assert!(run_with(&site(), &settings, "42", Subject::Films).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{");
    }
}
