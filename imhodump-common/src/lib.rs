pub mod models;
pub mod utils;

use std::path::PathBuf;

pub use color_eyre::{
    eyre::{bail, eyre as err, Context, Report},
    install,
};
pub use http::Uri;

use crate::{models::Subject, utils::Format};

pub const DEFAULT_RATES_URL: &str =
    "http://user.imhonet.ru/{user}/content/{subject}/rates/{rating}/?page={page}";

/// Every rating a user can give, walked in ascending order
pub const RATINGS: std::ops::RangeInclusive<u8> = 1..=10;

#[twelf::config]
pub struct Conf {
    /// Listing URL template, `{user}`, `{subject}`, `{rating}` and `{page}` are substituted
    pub rates_url: Option<String>,

    /// Rating to start scraping from, used to resume an interrupted run
    pub start_from_rating: Option<u8>,

    /// Directory the json, html and csv files are written to
    pub output_dir: Option<String>,

    /// Response format to request from the site, `html` or `json`
    pub format: Option<String>,
}

/// Validated view of [`Conf`] with defaults filled in.
#[derive(Clone, Debug)]
pub struct Settings {
    pub rates_url: String,
    pub start_from_rating: u8,
    pub output_dir: PathBuf,
    pub format: Format,
}

impl Settings {
    pub fn from_conf(conf: &Conf) -> Result<Self, Report> {
        let start_from_rating = conf.start_from_rating.unwrap_or(*RATINGS.start());
        if !RATINGS.contains(&start_from_rating) {
            bail!(
                "start_from_rating must be between {} and {}, got {}",
                RATINGS.start(),
                RATINGS.end(),
                start_from_rating
            );
        }

        let format = match conf.format.as_deref() {
            Some(format) => format.parse::<Format>().map_err(|e| err!(e))?,
            None => Format::Html,
        };

        Ok(Self {
            rates_url: conf
                .rates_url
                .clone()
                .unwrap_or_else(|| DEFAULT_RATES_URL.to_string()),
            start_from_rating,
            output_dir: conf
                .output_dir
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            format,
        })
    }

    /// Path of the json collection for a user and subject, the html and csv
    /// reports are its siblings.
    pub fn output_path(&self, subject: Subject, user: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}.json", subject, user))
    }

    pub fn rates_url(&self, user: &str, subject: Subject, rating: u8, page: usize) -> String {
        self.rates_url
            .replace("{user}", user)
            .replace("{subject}", subject.as_str())
            .replace("{rating}", &rating.to_string())
            .replace("{page}", &page.to_string())
    }
}
