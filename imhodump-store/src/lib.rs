use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufWriter, Write as _},
    ops::Deref,
    path::{Path, PathBuf},
};

use imhodump_common::{bail, models::RatedItem, Context as _, Report, RATINGS};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

/// Previously dumped items keyed by `details_url`, in file order.
pub type Collection = IndexMap<String, StoredItem>;

/// An item of the collection.
///
/// Items read from a dump keep the exact json they were read from and are
/// written back as is.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredItem {
    item: RatedItem,
    json: Option<serde_json::Value>,
}

impl From<RatedItem> for StoredItem {
    fn from(item: RatedItem) -> Self {
        Self { item, json: None }
    }
}

impl Deref for StoredItem {
    type Target = RatedItem;

    fn deref(&self) -> &Self::Target {
        &self.item
    }
}

/// Reads a dumped json array.
///
/// A missing file is an empty collection, a file that is not a json array of
/// items (or holds a rating outside 1 to 10) is an error. Empty objects (the
/// sentinel that closes every dump) are skipped.
#[tracing::instrument(skip(path), fields(path = %path.display()), err)]
pub fn load(path: &Path) -> Result<Collection, Report> {
    if !path.exists() {
        tracing::debug!("no previous dump");

        return Ok(Collection::new());
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("unable to read `{}`", path.display()))?;

    let entries: Vec<serde_json::Value> = serde_json::from_str(&data)
        .with_context(|| format!("malformed json in `{}`", path.display()))?;

    let mut collection = Collection::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        if entry.as_object().map_or(false, |object| object.is_empty()) {
            continue;
        }

        let item: RatedItem = serde_json::from_value(entry.clone()).with_context(|| {
            format!("malformed entry {} in `{}`", index, path.display())
        })?;

        if !RATINGS.contains(&item.rating) {
            bail!(
                "entry {} in `{}` has rating {}, expected {} to {}",
                index,
                path.display(),
                item.rating,
                RATINGS.start(),
                RATINGS.end()
            );
        }

        collection.insert(
            item.details_url.clone(),
            StoredItem {
                item,
                json: Some(entry),
            },
        );
    }

    tracing::info!(items = collection.len(), "loaded previously dumped items");

    Ok(collection)
}

/// Copies an existing dump to `<path>.bak<timestamp>`.
///
/// Returns the backup path, or `None` when there was nothing to back up.
#[tracing::instrument(skip(path), fields(path = %path.display()), err)]
pub fn backup(path: &Path) -> Result<Option<PathBuf>, Report> {
    if !path.exists() {
        return Ok(None);
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f");

    let mut target = path.as_os_str().to_owned();
    target.push(format!(".bak{}", timestamp));
    let target = PathBuf::from(target);

    tracing::info!(backup = %target.display(), "backing up previous dump");

    fs::copy(path, &target).with_context(|| {
        format!(
            "unable to back up `{}` to `{}`",
            path.display(),
            target.display()
        )
    })?;

    Ok(Some(target))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DumpSummary {
    /// Items carried over from the previous dump
    pub kept: usize,
    /// Newly fetched items written
    pub added: usize,
    /// Newly fetched items dropped because their url was already written
    pub skipped: usize,
    /// Whether an error cut the run short
    pub interrupted: bool,
}

/// Writes `existing` followed by every new item from `items` to `path`.
///
/// Items are flushed one by one. An error coming out of `items` ends the run,
/// is logged, and the array is still closed so the file stays loadable.
#[tracing::instrument(skip(path, existing, items), fields(path = %path.display()), err)]
pub fn dump<I>(path: &Path, existing: &Collection, items: I) -> Result<DumpSummary, Report>
where
    I: IntoIterator<Item = Result<RatedItem, Report>>,
{
    let mut writer = ArrayWriter::create(path)?;
    let mut summary = DumpSummary::default();

    if let Err(err) = write_items(&mut writer, existing, items, &mut summary) {
        tracing::error!(error = ?err, "unhandled error while dumping, closing the file out");

        summary.interrupted = true;
    }

    writer.finish()?;

    tracing::info!(
        kept = summary.kept,
        added = summary.added,
        skipped = summary.skipped,
        "dump finished"
    );

    Ok(summary)
}

fn write_items<I>(
    writer: &mut ArrayWriter,
    existing: &Collection,
    items: I,
    summary: &mut DumpSummary,
) -> Result<(), Report>
where
    I: IntoIterator<Item = Result<RatedItem, Report>>,
{
    let mut written: HashSet<String> = existing.keys().cloned().collect();

    for stored in existing.values() {
        match &stored.json {
            Some(json) => writer.push(json)?,
            None => writer.push(&stored.item)?,
        }
        summary.kept += 1;
    }

    for item in items {
        let item = item?;

        if written.contains(&item.details_url) {
            tracing::debug!(url = %item.details_url, "already dumped, skipping");
            summary.skipped += 1;

            continue;
        }

        writer.push(&item)?;
        written.insert(item.details_url);
        summary.added += 1;
    }

    Ok(())
}

/// Streams a json array one pretty printed element at a time.
///
/// Every element is followed by a comma, the array is closed with an empty
/// object so the trailing comma stays valid.
struct ArrayWriter {
    out: BufWriter<File>,
}

impl ArrayWriter {
    fn create(path: &Path) -> Result<Self, Report> {
        let file = File::create(path)
            .with_context(|| format!("unable to create `{}`", path.display()))?;

        let mut out = BufWriter::new(file);
        out.write_all(b"[\n")?;

        Ok(Self { out })
    }

    fn push<T: Serialize + ?Sized>(&mut self, item: &T) -> Result<(), Report> {
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut self.out, formatter);
        item.serialize(&mut ser)?;

        self.out.write_all(b",\n")?;
        self.out.flush()?;

        Ok(())
    }

    fn finish(mut self) -> Result<(), Report> {
        self.out.write_all(b"{}\n]\n")?;
        self.out.flush()?;

        Ok(())
    }
}
