//! Streaming GTFS CSV ingestion: reads a feed directory or zip file one row
//! at a time without materializing the whole file in memory. Covers
//! `stops.txt`, `stop_times.txt`, `trips.txt`, `routes.txt`, `calendar.txt`,
//! `calendar_dates.txt`, `shapes.txt` and `transfers.txt`.

pub mod models;

pub use models::*;
use serde::de::DeserializeOwned;
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use zip::{ZipArchive, read::ZipFile};

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("could not find required file: {0}")]
    FileNotFound(String),
    #[error("no source configured to read GTFS data from")]
    MissingSource,
}

#[derive(Default)]
pub enum Source {
    #[default]
    None,
    Zip(ZipArchive<File>),
    Directory(PathBuf),
}

/// A readable GTFS feed, backed by either a directory of `.txt` files or a
/// zip archive containing them.
#[derive(Default)]
pub struct Gtfs {
    storage: Source,
}

impl Gtfs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_zip<P: AsRef<Path>>(mut self, path: P) -> Result<Self, Error> {
        let zip_file = File::open(path)?;
        let archive = ZipArchive::new(zip_file)?;
        self.storage = Source::Zip(archive);
        Ok(self)
    }

    pub fn from_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.storage = Source::Directory(path.as_ref().to_path_buf());
        self
    }

    fn stream<T, F>(&mut self, file_name: &str, required: bool, f: F) -> Result<(), Error>
    where
        T: DeserializeOwned,
        F: FnMut((usize, T)),
    {
        match &mut self.storage {
            Source::None => Err(Error::MissingSource),
            Source::Zip(archive) => match get_file_from_zip(archive, file_name) {
                Ok(file) => stream_reader(file, f),
                Err(Error::FileNotFound(_)) if !required => Ok(()),
                Err(err) => Err(err),
            },
            Source::Directory(path) => {
                let file_path = path.join(file_name);
                if !required && !file_path.exists() {
                    return Ok(());
                }
                let file = fs::File::open(file_path)?;
                let reader = io::BufReader::with_capacity(128 * 1024, file);
                stream_reader(reader, f)
            }
        }
    }

    pub fn stream_stops<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut((usize, GtfsStop)),
    {
        self.stream("stops.txt", true, f)
    }

    pub fn stream_stop_times<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut((usize, GtfsStopTime)),
    {
        self.stream("stop_times.txt", true, f)
    }

    pub fn stream_trips<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut((usize, GtfsTrip)),
    {
        self.stream("trips.txt", false, f)
    }

    pub fn stream_routes<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut((usize, GtfsRoute)),
    {
        self.stream("routes.txt", false, f)
    }

    pub fn stream_calendar<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut((usize, GtfsCalendar)),
    {
        self.stream("calendar.txt", false, f)
    }

    pub fn stream_calendar_dates<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut((usize, GtfsCalendarDate)),
    {
        self.stream("calendar_dates.txt", false, f)
    }

    pub fn stream_shapes<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut((usize, GtfsShape)),
    {
        self.stream("shapes.txt", false, f)
    }

    pub fn stream_transfers<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut((usize, GtfsTransfer)),
    {
        self.stream("transfers.txt", false, f)
    }
}

fn stream_reader<R, T, F>(reader: R, mut f: F) -> Result<(), Error>
where
    R: io::Read,
    T: DeserializeOwned,
    F: FnMut((usize, T)),
{
    let mut csv_reader = csv::Reader::from_reader(reader);
    for (i, result) in csv_reader.deserialize().enumerate() {
        let record: T = result?;
        f((i, record));
    }
    Ok(())
}

fn get_file_from_zip<'a>(
    archive: &'a mut ZipArchive<File>,
    name: &'a str,
) -> Result<ZipFile<'a, File>, Error> {
    let index = archive
        .index_for_name(name)
        .ok_or_else(|| Error::FileNotFound(name.to_string()))?;
    let file = archive.by_index(index)?;
    Ok(file)
}
