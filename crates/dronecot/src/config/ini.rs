//! A figment provider for INI configuration files.
//!
//! Keys outside any section are read first, then the keys of the
//! application section. Key names are case-insensitive and empty values are
//! treated as unset.

use std::path::{Path, PathBuf};

use figment::value::{Dict, Map, Value};
use figment::{Error, Metadata, Profile, Provider, Source};
use ini::Ini;

#[derive(Debug, Clone)]
enum IniSource {
    File(PathBuf),
    String(String),
}

/// INI file or string provider.
#[derive(Debug, Clone)]
pub struct IniFile {
    source: IniSource,
    section: String,
}

impl IniFile {
    /// Read `path`; a missing file provides nothing.
    pub fn file(path: impl AsRef<Path>, section: impl Into<String>) -> Self {
        Self {
            source: IniSource::File(path.as_ref().to_path_buf()),
            section: section.into(),
        }
    }

    /// Read INI data from a string.
    pub fn string(contents: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            source: IniSource::String(contents.into()),
            section: section.into(),
        }
    }

    fn load(&self) -> Result<Option<Ini>, Error> {
        match &self.source {
            IniSource::File(path) if !path.exists() => Ok(None),
            IniSource::File(path) => Ini::load_from_file(path)
                .map(Some)
                .map_err(|e| Error::from(format!("{}: {e}", path.display()))),
            IniSource::String(contents) => Ini::load_from_str(contents)
                .map(Some)
                .map_err(|e| Error::from(e.to_string())),
        }
    }

    fn dict(&self) -> Result<Dict, Error> {
        let mut dict = Dict::new();
        let Some(ini) = self.load()? else {
            return Ok(dict);
        };

        for section in [None, Some(self.section.as_str())] {
            let Some(properties) = ini.section(section) else {
                continue;
            };
            for (key, value) in properties.iter() {
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                dict.insert(
                    key.trim().to_ascii_lowercase(),
                    Value::from(value.to_string()),
                );
            }
        }
        Ok(dict)
    }
}

impl Provider for IniFile {
    fn metadata(&self) -> Metadata {
        match &self.source {
            IniSource::File(path) => Metadata::from("INI file", Source::File(path.clone())),
            IniSource::String(_) => Metadata::named("INI source string"),
        }
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        Ok(Profile::Default.collect(self.dict()?))
    }
}
