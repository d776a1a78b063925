use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::Path,
};

use miette::{miette, Context, IntoDiagnostic};
use tracing::{debug, info};

use crate::{
    io::ScratchFile,
    outside::HttpClient,
    result::{Error, Result},
    types::ScratchExtension,
};

/// Downloads media that cannot, or should not, be read remotely.
pub struct LocalFallbackFetcher<'a> {
    http: &'a dyn HttpClient,
    scratch_dir: Option<&'a Path>,
    extension: ScratchExtension,
}

impl<'a> LocalFallbackFetcher<'a> {
    pub fn new(
        http: &'a dyn HttpClient,
        scratch_dir: Option<&'a Path>,
        extension: ScratchExtension,
    ) -> Self {
        Self {
            http,
            scratch_dir,
            extension,
        }
    }

    /// Download `url` to a scratch file named after `name`.
    ///
    /// The file is removed when the returned handle is dropped, including
    /// when the download fails half-way.
    pub fn fetch(&self, url: &str, name: &str) -> Result<ScratchFile> {
        let file_name = self.extension.file_name(name, url);
        let scratch = ScratchFile::reserve(self.scratch_dir, &file_name)?;

        let written = self
            .download(url, scratch.path())
            .map_err(|report| Error::Download {
                url: url.to_owned(),
                report,
            })?;

        info!(
            "Downloaded {written} bytes from {url} to {}",
            scratch.path().display()
        );
        Ok(scratch)
    }

    fn download(&self, url: &str, dest: &Path) -> miette::Result<u64> {
        let mut body = self.http.get(url).map_err(miette::Report::from)?;
        let file = File::create(dest)
            .into_diagnostic()
            .wrap_err("Could not create scratch file")?;

        match body.content_length {
            Some(expected) => {
                debug!("Downloading {expected} bytes from {url}");
                file.set_len(expected).into_diagnostic()?;

                let mut writer = BufWriter::new(file);
                let written = io::copy(&mut (&mut body.reader).take(expected), &mut writer)
                    .into_diagnostic()?;
                writer.flush().into_diagnostic()?;

                if written != expected {
                    return Err(miette!(
                        "Connection closed after {written} of {expected} bytes"
                    ));
                }
                Ok(written)
            }
            None => {
                debug!("No Content-Length for {url}, reading until the end");
                let mut writer = BufWriter::new(file);
                let written = io::copy(&mut body.reader, &mut writer).into_diagnostic()?;
                writer.flush().into_diagnostic()?;
                Ok(written)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::always_ok;

    #[test]
    fn downloads_to_named_scratch_file() {
        let base = tempfile::tempdir().unwrap();
        let http = always_ok();
        let fetcher = LocalFallbackFetcher::new(&http, Some(base.path()), ScratchExtension::Mp4);

        let file = fetcher
            .fetch("https://otherplace.com/file.mpg", "abc123")
            .unwrap();
        assert!(file.path().starts_with(base.path()));
        assert!(file.path().ends_with("abc123.mp4"));
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), 100_000);
        assert_eq!(*http.gets.borrow(), vec!["https://otherplace.com/file.mpg"]);

        drop(file);
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn native_extension_policy() {
        let http = always_ok();
        let fetcher = LocalFallbackFetcher::new(&http, None, ScratchExtension::Native);

        let file = fetcher.fetch("http://videos.m.org/foo.ogg", "foo").unwrap();
        assert!(file.path().ends_with("foo.ogg"));
    }

    #[test]
    fn short_body_is_a_download_failure() {
        struct Short;
        impl HttpClient for Short {
            fn head(&self, _url: &str) -> Result<crate::outside::HeadResponse> {
                unreachable!()
            }

            fn get(&self, _url: &str) -> Result<crate::outside::Body> {
                Ok(crate::outside::Body {
                    content_length: Some(10),
                    reader: Box::new(io::Cursor::new(b"12345".to_vec())),
                })
            }
        }

        let base = tempfile::tempdir().unwrap();
        let fetcher = LocalFallbackFetcher::new(&Short, Some(base.path()), ScratchExtension::Mp4);
        let err = fetcher.fetch("https://otherplace.com/file.mp4", "x").unwrap_err();

        assert!(matches!(err, Error::Download { .. }));
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_length_reads_until_the_end() {
        struct Unsized;
        impl HttpClient for Unsized {
            fn head(&self, _url: &str) -> Result<crate::outside::HeadResponse> {
                unreachable!()
            }

            fn get(&self, _url: &str) -> Result<crate::outside::Body> {
                Ok(crate::outside::Body {
                    content_length: None,
                    reader: Box::new(io::Cursor::new(vec![b'0'; 12345])),
                })
            }
        }

        let base = tempfile::tempdir().unwrap();
        let fetcher = LocalFallbackFetcher::new(&Unsized, Some(base.path()), ScratchExtension::Mp4);

        let file = fetcher.fetch("https://otherplace.com/file.mp4", "abc123").unwrap();
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), 12345);

        drop(file);
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }
}
