use serde::Deserialize;

/// Extension given to media downloaded to a scratch file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScratchExtension {
    /// Always `.mp4`, the container the provider delivers
    #[default]
    Mp4,

    /// Keep the extension found at the end of the remote URL path
    Native,
}

impl ScratchExtension {
    /// Build the scratch file name for `stem`, downloaded from `url`.
    ///
    /// [`ScratchExtension::Native`] falls back to `.mp4` when the URL path
    /// has no usable extension.
    pub fn file_name(self, stem: &str, url: &str) -> String {
        let ext = match self {
            ScratchExtension::Mp4 => None,
            ScratchExtension::Native => native_extension(url),
        };

        format!("{stem}.{}", ext.unwrap_or("mp4"))
    }
}

fn native_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;

    let usable = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    usable.then_some(ext)
}
