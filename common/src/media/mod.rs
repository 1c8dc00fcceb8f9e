pub mod image;
pub mod video;

/// output format for a generated thumbnail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThumbFormat {
    Webp,
    Jpg,
    Png,
}

impl ThumbFormat {
    pub fn parse(s: &str, allow_webp: bool) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "webp" if allow_webp => Ok(ThumbFormat::Webp),
            "jpg" | "jpeg" => Ok(ThumbFormat::Jpg),
            "png" => Ok(ThumbFormat::Png),
            other => Err(anyhow::Error::msg(format!(
                "unsupported thumbnail format: {other}"
            ))),
        }
    }

    pub fn ext(&self) -> &'static str {
        match self {
            ThumbFormat::Webp => "webp",
            ThumbFormat::Jpg => "jpg",
            ThumbFormat::Png => "png",
        }
    }
}
