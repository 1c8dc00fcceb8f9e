use std::path::{Path, PathBuf};

use anyhow::Result;
use image::{DynamicImage, ImageDecoder, ImageReader, codecs::jpeg::JpegEncoder};
use tokio::task::spawn_blocking;
use tracing::{debug, instrument};

use crate::media::ThumbFormat;

// image thumbnail pipeline
//
// the image crate is built on synchronous std::io, so every call here gets
// wrapped in spawn_blocking to avoid jamming the async runtime

#[instrument(skip_all, fields(width, quality))]
pub async fn create_image_thumbnail(
    source_path: &Path,
    dest_path: &Path,
    width: u32,
    format: ThumbFormat,
    quality: u8,
) -> Result<()> {
    debug!("creating image thumbnail");

    let source_path = source_path.to_path_buf();
    let dest_path = dest_path.to_path_buf();

    spawn_blocking(move || generate_sync(&source_path, &dest_path, width, format, quality))
        .await?
}

fn generate_sync(
    source_path: &Path,
    dest_path: &Path,
    width: u32,
    format: ThumbFormat,
    quality: u8,
) -> Result<()> {
    let mut decoder = ImageReader::open(source_path)?
        .with_guessed_format()?
        .into_decoder()?;

    let orientation = decoder.orientation()?;

    let image = DynamicImage::from_decoder(decoder)?;

    let (src_w, src_h) = (image.width(), image.height());

    // fit=inside, withoutEnlargement=true: never produce a thumbnail larger
    // than the source
    let target_w = width.min(src_w).max(1);
    let target_h = ((target_w as u64 * src_h as u64) / src_w.max(1) as u64).max(1) as u32;

    let mut thumbnail = image.resize(target_w, target_h, image::imageops::FilterType::Lanczos3);
    thumbnail.apply_orientation(orientation);

    write_atomic(&thumbnail, dest_path, format, quality)?;

    Ok(())
}

fn write_atomic(
    image: &DynamicImage,
    dest_path: &Path,
    format: ThumbFormat,
    quality: u8,
) -> Result<()> {
    let tmp_path = tmp_sibling(dest_path);

    match format {
        ThumbFormat::Jpg => {
            let rgb = image.to_rgb8();
            let mut file = std::fs::File::create(&tmp_path)?;
            let mut encoder = JpegEncoder::new_with_quality(&mut file, quality.clamp(1, 100));
            encoder.encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ExtendedColorType::Rgb8,
            )?;
        }
        ThumbFormat::Png => {
            image.save_with_format(&tmp_path, image::ImageFormat::Png)?;
        }
        ThumbFormat::Webp => {
            image.save_with_format(&tmp_path, image::ImageFormat::WebP)?;
        }
    }

    std::fs::rename(&tmp_path, dest_path)?;

    Ok(())
}

fn tmp_sibling(dest_path: &Path) -> PathBuf {
    let mut tmp = dest_path.to_path_buf();
    let file_name = tmp
        .file_name()
        .map(|n| format!("{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| "thumb.tmp".to_owned());
    tmp.set_file_name(file_name);
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_sibling_names_stay_alongside_dest() {
        let dest = PathBuf::from("/data/thumbs/abc123.jpg");
        let tmp = tmp_sibling(&dest);
        assert_eq!(tmp, PathBuf::from("/data/thumbs/abc123.jpg.tmp"));
    }
}
