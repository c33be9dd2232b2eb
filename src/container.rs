//! Detects the container/media type of an input or output buffer.
//!
//! `file_format` covers everything except AVIF, whose ftyp brand it does not yet
//! distinguish from other ISO-BMFF containers, so a small brand check is layered
//! on top.

use file_format::FileFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
	Webp,
	Gif,
	Png,
	Mp4,
	Flv,
	Avi,
	Mov,
	Jpeg,
	Tiff,
	Webm,
	Avif,
	Zip,
}

impl Container {
	pub fn is_animatable(&self) -> bool {
		matches!(self, Container::Webp | Container::Gif | Container::Avif | Container::Mp4 | Container::Webm)
	}

	pub fn content_type(&self) -> &'static str {
		match self {
			Container::Webp => "image/webp",
			Container::Gif => "image/gif",
			Container::Png => "image/png",
			Container::Mp4 => "video/mp4",
			Container::Flv => "video/x-flv",
			Container::Avi => "video/x-msvideo",
			Container::Mov => "video/quicktime",
			Container::Jpeg => "image/jpeg",
			Container::Tiff => "image/tiff",
			Container::Webm => "video/webm",
			Container::Avif => "image/avif",
			Container::Zip => "application/zip",
		}
	}

	/// Identifies the container of `buf`, returning `None` for anything unsupported.
	pub fn detect(buf: &[u8]) -> Option<Container> {
		if is_avif(buf) {
			return Some(Container::Avif);
		}

		let format = FileFormat::from_bytes(buf);
		match format {
			FileFormat::WebP => Some(Container::Webp),
			FileFormat::GraphicsInterchangeFormat => Some(Container::Gif),
			FileFormat::PortableNetworkGraphics => Some(Container::Png),
			FileFormat::Mpeg4Part14 | FileFormat::Mpeg4Part14Video => Some(Container::Mp4),
			FileFormat::FlashVideo => Some(Container::Flv),
			FileFormat::AudioVideoInterleave => Some(Container::Avi),
			FileFormat::QuicktimeMovie => Some(Container::Mov),
			FileFormat::JointPhotographicExpertsGroup => Some(Container::Jpeg),
			FileFormat::TagImageFileFormat => Some(Container::Tiff),
			FileFormat::Webm => Some(Container::Webm),
			FileFormat::Zip => Some(Container::Zip),
			_ => None,
		}
	}
}

/// Brands that identify an AVIF (as opposed to HEIC or another ISO-BMFF payload) `ftyp` box.
const AVIF_BRANDS: [&[u8; 4]; 3] = [b"avis", b"avif", b"avio"];

fn is_avif(buf: &[u8]) -> bool {
	if buf.len() < 12 {
		return false;
	}
	if &buf[4..8] != b"ftyp" {
		return false;
	}
	AVIF_BRANDS.contains(&&buf[8..12].try_into().unwrap())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn detects_avif_by_ftyp_brand() {
		let mut buf = vec![0u8; 16];
		buf[4..8].copy_from_slice(b"ftyp");
		buf[8..12].copy_from_slice(b"avif");
		assert_eq!(Container::detect(&buf), Some(Container::Avif));
	}

	#[test]
	fn rejects_non_avif_ftyp_brand() {
		let mut buf = vec![0u8; 16];
		buf[4..8].copy_from_slice(b"ftyp");
		buf[8..12].copy_from_slice(b"heic");
		assert_ne!(Container::detect(&buf), Some(Container::Avif));
	}

	#[test]
	fn detects_png_via_magic_bytes() {
		let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
		assert_eq!(Container::detect(&png), Some(Container::Png));
	}
}
