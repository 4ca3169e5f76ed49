use crate::downloader::TrackDetails;
use crate::errors::{Result, CoverQueueError};
use id3::frame::{Picture as Id3Picture, PictureType as Id3PictureType};
use id3::{Tag, TagLike, Version};
use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture as LoftyPicture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag as LoftyTag};
use std::path::Path;

/// Label stored with embedded artwork
const PICTURE_DESCRIPTION: &str = "Album art";

/// Tag container a file is written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagContainer {
    Id3,
    Lofty,
    /// No tag writer for this container (webm and unknown extensions)
    Unsupported,
}

impl TagContainer {
    pub fn for_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "mp3" => TagContainer::Id3,
            "m4a" | "mp4" | "flac" | "ogg" | "opus" => TagContainer::Lofty,
            _ => TagContainer::Unsupported,
        }
    }
}

/// Writes title/artist/album and a front cover into audio files
pub struct TagWriter;

impl TagWriter {
    /// Rewrite the file's tags in place; returns false when the container has no writer
    pub fn write(path: &Path, details: &TrackDetails, cover: Option<&[u8]>) -> Result<bool> {
        match TagContainer::for_path(path) {
            TagContainer::Id3 => Self::write_id3(path, details, cover).map(|_| true),
            TagContainer::Lofty => Self::write_lofty(path, details, cover).map(|_| true),
            TagContainer::Unsupported => Ok(false),
        }
    }

    fn write_id3(path: &Path, details: &TrackDetails, cover: Option<&[u8]>) -> Result<()> {
        let mut tag = match Tag::read_from_path(path) {
            Ok(tag) => tag,
            Err(_) => Tag::new(),
        };

        if let Some(title) = &details.title {
            tag.set_title(title.as_str());
        }
        if let Some(artist) = &details.artist {
            tag.set_artist(artist.as_str());
        }
        if let Some(album) = &details.album {
            tag.set_album(album.as_str());
        }

        if let Some(data) = cover {
            tag.remove_picture_by_type(Id3PictureType::CoverFront);
            tag.add_frame(Id3Picture {
                mime_type: "image/jpeg".to_string(),
                picture_type: Id3PictureType::CoverFront,
                description: PICTURE_DESCRIPTION.to_string(),
                data: data.to_vec(),
            });
        }

        tag.write_to_path(path, Version::Id3v24)
            .map_err(|e| CoverQueueError::TagWriteFailed(format!("{}: {}", path.display(), e)))
    }

    fn write_lofty(path: &Path, details: &TrackDetails, cover: Option<&[u8]>) -> Result<()> {
        let mut tagged_file = Probe::open(path)
            .and_then(|probe| probe.read())
            .map_err(|e| CoverQueueError::TagWriteFailed(format!("{}: {}", path.display(), e)))?;

        if tagged_file.primary_tag_mut().is_none() {
            let tag_type = tagged_file.primary_tag_type();
            tagged_file.insert_tag(LoftyTag::new(tag_type));
        }
        let tag = tagged_file
            .primary_tag_mut()
            .ok_or_else(|| CoverQueueError::TagWriteFailed(format!("{}: no writable tag", path.display())))?;

        if let Some(title) = &details.title {
            tag.insert_text(ItemKey::TrackTitle, title.clone());
        }
        if let Some(artist) = &details.artist {
            tag.insert_text(ItemKey::TrackArtist, artist.clone());
        }
        if let Some(album) = &details.album {
            tag.insert_text(ItemKey::AlbumTitle, album.clone());
        }

        if let Some(data) = cover {
            tag.remove_picture_type(PictureType::CoverFront);
            tag.push_picture(LoftyPicture::new_unchecked(
                PictureType::CoverFront,
                Some(MimeType::Jpeg),
                Some(PICTURE_DESCRIPTION.to_string()),
                data.to_vec(),
            ));
        }

        tagged_file
            .save_to_path(path, WriteOptions::default())
            .map_err(|e| CoverQueueError::TagWriteFailed(format!("{}: {}", path.display(), e)))
    }

    /// First embedded picture of an mp3, if any
    pub fn read_mp3_picture(path: &Path) -> Result<Option<Vec<u8>>> {
        let tag = match Tag::read_from_path(path) {
            Ok(tag) => tag,
            Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let picture = tag.pictures().next().map(|picture| picture.data.clone());
        Ok(picture)
    }

    /// Replace the front cover of an mp3, keeping every other frame
    pub fn replace_mp3_cover(path: &Path, data: Vec<u8>) -> Result<()> {
        let mut tag = Tag::read_from_path(path)?;

        tag.remove_picture_by_type(Id3PictureType::CoverFront);
        tag.add_frame(Id3Picture {
            mime_type: "image/jpeg".to_string(),
            picture_type: Id3PictureType::CoverFront,
            description: "Cover".to_string(),
            data,
        });

        tag.write_to_path(path, Version::Id3v24)?;
        Ok(())
    }
}
