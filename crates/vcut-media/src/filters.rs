//! FFmpeg video filter definitions.

use std::path::{Path, PathBuf};

use vcut_models::{CropParams, Manipulations, Rotation};

/// Filter for a clockwise rotation.
pub fn filter_rotate(rotation: Rotation) -> &'static str {
    match rotation {
        Rotation::Clockwise90 => "transpose=clock",
        Rotation::Half => "hflip,vflip",
        Rotation::Clockwise270 => "transpose=cclock",
    }
}

/// Filter for a crop rectangle in output pixels.
pub fn filter_crop(crop: &CropParams) -> String {
    format!("crop={}:{}:{}:{}", crop.width, crop.height, crop.x, crop.y)
}

/// Build the video filter chain for a set of manipulations.
///
/// Rotation runs before crop, so crop coordinates refer to the rotated frame.
/// Returns `None` when no video filter applies.
pub fn build_video_filter(manipulations: &Manipulations) -> Option<String> {
    let mut chain = Vec::new();

    if let Some(rotation) = manipulations.rotate {
        chain.push(filter_rotate(rotation).to_string());
    }
    if let Some(crop) = &manipulations.crop {
        chain.push(filter_crop(crop));
    }

    if chain.is_empty() {
        None
    } else {
        Some(chain.join(","))
    }
}

/// Render an ffconcat list for the concat demuxer.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for input in inputs {
        list.push_str("file '");
        list.push_str(&escape_concat_path(input));
        list.push_str("'\n");
    }
    list
}

fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_filters() {
        assert_eq!(filter_rotate(Rotation::Clockwise90), "transpose=clock");
        assert_eq!(filter_rotate(Rotation::Half), "hflip,vflip");
        assert_eq!(filter_rotate(Rotation::Clockwise270), "transpose=cclock");
    }

    #[test]
    fn test_filter_chain_rotates_before_crop() {
        let m = Manipulations {
            rotate: Some(Rotation::Clockwise90),
            crop: Some(CropParams::new(320, 240, 10, 20)),
            disable_audio: false,
        };
        assert_eq!(
            build_video_filter(&m).as_deref(),
            Some("transpose=clock,crop=320:240:10:20")
        );
    }

    #[test]
    fn test_mute_only_has_no_filter() {
        assert!(build_video_filter(&Manipulations::mute()).is_none());
        assert!(build_video_filter(&Manipulations::default()).is_none());
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/w/01-trim-0.mp4"),
            PathBuf::from("/w/it's.mp4"),
        ]);
        assert_eq!(
            list,
            "ffconcat version 1.0\nfile '/w/01-trim-0.mp4'\nfile '/w/it'\\''s.mp4'\n"
        );
    }
}
