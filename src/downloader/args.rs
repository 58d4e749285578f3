// Argument construction for the extraction tool. Pure; no I/O.

use std::path::Path;

use super::models::JobRequest;
use crate::error::Error;

/// yt-dlp output template: title truncated to dodge path-length limits, the
/// video id kept so two uploads with the same title cannot collide.
const OUTPUT_TEMPLATE: &str = "%(title).200s [%(id)s].%(ext)s";

/// Map a job request to the ordered yt-dlp argument list. Deterministic for a
/// given request; the only failure is a malformed request, caught before any
/// process is spawned.
pub fn build_args(request: &JobRequest, bin_dir: &Path) -> Result<Vec<String>, Error> {
    request.validate()?;

    let mut args: Vec<String> = vec![
        // Extract audio instead of keeping the video stream
        "-x".into(),
        "--audio-format".into(),
        // "best" is yt-dlp's own keyword for "no conversion"
        request.format.as_str().into(),
        "-P".into(),
        request.dest.to_string_lossy().into_owned(),
        "-o".into(),
        OUTPUT_TEMPLATE.into(),
        // Sanitize characters that are illegal on the strictest host filesystem
        "--windows-filenames".into(),
        "--ffmpeg-location".into(),
        bin_dir.to_string_lossy().into_owned(),
        // Line-buffered progress, no ANSI noise, no prompts
        "--newline".into(),
        "--no-colors".into(),
    ];

    if request.playlist {
        args.push("--yes-playlist".into());
    } else {
        args.push("--no-playlist".into());
    }

    args.push(request.url.clone());
    Ok(args)
}
