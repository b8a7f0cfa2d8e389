//! Extractor records and the quality-bucket reduction applied to them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::humanize::{format_filesize, sanitize_filename};

pub const DEFAULT_TITLE: &str = "Twitter Space";
pub const DEFAULT_AUTHOR: &str = "Unknown";
const DEFAULT_EXT: &str = "mp4";
const AUDIO_EXT: &str = "mp3";

/// One candidate stream as reported by the extractor. Never mutated here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: Option<String>,
    pub url: Option<String>,
    pub ext: Option<String>,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub abr: Option<f64>,
    pub asr: Option<f64>,
    pub filesize: Option<Value>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
}

impl FormatDescriptor {
    /// Codecs count as present unless the extractor literally says `none`.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref() != Some("none")
    }

    pub fn filesize(&self) -> Option<f64> {
        parse_size(self.filesize.as_ref())
    }

    /// Size used to rank descriptors sharing a label; unknown sizes rank as 0.
    pub fn byte_size(&self) -> u64 {
        self.filesize()
            .filter(|size| size.is_finite() && *size > 0.0)
            .map(|size| size as u64)
            .unwrap_or(0)
    }
}

/// Top-level metadata for one piece of media, possibly wrapping a playlist.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaRecord {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub url: Option<String>,
    pub ext: Option<String>,
    pub filesize: Option<Value>,
    pub formats: Option<Vec<FormatDescriptor>>,
    pub entries: Option<Vec<MediaRecord>>,
}

impl MediaRecord {
    /// Unwraps playlist-shaped output to its first entry. `None` when the
    /// playlist is empty.
    pub fn primary(self) -> Option<Self> {
        match self.entries {
            Some(entries) => entries.into_iter().next(),
            None => Some(self),
        }
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    pub fn author(&self) -> &str {
        self.uploader.as_deref().unwrap_or(DEFAULT_AUTHOR)
    }

    pub fn formats(&self) -> &[FormatDescriptor] {
        self.formats.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReducedFormat {
    pub format_id: String,
    pub url: String,
    pub ext: String,
    pub quality: String,
    pub filesize: String,
    pub filename: String,
}

/// Response payload describing one piece of media and its reduced formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSummary {
    pub title: String,
    pub author: String,
    pub duration: String,
    pub thumbnail: String,
    pub formats: Vec<ReducedFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionMode {
    /// Audio streams without video; every entry is delivered as mp3.
    AudioOnly,
    VideoOnly,
    /// Anything carrying audio, muxed video or not.
    AudioPreferred,
}

/// The two audio labelling rule sets in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioLabelScheme {
    /// 320/192/128 kbps buckets, then the codec tag when bitrate is unknown.
    CodecFallback,
    /// 320/256/192/128 kbps buckets, then the sample rate.
    SampleRateFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reduction {
    pub mode: ReductionMode,
    pub audio_labels: AudioLabelScheme,
    pub cap: usize,
}

impl Reduction {
    pub fn label(&self, descriptor: &FormatDescriptor) -> String {
        match self.mode {
            ReductionMode::VideoOnly => video_label(descriptor),
            ReductionMode::AudioOnly | ReductionMode::AudioPreferred => {
                audio_label(descriptor, self.audio_labels)
            }
        }
    }

    fn accepts(&self, descriptor: &FormatDescriptor) -> bool {
        match self.mode {
            ReductionMode::VideoOnly => descriptor.has_video(),
            ReductionMode::AudioOnly => descriptor.has_audio() && !descriptor.has_video(),
            ReductionMode::AudioPreferred => descriptor.has_audio(),
        }
    }

    fn fallback_label(&self) -> &'static str {
        match (self.mode, self.audio_labels) {
            (ReductionMode::VideoOnly, _) | (_, AudioLabelScheme::SampleRateFallback) => {
                "Standard Quality"
            }
            (_, AudioLabelScheme::CodecFallback) => "Standard Audio",
        }
    }

    fn output_ext<'a>(&self, native: Option<&'a str>) -> &'a str {
        match self.mode {
            ReductionMode::AudioOnly => AUDIO_EXT,
            ReductionMode::VideoOnly | ReductionMode::AudioPreferred => {
                native.unwrap_or(DEFAULT_EXT)
            }
        }
    }

    /// Keeps the largest descriptor per quality label, in first-seen label
    /// order, then caps the list. Output is not sorted by quality.
    pub fn reduce(&self, formats: &[FormatDescriptor], title: &str) -> Vec<ReducedFormat> {
        let mut buckets: Vec<(String, &FormatDescriptor)> = Vec::new();

        for descriptor in formats.iter().filter(|item| self.accepts(item)) {
            let label = self.label(descriptor);
            match buckets.iter_mut().find(|(existing, _)| *existing == label) {
                Some((_, kept)) => {
                    if descriptor.byte_size() > kept.byte_size() {
                        *kept = descriptor;
                    }
                }
                None => buckets.push((label, descriptor)),
            }
        }

        let stem = sanitize_filename(title);
        buckets
            .into_iter()
            .take(self.cap)
            .map(|(quality, descriptor)| {
                let ext = self.output_ext(descriptor.ext.as_deref()).to_string();
                ReducedFormat {
                    format_id: descriptor.format_id.clone().unwrap_or_default(),
                    url: descriptor.url.clone().unwrap_or_default(),
                    filename: format!("{stem}.{ext}"),
                    ext,
                    quality,
                    filesize: format_filesize(descriptor.filesize()),
                }
            })
            .collect()
    }

    /// [`Reduction::reduce`] over a record's formats, synthesizing a single
    /// entry from the record's direct URL when nothing qualifies.
    pub fn reduce_record(&self, record: &MediaRecord) -> Vec<ReducedFormat> {
        let title = record.title.as_deref().unwrap_or_default();
        let reduced = self.reduce(record.formats(), title);
        if !reduced.is_empty() || self.cap == 0 {
            return reduced;
        }

        let Some(direct_url) = record.url.as_deref().filter(|url| !url.is_empty()) else {
            return reduced;
        };

        let ext = self.output_ext(record.ext.as_deref()).to_string();
        vec![ReducedFormat {
            format_id: "direct".to_string(),
            url: direct_url.to_string(),
            filename: format!("{}.{ext}", sanitize_filename(title)),
            ext,
            quality: self.fallback_label().to_string(),
            filesize: format_filesize(parse_size(record.filesize.as_ref())),
        }]
    }
}

pub fn video_label(descriptor: &FormatDescriptor) -> String {
    if let Some(height) = descriptor.height.filter(|value| *value > 0) {
        return match height {
            h if h >= 1080 => "1080p HD".to_string(),
            h if h >= 720 => "720p HD".to_string(),
            h if h >= 480 => "480p".to_string(),
            h if h >= 360 => "360p".to_string(),
            _ => format!("{height}p"),
        };
    }

    match descriptor.width.filter(|value| *value > 0) {
        Some(width) if width >= 1920 => "1080p HD".to_string(),
        Some(width) if width >= 1280 => "720p HD".to_string(),
        _ => "Standard Quality".to_string(),
    }
}

pub fn audio_label(descriptor: &FormatDescriptor, scheme: AudioLabelScheme) -> String {
    let bitrate = descriptor.abr.filter(|value| *value > 0.0);

    match scheme {
        AudioLabelScheme::CodecFallback => match bitrate {
            Some(abr) if abr >= 320.0 => "High Quality Audio (320kbps)".to_string(),
            Some(abr) if abr >= 192.0 => "Standard Audio (192kbps)".to_string(),
            Some(abr) if abr >= 128.0 => "Good Audio (128kbps)".to_string(),
            Some(abr) => format!("Audio ({}kbps)", abr.trunc() as u32),
            None => {
                let codec = descriptor.acodec.as_deref().unwrap_or_default();
                if codec.contains("mp4a") || codec.contains("aac") {
                    "AAC Audio".to_string()
                } else if codec.contains("mp3") {
                    "MP3 Audio".to_string()
                } else {
                    "Standard Audio".to_string()
                }
            }
        },
        AudioLabelScheme::SampleRateFallback => match bitrate {
            Some(abr) if abr >= 320.0 => "High Quality (320kbps)".to_string(),
            Some(abr) if abr >= 256.0 => "High Quality (256kbps)".to_string(),
            Some(abr) if abr >= 192.0 => "Good Quality (192kbps)".to_string(),
            Some(abr) if abr >= 128.0 => "Standard Quality (128kbps)".to_string(),
            Some(abr) => format!("Basic Quality ({}kbps)", abr.trunc() as u32),
            None => match descriptor.asr.filter(|value| *value > 0.0) {
                Some(asr) if asr >= 48_000.0 => "High Quality (48kHz)".to_string(),
                Some(asr) if asr >= 44_100.0 => "CD Quality (44.1kHz)".to_string(),
                _ => "Standard Quality".to_string(),
            },
        },
    }
}

fn parse_size(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}
