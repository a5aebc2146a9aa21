//! Compression presets and the tool parameters they resolve to.

use std::fmt;
use std::path::Path;

/// User-facing compression preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionPreset {
    Light,
    #[default]
    Balanced,
    Max,
}

impl CompressionPreset {
    /// Case-insensitive; anything unrecognised (or missing) is `Balanced`.
    pub fn parse(name: Option<&str>) -> Self {
        match name.map(str::to_ascii_lowercase).as_deref() {
            Some("light") => CompressionPreset::Light,
            Some("max") => CompressionPreset::Max,
            _ => CompressionPreset::Balanced,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionPreset::Light => "light",
            CompressionPreset::Balanced => "balanced",
            CompressionPreset::Max => "max",
        }
    }

    pub fn profile(&self) -> ToolProfile {
        match self {
            CompressionPreset::Light => ToolProfile {
                quality: QualityTier::Printer,
                color_dpi: 150,
                gray_dpi: 150,
                mono_dpi: 600,
                detect_duplicate_images: true,
                compress_fonts: true,
            },
            CompressionPreset::Balanced => ToolProfile {
                quality: QualityTier::Ebook,
                color_dpi: 96,
                gray_dpi: 96,
                mono_dpi: 300,
                detect_duplicate_images: true,
                compress_fonts: true,
            },
            CompressionPreset::Max => ToolProfile {
                quality: QualityTier::Screen,
                color_dpi: 72,
                gray_dpi: 72,
                mono_dpi: 300,
                detect_duplicate_images: true,
                compress_fonts: true,
            },
        }
    }
}

impl fmt::Display for CompressionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a requested preset name straight to its tool profile.
pub fn resolve(name: Option<&str>) -> ToolProfile {
    CompressionPreset::parse(name).profile()
}

/// Named quality tier understood by the compression tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    Printer,
    Ebook,
    Screen,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Printer => "printer",
            QualityTier::Ebook => "ebook",
            QualityTier::Screen => "screen",
        }
    }
}

/// Concrete invocation parameters for one compression run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolProfile {
    pub quality: QualityTier,
    pub color_dpi: u32,
    pub gray_dpi: u32,
    pub mono_dpi: u32,
    pub detect_duplicate_images: bool,
    pub compress_fonts: bool,
}

impl ToolProfile {
    /// Full argument list for a pdfwrite run from `input` to `output`.
    pub fn tool_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-sDEVICE=pdfwrite".to_string(),
            "-dCompatibilityLevel=1.4".to_string(),
            format!("-dPDFSETTINGS=/{}", self.quality.as_str()),
            format!("-dDetectDuplicateImages={}", self.detect_duplicate_images),
            format!("-dCompressFonts={}", self.compress_fonts),
        ];

        for (class, dpi) in [
            ("Color", self.color_dpi),
            ("Gray", self.gray_dpi),
            ("Mono", self.mono_dpi),
        ] {
            args.push(format!("-dDownsample{}Images=true", class));
            args.push(format!("-d{}ImageDownsampleType=/Bicubic", class));
            args.push(format!("-d{}ImageResolution={}", class, dpi));
        }

        args.extend([
            "-dNOPAUSE".to_string(),
            "-dQUIET".to_string(),
            "-dBATCH".to_string(),
            format!("-sOutputFile={}", output.display()),
            input.display().to_string(),
        ]);
        args
    }
}
